use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::coordinator::{self, ExtractionFailure};
use crate::discovery::{self, SkippedFolder};
use crate::domain::IdentifierMap;
use crate::error::QcError;
use crate::reconcile::{self, Reconciliation};
use crate::scorer::{QualityScorer, ScorerRequest, ToolInfo};
use crate::table;
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress events to the log.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub show_progress: bool,
    /// Ask the scorer for its version; this spawns the tool.
    pub report_tool: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoringStatus {
    Scored { genomes: usize, reused_report: bool },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub output: String,
    pub genomes_detected: usize,
    pub rows_written: usize,
    pub skipped: Vec<SkippedFolder>,
    pub extraction_failures: Vec<ExtractionFailure>,
    pub scoring: ScoringStatus,
    pub unmapped: Vec<String>,
    pub workspace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolInfo>,
}

#[derive(Clone)]
pub struct App<S: QualityScorer> {
    config: ResolvedConfig,
    scorer: S,
}

impl<S: QualityScorer> App<S> {
    pub fn new(config: ResolvedConfig, scorer: S) -> Self {
        Self { config, scorer }
    }

    /// Opens the scratch workspace this configuration asks for.
    pub fn open_workspace(&self) -> Result<Workspace, QcError> {
        match &self.config.work_dir {
            Some(dir) => Workspace::at(dir),
            None => Workspace::temporary(self.config.keep_temp),
        }
    }

    /// Runs every stage against `workspace`. Only fatal conditions return an
    /// error; scoring problems degrade to empty score columns.
    pub fn run(
        &self,
        workspace: &Workspace,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, QcError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Discover; scanning {}", self.config.base_dir),
            elapsed: None,
        });
        let discovered = discovery::discover(
            &self.config.base_dir,
            &workspace.assemblies_dir(),
            &self.config.discovery,
        )?;
        discovered
            .identifiers
            .write_json(&workspace.name_map_path())?;

        let extraction = coordinator::run_extraction(
            &discovered.genomes,
            self.config.threads,
            options.show_progress,
            sink,
        )?;

        let (scoring, reconciliation) = match self.score(workspace, &discovered.identifiers, sink) {
            Ok((reconciliation, reused_report)) => (
                ScoringStatus::Scored {
                    genomes: reconciliation.scores.len(),
                    reused_report,
                },
                Some(reconciliation),
            ),
            Err(err) => {
                warn!(reason = %err, "quality scoring failed; completeness and contamination left empty");
                (
                    ScoringStatus::Failed {
                        reason: err.to_string(),
                    },
                    None,
                )
            }
        };

        let rows = table::assemble(&extraction.rows, reconciliation.as_ref());
        table::write_table(&self.config.out, &rows)?;
        if !self.config.out.as_std_path().is_file() {
            return Err(QcError::OutputMissing(
                self.config.out.as_std_path().to_path_buf(),
            ));
        }
        if rows.len() < self.config.min_rows {
            return Err(QcError::TooFewRows {
                rows: rows.len(),
                min_rows: self.config.min_rows,
            });
        }

        info!(output = %self.config.out, rows = rows.len(), "saved quality table");
        sink.event(ProgressEvent {
            message: format!("phase=Done; {} rows written", rows.len()),
            elapsed: Some(started.elapsed()),
        });

        Ok(RunSummary {
            output: self.config.out.to_string(),
            genomes_detected: discovered.genomes.len(),
            rows_written: rows.len(),
            skipped: discovered.skipped,
            extraction_failures: extraction.failures,
            scoring,
            unmapped: reconciliation
                .map(|reconciliation| reconciliation.unmapped)
                .unwrap_or_default(),
            workspace: workspace
                .is_retained()
                .then(|| workspace.root().to_string()),
            tool: options.report_tool.then(|| self.scorer.tool_info()),
        })
    }

    /// Scorer invocation plus reconciliation. Returns whether a report left
    /// by an earlier run was reused.
    fn score(
        &self,
        workspace: &Workspace,
        identifiers: &IdentifierMap,
        sink: &dyn ProgressSink,
    ) -> Result<(Reconciliation, bool), QcError> {
        let started = Instant::now();
        let reused_report =
            self.config.reuse_report && reconcile::locate_report(&workspace.scorer_dir()).is_ok();
        if reused_report {
            info!(dir = %workspace.scorer_dir(), "reusing existing quality report");
        } else {
            sink.event(ProgressEvent {
                message: "phase=Score; running quality scorer".to_string(),
                elapsed: None,
            });
            let request = ScorerRequest {
                threads: self.config.threads,
                input_dir: workspace.assemblies_dir(),
                output_dir: workspace.scorer_dir(),
                extension: self.config.discovery.sequence_extension.clone(),
                database: self.config.scorer.database.clone(),
            };
            self.scorer.predict(&request)?;
        }

        let reconciliation = reconcile::reconcile_workspace(workspace, identifiers)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Reconcile; {} genomes scored, {} bins unmapped",
                reconciliation.scores.len(),
                reconciliation.unmapped.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok((reconciliation, reused_report))
    }
}
