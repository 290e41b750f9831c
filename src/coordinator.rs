use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{AssemblyStats, Genome};
use crate::error::QcError;
use crate::extract;

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionFailure {
    pub genome: String,
    pub annotation_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Sorted by genome name.
    pub rows: Vec<AssemblyStats>,
    pub failures: Vec<ExtractionFailure>,
}

/// Extracts every genome on a pool of `threads` workers. One genome failing
/// never aborts the others; only pool construction can fail the call.
pub fn run_extraction(
    genomes: &[Genome],
    threads: usize,
    show_progress: bool,
    sink: &dyn ProgressSink,
) -> Result<ExtractionReport, QcError> {
    let threads = threads.max(1);
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|err| QcError::WorkerPool(err.to_string()))?;

    sink.event(ProgressEvent {
        message: format!("phase=Extract; {} genomes on {threads} workers", genomes.len()),
        elapsed: None,
    });
    let started = Instant::now();
    let bar = progress_bar(genomes.len() as u64, show_progress);

    let outcomes = pool.install(|| {
        genomes
            .par_iter()
            .map(|genome| {
                let outcome = extract::extract_genome(genome);
                bar.inc(1);
                (genome, outcome)
            })
            .collect::<Vec<_>>()
    });
    bar.finish_and_clear();

    let mut report = ExtractionReport::default();
    for (genome, outcome) in outcomes {
        match outcome {
            Ok(stats) => report.rows.push(stats),
            Err(err) => {
                warn!(
                    genome = %genome.name,
                    path = %genome.annotation_path,
                    reason = %err,
                    "extraction failed; genome excluded"
                );
                report.failures.push(ExtractionFailure {
                    genome: genome.name.clone(),
                    annotation_path: genome.annotation_path.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }
    report.rows.sort_by(|a, b| a.genome.cmp(&b.genome));

    info!(
        extracted = report.rows.len(),
        failed = report.failures.len(),
        "extraction finished"
    );
    sink.event(ProgressEvent {
        message: format!(
            "phase=Extract; {}/{} genomes extracted",
            report.rows.len(),
            genomes.len()
        ),
        elapsed: Some(started.elapsed()),
    });
    Ok(report)
}

fn progress_bar(total: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template("Genomes {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}]")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}
