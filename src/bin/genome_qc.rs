use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use genome_qc::app::{App, ProgressSink, RunOptions, RunSummary, ScoringStatus, TracingSink};
use genome_qc::config::{ConfigLoader, ConfigOverrides};
use genome_qc::error::QcError;
use genome_qc::output::{JsonOutput, OutputMode};
use genome_qc::scorer::CheckM2Scorer;

#[derive(Parser)]
#[command(name = "genome-qc")]
#[command(about = "Genome QC from GenBank bundles: assembly statistics plus CheckM2 completeness/contamination")]
#[command(version, author)]
struct Cli {
    /// Directory holding one subfolder per genome.
    #[arg(long)]
    base_dir: Option<String>,

    /// Output table; `.tsv` is tab-separated, anything else comma-separated.
    #[arg(long)]
    out: Option<String>,

    #[arg(long)]
    threads: Option<usize>,

    /// Environment runner used as `<runner> run -n <env> checkm2 ...`.
    #[arg(long, conflicts_with = "no_runner")]
    runner: Option<String>,

    /// Call `checkm2` from PATH directly.
    #[arg(long)]
    no_runner: bool,

    #[arg(long)]
    env: Option<String>,

    #[arg(long)]
    checkm2_db: Option<String>,

    /// Accepted annotation extensions, most preferred first.
    #[arg(long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    /// Fail when fewer rows than this are written.
    #[arg(long)]
    min_rows: Option<usize>,

    #[arg(long)]
    keep_temp: bool,

    /// Use this directory as the workspace instead of a temporary one.
    #[arg(long)]
    work_dir: Option<String>,

    /// Skip CheckM2 when the workspace already holds its report.
    #[arg(long)]
    reuse_checkm2: bool,

    /// JSON config file (defaults to ./genome-qc.json when present).
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    no_progress: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<QcError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &QcError) -> u8 {
    match error {
        QcError::NoGenomes(_) | QcError::BaseDirNotFound(_) => 2,
        QcError::ConfigRead(_) | QcError::ConfigParse(_) | QcError::InvalidConfig(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let overrides = ConfigOverrides {
        base_dir: cli.base_dir,
        out: cli.out,
        threads: cli.threads,
        runner: cli.runner,
        no_runner: cli.no_runner,
        env: cli.env,
        checkm2_db: cli.checkm2_db,
        extensions: cli.extensions,
        min_rows: cli.min_rows,
        keep_temp: cli.keep_temp,
        work_dir: cli.work_dir,
        reuse_checkm2: cli.reuse_checkm2,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;
    let scorer = CheckM2Scorer::new(&config.scorer);
    let app = App::new(config, scorer);

    let workspace = app.open_workspace()?;
    workspace.remove_on_interrupt()?;
    info!(workspace = %workspace.root(), "workspace ready");

    let options = RunOptions {
        show_progress: !cli.no_progress && matches!(output_mode, OutputMode::Text),
        report_tool: matches!(output_mode, OutputMode::Json),
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Text => &TracingSink,
        OutputMode::Json => &JsonOutput,
    };
    let result = app.run(&workspace, options, sink);

    if workspace.is_retained() {
        info!(workspace = %workspace.root(), "workspace kept");
    } else {
        info!(workspace = %workspace.root(), "cleaning workspace");
    }
    drop(workspace);

    let summary = result?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Text => print_summary(&summary),
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("[OK] Saved: {}", summary.output);
    println!(
        "[STATS] genomes_detected={} rows_written={} skipped_folders={} extraction_failures={}",
        summary.genomes_detected,
        summary.rows_written,
        summary.skipped.len(),
        summary.extraction_failures.len()
    );
    match &summary.scoring {
        ScoringStatus::Scored {
            genomes,
            reused_report,
        } => {
            let source = if *reused_report { " (reused report)" } else { "" };
            println!(
                "[SCORE] scored={genomes} unmapped_bins={}{source}",
                summary.unmapped.len()
            );
        }
        ScoringStatus::Failed { reason } => {
            println!("[SCORE] failed, completeness/contamination left empty: {reason}");
        }
    }
    if let Some(workspace) = &summary.workspace {
        println!("[INFO] Workspace kept at: {workspace}");
    }
}
