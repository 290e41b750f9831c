use camino::Utf8Path;
use csv::WriterBuilder;
use serde::Serialize;

use crate::domain::{AssemblyStats, Scores};
use crate::error::QcError;
use crate::fs_util;
use crate::reconcile::Reconciliation;

/// One line of the consolidated quality table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcRow {
    pub genome: String,
    pub num_contigs: usize,
    #[serde(rename = "N50")]
    pub n50: u64,
    pub gc_percent: f64,
    pub gbff_path: String,
    pub fasta_path: String,
    pub completeness: Option<f64>,
    pub contamination: Option<f64>,
}

/// Left join of the statistics onto the reconciled scores. `None` means the
/// scoring stage failed; every genome then gets empty scores.
pub fn assemble(stats: &[AssemblyStats], scores: Option<&Reconciliation>) -> Vec<QcRow> {
    stats
        .iter()
        .map(|row| {
            let Scores {
                completeness,
                contamination,
            } = scores
                .and_then(|reconciliation| reconciliation.scores.get(&row.genome))
                .copied()
                .unwrap_or_default();
            QcRow {
                genome: row.genome.clone(),
                num_contigs: row.num_contigs,
                n50: row.n50,
                gc_percent: round3(row.gc_percent),
                gbff_path: row.annotation_path.to_string(),
                fasta_path: row.fasta_path.to_string(),
                completeness,
                contamination,
            }
        })
        .collect()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Tab for `.tsv`, comma for anything else.
pub fn delimiter_for(path: &Utf8Path) -> u8 {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

pub fn write_table(path: &Utf8Path, rows: &[QcRow]) -> Result<(), QcError> {
    let write_err = |message: String| QcError::TableWrite {
        path: path.as_std_path().to_path_buf(),
        message,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            fs_util::ensure_dir(parent)?;
        }
    }
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .has_headers(false)
        .from_path(path.as_std_path())
        .map_err(|err| write_err(err.to_string()))?;
    // Written explicitly so an empty table still carries its header.
    writer
        .write_record(HEADER)
        .map_err(|err| write_err(err.to_string()))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|err| write_err(err.to_string()))?;
    }
    writer.flush().map_err(|err| write_err(err.to_string()))
}

pub const HEADER: [&str; 8] = [
    "genome",
    "num_contigs",
    "N50",
    "gc_percent",
    "gbff_path",
    "fasta_path",
    "completeness",
    "contamination",
];
