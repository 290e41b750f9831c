use std::collections::{BTreeMap, HashSet};

use camino::{Utf8Path, Utf8PathBuf};
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{IdentifierMap, Scores, normalize_label};
use crate::error::QcError;
use crate::fs_util;
use crate::workspace::Workspace;

/// Report file names the scorer is known to produce, in lookup order.
pub const REPORT_FILES: &[&str] = &["quality_report.tsv", "quality_report.txt"];

/// Accepted bin-label headers, most specific first. Compared case-insensitively.
pub const LABEL_HEADERS: &[&str] = &["name", "bin", "bin id", "bin_id", "genome", "filename"];

#[derive(Debug, Clone, Copy)]
enum HeaderMatch {
    Exact(&'static str),
    Contains(&'static str),
}

impl HeaderMatch {
    fn matches(self, header: &str) -> bool {
        match self {
            HeaderMatch::Exact(name) => header == name,
            HeaderMatch::Contains(fragment) => header.contains(fragment),
        }
    }
}

const COMPLETENESS: &[HeaderMatch] = &[
    HeaderMatch::Exact("completeness"),
    HeaderMatch::Contains("completeness"),
    HeaderMatch::Exact("complete"),
];

const CONTAMINATION: &[HeaderMatch] = &[
    HeaderMatch::Exact("contamination"),
    HeaderMatch::Contains("contamination"),
    HeaderMatch::Exact("contam"),
];

/// Column indices of the fields the join needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBinding {
    pub label: usize,
    pub completeness: usize,
    pub contamination: usize,
}

impl ColumnBinding {
    pub fn bind(headers: &StringRecord, path: &Utf8Path) -> Result<Self, QcError> {
        let lowered = headers
            .iter()
            .map(|header| header.trim().to_lowercase())
            .collect::<Vec<_>>();
        let missing = |column: &'static str| QcError::ColumnNotFound {
            path: path.as_std_path().to_path_buf(),
            column,
        };

        if lowered.is_empty() {
            return Err(missing("label"));
        }
        let label = LABEL_HEADERS
            .iter()
            .find_map(|name| lowered.iter().position(|header| header == name))
            .unwrap_or(0);
        let completeness = find_column(&lowered, COMPLETENESS).ok_or_else(|| missing("completeness"))?;
        let contamination =
            find_column(&lowered, CONTAMINATION).ok_or_else(|| missing("contamination"))?;

        Ok(Self {
            label,
            completeness,
            contamination,
        })
    }
}

fn find_column(headers: &[String], candidates: &[HeaderMatch]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|candidate| headers.iter().position(|header| candidate.matches(header)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub label: String,
    pub scores: Scores,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reconciliation {
    /// Genome name to scores, only for genomes the report scored.
    pub scores: BTreeMap<String, Scores>,
    /// Labels without a known genome, each once, in report order.
    pub unmapped: Vec<String>,
    pub blank_labels: usize,
}

pub fn locate_report(out_dir: &Utf8Path) -> Result<Utf8PathBuf, QcError> {
    REPORT_FILES
        .iter()
        .map(|name| out_dir.join(name))
        .find(|path| path.as_std_path().is_file())
        .ok_or_else(|| QcError::ReportMissing(out_dir.as_std_path().to_path_buf()))
}

pub fn read_report(path: &Utf8Path) -> Result<Vec<ScoreRow>, QcError> {
    let parse_err = |message: String| QcError::ReportParse {
        path: path.as_std_path().to_path_buf(),
        message,
    };
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path.as_std_path())
        .map_err(|err| parse_err(err.to_string()))?;
    let headers = reader
        .headers()
        .map_err(|err| parse_err(err.to_string()))?
        .clone();
    let binding = ColumnBinding::bind(&headers, path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| parse_err(err.to_string()))?;
        rows.push(ScoreRow {
            label: record.get(binding.label).unwrap_or_default().trim().to_string(),
            scores: Scores {
                completeness: record.get(binding.completeness).and_then(coerce_score),
                contamination: record.get(binding.contamination).and_then(coerce_score),
            },
        });
    }
    Ok(rows)
}

/// Empty, non-numeric and non-finite values become `None`.
pub fn coerce_score(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|score| score.is_finite())
}

/// Joins report rows onto genome names: a label carrying a known external
/// identifier maps directly, anything else through its normalized form.
pub fn join_scores(rows: Vec<ScoreRow>, identifiers: &IdentifierMap) -> Reconciliation {
    let inverted = identifiers.inverted();
    let mut reconciliation = Reconciliation::default();
    let mut seen_unmapped = HashSet::new();

    for row in rows {
        if row.label.is_empty() {
            reconciliation.blank_labels += 1;
            continue;
        }
        let genome = identifiers.resolve(&row.label).or_else(|| {
            inverted
                .get(&normalize_label(&row.label))
                .map(String::as_str)
        });
        match genome {
            Some(genome) => {
                if reconciliation.scores.contains_key(genome) {
                    warn!(genome = %genome, label = %row.label, "duplicate score row; keeping the first");
                    continue;
                }
                reconciliation.scores.insert(genome.to_string(), row.scores);
            }
            None => {
                if seen_unmapped.insert(row.label.clone()) {
                    reconciliation.unmapped.push(row.label);
                }
            }
        }
    }
    reconciliation
}

pub fn reconcile(report: &Utf8Path, identifiers: &IdentifierMap) -> Result<Reconciliation, QcError> {
    let rows = read_report(report)?;
    let total = rows.len();
    let reconciliation = join_scores(rows, identifiers);
    info!(
        report = %report,
        rows = total,
        mapped = reconciliation.scores.len(),
        unmapped = reconciliation.unmapped.len(),
        "reconciled quality report"
    );
    Ok(reconciliation)
}

/// Full reconciliation stage: locates the report in the scorer output,
/// keeps a raw copy, joins it and writes the unmapped-label audit.
pub fn reconcile_workspace(
    workspace: &Workspace,
    identifiers: &IdentifierMap,
) -> Result<Reconciliation, QcError> {
    let report = locate_report(&workspace.scorer_dir())?;
    fs_util::copy_file(&report, &workspace.raw_report_path())?;
    let reconciliation = reconcile(&report, identifiers)?;
    write_audit(&reconciliation, workspace)?;
    Ok(reconciliation)
}

pub fn write_audit(reconciliation: &Reconciliation, workspace: &Workspace) -> Result<(), QcError> {
    if reconciliation.blank_labels > 0 {
        warn!(rows = reconciliation.blank_labels, "report rows without a bin label");
    }
    let path = workspace.unmapped_path();
    if reconciliation.unmapped.is_empty() {
        // a reused workspace may still hold the list from an earlier run
        if path.as_std_path().exists() {
            std::fs::remove_file(path.as_std_path())
                .map_err(|err| QcError::Filesystem(format!("remove {path}: {err}")))?;
        }
        return Ok(());
    }
    let mut content = reconciliation.unmapped.join("\n");
    content.push('\n');
    fs_util::write_bytes_atomic(&path, content.as_bytes())?;
    warn!(
        count = reconciliation.unmapped.len(),
        path = %path,
        "quality report bins could not be mapped to genomes"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::ExternalId;

    fn headers(names: &[&str]) -> StringRecord {
        StringRecord::from(names.to_vec())
    }

    #[test]
    fn binds_checkm2_header() {
        let binding = ColumnBinding::bind(
            &headers(&[
                "Name",
                "Completeness",
                "Contamination",
                "Completeness_Model_Used",
                "Translation_Table_Used",
            ]),
            Utf8Path::new("quality_report.tsv"),
        )
        .unwrap();
        assert_eq!(
            binding,
            ColumnBinding {
                label: 0,
                completeness: 1,
                contamination: 2
            }
        );
    }

    #[test]
    fn exact_header_beats_substring() {
        let binding = ColumnBinding::bind(
            &headers(&["Bin Id", "Completeness_Model_Used", "Contam", "Completeness"]),
            Utf8Path::new("report.tsv"),
        )
        .unwrap();
        assert_eq!(binding.label, 0);
        assert_eq!(binding.completeness, 3);
        assert_eq!(binding.contamination, 2);
    }

    #[test]
    fn label_falls_back_to_first_column() {
        let binding = ColumnBinding::bind(
            &headers(&["sample", "complete", "contamination"]),
            Utf8Path::new("report.tsv"),
        )
        .unwrap();
        assert_eq!(binding.label, 0);
        assert_eq!(binding.completeness, 1);
    }

    #[test]
    fn missing_numeric_column_is_structural() {
        let err = ColumnBinding::bind(
            &headers(&["Name", "Completeness", "GC_Content"]),
            Utf8Path::new("report.tsv"),
        )
        .unwrap_err();
        assert_matches!(err, QcError::ColumnNotFound { column: "contamination", .. });
    }

    #[test]
    fn coercion_never_fails() {
        assert_eq!(coerce_score(" 98.5 "), Some(98.5));
        assert_eq!(coerce_score(""), None);
        assert_eq!(coerce_score("NA"), None);
        assert_eq!(coerce_score("nan"), None);
    }

    #[test]
    fn unmapped_labels_are_listed_once() {
        let mut map = IdentifierMap::new();
        map.insert(ExternalId::new(1, "strainA"), "strainA".to_string());
        let rows = ["unknownX", "strainA.fasta", "unknownX", ""]
            .iter()
            .map(|label| ScoreRow {
                label: label.to_string(),
                scores: Scores::default(),
            })
            .collect();
        let reconciliation = join_scores(rows, &map);
        assert_eq!(reconciliation.unmapped, vec!["unknownX"]);
        assert_eq!(reconciliation.blank_labels, 1);
        assert!(reconciliation.scores.contains_key("strainA"));
    }

    #[test]
    fn prefixed_labels_win_over_normalized_collisions() {
        let mut map = IdentifierMap::new();
        map.insert(ExternalId::new(1, "strainA"), "strainA".to_string());
        map.insert(ExternalId::new(2, "strainA.fasta"), "strainA.fasta".to_string());
        let row = |label: &str, completeness: f64, contamination: f64| ScoreRow {
            label: label.to_string(),
            scores: Scores {
                completeness: Some(completeness),
                contamination: Some(contamination),
            },
        };
        let rows = vec![
            row("00002__strainA.fasta", 10.0, 9.0),
            row("00001__strainA", 99.0, 0.1),
        ];

        let reconciliation = join_scores(rows, &map);

        assert_eq!(reconciliation.scores.len(), 2);
        assert_eq!(reconciliation.scores["strainA"].completeness, Some(99.0));
        assert_eq!(reconciliation.scores["strainA.fasta"].contamination, Some(9.0));
        assert!(reconciliation.unmapped.is_empty());
    }
}
