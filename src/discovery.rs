use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{ExternalId, Genome, IdentifierMap};
use crate::error::QcError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Accepted annotation extensions, most preferred first.
    pub extensions: Vec<String>,
    pub accept_gzip: bool,
    /// Extension of the derived FASTA files handed to the scorer.
    pub sequence_extension: String,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["gbff".to_string(), "gbk".to_string(), "genbank".to_string()],
            accept_gzip: true,
            sequence_extension: "fasta".to_string(),
        }
    }
}

impl DiscoveryOptions {
    /// Index of the accepted extension `file_name` carries, if any.
    fn match_extension(&self, file_name: &str) -> Option<usize> {
        let lower = file_name.to_ascii_lowercase();
        self.extensions.iter().position(|ext| {
            let plain = format!(".{ext}");
            lower.ends_with(&plain) || (self.accept_gzip && lower.ends_with(&format!("{plain}.gz")))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    NoAnnotation,
    Ambiguous { candidates: Vec<String> },
    NonUtf8Name,
    Unreadable { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFolder {
    pub folder: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct Discovery {
    pub genomes: Vec<Genome>,
    pub identifiers: IdentifierMap,
    pub skipped: Vec<SkippedFolder>,
}

/// Scans the immediate subfolders of `root` in lexicographic order and
/// accepts those holding exactly one usable annotation file.
pub fn discover(
    root: &Utf8Path,
    assemblies_dir: &Utf8Path,
    options: &DiscoveryOptions,
) -> Result<Discovery, QcError> {
    if !root.as_std_path().is_dir() {
        return Err(QcError::BaseDirNotFound(root.as_std_path().to_path_buf()));
    }
    info!(base_dir = %root, "scanning for genome folders");

    let mut folders = fs::read_dir(root.as_std_path())
        .map_err(|err| QcError::Filesystem(format!("read {root}: {err}")))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    folders.sort();

    let mut genomes = Vec::new();
    let mut skipped = Vec::new();
    for folder in folders {
        let folder = match Utf8PathBuf::from_path_buf(folder) {
            Ok(folder) => folder,
            Err(raw) => {
                let folder = raw.to_string_lossy().into_owned();
                warn!(folder = %folder, "skipping folder with a non UTF-8 name");
                skipped.push(SkippedFolder {
                    folder,
                    reason: SkipReason::NonUtf8Name,
                });
                continue;
            }
        };
        let name = folder.file_name().unwrap_or_default().to_string();

        match select_annotation(&folder, options) {
            Ok(annotation_path) => {
                let ordinal = genomes.len() + 1;
                let external_id = ExternalId::new(ordinal, &name);
                let fasta_path = assemblies_dir
                    .join(format!("{external_id}.{}", options.sequence_extension));
                genomes.push(Genome {
                    name,
                    ordinal,
                    external_id,
                    annotation_path,
                    fasta_path,
                });
            }
            Err(reason) => {
                match &reason {
                    SkipReason::Ambiguous { candidates } => warn!(
                        folder = %folder,
                        candidates = candidates.len(),
                        "ambiguous annotation files; skipping folder"
                    ),
                    SkipReason::Unreadable { error } => {
                        warn!(folder = %folder, error = %error, "cannot list folder; skipping")
                    }
                    _ => warn!(folder = %folder, "no annotation file; skipping folder"),
                }
                skipped.push(SkippedFolder {
                    folder: folder.to_string(),
                    reason,
                });
            }
        }
    }

    if genomes.is_empty() {
        return Err(QcError::NoGenomes(root.as_std_path().to_path_buf()));
    }
    info!(
        genomes = genomes.len(),
        skipped = skipped.len(),
        "genome folders accepted"
    );

    let identifiers = IdentifierMap::from_genomes(&genomes);
    Ok(Discovery {
        genomes,
        identifiers,
        skipped,
    })
}

/// Picks the single annotation file of a genome folder, or says why the
/// folder cannot be used.
pub fn select_annotation(
    folder: &Utf8Path,
    options: &DiscoveryOptions,
) -> Result<Utf8PathBuf, SkipReason> {
    let mut candidates = Vec::new();
    let entries = fs::read_dir(folder.as_std_path()).map_err(|err| SkipReason::Unreadable {
        error: err.to_string(),
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
            continue;
        };
        let file_name = path.file_name().unwrap_or_default();
        if let Some(index) = options.match_extension(file_name) {
            candidates.push((path, index));
        }
    }
    candidates.sort();

    if candidates.len() == 1 {
        return Ok(candidates.remove(0).0);
    }
    if candidates.is_empty() {
        return Err(SkipReason::NoAnnotation);
    }

    let mut preferred = candidates
        .iter()
        .filter(|(_, index)| *index == 0)
        .collect::<Vec<_>>();
    if preferred.len() == 1 {
        return Ok(preferred.remove(0).0.clone());
    }
    Err(SkipReason::Ambiguous {
        candidates: candidates
            .into_iter()
            .map(|(path, _)| path.file_name().unwrap_or_default().to_string())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Utf8Path, name: &str) {
        fs::create_dir_all(dir.as_std_path()).unwrap();
        fs::write(dir.join(name).as_std_path(), b"").unwrap();
    }

    fn root() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[test]
    fn extension_matching_is_case_insensitive() {
        let options = DiscoveryOptions::default();
        assert_eq!(options.match_extension("a.GBFF"), Some(0));
        assert_eq!(options.match_extension("a.gbk.gz"), Some(1));
        assert_eq!(options.match_extension("a.fasta"), None);
    }

    #[test]
    fn prefers_single_primary_candidate() {
        let (_temp, root) = root();
        let folder = root.join("g1");
        touch(&folder, "g1.gbk");
        touch(&folder, "g1.gbff");
        let chosen = select_annotation(&folder, &DiscoveryOptions::default()).unwrap();
        assert_eq!(chosen.file_name(), Some("g1.gbff"));
    }

    #[test]
    fn two_secondary_candidates_are_ambiguous() {
        let (_temp, root) = root();
        let folder = root.join("g1");
        touch(&folder, "a.gbk");
        touch(&folder, "b.genbank");
        let reason = select_annotation(&folder, &DiscoveryOptions::default()).unwrap_err();
        assert_eq!(
            reason,
            SkipReason::Ambiguous {
                candidates: vec!["a.gbk".to_string(), "b.genbank".to_string()]
            }
        );
    }

    #[test]
    fn gzip_can_be_disabled() {
        let (_temp, root) = root();
        let folder = root.join("g1");
        touch(&folder, "g1.gbff.gz");
        let options = DiscoveryOptions {
            accept_gzip: false,
            ..DiscoveryOptions::default()
        };
        let reason = select_annotation(&folder, &options).unwrap_err();
        assert_eq!(reason, SkipReason::NoAnnotation);
    }

    #[test]
    fn unlistable_folder_is_a_skip_reason() {
        let (_temp, root) = root();
        let reason = select_annotation(&root.join("gone"), &DiscoveryOptions::default()).unwrap_err();
        assert_matches::assert_matches!(reason, SkipReason::Unreadable { .. });
    }
}
