use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::QcError;
use crate::fs_util;

/// Extensions the scorer or the FASTA export may leave on a bin label.
pub const SEQUENCE_SUFFIXES: &[&str] = &["fa", "fna", "fasta", "gz"];

static ORDINAL_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,6}__").unwrap());

/// Stable identifier handed to the external scorer: `{ordinal:05}__{name}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(ordinal: usize, genome: &str) -> Self {
        Self(format!("{ordinal:05}__{genome}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn ordinal(&self) -> usize {
        self.0
            .split_once("__")
            .and_then(|(prefix, _)| prefix.parse().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExternalId {
    type Err = QcError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let Some((prefix, name)) = trimmed.split_once("__") else {
            return Err(QcError::InvalidExternalId(value.to_string()));
        };
        let is_valid = prefix.len() >= 5
            && prefix.chars().all(|ch| ch.is_ascii_digit())
            && !name.is_empty();
        if !is_valid {
            return Err(QcError::InvalidExternalId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// One genome folder accepted at discovery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genome {
    pub name: String,
    pub ordinal: usize,
    pub external_id: ExternalId,
    pub annotation_path: Utf8PathBuf,
    pub fasta_path: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyStats {
    pub genome: String,
    pub num_contigs: usize,
    pub n50: u64,
    pub gc_percent: f64,
    pub annotation_path: Utf8PathBuf,
    pub fasta_path: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scores {
    pub completeness: Option<f64>,
    pub contamination: Option<f64>,
}

/// Association between external identifiers and genome names, in ordinal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMap {
    entries: BTreeMap<ExternalId, String>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_genomes(genomes: &[Genome]) -> Self {
        let entries = genomes
            .iter()
            .map(|genome| (genome.external_id.clone(), genome.name.clone()))
            .collect();
        Self { entries }
    }

    pub fn insert(&mut self, id: ExternalId, genome: String) {
        self.entries.insert(id, genome);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn genome(&self, id: &ExternalId) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn external_id(&self, genome: &str) -> Option<&ExternalId> {
        self.entries
            .iter()
            .find(|(_, name)| name.as_str() == genome)
            .map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExternalId, &str)> {
        self.entries.iter().map(|(id, name)| (id, name.as_str()))
    }

    /// Normalized external identifier to genome name. Earlier ordinals win on collision.
    pub fn inverted(&self) -> HashMap<String, String> {
        let mut inverted: HashMap<String, String> = HashMap::with_capacity(self.entries.len());
        for (id, genome) in &self.entries {
            match inverted.entry(normalize_label(id.as_str())) {
                Entry::Vacant(slot) => {
                    slot.insert(genome.clone());
                }
                Entry::Occupied(slot) => warn!(
                    external_id = %id,
                    genome = %genome,
                    shadowed_by = %slot.get(),
                    "genome names collide after normalization; labels must carry the ordinal prefix"
                ),
            }
        }
        inverted
    }

    /// Genome whose external identifier the label carries verbatim, ignoring
    /// directory components and trailing sequence suffixes.
    ///
    /// Suffixes are peeled one at a time so that `00002__x.fasta` resolves to
    /// the genome named `x.fasta` before it is read as `00002__x`.
    pub fn resolve(&self, label: &str) -> Option<&str> {
        let mut stem = basename(label);
        loop {
            if let Some(genome) = stem
                .parse::<ExternalId>()
                .ok()
                .and_then(|id| self.genome(&id))
            {
                return Some(genome);
            }
            stem = strip_sequence_suffix(stem)?;
        }
    }

    pub fn write_json(&self, path: &Utf8Path) -> Result<(), QcError> {
        let content = serde_json::to_vec_pretty(&self.entries)
            .map_err(|err| QcError::Filesystem(err.to_string()))?;
        fs_util::write_bytes_atomic(path, &content)
    }

    pub fn read_json(path: &Utf8Path) -> Result<Self, QcError> {
        let content = std::fs::read_to_string(path.as_std_path())
            .map_err(|err| QcError::Filesystem(format!("read {path}: {err}")))?;
        let raw: BTreeMap<String, String> = serde_json::from_str(&content)
            .map_err(|err| QcError::Filesystem(format!("parse {path}: {err}")))?;
        let entries = raw
            .into_iter()
            .map(|(id, genome)| Ok((id.parse()?, genome)))
            .collect::<Result<BTreeMap<_, _>, QcError>>()?;
        Ok(Self { entries })
    }
}

/// Reduces a bin label or external identifier to the bare genome name.
///
/// Both sides of the reconciliation join go through this function, so it only
/// undoes what the naming scheme and the FASTA export add: directory
/// components, sequence-file suffixes and the ordinal prefix.
pub fn normalize_label(label: &str) -> String {
    let mut stem = basename(label);
    while let Some(stripped) = strip_sequence_suffix(stem) {
        stem = stripped;
    }
    ORDINAL_PREFIX.replace(stem, "").into_owned()
}

fn basename(label: &str) -> &str {
    let trimmed = label.trim();
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}

fn strip_sequence_suffix(stem: &str) -> Option<&str> {
    let (base, ext) = stem.rsplit_once('.')?;
    if base.is_empty() {
        return None;
    }
    SEQUENCE_SUFFIXES
        .iter()
        .any(|suffix| ext.eq_ignore_ascii_case(suffix))
        .then_some(base)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn external_id_is_zero_padded() {
        let id = ExternalId::new(7, "strainA");
        assert_eq!(id.as_str(), "00007__strainA");
        assert_eq!(id.ordinal(), 7);
    }

    #[test]
    fn parse_external_id_invalid() {
        let err = "strainA".parse::<ExternalId>().unwrap_err();
        assert_matches!(err, QcError::InvalidExternalId(_));
        let err = "12__strainA".parse::<ExternalId>().unwrap_err();
        assert_matches!(err, QcError::InvalidExternalId(_));
    }

    #[test]
    fn normalize_strips_prefix_and_suffixes() {
        assert_eq!(normalize_label("00002__strainB"), "strainB");
        assert_eq!(normalize_label("strainA.fasta"), "strainA");
        assert_eq!(normalize_label("00003__strainC.FNA"), "strainC");
        assert_eq!(normalize_label("/tmp/x/00004__strainD.fasta.gz"), "strainD");
        assert_eq!(normalize_label("GCF_000005845.2_ASM584v2"), "GCF_000005845.2_ASM584v2");
    }

    #[test]
    fn normalize_inverts_naming() {
        for (ordinal, name) in ["strainA", "GCA_000001.1", "E_coli_K12"].iter().enumerate() {
            let id = ExternalId::new(ordinal + 1, name);
            assert_eq!(normalize_label(id.as_str()), *name);
        }
    }

    #[test]
    fn inverted_map_prefers_first_ordinal() {
        let mut map = IdentifierMap::new();
        map.insert(ExternalId::new(1, "dup"), "dup".to_string());
        map.insert(ExternalId::new(2, "dup.fasta"), "dup.fasta".to_string());
        let inverted = map.inverted();
        assert_eq!(inverted.len(), 1);
        assert_eq!(inverted["dup"], "dup");
    }

    #[test]
    fn resolve_keeps_colliding_genomes_apart() {
        let mut map = IdentifierMap::new();
        map.insert(ExternalId::new(1, "strainA"), "strainA".to_string());
        map.insert(ExternalId::new(2, "strainA.fasta"), "strainA.fasta".to_string());
        assert_eq!(map.resolve("00002__strainA.fasta"), Some("strainA.fasta"));
        assert_eq!(map.resolve("00002__strainA.fasta.fasta"), Some("strainA.fasta"));
        assert_eq!(map.resolve("00001__strainA"), Some("strainA"));
        assert_eq!(map.resolve("bins/00001__strainA.fna"), Some("strainA"));
        assert_eq!(map.resolve("strainA"), None);
        assert_eq!(map.resolve("00003__strainA"), None);
    }
}
