use std::fs;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use gb_io::reader::SeqReader;
use gb_io::seq::Seq;
use tracing::debug;

use crate::domain::{AssemblyStats, Genome};
use crate::error::QcError;
use crate::fs_util;

const FASTA_LINE_WIDTH: usize = 60;

/// Parses one genome's annotation file, writes its derived FASTA and returns
/// the assembly statistics.
pub fn extract_genome(genome: &Genome) -> Result<AssemblyStats, QcError> {
    let records = read_records(&genome.annotation_path)?;
    write_fasta(&genome.fasta_path, &records)?;

    let lengths = records.iter().map(|record| record.seq.len() as u64).collect::<Vec<_>>();
    let stats = AssemblyStats {
        genome: genome.name.clone(),
        num_contigs: records.len(),
        n50: n50(&lengths),
        gc_percent: gc_percent(records.iter().map(|record| record.seq.as_slice())),
        annotation_path: genome.annotation_path.clone(),
        fasta_path: genome.fasta_path.clone(),
    };
    debug!(
        genome = %stats.genome,
        contigs = stats.num_contigs,
        n50 = stats.n50,
        gc = stats.gc_percent,
        "extracted assembly statistics"
    );
    Ok(stats)
}

pub fn read_records(path: &Utf8Path) -> Result<Vec<Seq>, QcError> {
    let reader = fs_util::open_maybe_gz(path).map_err(|err| QcError::Annotation {
        path: path.as_std_path().to_path_buf(),
        message: err.to_string(),
    })?;
    SeqReader::new(reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| QcError::Annotation {
            path: path.as_std_path().to_path_buf(),
            message: err.to_string(),
        })
}

/// Writes every record as FASTA, through a temporary sibling so a failed
/// export never leaves a truncated file behind.
pub fn write_fasta(path: &Utf8Path, records: &[Seq]) -> Result<(), QcError> {
    let tmp_path = path.with_extension("part");
    let write = || -> std::io::Result<()> {
        let mut out = BufWriter::new(fs::File::create(tmp_path.as_std_path())?);
        for (index, record) in records.iter().enumerate() {
            let id = record_id(record, index);
            match record.definition.as_deref().filter(|def| !def.is_empty()) {
                Some(definition) => writeln!(out, ">{id} {definition}")?,
                None => writeln!(out, ">{id}")?,
            }
            for line in record.seq.chunks(FASTA_LINE_WIDTH) {
                out.write_all(line)?;
                out.write_all(b"\n")?;
            }
        }
        out.flush()
    };
    write().map_err(|err| QcError::Filesystem(format!("write {tmp_path}: {err}")))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| QcError::Filesystem(format!("rename {tmp_path}: {err}")))
}

fn record_id(record: &Seq, index: usize) -> String {
    record
        .version
        .as_deref()
        .or(record.accession.as_deref())
        .or(record.name.as_deref())
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("record_{}", index + 1))
}

/// Length of the contig at which the cumulative length, taken longest first,
/// reaches half of the assembly. Zero for an empty assembly.
pub fn n50(lengths: &[u64]) -> u64 {
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let total: u64 = sorted.iter().sum();
    let mut acc = 0u64;
    for length in &sorted {
        acc += length;
        // acc >= total / 2 without losing the half on odd totals
        if acc * 2 >= total {
            return *length;
        }
    }
    sorted.last().copied().unwrap_or(0)
}

pub fn gc_percent<'a>(sequences: impl IntoIterator<Item = &'a [u8]>) -> f64 {
    let mut gc = 0u64;
    let mut total = 0u64;
    for seq in sequences {
        total += seq.len() as u64;
        gc += seq
            .iter()
            .filter(|base| matches!(base.to_ascii_uppercase(), b'G' | b'C'))
            .count() as u64;
    }
    if total == 0 {
        0.0
    } else {
        100.0 * gc as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n50_crosses_half_of_total() {
        assert_eq!(n50(&[100, 90, 80, 20, 5]), 90);
        assert_eq!(n50(&[5, 20, 80, 90, 100]), 90);
        assert_eq!(n50(&[10, 10, 10, 10]), 10);
        assert_eq!(n50(&[2, 3, 4]), 3);
    }

    #[test]
    fn n50_of_nothing_is_zero() {
        assert_eq!(n50(&[]), 0);
    }

    #[test]
    fn gc_is_case_insensitive() {
        assert_eq!(gc_percent([b"GGCCAATT".as_slice()]), 50.0);
        assert_eq!(gc_percent([b"ggcc".as_slice(), b"aatt".as_slice()]), 50.0);
        assert_eq!(gc_percent([b"gcgc".as_slice()]), 100.0);
    }

    #[test]
    fn gc_of_empty_is_zero() {
        assert_eq!(gc_percent(std::iter::empty::<&[u8]>()), 0.0);
        assert_eq!(gc_percent([b"".as_slice()]), 0.0);
    }
}
