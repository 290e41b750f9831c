use std::fs;
use std::io::Write;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use genome_qc::domain::{ExternalId, Genome};
use genome_qc::error::QcError;
use genome_qc::extract::{extract_genome, gc_percent, n50};

fn genbank_record(name: &str, seq: &str) -> String {
    let mut out = format!(
        "LOCUS       {name:<16} {:>11} bp    DNA     linear   BCT 01-JAN-2020\n",
        seq.len()
    );
    out.push_str(&format!("DEFINITION  {name} test contig.\n"));
    out.push_str(&format!("ACCESSION   {name}\n"));
    out.push_str(&format!("VERSION     {name}.1\n"));
    out.push_str("FEATURES             Location/Qualifiers\n");
    out.push_str(&format!("     source          1..{}\n", seq.len()));
    out.push_str("                     /organism=\"Escherichia coli\"\n");
    out.push_str("ORIGIN\n");
    for (line_index, line) in seq.as_bytes().chunks(60).enumerate() {
        out.push_str(&format!("{:>9}", line_index * 60 + 1));
        for block in line.chunks(10) {
            out.push(' ');
            out.push_str(std::str::from_utf8(block).unwrap());
        }
        out.push('\n');
    }
    out.push_str("//\n");
    out
}

fn genome(dir: &Utf8PathBuf, annotation: &str) -> Genome {
    let external_id = ExternalId::new(1, "sample");
    Genome {
        name: "sample".to_string(),
        ordinal: 1,
        annotation_path: dir.join(annotation),
        fasta_path: dir.join(format!("{external_id}.fasta")),
        external_id,
    }
}

#[test]
fn multi_record_statistics() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let lengths = [100usize, 90, 80, 20, 5];
    let content = lengths
        .iter()
        .enumerate()
        .map(|(index, len)| genbank_record(&format!("contig{}", index + 1), &"GCAT".repeat(len / 4 + 1)[..*len]))
        .collect::<String>();
    fs::write(dir.join("sample.gbff"), content).unwrap();

    let stats = extract_genome(&genome(&dir, "sample.gbff")).unwrap();

    assert_eq!(stats.genome, "sample");
    assert_eq!(stats.num_contigs, 5);
    assert_eq!(stats.n50, 90);
    assert!(stats.gc_percent > 0.0 && stats.gc_percent < 100.0);

    let fasta = fs::read_to_string(&stats.fasta_path).unwrap();
    assert_eq!(fasta.matches('>').count(), 5);
    assert!(fasta.lines().all(|line| line.len() <= 60 || line.starts_with('>')));
    let bases = fasta
        .lines()
        .filter(|line| !line.starts_with('>'))
        .map(str::len)
        .sum::<usize>();
    assert_eq!(bases, 295);
}

#[test]
fn gzip_annotation_is_read() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(genbank_record("chr", "GGCCAATT").as_bytes())
        .unwrap();
    fs::write(dir.join("sample.gbff.gz"), encoder.finish().unwrap()).unwrap();

    let stats = extract_genome(&genome(&dir, "sample.gbff.gz")).unwrap();

    assert_eq!(stats.num_contigs, 1);
    assert_eq!(stats.n50, 8);
    assert_eq!(stats.gc_percent, 50.0);
}

#[test]
fn unreadable_annotation_fails_the_genome() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    fs::write(dir.join("sample.gbff.gz"), "plain text, not gzip").unwrap();

    let err = extract_genome(&genome(&dir, "sample.gbff.gz")).unwrap_err();
    assert_matches!(err, QcError::Annotation { .. });
    assert!(!dir.join("00001__sample.fasta").exists());
}

#[test]
fn documented_examples() {
    assert_eq!(n50(&[100, 90, 80, 20, 5]), 90);
    assert_eq!(n50(&[]), 0);
    assert_eq!(gc_percent([b"GGCCAATT".as_slice()]), 50.0);
    assert_eq!(gc_percent(std::iter::empty::<&[u8]>()), 0.0);
}
