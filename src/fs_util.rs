use std::fs;
use std::io::{self, BufReader, Read};

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;

use crate::error::QcError;

pub fn is_gzipped(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Opens a plain or `.gz` file for streaming reads.
pub fn open_maybe_gz(path: &Utf8Path) -> io::Result<Box<dyn Read + Send>> {
    let file = fs::File::open(path.as_std_path())?;
    if is_gzipped(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), QcError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| QcError::Filesystem(format!("create {path}: {err}")))
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), QcError> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| QcError::Filesystem(format!("write {tmp_path}: {err}")))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| QcError::Filesystem(format!("rename {tmp_path}: {err}")))?;
    Ok(())
}

pub fn copy_file(source: &Utf8Path, dest: &Utf8Path) -> Result<(), QcError> {
    if let Some(parent) = dest.parent() {
        if !parent.as_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    fs::copy(source.as_std_path(), dest.as_std_path())
        .map_err(|err| QcError::Filesystem(format!("copy {source} -> {dest}: {err}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use camino::Utf8PathBuf;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn reads_gzip_transparently() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("a.gbff.gz")).unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"LOCUS").unwrap();
        fs::write(path.as_std_path(), encoder.finish().unwrap()).unwrap();

        let mut content = String::new();
        open_maybe_gz(&path).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "LOCUS");
    }

    #[test]
    fn atomic_write_creates_parents() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/dir/map.json")).unwrap();
        write_bytes_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"{}");
        assert!(!path.with_extension("tmp").as_std_path().exists());
    }
}
