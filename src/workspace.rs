use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, TempDir};

use crate::error::QcError;
use crate::fs_util;

pub const ASSEMBLIES_DIR: &str = "assemblies";
pub const SCORER_DIR: &str = "checkm2";
pub const NAME_MAP_FILE: &str = "name_map.json";
pub const RAW_REPORT_FILE: &str = "quality_raw.tsv";
pub const UNMAPPED_FILE: &str = "unmapped_bins.txt";

/// Scratch directory for one run. Temporary workspaces are removed when the
/// handle is dropped unless they were created with `keep`.
#[derive(Debug)]
pub struct Workspace {
    root: Utf8PathBuf,
    guard: Option<TempDir>,
}

impl Workspace {
    pub fn temporary(keep: bool) -> Result<Self, QcError> {
        let temp = Builder::new()
            .prefix("genome_qc_")
            .tempdir()
            .map_err(|err| QcError::Filesystem(err.to_string()))?;
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
            .map_err(|_| QcError::Filesystem("invalid temp dir".to_string()))?;
        let guard = if keep {
            let _ = temp.keep();
            None
        } else {
            Some(temp)
        };
        Self::layout(root, guard)
    }

    /// Uses a caller-owned directory; it is never removed.
    pub fn at(root: &Utf8Path) -> Result<Self, QcError> {
        Self::layout(root.to_path_buf(), None)
    }

    fn layout(root: Utf8PathBuf, guard: Option<TempDir>) -> Result<Self, QcError> {
        let workspace = Self { root, guard };
        fs_util::ensure_dir(&workspace.assemblies_dir())?;
        fs_util::ensure_dir(&workspace.scorer_dir())?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn is_retained(&self) -> bool {
        self.guard.is_none()
    }

    pub fn assemblies_dir(&self) -> Utf8PathBuf {
        self.root.join(ASSEMBLIES_DIR)
    }

    pub fn scorer_dir(&self) -> Utf8PathBuf {
        self.root.join(SCORER_DIR)
    }

    pub fn name_map_path(&self) -> Utf8PathBuf {
        self.root.join(NAME_MAP_FILE)
    }

    pub fn raw_report_path(&self) -> Utf8PathBuf {
        self.root.join(RAW_REPORT_FILE)
    }

    pub fn unmapped_path(&self) -> Utf8PathBuf {
        self.root.join(UNMAPPED_FILE)
    }

    /// Removes a temporary workspace when the process is interrupted with Ctrl-C.
    /// Can be installed once per process.
    pub fn remove_on_interrupt(&self) -> Result<(), QcError> {
        if self.is_retained() {
            return Ok(());
        }
        let root = self.root.clone();
        ctrlc::set_handler(move || {
            tracing::warn!(workspace = %root, "interrupted; removing workspace");
            let _ = fs::remove_dir_all(root.as_std_path());
            std::process::exit(130);
        })
        .map_err(|err| QcError::Filesystem(format!("install interrupt handler: {err}")))
    }
}
