use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryOptions;
use crate::error::QcError;

pub const DEFAULT_CONFIG_FILE: &str = "genome-qc.json";
pub const DEFAULT_THREADS: usize = 8;
pub const DEFAULT_RUNNER: &str = "micromamba";
pub const DEFAULT_ENV: &str = "ckm2";
pub const DEFAULT_MIN_ROWS: usize = 1;

/// On-disk run configuration. Every field is optional; unset fields fall back
/// to command-line values and then to the defaults above.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_dir: Option<String>,
    #[serde(default)]
    pub out: Option<String>,
    #[serde(default)]
    pub threads: Option<usize>,
    /// Environment runner wrapping the scorer; an empty string runs it directly.
    #[serde(default)]
    pub runner: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub checkm2_db: Option<String>,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub accept_gzip: Option<bool>,
    #[serde(default)]
    pub min_rows: Option<usize>,
    #[serde(default)]
    pub keep_temp: Option<bool>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub reuse_checkm2: Option<bool>,
}

/// Values given on the command line; they take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_dir: Option<String>,
    pub out: Option<String>,
    pub threads: Option<usize>,
    pub runner: Option<String>,
    pub no_runner: bool,
    pub env: Option<String>,
    pub checkm2_db: Option<String>,
    pub extensions: Option<Vec<String>>,
    pub min_rows: Option<usize>,
    pub keep_temp: bool,
    pub work_dir: Option<String>,
    pub reuse_checkm2: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScorerConfig {
    pub runner: Option<String>,
    pub env: String,
    pub database: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_dir: Utf8PathBuf,
    pub out: Utf8PathBuf,
    pub threads: usize,
    pub scorer: ScorerConfig,
    pub discovery: DiscoveryOptions,
    pub min_rows: usize,
    pub keep_temp: bool,
    pub work_dir: Option<Utf8PathBuf>,
    pub reuse_report: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `genome-qc.json` in the current directory when it
    /// exists, and merges `overrides` on top.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, QcError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| QcError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| QcError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, QcError> {
        let base_dir = overrides
            .base_dir
            .or(config.base_dir)
            .ok_or_else(|| QcError::InvalidConfig("base_dir is required".to_string()))?;
        let out = overrides
            .out
            .or(config.out)
            .ok_or_else(|| QcError::InvalidConfig("out is required".to_string()))?;

        let threads = overrides
            .threads
            .or(config.threads)
            .unwrap_or(DEFAULT_THREADS)
            .max(1);

        let runner = if overrides.no_runner {
            None
        } else {
            overrides
                .runner
                .or(config.runner)
                .or_else(|| Some(DEFAULT_RUNNER.to_string()))
                .filter(|runner| !runner.trim().is_empty())
        };
        let scorer = ScorerConfig {
            runner,
            env: overrides
                .env
                .or(config.env)
                .unwrap_or_else(|| DEFAULT_ENV.to_string()),
            database: overrides
                .checkm2_db
                .or(config.checkm2_db)
                .filter(|db| !db.trim().is_empty())
                .map(Utf8PathBuf::from),
        };

        let mut discovery = DiscoveryOptions::default();
        if let Some(extensions) = overrides.extensions.or(config.extensions) {
            let extensions = extensions
                .into_iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect::<Vec<_>>();
            if extensions.is_empty() {
                return Err(QcError::InvalidConfig(
                    "at least one annotation extension is required".to_string(),
                ));
            }
            discovery.extensions = extensions;
        }
        if let Some(accept_gzip) = config.accept_gzip {
            discovery.accept_gzip = accept_gzip;
        }

        Ok(ResolvedConfig {
            base_dir: Utf8PathBuf::from(base_dir),
            out: Utf8PathBuf::from(out),
            threads,
            scorer,
            discovery,
            min_rows: overrides
                .min_rows
                .or(config.min_rows)
                .unwrap_or(DEFAULT_MIN_ROWS),
            keep_temp: overrides.keep_temp || config.keep_temp.unwrap_or(false),
            work_dir: overrides
                .work_dir
                .or(config.work_dir)
                .map(Utf8PathBuf::from),
            reuse_report: overrides.reuse_checkm2 || config.reuse_checkm2.unwrap_or(false),
        })
    }
}
