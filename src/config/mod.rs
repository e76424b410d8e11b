mod file_config;

pub use file_config::FileConfig;

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_FILENAME: &str = "clipbook.db";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub clippings_path: Option<PathBuf>,
    pub staging_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Default directory-ingest root (the "inbox").
    pub input_path: Option<PathBuf>,
    /// Artifact destination.
    pub output_path: Option<PathBuf>,
    /// Vault scan root for fallback ingest mode.
    pub clippings_path: Option<PathBuf>,
    staging_path: Option<PathBuf>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILENAME));
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let input_path = file
            .input_path
            .map(PathBuf::from)
            .or_else(|| cli.input_path.clone());
        if let Some(input) = &input_path {
            if !input.is_dir() {
                bail!("Input directory does not exist: {:?}", input);
            }
        }

        let clippings_path = file
            .clippings_path
            .map(PathBuf::from)
            .or_else(|| cli.clippings_path.clone());
        if let Some(vault) = &clippings_path {
            if !vault.is_dir() {
                bail!("Clippings path does not exist: {:?}", vault);
            }
        }

        let output_path = file
            .output_path
            .map(PathBuf::from)
            .or_else(|| cli.output_path.clone());

        let staging_path = file
            .staging_path
            .map(PathBuf::from)
            .or_else(|| cli.staging_path.clone());

        Ok(Self {
            db_path,
            input_path,
            output_path,
            clippings_path,
            staging_path,
        })
    }

    /// Artifact destination, required for conversion. Created on demand by
    /// the conversion engine.
    pub fn output_dir(&self) -> Result<&Path> {
        match &self.output_path {
            Some(path) => Ok(path),
            None => bail!("output_path must be specified via --output-dir or in config file"),
        }
    }

    /// Staging-snapshot directory: an explicit setting, else `staging/`
    /// under the inbox, else `staging/` next to the artifacts.
    pub fn staging_dir(&self) -> Result<PathBuf> {
        if let Some(path) = &self.staging_path {
            return Ok(path.clone());
        }
        if let Some(input) = &self.input_path {
            return Ok(input.join("staging"));
        }
        Ok(self.output_dir()?.join("staging"))
    }
}
