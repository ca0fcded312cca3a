// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TreewatchError};
use crate::watch::patterns::build_globset;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TreewatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_root(cfg)?;
    validate_exclude_patterns(cfg)?;
    Ok(())
}

fn validate_root(cfg: &RawConfigFile) -> Result<()> {
    if cfg.workspace.root.as_os_str().is_empty() {
        return Err(TreewatchError::ConfigError(
            "[workspace].root must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_exclude_patterns(cfg: &RawConfigFile) -> Result<()> {
    build_globset(&cfg.workspace.exclude).map_err(|e| {
        TreewatchError::ConfigError(format!("[workspace].exclude: {e:#}"))
    })?;
    Ok(())
}
