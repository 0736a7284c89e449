use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::technology::{EbeamParams, Medium};
use crate::{warnln, Float, PdkError};

/// Environment variable naming the GDS component library root.
pub const LIBRARY_ENV: &str = "EBEAM_PDK_LIBRARY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not parse {0} from {1:?}")]
    InvalidValue(String, String),
    #[error("Delimiter not found on line {0}: {1:?}")]
    MissingDelimiter(usize, String),
    #[error("Could not expand path {0}: {1}")]
    Expand(String, String),
}

impl EbeamParams {
    /// Update one parameter by name. Unknown keys are reported and ignored.
    pub fn update(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let number = || {
            value
                .parse::<Float>()
                .map_err(|_| ConfigError::InvalidValue(key.to_owned(), value.to_owned()))
        };
        let medium = || {
            value
                .parse::<Medium>()
                .map_err(|_| ConfigError::InvalidValue(key.to_owned(), value.to_owned()))
        };

        match key.to_lowercase().as_str() {
            "si_thickness" => self.si_thickness = number()?,
            "si_slab_thickness" => self.si_slab_thickness = number()?,
            "sin_thickness" => self.sin_thickness = number()?,
            "si_mask_dilation" => self.si_mask_dilation = number()?,
            "si_slab_mask_dilation" => self.si_slab_mask_dilation = number()?,
            "sin_mask_dilation" => self.sin_mask_dilation = number()?,
            "sidewall_angle" => self.sidewall_angle = number()?,
            "sio2" => self.sio2 = medium()?,
            "si" => self.si = medium()?,
            "sin" => self.sin = medium()?,
            other => warnln!("Ignoring unknown technology parameter {}", other),
        }

        Ok(())
    }
}

/// Parse `key: value` lines into technology parameters.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse(contents: &str) -> Result<EbeamParams, ConfigError> {
    let mut params = EbeamParams::default();

    for (n, line) in contents.lines().enumerate() {
        let line = line.trim();

        // Skip comments and empty lines
        if line.starts_with('#') || line.is_empty() {
            continue;
        }

        match line.split_once(':') {
            Some((key, value)) => params.update(key.trim(), value.trim())?,
            None => return Err(ConfigError::MissingDelimiter(n + 1, line.to_owned())),
        }
    }

    Ok(params)
}

/// Read technology parameters from a file.
pub fn read(filename: &Path) -> Result<EbeamParams, PdkError> {
    let contents = fs::read_to_string(filename)?;
    Ok(parse(&contents)?)
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand(path: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| ConfigError::Expand(path.to_owned(), e.to_string()))
}

/// Component library root: explicit path, then the environment, then `./library`.
pub fn library_root(explicit: Option<&str>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => expand(path),
        None => match std::env::var(LIBRARY_ENV) {
            Ok(path) if !path.is_empty() => expand(&path),
            _ => Ok(PathBuf::from("library")),
        },
    }
}
