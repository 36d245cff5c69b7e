//! Application settings backing `$_SETTING_NAME_$` template tokens.
//!
//! Settings live in a flat JSON object on disk:
//!
//! ```json
//! { "BOARD_NAME": "Licensing Board", "RENEWAL_FEE": 120 }
//! ```
//!
//! The file is read once by [`SettingsProvider::load`] and again on every
//! explicit [`SettingsProvider::reload`]; template processing only ever sees
//! the in-memory copy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use templating::engine::value_text;
use templating::SettingsLoader;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("settings file {0} must contain a JSON object")]
    NotAnObject(PathBuf),
}

#[derive(Debug, Default)]
pub struct SettingsProvider {
    path: Option<PathBuf>,
    values: RwLock<HashMap<String, String>>,
}

impl SettingsProvider {
    /// Read settings from `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = read_file(&path)?;
        info!(path = %path.display(), count = values.len(), "settings loaded");
        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
        })
    }

    /// Fixed in-memory settings.
    pub fn from_values(values: HashMap<String, String>) -> Self {
        Self {
            path: None,
            values: RwLock::new(values),
        }
    }

    /// Re-read the backing file. On error the previous values stay active.
    /// A provider built with [`Self::from_values`] has nothing to reload.
    pub fn reload(&self) -> Result<usize, SettingsError> {
        let Some(path) = &self.path else {
            return Ok(self.len());
        };
        let fresh = read_file(path)?;
        let count = fresh.len();
        *self.values.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        info!(path = %path.display(), count, "settings reloaded");
        Ok(count)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl SettingsLoader for SettingsProvider {
    fn setting(&self, key: &str) -> String {
        self.get(key).unwrap_or_default()
    }
}

fn read_file(path: &Path) -> Result<HashMap<String, String>, SettingsError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_owned(),
        source,
    })?;
    let parsed: Value = serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
        path: path.to_owned(),
        source,
    })?;
    let Value::Object(map) = parsed else {
        return Err(SettingsError::NotAnObject(path.to_owned()));
    };

    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let text = value_text(&value);
            (key, text)
        })
        .collect())
}
