//! JSON-document persistence shared by the run and session stores.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode store document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unknown run_id '{0}'")]
    UnknownRun(String),
    #[error("run_id does not belong to this user_id")]
    RunNotOwned,
    #[error("unknown session_id '{0}'")]
    UnknownSession(String),
    #[error("session_id does not belong to this user_id")]
    SessionNotOwned,
}

/// Load a JSON document, treating a missing or unreadable file as the
/// default (empty) document.
pub fn load_document<T: DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return T::default(),
    };
    match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "store document unreadable, starting empty");
            T::default()
        }
    }
}

/// Persist a JSON document, creating parent directories as needed.
pub fn save_document<T: Serialize>(path: &Path, document: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: path.display().to_string(),
                source,
            })?;
        }
    }
    let raw = serde_json::to_string_pretty(document)?;
    std::fs::write(path, raw).map_err(|source| StoreError::Write {
        path: path.display().to_string(),
        source,
    })
}
