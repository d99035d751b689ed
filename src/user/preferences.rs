//! User preferences: the visa classes a user wants sponsorship for.
//!
//! Stored as one JSON document keyed by user ID. The search core only reads
//! `preferred_visa_types`; the rest of the per-user blob passes through
//! untouched.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::VisaType;
use crate::store::{load_document, save_document, StoreError};
use crate::utils::time::utc_now_iso;

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("unsupported visa type '{0}'")]
    UnsupportedVisaType(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

type PrefsDocument = HashMap<String, Map<String, Value>>;

/// The user's preferred visa classes, normalized and sorted. Absent users
/// or empty preference lists yield an empty set.
pub fn optional_visa_types(path: &Path, user_id: &str) -> Vec<VisaType> {
    let document: PrefsDocument = load_document(path);
    let Some(user) = document.get(user_id.trim()) else {
        return Vec::new();
    };
    let Some(raw_types) = user.get("preferred_visa_types").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut normalized: Vec<VisaType> = raw_types
        .iter()
        .filter_map(Value::as_str)
        .filter_map(VisaType::from_alias)
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Replace the user's preferred visa classes. Unknown aliases are rejected.
pub fn set_visa_types(
    path: &Path,
    user_id: &str,
    raw_types: &[String],
) -> Result<Vec<VisaType>, PrefsError> {
    let mut normalized = Vec::new();
    for raw in raw_types {
        let visa = VisaType::from_alias(raw)
            .ok_or_else(|| PrefsError::UnsupportedVisaType(raw.clone()))?;
        if !normalized.contains(&visa) {
            normalized.push(visa);
        }
    }
    normalized.sort();

    let mut document: PrefsDocument = load_document(path);
    let user = document.entry(user_id.trim().to_string()).or_default();
    user.insert(
        "preferred_visa_types".to_string(),
        Value::Array(
            normalized
                .iter()
                .map(|visa| Value::String(visa.as_str().to_string()))
                .collect(),
        ),
    );
    user.insert(
        "updated_at_utc".to_string(),
        Value::String(utc_now_iso()),
    );
    save_document(path, &document)?;
    Ok(normalized)
}

/// The user's raw preference blob, for the get tool.
pub fn user_preferences(path: &Path, user_id: &str) -> Map<String, Value> {
    let document: PrefsDocument = load_document(path);
    document.get(user_id.trim()).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_read_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_preferences.json");
        let saved = set_visa_types(
            &path,
            "u1",
            &["E-3".to_string(), "PERM".to_string(), "e3".to_string()],
        )
        .unwrap();
        assert_eq!(saved, vec![VisaType::E3Australian, VisaType::GreenCard]);
        assert_eq!(
            optional_visa_types(&path, "u1"),
            vec![VisaType::E3Australian, VisaType::GreenCard]
        );
    }

    #[test]
    fn test_unknown_alias_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_preferences.json");
        let err = set_visa_types(&path, "u1", &["b2-tourist".to_string()]).unwrap_err();
        assert!(matches!(err, PrefsError::UnsupportedVisaType(_)));
    }

    #[test]
    fn test_absent_user_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_preferences.json");
        assert!(optional_visa_types(&path, "ghost").is_empty());
        assert!(user_preferences(&path, "ghost").is_empty());
    }
}
