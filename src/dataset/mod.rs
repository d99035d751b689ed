//! Sponsor dataset: employer → historical visa-count records.
//!
//! The dataset is a CSV keyed by normalized company name. Loads are cached
//! process-wide on `(path, mtime)` so repeated runs do not re-read the file;
//! `refresh` evicts one path so the next load re-reads.

mod freshness;

pub use freshness::dataset_freshness;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::SystemTime;

use thiserror::Error;
use tracing::debug;

use crate::config::Settings;
use crate::models::{EmployerContact, VisaCounts};
use crate::utils::text::normalize_company_name;

/// One employer's sponsorship history, as indexed by normalized name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SponsorRecord {
    pub company_name: String,
    pub company_tier: String,
    pub counts: VisaCounts,
    pub employer_contacts: Vec<EmployerContact>,
}

/// Parsed dataset: row count plus the normalized-name index.
#[derive(Debug, Clone, Default)]
pub struct SponsorDataset {
    pub rows: usize,
    pub by_normalized_company: HashMap<String, SponsorRecord>,
}

impl SponsorDataset {
    pub fn lookup(&self, normalized_company: &str) -> Option<&SponsorRecord> {
        if normalized_company.is_empty() {
            return None;
        }
        self.by_normalized_company.get(normalized_company)
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset not found at '{path}'")]
    NotFound { path: String },
    #[error("read dataset '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("dataset missing required columns: {0}")]
    MissingColumns(String),
}

/// Canonical column → accepted header spellings. Headers are matched
/// case-insensitively after trimming.
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("company_tier", &["company_tier", "size"]),
    ("company_name", &["company_name", "employer"]),
    ("h1b", &["h1b", "h-1b"]),
    ("h1b1_chile", &["h1b1_chile", "h-1b1 chile"]),
    ("h1b1_singapore", &["h1b1_singapore", "h-1b1 singapore"]),
    ("e3_australian", &["e3_australian", "e-3 australian"]),
    ("green_card", &["green_card", "green card"]),
    ("email_1", &["email_1"]),
    ("contact_1", &["contact_1"]),
    ("contact_1_title", &["contact_1_title"]),
    ("contact_1_phone", &["contact_1_phone"]),
    ("email_2", &["email_2"]),
    ("contact_2", &["contact_2"]),
    ("contact_2_title", &["contact_2_title"]),
    ("contact_2_phone", &["contact_2_phone"]),
    ("email_3", &["email_3"]),
    ("contact_3", &["contact_3"]),
    ("contact_3_title", &["contact_3_title"]),
    ("contact_3_phone", &["contact_3_phone"]),
];

const REQUIRED_COLUMNS: &[&str] = &[
    "company_name",
    "h1b",
    "h1b1_chile",
    "h1b1_singapore",
    "e3_australian",
    "green_card",
];

struct CacheEntry {
    mtime: SystemTime,
    data: Arc<SponsorDataset>,
}

fn cache() -> &'static Mutex<HashMap<PathBuf, CacheEntry>> {
    static CACHE: OnceLock<Mutex<HashMap<PathBuf, CacheEntry>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolve the dataset path for one request: an explicit path wins, then the
/// configured default.
pub fn dataset_path_or_default(raw: &str, settings: &Settings) -> PathBuf {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        settings.dataset_path.clone()
    } else {
        PathBuf::from(trimmed)
    }
}

/// Load (or fetch from cache) the sponsor dataset at `path`.
pub fn load_company_dataset(path: &Path) -> Result<Arc<SponsorDataset>, DatasetError> {
    let mtime = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|_| DatasetError::NotFound {
            path: path.display().to_string(),
        })?;

    if let Ok(guard) = cache().lock() {
        if let Some(entry) = guard.get(path) {
            if entry.mtime == mtime {
                return Ok(entry.data.clone());
            }
        }
    }

    let data = Arc::new(parse_dataset(path)?);
    debug!(
        path = %path.display(),
        rows = data.rows,
        companies = data.by_normalized_company.len(),
        "loaded sponsor dataset"
    );
    if let Ok(mut guard) = cache().lock() {
        guard.insert(
            path.to_path_buf(),
            CacheEntry {
                mtime,
                data: data.clone(),
            },
        );
    }
    Ok(data)
}

/// Drop the cache entry for `path`; the next load re-reads the file.
pub fn refresh(path: &Path) {
    if let Ok(mut guard) = cache().lock() {
        guard.remove(path);
    }
}

fn parse_dataset(path: &Path) -> Result<SponsorDataset, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|source| DatasetError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let headers = reader
        .headers()
        .map_err(|source| DatasetError::Read {
            path: path.display().to_string(),
            source,
        })?
        .clone();
    let header_index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, raw)| (raw.trim().to_lowercase(), idx))
        .collect();

    let mut canonical_index: HashMap<&str, Option<usize>> = HashMap::new();
    for (canonical, aliases) in COLUMN_ALIASES {
        let found = aliases
            .iter()
            .find_map(|alias| header_index.get(&alias.trim().to_lowercase()).copied());
        canonical_index.insert(canonical, found);
    }

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|key| canonical_index.get(**key).copied().flatten().is_none())
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(DatasetError::MissingColumns(missing.join(", ")));
    }

    let column = |record: &csv::StringRecord, key: &str| -> String {
        canonical_index
            .get(key)
            .copied()
            .flatten()
            .and_then(|idx| record.get(idx))
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };

    let mut out = SponsorDataset::default();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(_) => break,
        };
        let company_name = column(&record, "company_name");
        let normalized = normalize_company_name(&company_name);
        if normalized.is_empty() {
            continue;
        }

        let h1b = parse_count(&column(&record, "h1b"));
        let h1b1_chile = parse_count(&column(&record, "h1b1_chile"));
        let h1b1_singapore = parse_count(&column(&record, "h1b1_singapore"));
        let e3_australian = parse_count(&column(&record, "e3_australian"));
        let green_card = parse_count(&column(&record, "green_card"));
        let sponsor = SponsorRecord {
            company_name,
            company_tier: column(&record, "company_tier"),
            counts: VisaCounts {
                h1b,
                h1b1_chile,
                h1b1_singapore,
                e3_australian,
                green_card,
                total_visas: h1b + h1b1_chile + h1b1_singapore + e3_australian + green_card,
            },
            employer_contacts: contacts_from_record(&record, &column),
        };

        // On normalized-name collisions the larger sponsorship history wins.
        let keep = match out.by_normalized_company.get(&normalized) {
            Some(existing) => sponsor.counts.total_visas > existing.counts.total_visas,
            None => true,
        };
        if keep {
            out.by_normalized_company.insert(normalized, sponsor);
        }
        out.rows += 1;
    }
    Ok(out)
}

fn contacts_from_record(
    record: &csv::StringRecord,
    column: &impl Fn(&csv::StringRecord, &str) -> String,
) -> Vec<EmployerContact> {
    let mut contacts = Vec::new();
    for n in ["1", "2", "3"] {
        let contact = EmployerContact {
            name: column(record, &format!("contact_{n}")),
            title: column(record, &format!("contact_{n}_title")),
            email: column(record, &format!("email_{n}")),
            phone: column(record, &format!("contact_{n}_phone")),
        };
        if contact.name.is_empty()
            && contact.title.is_empty()
            && contact.email.is_empty()
            && contact.phone.is_empty()
        {
            continue;
        }
        contacts.push(contact);
    }
    contacts
}

fn parse_count(text: &str) -> u32 {
    text.trim().parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dataset(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_with_aliased_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dataset(
            &dir,
            "companies.csv",
            "employer,h-1b,h-1b1 chile,h-1b1 singapore,e-3 australian,green card,contact_1,email_1\n\
             Acme Inc,3,0,0,5,2,Jo Smith,jo@acme.test\n",
        );
        let dataset = load_company_dataset(&path).unwrap();
        assert_eq!(dataset.rows, 1);
        let record = dataset.lookup("acme").unwrap();
        assert_eq!(record.counts.e3_australian, 5);
        assert_eq!(record.counts.total_visas, 10);
        assert_eq!(record.employer_contacts.len(), 1);
        assert_eq!(record.employer_contacts[0].email, "jo@acme.test");
    }

    #[test]
    fn test_duplicate_normalized_key_keeps_larger_total() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dataset(
            &dir,
            "companies.csv",
            "company_name,h1b,h1b1_chile,h1b1_singapore,e3_australian,green_card\n\
             Acme Inc,1,0,0,0,0\n\
             Acme LLC,7,0,0,0,0\n\
             Acme Corp,2,0,0,0,0\n",
        );
        let dataset = load_company_dataset(&path).unwrap();
        assert_eq!(dataset.rows, 3);
        assert_eq!(dataset.lookup("acme").unwrap().counts.h1b, 7);
    }

    #[test]
    fn test_missing_required_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dataset(&dir, "companies.csv", "company_name,h1b\nAcme,1\n");
        let err = load_company_dataset(&path).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("missing required columns"));
        assert!(text.contains("green_card"));
    }

    #[test]
    fn test_blank_company_rows_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dataset(
            &dir,
            "companies.csv",
            "company_name,h1b,h1b1_chile,h1b1_singapore,e3_australian,green_card\n\
             N/A,9,0,0,0,0\n\
             Initech,1,0,0,0,0\n",
        );
        let dataset = load_company_dataset(&path).unwrap();
        assert!(dataset.lookup("initech").is_some());
        assert_eq!(dataset.by_normalized_company.len(), 1);
    }

    #[test]
    fn test_refresh_forces_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dataset(
            &dir,
            "companies.csv",
            "company_name,h1b,h1b1_chile,h1b1_singapore,e3_australian,green_card\nAcme,1,0,0,0,0\n",
        );
        let first = load_company_dataset(&path).unwrap();
        assert_eq!(first.lookup("acme").unwrap().counts.h1b, 1);

        // Rewrite in place; the mtime may not tick, so refresh explicitly.
        write_dataset(
            &dir,
            "companies.csv",
            "company_name,h1b,h1b1_chile,h1b1_singapore,e3_australian,green_card\nAcme,4,0,0,0,0\n",
        );
        refresh(&path);
        let second = load_company_dataset(&path).unwrap();
        assert_eq!(second.lookup("acme").unwrap().counts.h1b, 4);
    }

    #[test]
    fn test_not_found() {
        let err = load_company_dataset(Path::new("/nonexistent/companies.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::NotFound { .. }));
    }
}
