//! Job records as they move through the pipeline: the raw listing card, the
//! optional detail-page overlay, and the accepted job persisted in a session.

use serde::{Deserialize, Serialize};

use super::visa::VisaCounts;

/// One listing as scraped from a search-results page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedJob {
    pub job_url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub site: String,
    pub date_posted: Option<String>,
    pub salary_text: Option<String>,
    pub salary_currency: Option<String>,
    pub salary_interval: Option<String>,
    pub salary_min_amount: Option<i64>,
    pub salary_max_amount: Option<i64>,
    pub salary_source: Option<String>,
    pub job_type: Option<String>,
    pub job_level: Option<String>,
    pub company_industry: Option<String>,
    pub job_function: Option<String>,
    pub job_url_direct: Option<String>,
    pub is_remote: Option<bool>,
}

/// Fields parsed from a job's detail page. Every field is optional; parse
/// anomalies yield an empty overlay rather than an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobDetails {
    pub description: String,
    pub job_type: Option<String>,
    pub job_level: Option<String>,
    pub company_industry: Option<String>,
    pub job_function: Option<String>,
    pub job_url_direct: Option<String>,
    pub is_remote: Option<bool>,
}

/// A named employer contact from the sponsor dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployerContact {
    pub name: String,
    pub title: String,
    pub email: String,
    pub phone: String,
}

/// How strongly a job matched the requested visa criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrength {
    Strong,
    CompanyDataset,
    DescriptionSignal,
    Weak,
    NotRequested,
}

/// A job that passed filtering, enriched with evidence. Owned by its
/// session and never mutated after the session is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedJob {
    /// Stable alias of the form `<session_id>:<1-based index>`.
    pub result_id: String,
    pub job_url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub site: String,
    pub date_posted: Option<String>,
    pub description_fetched: bool,
    pub description: Option<String>,
    /// First 280 characters of the description.
    pub description_excerpt: String,
    pub salary_text: Option<String>,
    pub salary_currency: Option<String>,
    pub salary_interval: Option<String>,
    pub salary_min_amount: Option<i64>,
    pub salary_max_amount: Option<i64>,
    pub salary_source: Option<String>,
    pub job_type: Option<String>,
    pub job_level: Option<String>,
    pub company_industry: Option<String>,
    pub job_function: Option<String>,
    pub job_url_direct: Option<String>,
    pub is_remote: Option<bool>,
    pub employer_contacts: Vec<EmployerContact>,
    pub visa_counts: VisaCounts,
    /// Human labels for the visa classes this job appears to sponsor.
    pub visas_sponsored: Vec<String>,
    pub visa_match_strength: MatchStrength,
    pub eligibility_reasons: Vec<String>,
    /// In [0, 1], rounded to two decimals.
    pub confidence_score: f64,
    pub confidence_model_version: String,
    pub agent_guidance: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_strength_serde() {
        assert_eq!(
            serde_json::to_string(&MatchStrength::CompanyDataset).unwrap(),
            "\"company_dataset\""
        );
        assert_eq!(
            serde_json::from_str::<MatchStrength>("\"not_requested\"").unwrap(),
            MatchStrength::NotRequested
        );
    }
}
