//! Site clients: one adapter per upstream listings provider.
//!
//! Only LinkedIn is implemented. The trait keeps the pipeline pluggable and
//! confines upstream selectors to a single adapter file.

pub mod linkedin;
pub mod rate_limit;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Settings;
use crate::models::{JobDetails, ScrapedJob};

/// Cheap, lock-free cancellation probe polled between chunks of work.
pub type CancelProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// A probe that never cancels.
pub fn never_cancelled() -> CancelProbe {
    Arc::new(|| false)
}

/// Parameters for one listings page request.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub job_title: String,
    pub location: String,
    pub hours_old: u32,
    pub start: usize,
}

#[derive(Debug, Error)]
pub enum SiteError {
    /// Distinguished cancellation error; observed at a checkpoint.
    #[error("search run cancelled")]
    Cancelled,
    /// The retry window closed without the upstream recovering.
    #[error("rate limited by upstream job source (429/Too Many Requests). Backed off for 3 minutes without recovery. Please retry later")]
    RetryBudgetExhausted,
    #[error("upstream request failed: {0}")]
    Http(String),
    #[error("only linkedin is supported right now: '{0}'")]
    UnsupportedSite(String),
}

/// One upstream listings provider.
#[async_trait]
pub trait SiteClient: Send + Sync {
    /// Fetch and parse one listings page.
    async fn fetch_search_page(
        &self,
        query: &PageQuery,
        probe: &CancelProbe,
    ) -> Result<Vec<ScrapedJob>, SiteError>;

    /// Fetch and parse one job's detail page.
    async fn fetch_job_details(
        &self,
        job_url: &str,
        title: &str,
        location: &str,
        probe: &CancelProbe,
    ) -> Result<JobDetails, SiteError>;
}

/// Normalize a requested site name; empty means LinkedIn.
pub fn normalize_site(site: &str) -> Result<String, SiteError> {
    let clean = site.trim().to_lowercase();
    if clean.is_empty() {
        return Ok("linkedin".to_string());
    }
    if clean != "linkedin" {
        return Err(SiteError::UnsupportedSite(clean));
    }
    Ok(clean)
}

/// Build the live client for a site.
pub fn new_site_client(
    site: &str,
    settings: &Settings,
) -> Result<Arc<dyn SiteClient>, SiteError> {
    let clean = normalize_site(site)?;
    match clean.as_str() {
        "linkedin" => Ok(Arc::new(linkedin::LinkedInClient::new(settings)?)),
        other => Err(SiteError::UnsupportedSite(other.to_string())),
    }
}
