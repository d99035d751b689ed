//! LinkedIn adapter: guest search endpoint + job detail pages.
//!
//! All upstream CSS selectors live here; when LinkedIn's markup drifts this
//! is the only file that changes. Parse anomalies degrade to empty pages or
//! empty details rather than errors.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA};
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::rate_limit::{request_with_backoff, RateLimitConfig};
use super::{CancelProbe, PageQuery, SiteClient, SiteError};
use crate::config::Settings;
use crate::models::{JobDetails, ScrapedJob};
use crate::search::salary::parse_compensation;
use crate::utils::text::normalize_whitespace;

const SEARCH_URL: &str = "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Live client for LinkedIn's guest search surface.
pub struct LinkedInClient {
    http: reqwest::Client,
    rate_limit: RateLimitConfig,
}

impl LinkedInClient {
    pub fn new(settings: &Settings) -> Result<Self, SiteError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(
            "Upgrade-Insecure-Requests",
            HeaderValue::from_static("1"),
        );

        // Retries are owned by the rate-limit envelope, not the client.
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(settings.linkedin_timeout)
            .no_proxy()
            .gzip(true)
            .build()
            .map_err(|err| SiteError::Http(err.to_string()))?;

        Ok(Self {
            http,
            rate_limit: settings.rate_limit,
        })
    }
}

#[async_trait]
impl SiteClient for LinkedInClient {
    async fn fetch_search_page(
        &self,
        query: &PageQuery,
        probe: &CancelProbe,
    ) -> Result<Vec<ScrapedJob>, SiteError> {
        let mut params = vec![
            ("keywords".to_string(), query.job_title.clone()),
            ("location".to_string(), query.location.clone()),
            ("start".to_string(), query.start.to_string()),
        ];
        if query.hours_old > 0 {
            params.push((
                "f_TPR".to_string(),
                format!("r{}", u64::from(query.hours_old) * 3600),
            ));
        }

        let response = request_with_backoff(
            || {
                let builder = self.http.get(SEARCH_URL).query(&params);
                async move { builder.send().await }
            },
            |resp: &reqwest::Response| resp.status() == StatusCode::TOO_MANY_REQUESTS,
            probe,
            &self.rate_limit,
        )
        .await?;
        let body = response
            .text()
            .await
            .map_err(|err| SiteError::Http(err.to_string()))?;
        Ok(parse_listing_html(&body))
    }

    async fn fetch_job_details(
        &self,
        job_url: &str,
        title: &str,
        location: &str,
        probe: &CancelProbe,
    ) -> Result<JobDetails, SiteError> {
        let response = request_with_backoff(
            || {
                let builder = self.http.get(job_url);
                async move { builder.send().await }
            },
            |resp: &reqwest::Response| resp.status() == StatusCode::TOO_MANY_REQUESTS,
            probe,
            &self.rate_limit,
        )
        .await?;
        let body = response
            .text()
            .await
            .map_err(|err| SiteError::Http(err.to_string()))?;
        Ok(parse_details_html(&body, title, location))
    }
}

fn sel(source: &str) -> Selector {
    Selector::parse(source).expect("static selector")
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

fn first_non_empty_text(card: ElementRef<'_>, selectors: &[&str]) -> String {
    for source in selectors {
        if let Some(found) = card.select(&sel(source)).next() {
            let text = element_text(found);
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Drop the query string from a job URL; tracking parameters vary per page
/// and would defeat de-duplication.
pub(crate) fn strip_query(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    match Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// Parse one listings page into scraped jobs. Unrecognized markup yields an
/// empty vector.
pub(crate) fn parse_listing_html(html: &str) -> Vec<ScrapedJob> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();
    for card in doc.select(&sel("div.base-search-card")) {
        let href = card
            .select(&sel("a.base-card__full-link"))
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default();
        let job_url = strip_query(href);
        if job_url.is_empty() {
            continue;
        }

        let title = first_non_empty_text(card, &["h3.base-search-card__title", "span.sr-only"]);
        let company = card
            .select(&sel("h4.base-search-card__subtitle"))
            .next()
            .map(element_text)
            .unwrap_or_default();
        let location = card
            .select(&sel("span.job-search-card__location"))
            .next()
            .map(element_text)
            .unwrap_or_default();
        let date_posted = card
            .select(&sel("time"))
            .next()
            .and_then(|node| node.value().attr("datetime"))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let mut job = ScrapedJob {
            job_url,
            title,
            company,
            location,
            site: "linkedin".to_string(),
            date_posted,
            ..Default::default()
        };
        let salary_text = first_non_empty_text(card, &["span.job-search-card__salary-info"]);
        if let Some(compensation) = parse_compensation(&salary_text) {
            job.salary_text = Some(compensation.text.clone());
            job.salary_currency =
                Some(compensation.currency).filter(|value| !value.is_empty());
            job.salary_interval =
                Some(compensation.interval).filter(|value| !value.is_empty());
            job.salary_min_amount = compensation.min_amount;
            job.salary_max_amount = compensation.max_amount;
            job.salary_source = Some("listing_card".to_string());
        }
        out.push(job);
    }
    out
}

/// Parse a job detail page. Missing sections leave their fields empty.
pub(crate) fn parse_details_html(html: &str, title: &str, location: &str) -> JobDetails {
    let doc = Html::parse_document(html);

    let description = parse_description_text(&doc);
    let criteria = parse_criteria_values(&doc);
    let is_remote = detect_remote(title, location, &description);

    JobDetails {
        job_type: criteria_value(&criteria, "employment type"),
        job_level: criteria_value(&criteria, "seniority level"),
        company_industry: criteria_value(&criteria, "industries"),
        job_function: criteria_value(&criteria, "job function"),
        job_url_direct: parse_direct_apply_url(&doc),
        is_remote: Some(is_remote),
        description,
    }
}

fn criteria_value(criteria: &[(String, String)], key: &str) -> Option<String> {
    criteria
        .iter()
        .find(|(label, _)| label == key)
        .map(|(_, value)| value.clone())
}

fn parse_description_text(doc: &Html) -> String {
    let markup = doc
        .select(&sel("div.show-more-less-html__markup"))
        .next()
        .or_else(|| doc.select(&sel("div[class*='show-more-less-html__markup']")).next());
    markup.map(element_text).unwrap_or_default()
}

fn normalize_criteria_key(text: &str) -> String {
    normalize_whitespace(text)
        .to_lowercase()
        .trim_end_matches(':')
        .to_string()
}

fn parse_criteria_values(doc: &Html) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for item in doc.select(&sel("li.description__job-criteria-item")) {
        let label = item
            .select(&sel("h3"))
            .next()
            .map(|h| normalize_criteria_key(&element_text(h)))
            .unwrap_or_default();
        let value = item
            .select(&sel("span.description__job-criteria-text"))
            .next()
            .map(element_text)
            .unwrap_or_default();
        if label.is_empty() || value.is_empty() {
            continue;
        }
        out.push((label, value));
    }
    if !out.is_empty() {
        return out;
    }

    // Older markup: subheader followed by a sibling value span.
    for header in doc.select(&sel("h3.description__job-criteria-subheader")) {
        let label = normalize_criteria_key(&element_text(header));
        let value = header
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|node| {
                node.value().name() == "span"
                    && node
                        .value()
                        .attr("class")
                        .is_some_and(|class| class.contains("description__job-criteria-text"))
            })
            .map(element_text)
            .unwrap_or_default();
        if label.is_empty() || value.is_empty() {
            continue;
        }
        out.push((label, value));
    }
    out
}

fn parse_direct_apply_url(doc: &Html) -> Option<String> {
    if let Some(code) = doc.select(&sel("code#applyUrl")).next() {
        let text = element_text(code);
        if !text.is_empty() {
            if let Some(direct) = extract_direct_apply_url(&text) {
                return Some(direct);
            }
        }
        if let Some(direct) = extract_direct_apply_url(&code.inner_html()) {
            return Some(direct);
        }
    }

    doc.select(&sel("a[href]"))
        .filter_map(|anchor| anchor.value().attr("href"))
        .find_map(extract_direct_apply_url)
}

/// Unwrap LinkedIn's apply-redirect wrappers down to the external target.
pub(crate) fn extract_direct_apply_url(raw: &str) -> Option<String> {
    let clean = raw.trim().replace("\\u0026", "&").replace("&amp;", "&");
    if clean.is_empty() {
        return None;
    }

    if let Ok(parsed) = Url::parse(&clean) {
        if let Some((_, target)) = parsed.query_pairs().find(|(key, _)| key == "url") {
            let target = urlencoding::decode(&target)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| target.into_owned());
            if let Some(normalized) = normalize_external_url(&target) {
                return Some(normalized);
            }
        }
    }

    for prefix in ["url=", "?url=", "&url="] {
        if let Some(idx) = clean.find(prefix) {
            let mut target = &clean[idx + prefix.len()..];
            for separator in ['&', '"', '\'', '<', '>'] {
                if let Some(end) = target.find(separator) {
                    target = &target[..end];
                }
            }
            let target = target.trim();
            let target = urlencoding::decode(target)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| target.to_string());
            if let Some(normalized) = normalize_external_url(&target) {
                return Some(normalized);
            }
        }
    }

    normalize_external_url(&clean)
}

/// Validate an external URL and reject linkedin.com redirectors (after one
/// more unwrap attempt through their `url=` param).
pub(crate) fn normalize_external_url(raw: &str) -> Option<String> {
    let mut clean = raw.trim().to_string();
    if clean.is_empty() {
        return None;
    }
    if clean.starts_with("//") {
        clean = format!("https:{clean}");
    }
    let mut parsed = Url::parse(&clean).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if host.contains("linkedin.com") {
        if let Some((_, target)) = parsed.query_pairs().find(|(key, _)| key == "url") {
            let target = urlencoding::decode(&target)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| target.into_owned());
            return normalize_external_url(&target);
        }
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Remote inference over the lowercased union of title, location, and
/// description.
pub(crate) fn detect_remote(title: &str, location: &str, description: &str) -> bool {
    let text = format!("{title} {location} {description}").to_lowercase();
    text.contains("remote") || text.contains("work from home") || text.contains("wfh")
}
