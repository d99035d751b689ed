//! Query executor: the scrape → filter → score pipeline behind one run.
//!
//! Runs in its own task. All run mutation goes through the run store's
//! locked update protocol; the store mutex is held only for short bursts
//! (event appends, status transitions) and released around network I/O.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, warn};

use super::eval::{
    build_eligibility_reasons, build_general_eligibility_reasons, confidence_score,
    detect_description_signals, general_confidence_score, has_desired_mention,
    should_accept_job, visa_match_strength, CONFIDENCE_MODEL_VERSION,
};
use super::pagination::slice_accepted_jobs;
use super::scheduler::{long_guidance, tool_names, SearchRuntime};
use super::titles::{find_related_titles, job_matches_requested_title};
use crate::config::MAX_UPSTREAM_START;
use crate::dataset::{dataset_freshness, load_company_dataset, SponsorDataset};
use crate::models::{
    labels_for, AcceptedJob, EventPhase, Guidance, MatchStrength, RecoverySuggestion,
    ResponseStatus, ResultIndexEntry, RunStatus, ScanOutcome, ScrapedJob, SearchMode,
    SearchOutcome, SearchQuery, SearchResponse, SearchSession, SearchStats, SessionQuery,
    SessionSummary, VisaType,
};
use crate::site::{CancelProbe, PageQuery, SiteError};
use crate::user::{ignored, preferences};
use crate::utils::ids::new_opaque_id;
use crate::utils::text::{normalize_company_name, normalize_whitespace, truncate_chars};
use crate::utils::time::{future_iso, utc_now_iso};

#[derive(Debug, Error)]
pub(crate) enum ExecError {
    #[error("search run cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

impl From<SiteError> for ExecError {
    fn from(err: SiteError) -> Self {
        match err {
            SiteError::Cancelled => ExecError::Cancelled,
            other => ExecError::Failed(other.to_string()),
        }
    }
}

fn payload(pairs: Vec<(&str, Value)>) -> Option<Map<String, Value>> {
    let mut bag = Map::new();
    for (key, value) in pairs {
        bag.insert(key.to_string(), value);
    }
    Some(bag)
}

async fn emit(
    runtime: &SearchRuntime,
    run_id: &str,
    phase: EventPhase,
    detail: &str,
    progress_percent: f64,
    bag: Option<Map<String, Value>>,
) {
    let result = runtime
        .runs
        .update_run(run_id, |run| {
            run.append_event(phase, detail, progress_percent, bag);
            Ok(())
        })
        .await;
    if let Err(err) = result {
        warn!(run_id, error = %err, "failed to append run event");
    }
}

/// Drive one run to a terminal status.
pub(crate) async fn execute_search_run(runtime: Arc<SearchRuntime>, run_id: String) {
    let flag = runtime
        .register_cancel_flag(&run_id);
    let probe: CancelProbe = {
        let flag = flag.clone();
        Arc::new(move || flag.load(Ordering::SeqCst))
    };

    let marked = runtime
        .runs
        .update_run(&run_id, |run| {
            // A cancel that raced the spawn leaves the run in `cancelling`;
            // the first checkpoint below will finish it.
            if !run.cancel_requested {
                run.status = RunStatus::Running;
                run.append_event(
                    EventPhase::Running,
                    "Background search is running.",
                    2.0,
                    None,
                );
            }
            Ok(())
        })
        .await;
    if let Err(err) = marked {
        error!(run_id = %run_id, error = %err, "failed to mark run as running");
        runtime.clear_cancel_flag(&run_id);
        return;
    }

    let run = match runtime.runs.load_run(&run_id).await {
        Ok(run) => run,
        Err(err) => {
            fail_run(&runtime, &run_id, &err.to_string()).await;
            runtime.clear_cancel_flag(&run_id);
            return;
        }
    };

    // An already-requested cancel must not restart execution.
    if run.cancel_requested {
        flag.store(true, Ordering::SeqCst);
    }

    match execute_search_query(&runtime, &run_id, &run.query, &probe).await {
        Ok(output) => {
            let persisted = runtime
                .runs
                .update_run(&run_id, |run| {
                    run.status = RunStatus::Completed;
                    run.search_session_id = Some(output.session_id.clone());
                    run.latest_response = Some(output.response.clone());
                    run.latest_stats = Some(output.stats.clone());
                    run.completed_at_utc = Some(utc_now_iso());
                    run.error = None;
                    Ok(())
                })
                .await;
            if let Err(err) = persisted {
                error!(run_id = %run_id, error = %err, "failed to persist completed run");
            }
        }
        Err(err) => {
            let cancelled = matches!(err, ExecError::Cancelled);
            let message = err.to_string();
            let persisted = runtime
                .runs
                .update_run(&run_id, move |run| {
                    if cancelled || run.cancel_requested {
                        run.status = RunStatus::Cancelled;
                        run.error = None;
                        run.completed_at_utc = Some(utc_now_iso());
                        run.append_event(
                            EventPhase::Cancelled,
                            "Search run cancelled.",
                            100.0,
                            None,
                        );
                    } else {
                        run.status = RunStatus::Failed;
                        run.error = Some(message.clone());
                        run.completed_at_utc = Some(utc_now_iso());
                        run.append_event(EventPhase::Failed, &message, 100.0, None);
                    }
                    Ok(())
                })
                .await;
            if let Err(persist_err) = persisted {
                error!(run_id = %run_id, error = %persist_err, "failed to persist terminal run status");
            }
        }
    }
    runtime.clear_cancel_flag(&run_id);
}

async fn fail_run(runtime: &SearchRuntime, run_id: &str, message: &str) {
    let message = message.to_string();
    let result = runtime
        .runs
        .update_run(run_id, move |run| {
            run.status = RunStatus::Failed;
            run.error = Some(message.clone());
            run.completed_at_utc = Some(utc_now_iso());
            run.append_event(EventPhase::Failed, &message, 100.0, None);
            Ok(())
        })
        .await;
    if let Err(err) = result {
        error!(run_id = %run_id, error = %err, "failed to persist failed run status");
    }
}

pub(crate) struct QueryOutput {
    pub response: SearchResponse,
    pub stats: SearchStats,
    pub session_id: String,
}

pub(crate) async fn execute_search_query(
    runtime: &SearchRuntime,
    run_id: &str,
    query: &SearchQuery,
    probe: &CancelProbe,
) -> Result<QueryOutput, ExecError> {
    let settings = &runtime.settings;

    // 1. Preferences. Visa mode without saved preferences is user-actionable.
    let mut desired: Vec<VisaType> =
        preferences::optional_visa_types(&settings.user_prefs_path, &query.user_id);
    if query.search_mode == SearchMode::Visa && desired.is_empty() {
        return Err(ExecError::Failed(format!(
            "no saved preferences for user_id='{}'; set visa preferences first using set_user_preferences",
            query.user_id
        )));
    }
    let apply_visa_filtering = query.search_mode == SearchMode::Visa && !desired.is_empty();
    if !apply_visa_filtering {
        desired.clear();
    }

    // 2. Sponsor dataset; unavailable is degraded, not fatal.
    emit(
        runtime,
        run_id,
        EventPhase::Dataset,
        "Loading sponsor dataset.",
        5.0,
        None,
    )
    .await;
    let dataset_path = std::path::PathBuf::from(&query.dataset_path);
    let mut dataset_load_warning = None;
    let dataset: Arc<SponsorDataset> = match load_company_dataset(&dataset_path) {
        Ok(dataset) => dataset,
        Err(err) => {
            dataset_load_warning = Some(err.to_string());
            emit(
                runtime,
                run_id,
                EventPhase::Dataset,
                "Dataset unavailable; continuing with live listing signals only.",
                8.0,
                payload(vec![("warning", Value::from(err.to_string()))]),
            )
            .await;
            Arc::new(SponsorDataset::default())
        }
    };
    let freshness = dataset_freshness(&dataset_path, &settings.manifest_path);
    let ignored_jobs = ignored::ignored_job_urls(&settings.ignored_jobs_path, &query.user_id);
    let ignored_companies =
        ignored::ignored_company_keys(&settings.ignored_companies_path, &query.user_id);

    // 3. Scan budget.
    let required_accepted = query
        .results_wanted
        .max(query.offset + query.max_returned)
        .max(1);
    let raw_scan_target = (required_accepted * query.scan_multiplier)
        .max(required_accepted)
        .min(query.max_scan_results);

    let client = runtime
        .site_client(&query.site)
        .map_err(|err| ExecError::Failed(err.to_string()))?;

    // 4. Scrape loop, de-duplicating on lowercased trimmed URL.
    let mut raw_jobs: Vec<ScrapedJob> = Vec::new();
    let mut seen_urls = std::collections::HashSet::new();
    let mut start = 0usize;
    let mut scan_exhausted = false;
    let mut stats = SearchStats::default();
    emit(
        runtime,
        run_id,
        EventPhase::Scrape,
        "Scanning LinkedIn listings.",
        15.0,
        payload(vec![("scan_target", Value::from(raw_scan_target))]),
    )
    .await;
    while raw_jobs.len() < raw_scan_target && start <= MAX_UPSTREAM_START {
        // Coarse checkpoint: the durable cancel bit is authoritative even if
        // the in-memory flag was lost.
        if probe() || runtime.runs.cancel_requested(run_id).await {
            return Err(ExecError::Cancelled);
        }
        let page = client
            .fetch_search_page(
                &PageQuery {
                    job_title: query.job_title.clone(),
                    location: query.location.clone(),
                    hours_old: query.hours_old,
                    start,
                },
                probe,
            )
            .await?;
        if page.is_empty() {
            scan_exhausted = true;
            break;
        }
        let page_len = page.len();
        let mut added = 0usize;
        for job in page {
            let key = job.job_url.trim().to_lowercase();
            if key.is_empty() || !seen_urls.insert(key) {
                continue;
            }
            raw_jobs.push(job);
            added += 1;
            if raw_jobs.len() >= raw_scan_target {
                break;
            }
        }
        if added == 0 {
            scan_exhausted = true;
            break;
        }
        start += page_len;
        let progress =
            15.0 + 60.0 * raw_jobs.len() as f64 / raw_scan_target.max(1) as f64;
        emit(
            runtime,
            run_id,
            EventPhase::Scrape,
            "Collected LinkedIn pages.",
            progress,
            payload(vec![("raw_jobs_scanned", Value::from(raw_jobs.len()))]),
        )
        .await;
    }
    if raw_jobs.len() < raw_scan_target {
        scan_exhausted = true;
    }

    // 5. Filter/score loop under the description-fetch budget.
    let filter_detail = if apply_visa_filtering {
        "Evaluating visa relevance."
    } else {
        "Evaluating role relevance."
    };
    emit(
        runtime,
        run_id,
        EventPhase::Filter,
        filter_detail,
        76.0,
        payload(vec![("raw_jobs_scanned", Value::from(raw_jobs.len()))]),
    )
    .await;

    let mut accepted: Vec<AcceptedJob> = Vec::new();
    let mut description_fetches = 0usize;
    let description_fetch_limit = settings.max_description_fetches;
    let description_deadline = Instant::now() + settings.description_budget;
    let mut description_budget_hit = false;
    let raw_total = raw_jobs.len();

    for (idx, raw) in raw_jobs.into_iter().enumerate() {
        if probe() {
            return Err(ExecError::Cancelled);
        }
        stats.raw_jobs_scanned += 1;

        let url_key = raw.job_url.trim().to_lowercase();
        if ignored_jobs.contains(&url_key) {
            stats.ignored_jobs_skipped += 1;
            continue;
        }
        let normalized_company = normalize_company_name(&raw.company);
        if !normalized_company.is_empty() && ignored_companies.contains(&normalized_company) {
            stats.ignored_companies_skipped += 1;
            continue;
        }

        let record = dataset.lookup(&normalized_company);
        let has_company = record.is_some();
        let (desired_count, total_count, visa_counts, contacts) = match record {
            Some(record) => {
                stats.company_matches += 1;
                (
                    record.counts.desired_total(&desired),
                    record.counts.total_visas,
                    record.counts,
                    record.employer_contacts.clone(),
                )
            }
            None => (0, 0, Default::default(), Vec::new()),
        };

        let mut description_text = String::new();
        let mut fetched_description = false;
        let mut job_type = raw.job_type.clone();
        let mut job_level = raw.job_level.clone();
        let mut company_industry = raw.company_industry.clone();
        let mut job_function = raw.job_function.clone();
        let mut job_url_direct = raw.job_url_direct.clone();
        let mut is_remote = raw.is_remote;

        let needs_description =
            query.require_description_signal || (apply_visa_filtering && desired_count == 0);
        if needs_description {
            let can_fetch = description_fetches < description_fetch_limit
                && Instant::now() < description_deadline;
            if can_fetch {
                if description_fetches % 5 == 0 {
                    let detail = if apply_visa_filtering {
                        "Checking job descriptions for visa signals."
                    } else {
                        "Checking job descriptions for relevance signals."
                    };
                    emit(
                        runtime,
                        run_id,
                        EventPhase::Filter,
                        detail,
                        80.0,
                        payload(vec![
                            ("description_fetches", Value::from(description_fetches)),
                            (
                                "description_fetch_limit",
                                Value::from(description_fetch_limit),
                            ),
                            ("accepted_jobs", Value::from(accepted.len())),
                        ]),
                    )
                    .await;
                }
                match client
                    .fetch_job_details(&raw.job_url, &raw.title, &raw.location, probe)
                    .await
                {
                    Ok(details) => {
                        description_text = details.description;
                        fetched_description = !description_text.is_empty();
                        overlay(&mut job_type, details.job_type);
                        overlay(&mut job_level, details.job_level);
                        overlay(&mut company_industry, details.company_industry);
                        overlay(&mut job_function, details.job_function);
                        overlay(&mut job_url_direct, details.job_url_direct);
                        if details.is_remote.is_some() {
                            is_remote = details.is_remote;
                        }
                    }
                    Err(SiteError::Cancelled) => return Err(ExecError::Cancelled),
                    // Per-candidate fetch failures are not fatal; the job is
                    // evaluated on its listing card alone.
                    Err(_) => {}
                }
                description_fetches += 1;
                stats.description_fetches = description_fetches;
            } else {
                description_budget_hit = true;
                stats.description_fetch_skipped += 1;
            }
        }

        let signals = detect_description_signals(&description_text);
        let description_desired = has_desired_mention(&signals.mentioned, &desired);
        if apply_visa_filtering && signals.positive && description_desired {
            stats.description_signal_matches += 1;
        }
        if !apply_visa_filtering && !job_matches_requested_title(&query.job_title, &raw.title) {
            continue;
        }

        let accept = if apply_visa_filtering {
            should_accept_job(
                query.strictness_mode,
                desired_count,
                signals.positive,
                signals.negative,
                description_desired,
                query.require_description_signal,
            )
        } else {
            !(query.require_description_signal && description_text.trim().is_empty())
        };
        if !accept {
            continue;
        }

        let visas_sponsored = if apply_visa_filtering {
            desired
                .iter()
                .filter(|visa| {
                    visa_counts.get(**visa) > 0
                        || (description_desired && signals.mentioned.contains(*visa))
                })
                .map(|visa| visa.label().to_string())
                .collect()
        } else {
            visa_counts.sponsored_labels()
        };

        let (confidence, reasons, match_strength) = if apply_visa_filtering {
            (
                confidence_score(
                    desired_count,
                    total_count,
                    signals.positive,
                    signals.negative,
                    description_desired,
                ),
                build_eligibility_reasons(
                    desired_count,
                    signals.positive,
                    signals.negative,
                    description_desired,
                    &desired,
                ),
                visa_match_strength(desired_count, description_desired, signals.positive),
            )
        } else {
            (
                general_confidence_score(has_company, fetched_description),
                build_general_eligibility_reasons(
                    &normalize_company_name(&query.job_title),
                    has_company,
                    fetched_description,
                ),
                MatchStrength::NotRequested,
            )
        };

        let mut agent_guidance = "Apply and tailor outreach to the hiring team.".to_string();
        if let Some(primary) = contacts.first() {
            if !primary.name.is_empty() || !primary.email.is_empty() {
                agent_guidance = format!(
                    "Prioritize outreach to {} {} after applying.",
                    primary.name, primary.email
                );
            }
        }
        let is_remote = is_remote.or_else(|| {
            Some(crate::site::linkedin::detect_remote(
                &raw.title,
                &raw.location,
                &description_text,
            ))
        });

        accepted.push(AcceptedJob {
            result_id: String::new(),
            job_url: raw.job_url,
            title: raw.title,
            company: raw.company,
            location: raw.location,
            site: "linkedin".to_string(),
            date_posted: raw.date_posted,
            description_fetched: fetched_description,
            description: optional_text(&description_text),
            description_excerpt: truncate_chars(&description_text, 280),
            salary_text: raw.salary_text,
            salary_currency: raw.salary_currency,
            salary_interval: raw.salary_interval,
            salary_min_amount: raw.salary_min_amount,
            salary_max_amount: raw.salary_max_amount,
            salary_source: raw.salary_source,
            job_type: job_type.filter(|v| !v.trim().is_empty()),
            job_level: job_level.filter(|v| !v.trim().is_empty()),
            company_industry: company_industry.filter(|v| !v.trim().is_empty()),
            job_function: job_function.filter(|v| !v.trim().is_empty()),
            job_url_direct: job_url_direct.filter(|v| !v.trim().is_empty()),
            is_remote,
            employer_contacts: contacts,
            visa_counts,
            visas_sponsored,
            visa_match_strength: match_strength,
            eligibility_reasons: reasons,
            confidence_score: confidence,
            confidence_model_version: CONFIDENCE_MODEL_VERSION.to_string(),
            agent_guidance,
        });
        if accepted.len() >= required_accepted {
            break;
        }

        if idx % 25 == 0 {
            let detail = if apply_visa_filtering {
                "Scoring visa eligibility."
            } else {
                "Scoring job relevance."
            };
            let progress = 76.0 + 18.0 * (idx + 1) as f64 / raw_total.max(1) as f64;
            emit(
                runtime,
                run_id,
                EventPhase::Filter,
                detail,
                progress,
                payload(vec![("accepted_jobs", Value::from(accepted.len()))]),
            )
            .await;
        }
    }

    // 6. Assemble the immutable session.
    let session_id = new_opaque_id();
    for (idx, job) in accepted.iter_mut().enumerate() {
        job.result_id = format!("{session_id}:{}", idx + 1);
    }
    let result_id_index = accepted
        .iter()
        .map(|job| (job.result_id.clone(), ResultIndexEntry::from_job(job)))
        .collect();
    let now = utc_now_iso();
    let session_expires_at = future_iso(settings.session_ttl_seconds);
    let session = SearchSession {
        created_at_utc: now.clone(),
        updated_at_utc: now,
        expires_at_utc: session_expires_at.clone(),
        query: SessionQuery {
            user_id: query.user_id.clone(),
            location: query.location.clone(),
            job_title: query.job_title.clone(),
            hours_old: query.hours_old,
            dataset_path: query.dataset_path.clone(),
            site: query.site.clone(),
            results_wanted: query.results_wanted,
            max_returned: query.max_returned,
            offset: query.offset,
            require_description_signal: query.require_description_signal,
            strictness_mode: query.strictness_mode,
            preferred_visa_types: desired.clone(),
        },
        accepted_jobs: accepted.clone(),
        result_id_index,
        accepted_jobs_total: accepted.len(),
        latest_scan_target: raw_scan_target,
        scan_exhausted,
    };
    runtime
        .sessions
        .insert_session(&session_id, session)
        .await
        .map_err(|err| ExecError::Failed(err.to_string()))?;

    // 7. Assemble the response snapshot.
    let (page, pagination) = slice_accepted_jobs(
        &accepted,
        query.offset,
        query.max_returned,
        raw_scan_target,
        query.max_scan_results,
        scan_exhausted,
    );
    stats.accepted_jobs = accepted.len();
    stats.returned_jobs = page.len();
    stats.dataset_rows = dataset.rows;
    stats.description_fetch_limit = description_fetch_limit;
    stats.description_budget_hit = description_budget_hit;
    stats.visa_filtering_enabled = apply_visa_filtering;

    let mut recovery_suggestions = Vec::new();
    if page.is_empty() {
        recovery_suggestions.push(RecoverySuggestion::RelatedTitles {
            job_title: query.job_title.clone(),
            suggested_titles: find_related_titles(&query.job_title, 8),
        });
    }
    if description_budget_hit {
        recovery_suggestions.push(RecoverySuggestion::DescriptionProbeBudgetReached {
            message: "Stopped description probing due runtime budget; narrow the search or rerun."
                .to_string(),
            description_fetch_limit,
        });
    }
    if dataset_load_warning.is_some() {
        recovery_suggestions.push(RecoverySuggestion::DatasetUnavailable {
            message:
                "Company dataset was unavailable; results were ranked using live listing signals only."
                    .to_string(),
        });
    }

    let desired_labels = labels_for(&desired);
    let message = if apply_visa_filtering {
        if page.is_empty() {
            format!(
                "No jobs matched requested visa criteria yet for {}. Try related titles or wider location.",
                desired_labels.join(", ")
            )
        } else {
            format!(
                "Evaluated {} raw LinkedIn jobs and accepted {} for {} sponsorship.",
                stats.raw_jobs_scanned,
                stats.accepted_jobs,
                desired_labels.join(", ")
            )
        }
    } else if page.is_empty() {
        format!(
            "No jobs matched \"{}\" in \"{}\" yet. Try related titles or a wider location.",
            query.job_title, query.location
        )
    } else {
        format!(
            "Evaluated {} raw LinkedIn jobs and accepted {} matching \"{}\" in \"{}\".",
            stats.raw_jobs_scanned, stats.accepted_jobs, query.job_title, query.location
        )
    };

    let accepted_total = accepted.len();
    let response = SearchResponse {
        status: ResponseStatus {
            outcome: if page.is_empty() {
                SearchOutcome::CompletedNoResults
            } else {
                SearchOutcome::Completed
            },
            message,
            site: query.site.clone(),
            strictness_mode: query.strictness_mode,
            search_mode: query.search_mode,
            visa_filtering: apply_visa_filtering,
            desired_visa_types: desired,
            search_session: SessionSummary {
                session_id: session_id.clone(),
                expires_at_utc: session_expires_at,
                accepted_jobs_total: accepted_total,
            },
            scan_outcome: ScanOutcome {
                scan_exhausted,
                requested_scan_target: raw_scan_target,
                max_scan_results: query.max_scan_results,
            },
        },
        stats: stats.clone(),
        guidance: Guidance {
            long_search_guidance: long_guidance(query.search_mode),
            background_search_tools: tool_names(query.search_mode),
        },
        dataset_freshness: freshness,
        pagination,
        recovery_suggestions,
        jobs: page,
    };

    emit(
        runtime,
        run_id,
        EventPhase::Completed,
        "Search run completed.",
        100.0,
        payload(vec![
            ("accepted_jobs", Value::from(accepted_total)),
            ("returned_jobs", Value::from(response.stats.returned_jobs)),
        ]),
    )
    .await;

    Ok(QueryOutput {
        response,
        stats,
        session_id,
    })
}

fn overlay(slot: &mut Option<String>, candidate: Option<String>) {
    if let Some(value) = candidate {
        if !normalize_whitespace(&value).is_empty() {
            *slot = Some(value);
        }
    }
}

fn optional_text(value: &str) -> Option<String> {
    let clean = normalize_whitespace(value);
    if clean.is_empty() {
        None
    } else {
        Some(clean)
    }
}
