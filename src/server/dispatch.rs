//! Tool dispatch: the thin shell between a JSON-speaking client and the
//! search runtime. One request per line on stdin, one reply per line on
//! stdout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use super::gate::InvocationGate;
use crate::dataset;
use crate::search::scheduler::{get_optional_usize, get_string};
use crate::search::titles::find_related_titles;
use crate::search::{SearchRuntime, ToolError};
use crate::models::SearchMode;
use crate::user::{ignored, preferences};

/// Tools served by this process.
pub const TOOL_NAMES: &[&str] = &[
    "start_visa_job_search",
    "get_visa_job_search_status",
    "get_visa_job_search_results",
    "cancel_visa_job_search",
    "start_job_search",
    "get_job_search_status",
    "get_job_search_results",
    "cancel_job_search",
    "set_user_preferences",
    "get_user_preferences",
    "ignore_job",
    "ignore_company",
    "find_related_titles",
    "refresh_company_dataset_cache",
];

#[derive(Debug, Deserialize)]
struct ToolRequest {
    tool: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ToolReply {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub struct ToolServer {
    runtime: Arc<SearchRuntime>,
    gate: InvocationGate,
}

impl ToolServer {
    pub fn new(runtime: Arc<SearchRuntime>) -> Self {
        Self {
            runtime,
            gate: InvocationGate::new(),
        }
    }

    /// Handle one tool call under the caller's invocation lock.
    pub async fn handle(&self, tool: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let user_id = get_string(args, "user_id");
        let lock = self
            .gate
            .lock_for(if user_id.is_empty() { None } else { Some(&user_id) });
        let _guard = lock.lock().await;
        self.dispatch(tool, args).await
    }

    async fn dispatch(&self, tool: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        match tool {
            "start_visa_job_search" => {
                to_value(self.runtime.start_search(SearchMode::Visa, args).await?)
            }
            "start_job_search" => {
                to_value(self.runtime.start_search(SearchMode::General, args).await?)
            }
            "get_visa_job_search_status" | "get_job_search_status" => {
                to_value(self.runtime.search_status(args).await?)
            }
            "get_visa_job_search_results" => {
                to_value(self.runtime.search_results(SearchMode::Visa, args).await?)
            }
            "get_job_search_results" => {
                to_value(self.runtime.search_results(SearchMode::General, args).await?)
            }
            "cancel_visa_job_search" | "cancel_job_search" => {
                to_value(self.runtime.cancel_search(args).await?)
            }
            "set_user_preferences" => self.set_user_preferences(args),
            "get_user_preferences" => self.get_user_preferences(args),
            "ignore_job" => self.ignore_job(args),
            "ignore_company" => self.ignore_company(args),
            "find_related_titles" => find_related_titles_tool(args),
            "refresh_company_dataset_cache" => self.refresh_dataset_cache(args),
            other => Err(ToolError::Invalid(format!("unknown tool '{other}'"))),
        }
    }

    fn set_user_preferences(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let user_id = require(args, "user_id")?;
        let raw_types = string_list(args, "preferred_visa_types");
        let path = &self.runtime.settings().user_prefs_path;
        preferences::set_visa_types(path, &user_id, &raw_types)?;
        Ok(json!({
            "user_id": user_id,
            "preferences": preferences::user_preferences(path, &user_id),
            "path": path.display().to_string(),
        }))
    }

    fn get_user_preferences(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let user_id = require(args, "user_id")?;
        let path = &self.runtime.settings().user_prefs_path;
        Ok(json!({
            "user_id": user_id,
            "preferences": preferences::user_preferences(path, &user_id),
            "path": path.display().to_string(),
        }))
    }

    fn ignore_job(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let user_id = require(args, "user_id")?;
        let job_url = require(args, "job_url")?;
        let reason = get_string(args, "reason");
        let path = &self.runtime.settings().ignored_jobs_path;
        let entry = ignored::add_ignored_job(path, &user_id, &job_url, &reason)?;
        Ok(json!({
            "user_id": user_id,
            "ignored": entry,
            "path": path.display().to_string(),
        }))
    }

    fn ignore_company(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let user_id = require(args, "user_id")?;
        let company_name = require(args, "company_name")?;
        let reason = get_string(args, "reason");
        let path = &self.runtime.settings().ignored_companies_path;
        let entry = ignored::add_ignored_company(path, &user_id, &company_name, &reason)?
            .ok_or_else(|| {
                ToolError::Invalid(format!(
                    "company_name '{company_name}' does not normalize to a usable key"
                ))
            })?;
        Ok(json!({
            "user_id": user_id,
            "ignored": entry,
            "path": path.display().to_string(),
        }))
    }

    fn refresh_dataset_cache(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let path = dataset::dataset_path_or_default(
            &get_string(args, "dataset_path"),
            self.runtime.settings(),
        );
        dataset::refresh(&path);
        Ok(json!({
            "dataset_path": path.display().to_string(),
            "refreshed": true,
        }))
    }
}

fn find_related_titles_tool(args: &Map<String, Value>) -> Result<Value, ToolError> {
    let job_title = require(args, "job_title")?;
    let limit = match get_optional_usize(args, "limit")? {
        Some(parsed) => parsed.clamp(1, 20),
        None => 8,
    };
    let related = find_related_titles(&job_title, limit);
    let count = related.len();
    Ok(json!({
        "job_title": job_title,
        "related_titles": related,
        "count": count,
    }))
}

fn require(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = get_string(args, key);
    if value.is_empty() {
        return Err(ToolError::Invalid(format!("{key} is required")));
    }
    Ok(value)
}

fn string_list(args: &Map<String, Value>, key: &str) -> Vec<String> {
    match args.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Some(Value::String(text)) if !text.trim().is_empty() => vec![text.trim().to_string()],
        _ => Vec::new(),
    }
}

fn to_value<T: Serialize>(reply: T) -> Result<Value, ToolError> {
    serde_json::to_value(reply)
        .map_err(|err| ToolError::Invalid(format!("failed to encode reply: {err}")))
}

/// Serve JSON-lines tool requests from stdin until EOF.
pub async fn serve_stdio(server: &ToolServer) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<ToolRequest>(&line) {
            Ok(request) => {
                debug!(tool = %request.tool, "dispatching tool call");
                match server.handle(&request.tool, &request.args).await {
                    Ok(result) => ToolReply {
                        ok: true,
                        result: Some(result),
                        error: None,
                    },
                    Err(err) => ToolReply {
                        ok: false,
                        result: None,
                        error: Some(err.to_string()),
                    },
                }
            }
            Err(err) => {
                warn!(error = %err, "unparseable tool request");
                ToolReply {
                    ok: false,
                    result: None,
                    error: Some(format!("invalid request: {err}")),
                }
            }
        };
        let mut raw = serde_json::to_string(&reply)?;
        raw.push('\n');
        stdout.write_all(raw.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
