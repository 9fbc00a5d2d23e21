//! Bugzilla REST client implementing [`PatchSource`].

use std::time::Duration;

use async_trait::async_trait;
use ews_domain::{BugMetadata, BugStatus, PatchMetadata, ReviewFlag};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::services::PatchSource;

/// Bug tracker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BugTrackerConfig {
    /// Server root, e.g. `https://bugs.webkit.org/`.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BugTrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://bugs.webkit.org/".to_string(),
            timeout_secs: 10,
        }
    }
}

pub struct BugzillaClient {
    base_url: String,
    http: reqwest::Client,
}

impl BugzillaClient {
    pub fn new(config: &BugTrackerConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ews-steps/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Transport {
                url: config.base_url.clone(),
                message: e.to_string(),
            })?;

        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self { base_url, http })
    }

    async fn fetch(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        debug!(url = %url, "fetching from bug tracker");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::NOT_FOUND => Err(FetchError::NotFound {
                what: url.to_string(),
            }),
            status => Err(FetchError::Transport {
                url: url.to_string(),
                message: format!("unexpected status code {status}"),
            }),
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        self.fetch(url)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Malformed {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl PatchSource for BugzillaClient {
    async fn get_patch(&self, patch_id: u64) -> Result<String, FetchError> {
        let url = self.patch_url(patch_id);
        self.fetch(&url)
            .await?
            .text()
            .await
            .map_err(|e| FetchError::Transport {
                url,
                message: e.to_string(),
            })
    }

    async fn get_patch_metadata(&self, patch_id: u64) -> Result<PatchMetadata, FetchError> {
        let url = format!("{}rest/bug/attachment/{}", self.base_url, patch_id);
        let body = self.fetch_json(&url).await?;
        parse_attachment(patch_id, &body).map_err(|e| e.at(&url))
    }

    async fn get_bug_metadata(&self, bug_id: u64) -> Result<BugMetadata, FetchError> {
        let url = format!("{}rest/bug/{}", self.base_url, bug_id);
        let body = self.fetch_json(&url).await?;
        parse_bug(&body).map_err(|e| e.at(&url))
    }

    fn patch_url(&self, patch_id: u64) -> String {
        format!("{}attachment.cgi?id={}", self.base_url, patch_id)
    }

    fn bug_url(&self, bug_id: u64) -> String {
        format!("{}show_bug.cgi?id={}", self.base_url, bug_id)
    }
}

/// Why a response body could not be turned into metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Missing(String),
    Invalid(String),
}

impl ParseError {
    fn at(self, url: &str) -> FetchError {
        match self {
            ParseError::Missing(what) => FetchError::NotFound { what },
            ParseError::Invalid(message) => FetchError::Malformed {
                url: url.to_string(),
                message,
            },
        }
    }
}

/// Bugzilla encodes booleans as `0`/`1` in some fields.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => !s.is_empty() && s != "0",
        _ => false,
    }
}

/// Parse `{"attachments": {"<id>": {...}}}`.
pub fn parse_attachment(patch_id: u64, body: &Value) -> Result<PatchMetadata, ParseError> {
    let attachment = body
        .get("attachments")
        .and_then(|a| a.get(patch_id.to_string()))
        .ok_or_else(|| ParseError::Missing(format!("patch {patch_id}")))?;

    let id = attachment
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| ParseError::Invalid(format!("patch {patch_id} has no id")))?;

    let flags = attachment
        .get("flags")
        .and_then(Value::as_array)
        .map(|flags| {
            flags
                .iter()
                .filter_map(|flag| {
                    Some(ReviewFlag {
                        name: flag.get("name")?.as_str()?.to_string(),
                        status: flag.get("status")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(PatchMetadata {
        id,
        bug_id: attachment.get("bug_id").and_then(Value::as_u64),
        author: attachment
            .get("creator")
            .and_then(Value::as_str)
            .map(str::to_string),
        obsolete: attachment.get("is_obsolete").is_some_and(truthy),
        flags,
    })
}

/// Parse `{"bugs": [{...}]}`; a bug without a status is unreadable.
pub fn parse_bug(body: &Value) -> Result<BugMetadata, ParseError> {
    let bug = body
        .get("bugs")
        .and_then(Value::as_array)
        .and_then(|bugs| bugs.first())
        .ok_or_else(|| ParseError::Missing("bug".to_string()))?;

    let id = bug
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| ParseError::Invalid("bug has no id".to_string()))?;
    let status = bug
        .get("status")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParseError::Invalid(format!("bug {id} has no status")))?;

    Ok(BugMetadata {
        id,
        status: BugStatus::from(status.to_string()),
        title: bug
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}
