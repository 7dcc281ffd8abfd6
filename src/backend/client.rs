//! HTTP client for the project backend
//!
//! Questions go to `POST /projects/{id}/ask` as `{"question": ...}` and come
//! back as `{"answer": ...}`. A failed ask never propagates: the caller
//! always gets an answer string, substituting a fixed fallback on transport
//! errors, non-success statuses, or unparseable bodies. Project metadata
//! reads are plain fallible requests.

use crate::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Answer substituted when the backend cannot be reached or cannot answer
pub const FALLBACK_ANSWER: &str =
    "Sorry, I could not get an answer from the project assistant. Please try again later.";

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
}

#[derive(Deserialize)]
struct AskResponse {
    answer: Option<String>,
}

/// Project metadata as served by the backend (read-only here)
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub description: String,
    pub video_path: Option<String>,
    pub document_path: Option<String>,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub status: String,
    pub thumbnail: Option<String>,
}

/// Client for the per-project ask endpoint and project reads
#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client with the given base URL and ask timeout
    pub fn new(base_url: impl Into<String>, ask_timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(ask_timeout_secs))
            .build()
            .map_err(|e| ParleyError::ConfigError(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Ask one question about a project
    ///
    /// Single attempt, no retry. Any failure resolves to [`FALLBACK_ANSWER`]
    /// so the user always gets a spoken/text response.
    pub async fn ask(&self, project_id: i64, question: &str) -> String {
        let url = format!("{}/projects/{}/ask", self.base_url, project_id);
        debug!(%url, question, "dispatching question");

        let response = match self
            .client
            .post(&url)
            .json(&AskRequest { question })
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "ask request failed, using fallback answer");
                return FALLBACK_ANSWER.to_string();
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "backend returned non-success status, using fallback answer");
            return FALLBACK_ANSWER.to_string();
        }

        match response.json::<AskResponse>().await {
            Ok(AskResponse {
                answer: Some(answer),
            }) if !answer.trim().is_empty() => {
                info!(chars = answer.len(), "answer received");
                answer
            }
            Ok(_) => {
                warn!("backend response missing answer, using fallback answer");
                FALLBACK_ANSWER.to_string()
            }
            Err(e) => {
                warn!(error = %e, "failed to parse backend response, using fallback answer");
                FALLBACK_ANSWER.to_string()
            }
        }
    }

    /// List all projects
    pub async fn projects(&self) -> Result<Vec<Project>> {
        let url = format!("{}/projects", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ParleyError::BackendError(format!("List projects failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ParleyError::BackendError(format!(
                "List projects returned {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ParleyError::BackendError(format!("Invalid projects payload: {}", e)))
    }

    /// Fetch one project by id
    pub async fn project(&self, project_id: i64) -> Result<Project> {
        let url = format!("{}/projects/{}", self.base_url, project_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ParleyError::BackendError(format!("Fetch project failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ParleyError::BackendError(format!(
                "Fetch project {} returned {}",
                project_id, status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ParleyError::BackendError(format!("Invalid project payload: {}", e)))
    }
}
