//! Update job input: the typed request body and its validation.

use serde::Deserialize;
use url::Url;

use crate::gateway::error::Rejection;

/// Body of `POST /update`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    pub link: Option<String>,
}

impl UpdateRequest {
    /// Deserialize a request body, mapping any JSON error to a validation rejection.
    pub fn from_json(body: &[u8]) -> Result<Self, Rejection> {
        serde_json::from_slice(body)
            .map_err(|e| Rejection::Validation(format!("invalid JSON body: {}", e)))
    }

    /// Check the request and turn it into a job.
    pub fn validate(self) -> Result<Job, Rejection> {
        let link = self
            .link
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Rejection::Validation("`link` is required".into()))?;

        let url = Url::parse(&link)
            .map_err(|e| Rejection::Validation(format!("`link` is not a valid URL: {}", e)))?;

        match url.scheme() {
            "http" | "https" => Ok(Job { link: url }),
            other => Err(Rejection::Validation(format!(
                "`link` must be an http(s) URL, got scheme `{}`",
                other
            ))),
        }
    }
}

/// A validated unit of work. Lives for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub link: Url,
}

impl Job {
    pub fn new(link: Url) -> Self {
        Self { link }
    }
}
