//! Client for the portal's HTTP API.
//!
//! Each flow issues one request at a time and never retries; a failed call is
//! reported once and left for the user to repeat.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use thiserror::Error;

pub mod admin;
pub mod session;
pub mod upload;

pub use admin::{AdminRow, AdminView, RowStatus};
pub use session::Session;
pub use upload::{UploadOutcome, UploadRequest};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v1";

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Authentication failed")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Resource not found")]
    NotFound,

    #[error("Server error. Please try again later.")]
    Server(StatusCode),

    #[error("Request failed ({status}): {detail}")]
    Rejected { status: StatusCode, detail: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Could not read file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
}

impl PortalClient {
    pub fn new(base_url: &str) -> Result<Self, PortalError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Maps non-success responses onto [`PortalError`].
async fn check_status(response: Response) -> Result<Response, PortalError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(PortalError::Unauthorized),
        StatusCode::FORBIDDEN => Err(PortalError::Forbidden),
        StatusCode::NOT_FOUND => Err(PortalError::NotFound),
        s if s.is_server_error() => Err(PortalError::Server(s)),
        s => {
            let body = response.text().await.unwrap_or_default();
            Err(PortalError::Rejected {
                status: s,
                detail: error_detail(&body),
            })
        }
    }
}

/// Pulls `detail` out of a FastAPI-style error body, falling back to a generic message.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("detail")
                .and_then(|detail| detail.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Request failed".to_string())
}
