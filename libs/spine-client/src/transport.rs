//! Transport abstraction and response classification.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_LOCATION, LOCATION};
use reqwest::StatusCode;

use crate::envelope::OutboundMessage;
use crate::error::{Error, Result};

/// A response that needs no further polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalResponse {
    pub status_code: u16,
    pub body: Bytes,
}

impl TerminalResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportResponse {
    Terminal(TerminalResponse),
    Pollable { status_code: u16, polling_url: String },
}

impl TransportResponse {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Terminal(terminal) => terminal.status_code,
            Self::Pollable { status_code, .. } => *status_code,
        }
    }
}

/// Pollable iff the status is 202 and a `Content-Location` (else `Location`)
/// header is present. Every other response is terminal with its body kept.
pub fn classify(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Result<TransportResponse> {
    if status == StatusCode::ACCEPTED {
        if let Some(value) = headers.get(CONTENT_LOCATION).or_else(|| headers.get(LOCATION)) {
            let polling_url = value.to_str().map_err(|_| {
                let err = Error::ClassificationAmbiguity(format!(
                    "202 response with unreadable location header {value:?}"
                ));
                tracing::error!(error = %err, "Could not classify Spine response");
                err
            })?;
            if polling_url.trim().is_empty() {
                let err = Error::ClassificationAmbiguity("202 response with empty location header".to_string());
                tracing::error!(error = %err, "Could not classify Spine response");
                return Err(err);
            }
            return Ok(TransportResponse::Pollable {
                status_code: status.as_u16(),
                polling_url: polling_url.to_string(),
            });
        }
    }

    Ok(TransportResponse::Terminal(TerminalResponse {
        status_code: status.as_u16(),
        body,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    pub pass: bool,
    pub status_code: u16,
}

/// Outbound calls to the backbone. One request per call, no retries.
#[async_trait]
pub trait SpineTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<TransportResponse>;

    /// Follows up a pollable response. The URL may be absolute or relative
    /// to the configured base.
    async fn poll(&self, polling_url: &str) -> Result<TransportResponse>;

    async fn status(&self) -> Result<HealthStatus>;
}
