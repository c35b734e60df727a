//! Error types for the Spine client

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No CPA id is configured for the interaction. Nothing is sent.
    #[error("no CPA id configured for interaction {interaction_id}")]
    Routing { interaction_id: String },

    #[error("invalid routing table: {0}")]
    RoutingTable(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response could not be classified as terminal or pollable.
    #[error("ambiguous Spine response: {0}")]
    ClassificationAmbiguity(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("polling abandoned after {attempts} attempts ({elapsed:?})")]
    PollingAbandoned { attempts: u32, elapsed: Duration },

    #[error("XML error: {0}")]
    Xml(#[from] eps_xml::Error),
}

impl Error {
    /// Failures talking to the backbone, as opposed to local configuration
    /// or routing problems.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::ClassificationAmbiguity(_) | Error::PollingAbandoned { .. }
        )
    }
}
