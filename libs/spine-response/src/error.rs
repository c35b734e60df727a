//! Error types for Spine response translation

use thiserror::Error;

use crate::translated::TranslatedResponse;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No registered handler accepted the message.
    #[error("no handler for Spine response {}", interaction_id.as_deref().unwrap_or("<unknown>"))]
    DispatchUnmatched { interaction_id: Option<String> },

    /// The body parsed but lacks an element the translation needs.
    #[error("malformed Spine message: {0}")]
    Malformed(String),

    #[error("XML error: {0}")]
    Xml(#[from] eps_xml::Error),

    #[error(transparent)]
    Client(#[from] eps_spine_client::Error),

    /// A message sent as a side effect of handling a response failed. Logged,
    /// never surfaced as the primary response.
    #[error("secondary send for prescription {prescription_id} failed: {source}")]
    SecondarySend {
        prescription_id: String,
        #[source]
        source: eps_spine_client::Error,
    },
}

impl Error {
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Client(e) if e.is_transport() => 502,
            Error::DispatchUnmatched { .. }
            | Error::Malformed(_)
            | Error::Xml(_)
            | Error::Client(_)
            | Error::SecondarySend { .. } => 500,
        }
    }

    /// The response returned to the caller for this failure.
    pub fn into_translated_response(self) -> TranslatedResponse {
        match self.status_code() {
            502 => TranslatedResponse::bad_gateway(self.to_string()),
            _ => TranslatedResponse::server_error(),
        }
    }
}
