//! Handlers for each Spine response interaction.
//!
//! A handler claims a message by interaction id and turns it into a
//! [`TranslatedResponse`]. The dispatcher asks each in turn; the first to
//! claim a message wins.

use async_trait::async_trait;
use eps_xml::Element;
use serde_json::Value;

use crate::message::SpineMessage;
use crate::translated::{coding, issue, TranslatedResponse, SPINE_ERROR_OR_WARNING_CODE};

pub mod acknowledgement;
pub mod cancellation;
pub mod release;
pub mod release_rejection;

pub use acknowledgement::AcknowledgementHandler;
pub use cancellation::CancellationHandler;
pub use release::ReleaseResponseHandler;
pub use release_rejection::ReleaseRejectionHandler;

pub const APPLICATION_ACKNOWLEDGEMENT: &str = "MCCI_IN010000UK13";
pub const CANCEL_RESPONSE: &str = "PORX_IN050101UK31";
pub const RELEASE_REJECTION: &str = "PORX_IN110101UK30";
pub const NOMINATED_RELEASE_RESPONSE: &str = "PORX_IN070101UK31";
pub const PATIENT_RELEASE_RESPONSE: &str = "PORX_IN070103UK31";

#[async_trait]
pub trait ResponseHandler: Send + Sync {
    /// Interaction this handler claims.
    fn interaction_id(&self) -> &str;

    async fn handle(&self, message: &SpineMessage) -> TranslatedResponse;

    /// `Some` only when the message is this handler's interaction.
    async fn try_handle(&self, message: &SpineMessage) -> Option<TranslatedResponse> {
        if message.interaction_id() != self.interaction_id() {
            return None;
        }
        tracing::debug!(interaction_id = self.interaction_id(), "Handling Spine response");
        Some(self.handle(message).await)
    }
}

/// Detected-issue codes carried by a rejection, as OperationOutcome issues.
/// Reads both `ControlActEvent/reason/justifyingDetectedIssueEvent/code` and
/// `acknowledgement/acknowledgementDetail/code`.
pub(crate) fn detected_issues(payload: &Element) -> Vec<Value> {
    let reasons = payload.find_all("ControlActEvent/reason/justifyingDetectedIssueEvent/code");
    let details = payload.find_all("acknowledgement/acknowledgementDetail/code");

    reasons
        .into_iter()
        .chain(details)
        .filter_map(|code| {
            let value = code.attribute("code")?;
            let display = code.attribute("displayName").unwrap_or_default();
            Some(issue(
                "error",
                "invalid",
                Some(coding(SPINE_ERROR_OR_WARNING_CODE, value, display)),
            ))
        })
        .collect()
}
