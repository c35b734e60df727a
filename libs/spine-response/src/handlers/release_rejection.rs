use async_trait::async_trait;

use super::{detected_issues, ResponseHandler, RELEASE_REJECTION};
use crate::message::SpineMessage;
use crate::translated::{issue, operation_outcome, TranslatedResponse};

/// `PORX_IN110101UK30`: Spine refused to release prescriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseRejectionHandler;

#[async_trait]
impl ResponseHandler for ReleaseRejectionHandler {
    fn interaction_id(&self) -> &str {
        RELEASE_REJECTION
    }

    async fn handle(&self, message: &SpineMessage) -> TranslatedResponse {
        let mut issues = detected_issues(message.payload());
        if issues.is_empty() {
            let mut generic = issue("error", "invalid", None);
            generic["diagnostics"] = "Spine rejected the release request".into();
            issues.push(generic);
        }
        TranslatedResponse::new(400, operation_outcome(issues))
    }
}
