use async_trait::async_trait;

use super::{detected_issues, ResponseHandler, APPLICATION_ACKNOWLEDGEMENT};
use crate::message::SpineMessage;
use crate::translated::{issue, operation_outcome, TranslatedResponse};

/// `MCCI_IN010000UK13`. `AA` is success; `AE` and `AR` carry the reasons
/// Spine gave.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgementHandler;

#[async_trait]
impl ResponseHandler for AcknowledgementHandler {
    fn interaction_id(&self) -> &str {
        APPLICATION_ACKNOWLEDGEMENT
    }

    async fn handle(&self, message: &SpineMessage) -> TranslatedResponse {
        let type_code = message
            .payload()
            .find("acknowledgement")
            .and_then(|ack| ack.attribute("typeCode"));

        match type_code {
            Some("AA") => TranslatedResponse::new(
                200,
                operation_outcome(vec![issue("information", "informational", None)]),
            ),
            Some(code @ ("AE" | "AR")) => {
                let mut issues = detected_issues(message.payload());
                if issues.is_empty() {
                    let mut generic = issue("error", "invalid", None);
                    generic["diagnostics"] = format!("Spine acknowledgement {code} gave no reason").into();
                    issues.push(generic);
                }
                tracing::info!(type_code = code, issues = issues.len(), "Spine rejected message");
                TranslatedResponse::new(400, operation_outcome(issues))
            }
            other => {
                tracing::error!(type_code = ?other, "Unrecognised acknowledgement type code");
                TranslatedResponse::server_error()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(type_code: &str, detail: &str) -> SpineMessage {
        SpineMessage::parse(
            format!(
                r#"<hl7:MCCI_IN010000UK13 xmlns:hl7="urn:hl7-org:v3"><hl7:acknowledgement typeCode="{type_code}">{detail}</hl7:acknowledgement></hl7:MCCI_IN010000UK13>"#
            )
            .as_bytes(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn accepted_is_informational_200() {
        let response = AcknowledgementHandler.handle(&ack("AA", "")).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body["issue"][0]["code"], "informational");
    }

    #[tokio::test]
    async fn error_carries_detail_codes() {
        let detail = r#"<hl7:acknowledgementDetail typeCode="ER"><hl7:code code="202" displayName="Duplicate HL7 ID Error"/></hl7:acknowledgementDetail>"#;
        let response = AcknowledgementHandler.handle(&ack("AE", detail)).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.body["issue"][0]["details"]["coding"][0]["code"], "202");
    }

    #[tokio::test]
    async fn rejection_without_reason_still_reports_an_issue() {
        let response = AcknowledgementHandler.handle(&ack("AR", "")).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.body["issue"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_type_code_is_server_error() {
        let response = AcknowledgementHandler.handle(&ack("ZZ", "")).await;
        assert_eq!(response, TranslatedResponse::server_error());
    }
}
