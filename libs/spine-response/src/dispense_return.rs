//! Dispense proposal returns (`PORX_IN100101SM31`).
//!
//! When a released prescription fails signature verification the dispenser
//! hands it back to Spine. The return is addressed with the identity headers
//! of the request that triggered the release.

use std::collections::BTreeMap;
use std::sync::Arc;

use eps_spine_client::{
    Clock, EnvelopeBuilder, IdGenerator, SpineTransport, SystemClock, TransportResponse, UuidGenerator,
};
use eps_xml::{canonical_string, Element};

use crate::error::{Error, Result};

pub const DISPENSE_PROPOSAL_RETURN: &str = "PORX_IN100101SM31";

const HL7_NS: &str = "urn:hl7-org:v3";
const INTERACTION_ROOT: &str = "2.16.840.1.113883.2.1.3.2.4.12";
const ASID_ROOT: &str = "1.2.826.0.1285.0.2.0.107";
const SDS_ROLE_PROFILE_ROOT: &str = "1.2.826.0.1285.0.2.0.67";
const SDS_USER_ROOT: &str = "1.2.826.0.1285.0.2.0.65";
const ODS_ROOT: &str = "1.2.826.0.1285.0.1.10";
const ANNOTATION_CODE_SYSTEM: &str = "2.16.840.1.113883.2.1.3.2.4.17.30";
const SHORT_FORM_ID_ROOT: &str = "2.16.840.1.113883.2.1.3.2.4.18.8";
const RETURN_REASON_CODE_SYSTEM: &str = "2.16.840.1.113883.2.1.3.2.4.16.29";

pub const INVALID_DIGITAL_SIGNATURE: (&str, &str) = ("0005", "Invalid Digital Signature");

pub mod headers {
    pub const ASID: &str = "nhsd-asid";
    pub const ROLE_PROFILE_ID: &str = "nhsd-session-urid";
    pub const USER_ID: &str = "nhsd-identity-uuid";
    pub const ORGANIZATION_CODE: &str = "nhsd-organization-code";
}

/// Inbound request headers, names lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    headers: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn from_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// What is being returned and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRequest {
    /// Id of the release response that delivered the prescription.
    pub release_response_id: String,
    /// Short-form prescription id.
    pub prescription_id: String,
    pub reason_code: String,
    pub reason_display: String,
}

impl ReturnRequest {
    pub fn invalid_signature(release_response_id: impl Into<String>, prescription_id: impl Into<String>) -> Self {
        let (code, display) = INVALID_DIGITAL_SIGNATURE;
        Self {
            release_response_id: release_response_id.into(),
            prescription_id: prescription_id.into(),
            reason_code: code.to_string(),
            reason_display: display.to_string(),
        }
    }
}

pub struct DispenseReturnSender {
    transport: Arc<dyn SpineTransport>,
    envelopes: EnvelopeBuilder,
    context: RequestContext,
    from_asid: String,
    to_asid: String,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl DispenseReturnSender {
    /// `from_asid` is used when the request carried no `nhsd-asid`.
    pub fn new(
        transport: Arc<dyn SpineTransport>,
        envelopes: EnvelopeBuilder,
        context: RequestContext,
        from_asid: impl Into<String>,
        to_asid: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            envelopes,
            context,
            from_asid: from_asid.into(),
            to_asid: to_asid.into(),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    fn sender_asid(&self) -> &str {
        self.context.header(headers::ASID).unwrap_or(&self.from_asid)
    }

    /// The HL7 interaction, wrapper included.
    pub fn payload(&self, request: &ReturnRequest) -> Element {
        let now = self.clock.now().format("%Y%m%d%H%M%S").to_string();
        let sender = self.sender_asid();

        let dispense_proposal_return = hl7("DispenseProposalReturn")
            .with_attribute("classCode", "INFO")
            .with_attribute("moodCode", "EVN")
            .with_child(hl7("id").with_attribute("root", self.ids.next_id()))
            .with_child(hl7("effectiveTime").with_attribute("value", now.clone()))
            .with_child(self.author())
            .with_child(
                hl7("pertinentInformation1")
                    .with_attribute("typeCode", "PERT")
                    .with_attribute("contextConductionInd", "true")
                    .with_child(boolean("seperatableInd", false))
                    .with_child(
                        annotation("pertinentPrescriptionID", "PID").with_child(
                            hl7("value")
                                .with_attribute("root", SHORT_FORM_ID_ROOT)
                                .with_attribute("extension", request.prescription_id.clone()),
                        ),
                    ),
            )
            .with_child(
                hl7("pertinentInformation3")
                    .with_attribute("typeCode", "PERT")
                    .with_attribute("contextConductionInd", "false")
                    .with_child(boolean("seperatableInd", false))
                    .with_child(
                        annotation("pertinentReturnReason", "RR").with_child(
                            hl7("value")
                                .with_attribute("codeSystem", RETURN_REASON_CODE_SYSTEM)
                                .with_attribute("code", request.reason_code.clone())
                                .with_attribute("displayName", request.reason_display.clone()),
                        ),
                    ),
            )
            .with_child(
                hl7("reversalOf")
                    .with_attribute("typeCode", "REV")
                    .with_attribute("inversionInd", "true")
                    .with_attribute("negationInd", "false")
                    .with_child(boolean("seperatableInd", true))
                    .with_child(
                        hl7("priorPrescriptionReleaseResponseRef")
                            .with_attribute("classCode", "INFO")
                            .with_attribute("moodCode", "EVN")
                            .with_child(hl7("id").with_attribute("root", request.release_response_id.clone())),
                    ),
            );

        hl7(DISPENSE_PROPOSAL_RETURN)
            .with_child(hl7("id").with_attribute("root", self.ids.next_id()))
            .with_child(hl7("creationTime").with_attribute("value", now))
            .with_child(hl7("versionCode").with_attribute("code", "V3NPfIT3.0"))
            .with_child(
                hl7("interactionId")
                    .with_attribute("root", INTERACTION_ROOT)
                    .with_attribute("extension", DISPENSE_PROPOSAL_RETURN),
            )
            .with_child(hl7("processingCode").with_attribute("code", "P"))
            .with_child(hl7("processingModeCode").with_attribute("code", "T"))
            .with_child(hl7("acceptAckCode").with_attribute("code", "NE"))
            .with_child(device("communicationFunctionRcv", "RCV", &self.to_asid))
            .with_child(device("communicationFunctionSnd", "SND", sender))
            .with_child(
                hl7("ControlActEvent")
                    .with_attribute("classCode", "CACT")
                    .with_attribute("moodCode", "EVN")
                    .with_child(
                        hl7("author1").with_attribute("typeCode", "AUT").with_child(
                            hl7("AgentSystemSDS").with_attribute("classCode", "AGNT").with_child(
                                hl7("agentSystemSDS")
                                    .with_attribute("classCode", "DEV")
                                    .with_attribute("determinerCode", "INSTANCE")
                                    .with_child(asid(sender)),
                            ),
                        ),
                    )
                    .with_child(
                        hl7("subject")
                            .with_attribute("typeCode", "SUBJ")
                            .with_attribute("contextConductionInd", "false")
                            .with_child(dispense_proposal_return),
                    ),
            )
    }

    fn author(&self) -> Element {
        let agent_person = hl7("AgentPerson")
            .with_attribute("classCode", "AGNT")
            .with_child(sds_id(SDS_ROLE_PROFILE_ROOT, self.context.header(headers::ROLE_PROFILE_ID)))
            .with_child(
                hl7("agentPerson")
                    .with_attribute("classCode", "PSN")
                    .with_attribute("determinerCode", "INSTANCE")
                    .with_child(sds_id(SDS_USER_ROOT, self.context.header(headers::USER_ID))),
            )
            .with_child(
                hl7("representedOrganization")
                    .with_attribute("classCode", "ORG")
                    .with_attribute("determinerCode", "INSTANCE")
                    .with_child(sds_id(ODS_ROOT, self.context.header(headers::ORGANIZATION_CODE))),
            );
        hl7("author")
            .with_attribute("typeCode", "AUT")
            .with_attribute("contextControlCode", "OP")
            .with_child(agent_person)
    }

    /// Wraps and sends the return. The response is not polled.
    pub async fn send(&self, request: &ReturnRequest) -> Result<TransportResponse> {
        let secondary = |source: eps_spine_client::Error| Error::SecondarySend {
            prescription_id: request.prescription_id.clone(),
            source,
        };

        let payload = canonical_string(&self.payload(request)).map_err(|e| secondary(e.into()))?;
        let outbound = self
            .envelopes
            .build(DISPENSE_PROPOSAL_RETURN, payload)
            .and_then(|envelope| envelope.into_outbound())
            .map_err(secondary)?;

        tracing::info!(
            prescription_id = %request.prescription_id,
            message_id = %outbound.message_id,
            reason = %request.reason_code,
            "Sending dispense proposal return"
        );
        self.transport.send(&outbound).await.map_err(secondary)
    }
}

impl std::fmt::Debug for DispenseReturnSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispenseReturnSender")
            .field("envelopes", &self.envelopes)
            .field("context", &self.context)
            .field("from_asid", &self.from_asid)
            .field("to_asid", &self.to_asid)
            .finish_non_exhaustive()
    }
}

fn hl7(name: &str) -> Element {
    Element::namespaced(None, name, HL7_NS)
}

fn boolean(name: &str, value: bool) -> Element {
    hl7(name).with_attribute("value", value.to_string())
}

fn annotation(name: &str, code: &str) -> Element {
    hl7(name)
        .with_attribute("classCode", "OBS")
        .with_attribute("moodCode", "EVN")
        .with_child(
            hl7("code")
                .with_attribute("codeSystem", ANNOTATION_CODE_SYSTEM)
                .with_attribute("code", code),
        )
}

fn asid(value: &str) -> Element {
    hl7("id").with_attribute("root", ASID_ROOT).with_attribute("extension", value)
}

fn device(name: &str, type_code: &str, value: &str) -> Element {
    hl7(name).with_attribute("typeCode", type_code).with_child(
        hl7("device")
            .with_attribute("classCode", "DEV")
            .with_attribute("determinerCode", "INSTANCE")
            .with_child(asid(value)),
    )
}

/// SDS identifier, or a null-flavoured one when the header was absent.
fn sds_id(root: &str, extension: Option<&str>) -> Element {
    match extension {
        Some(value) => hl7("id").with_attribute("root", root).with_attribute("extension", value),
        None => hl7("id").with_attribute("nullFlavor", "UNK"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use eps_spine_client::{HealthStatus, OutboundMessage, RoutingTable, TerminalResponse};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl SpineTransport for Recording {
        async fn send(&self, message: &OutboundMessage) -> eps_spine_client::Result<TransportResponse> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(TransportResponse::Terminal(TerminalResponse {
                status_code: 200,
                body: Default::default(),
            }))
        }

        async fn poll(&self, _polling_url: &str) -> eps_spine_client::Result<TransportResponse> {
            unreachable!("returns are not polled")
        }

        async fn status(&self) -> eps_spine_client::Result<HealthStatus> {
            Ok(HealthStatus { pass: true, status_code: 200 })
        }
    }

    fn sender(transport: Arc<dyn SpineTransport>, routes: &[(&str, &str)]) -> DispenseReturnSender {
        let routing = Arc::new(RoutingTable::from_pairs(routes.iter().copied()).unwrap());
        DispenseReturnSender::new(
            transport,
            EnvelopeBuilder::new(routing, "T141D-822234", "YES-0000806"),
            RequestContext::from_headers([("NHSD-ASID", "200000001285"), ("nhsd-session-urid", "555086718101")]),
            "999000000000",
            "990101234567",
        )
    }

    #[test]
    fn headers_are_case_insensitive() {
        let context = RequestContext::from_headers([("NHSD-Session-URID", "1")]);
        assert_eq!(context.header("nhsd-session-urid"), Some("1"));
        assert_eq!(context.header("NHSD-SESSION-URID"), Some("1"));
    }

    #[test]
    fn payload_carries_prescription_reason_and_release_reference() {
        let sender = sender(Arc::new(Recording::default()), &[(DISPENSE_PROPOSAL_RETURN, "S20001A000182")]);
        let payload = sender.payload(&ReturnRequest::invalid_signature("0D4A6A2C-2E9C", "A0548B-A99968-451485"));
        let proposal = payload.find("ControlActEvent/subject/DispenseProposalReturn").unwrap();

        assert_eq!(
            proposal.find("pertinentInformation1/pertinentPrescriptionID/value").unwrap().attribute("extension"),
            Some("A0548B-A99968-451485")
        );
        let reason = proposal.find("pertinentInformation3/pertinentReturnReason/value").unwrap();
        assert_eq!(reason.attribute("code"), Some("0005"));
        assert_eq!(reason.attribute("displayName"), Some("Invalid Digital Signature"));
        assert_eq!(
            proposal.find("reversalOf/priorPrescriptionReleaseResponseRef/id").unwrap().attribute("root"),
            Some("0D4A6A2C-2E9C")
        );
        assert_eq!(
            proposal.find("author/AgentPerson/id").unwrap().attribute("extension"),
            Some("555086718101")
        );
        // No organisation header: null flavour.
        assert_eq!(
            proposal.find("author/AgentPerson/representedOrganization/id").unwrap().attribute("nullFlavor"),
            Some("UNK")
        );
        assert_eq!(
            payload.find("communicationFunctionSnd/device/id").unwrap().attribute("extension"),
            Some("200000001285")
        );
    }

    #[tokio::test]
    async fn send_wraps_and_posts_the_return() {
        let transport = Arc::new(Recording::default());
        let sender = sender(transport.clone(), &[(DISPENSE_PROPOSAL_RETURN, "S20001A000182")]);
        sender
            .send(&ReturnRequest::invalid_signature("0D4A6A2C", "A0548B-A99968-451485"))
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].interaction_id, DISPENSE_PROPOSAL_RETURN);
        let body = String::from_utf8_lossy(&sent[0].body);
        assert!(body.contains("<eb:CPAId>S20001A000182</eb:CPAId>"));
        assert!(body.contains("A0548B-A99968-451485"));
    }

    #[tokio::test]
    async fn unrouted_return_is_a_secondary_send_failure() {
        let transport = Arc::new(Recording::default());
        let sender = sender(transport.clone(), &[("PORX_IN020101SM31", "S20001A000100")]);
        let err = sender
            .send(&ReturnRequest::invalid_signature("0D4A6A2C", "A0548B-A99968-451485"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SecondarySend { ref prescription_id, .. } if prescription_id == "A0548B-A99968-451485"));
        assert!(transport.sent.lock().unwrap().is_empty());
    }
}
