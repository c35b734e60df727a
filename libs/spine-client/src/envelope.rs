//! ebXML/SOAP envelope for outbound HL7v3 messages.
//!
//! Every message uses the async reliable pattern: duplicate elimination,
//! acknowledgement requested from the receiving MSH and a synchronous reply.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use eps_xml::{to_document_string, Element, XML_NS};
use uuid::Uuid;

use crate::error::Result;
use crate::routing::RoutingTable;

pub const MIME_BOUNDARY: &str = "--=_MIME-Boundary";
pub const CONTENT_TYPE: &str =
    "multipart/related; boundary=\"--=_MIME-Boundary\"; type=text/xml; start=ebXMLHeader@spine.nhs.uk";
pub const SERVICE: &str = "urn:nhs:names:services:mm";
pub const ACK_SOAP_ACTOR: &str = "urn:oasis:names:tc:ebxml-msg:actor:toPartyMSH";
const SYNC_REPLY_ACTOR: &str = "http://schemas.xmlsoap.org/soap/actor/next";
const PARTY_TYPE: &str = "urn:nhs:names:partyType:ocs+serviceInstance";

pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const EB_NS: &str = "http://www.oasis-open.org/committees/ebxml-msg/schema/msg-header-2_0.xsd";
const HL7_EBXML_NS: &str = "urn:hl7-org:transport/ebxml/DSTUv1.0";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Fresh v4 UUIDs in upper case, as the backbone expects.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string().to_uppercase()
    }
}

/// A message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub interaction_id: String,
    /// Sent as `NHSD-Request-ID`.
    pub message_id: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub conversation_id: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub from_party: String,
    pub to_party: String,
    pub cpa_id: String,
    pub action: String,
    pub sync_reply: bool,
    pub ack_requested: bool,
    pub duplicate_elimination: bool,
    pub payload: String,
}

impl Envelope {
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// The ebXML SOAP header document (first MIME part).
    pub fn soap_envelope(&self) -> Element {
        let mut header = Element::namespaced(Some("SOAP-ENV"), "Header", SOAP_ENV_NS).with_child(self.message_header());
        if self.ack_requested {
            header.push_child(
                eb("AckRequested")
                    .with_namespaced_attribute("SOAP-ENV", "mustUnderstand", SOAP_ENV_NS, "1")
                    .with_namespaced_attribute("eb", "version", EB_NS, "2.0")
                    .with_namespaced_attribute("eb", "signed", EB_NS, "false")
                    .with_namespaced_attribute("SOAP-ENV", "actor", SOAP_ENV_NS, ACK_SOAP_ACTOR),
            );
        }
        if self.sync_reply {
            header.push_child(
                eb("SyncReply")
                    .with_namespaced_attribute("SOAP-ENV", "mustUnderstand", SOAP_ENV_NS, "1")
                    .with_namespaced_attribute("eb", "version", EB_NS, "2.0")
                    .with_namespaced_attribute("SOAP-ENV", "actor", SOAP_ENV_NS, SYNC_REPLY_ACTOR),
            );
        }

        let manifest = eb("Manifest")
            .with_namespaced_attribute("SOAP-ENV", "mustUnderstand", SOAP_ENV_NS, "1")
            .with_namespaced_attribute("eb", "version", EB_NS, "2.0")
            .with_child(
                eb("Reference")
                    .with_namespaced_attribute("xlink", "href", XLINK_NS, format!("cid:{}@spine.nhs.uk", self.message_id))
                    .with_child(
                        eb("Schema")
                            .with_namespaced_attribute("eb", "location", EB_NS, "http://www.nhsia.nhs.uk/schemas/HL7-Message.xsd")
                            .with_namespaced_attribute("eb", "version", EB_NS, "1.0"),
                    )
                    .with_child(
                        eb("Description")
                            .with_namespaced_attribute("xml", "lang", XML_NS, "en")
                            .with_text(self.action.clone()),
                    )
                    .with_child(
                        Element::namespaced(Some("hl7ebxml"), "Payload", HL7_EBXML_NS)
                            .with_attribute("style", "HL7")
                            .with_attribute("encoding", "XML")
                            .with_attribute("version", "3.0"),
                    ),
            );

        Element::namespaced(Some("SOAP-ENV"), "Envelope", SOAP_ENV_NS)
            .with_child(header)
            .with_child(Element::namespaced(Some("SOAP-ENV"), "Body", SOAP_ENV_NS).with_child(manifest))
    }

    fn message_header(&self) -> Element {
        let party = |direction: &str, id: &str| {
            eb(direction).with_child(
                eb("PartyId")
                    .with_namespaced_attribute("eb", "type", EB_NS, PARTY_TYPE)
                    .with_text(id.to_string()),
            )
        };
        let mut message_header = eb("MessageHeader")
            .with_namespaced_attribute("SOAP-ENV", "mustUnderstand", SOAP_ENV_NS, "1")
            .with_namespaced_attribute("eb", "version", EB_NS, "2.0")
            .with_child(party("From", &self.from_party))
            .with_child(party("To", &self.to_party))
            .with_child(eb("CPAId").with_text(self.cpa_id.clone()))
            .with_child(eb("ConversationId").with_text(self.conversation_id.clone()))
            .with_child(eb("Service").with_text(SERVICE))
            .with_child(eb("Action").with_text(self.action.clone()))
            .with_child(
                eb("MessageData")
                    .with_child(eb("MessageId").with_text(self.message_id.clone()))
                    .with_child(eb("Timestamp").with_text(self.timestamp_string())),
            );
        if self.duplicate_elimination {
            message_header.push_child(eb("DuplicateElimination"));
        }
        message_header
    }

    /// Renders the `multipart/related` body: SOAP header part, then the HL7
    /// payload part.
    pub fn render(&self) -> Result<String> {
        let soap = to_document_string(&self.soap_envelope())?;
        let delimiter = format!("--{MIME_BOUNDARY}");
        Ok(format!(
            "{delimiter}\r\n\
             Content-Id: <ebXMLHeader@spine.nhs.uk>\r\n\
             Content-Type: text/xml\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             \r\n\
             {soap}\r\n\
             {delimiter}\r\n\
             Content-Id: <{message_id}@spine.nhs.uk>\r\n\
             Content-Type: application/xml\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             \r\n\
             {payload}\r\n\
             {delimiter}--\r\n",
            message_id = self.message_id,
            payload = self.payload,
        ))
    }

    pub fn into_outbound(self) -> Result<OutboundMessage> {
        let body = self.render()?;
        Ok(OutboundMessage {
            interaction_id: self.action,
            message_id: self.message_id,
            body: Bytes::from(body),
        })
    }
}

fn eb(name: &str) -> Element {
    Element::namespaced(Some("eb"), name, EB_NS)
}

/// Builds envelopes from a shared routing table with injectable clock and
/// id source.
#[derive(Clone)]
pub struct EnvelopeBuilder {
    routing: Arc<RoutingTable>,
    from_party: String,
    to_party: String,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl EnvelopeBuilder {
    pub fn new(routing: Arc<RoutingTable>, from_party: impl Into<String>, to_party: impl Into<String>) -> Self {
        Self {
            routing,
            from_party: from_party.into(),
            to_party: to_party.into(),
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

    /// Fails with a routing error, before any id is generated, when the
    /// interaction has no CPA id.
    pub fn build(&self, interaction_id: &str, payload: impl Into<String>) -> Result<Envelope> {
        let cpa_id = self.routing.cpa_id(interaction_id)?.to_string();
        let envelope = Envelope {
            conversation_id: self.ids.next_id(),
            message_id: self.ids.next_id(),
            timestamp: self.clock.now(),
            from_party: self.from_party.clone(),
            to_party: self.to_party.clone(),
            cpa_id,
            action: interaction_id.to_string(),
            sync_reply: true,
            ack_requested: true,
            duplicate_elimination: true,
            payload: payload.into(),
        };
        tracing::debug!(
            interaction_id,
            message_id = %envelope.message_id,
            conversation_id = %envelope.conversation_id,
            cpa_id = %envelope.cpa_id,
            "Built ebXML envelope"
        );
        Ok(envelope)
    }
}

impl std::fmt::Debug for EnvelopeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeBuilder")
            .field("routes", &self.routing.len())
            .field("from_party", &self.from_party)
            .field("to_party", &self.to_party)
            .finish()
    }
}
