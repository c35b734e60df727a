//! Fixtures for dispatch tests: signed prescriptions wrapped in release
//! responses, and transports that record or fail secondary sends.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use eps_signature::{compute_digest, DigestAlgorithm};
use eps_spine_client::{
    EnvelopeBuilder, HealthStatus, OutboundMessage, RoutingTable, SpineTransport, TerminalResponse,
    TransportResponse,
};
use eps_spine_response::{DispenseReturnSender, RequestContext, DISPENSE_PROPOSAL_RETURN};
use eps_xml::{canonicalize, parse_str};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha1::Sha1;
use tracing_subscriber::fmt::MakeWriter;

pub const SIGNING_TIME: &str = "20210824100522";
pub const RELEASE_ID: &str = "0D4A6A2C-2E9C-4D0A-8A2C-1B3D5E7F9A0B";
pub const VALID_PRESCRIPTION_ID: &str = "A0548B-A99968-451485";
pub const TAMPERED_PRESCRIPTION_ID: &str = "B1548B-A99968-451486";

pub fn read_fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name);
    fs::read_to_string(path).expect("fixture should exist")
}

fn strip_declaration(xml: &str) -> &str {
    xml.trim_start()
        .trim_start_matches(r#"<?xml version="1.0" encoding="UTF-8"?>"#)
}

/// The fixture prescription signed with the test key (SHA-1 / RSA-SHA1).
pub fn signed_prescription() -> String {
    let template = read_fixture("parent_prescription.xml").replace("{SIGNING_TIME}", SIGNING_TIME);
    let unsigned = template.replace("{SIGNATURE}", "");
    let digest = compute_digest(&parse_str(&unsigned).expect("template parses"), DigestAlgorithm::Sha1)
        .expect("digest");

    let signed_info = format!(
        concat!(
            r#"<SignedInfo xmlns="http://www.w3.org/2000/09/xmldsig#">"#,
            r#"<CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"></CanonicalizationMethod>"#,
            r#"<SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#rsa-sha1"></SignatureMethod>"#,
            r#"<Reference><DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"></DigestMethod>"#,
            r#"<DigestValue>{}</DigestValue></Reference></SignedInfo>"#
        ),
        digest
    );
    let canonical = canonicalize(&parse_str(&signed_info).expect("SignedInfo parses")).expect("canonical");
    let key = RsaPrivateKey::from_pkcs8_pem(&read_fixture("signer_key.pem")).expect("signer key");
    let signature = general_purpose::STANDARD.encode(SigningKey::<Sha1>::new(key).sign(&canonical).to_bytes());
    let certificate: String = read_fixture("signer_cert.pem")
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();

    template.replace(
        "{SIGNATURE}",
        &format!(
            r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#">{signed_info}<SignatureValue>{signature}</SignatureValue><KeyInfo><X509Data><X509Certificate>{certificate}</X509Certificate></X509Data></KeyInfo></Signature>"#
        ),
    )
}

/// Same prescription under another id with a line item altered after
/// signing.
pub fn tampered_prescription() -> String {
    signed_prescription()
        .replace(VALID_PRESCRIPTION_ID, TAMPERED_PRESCRIPTION_ID)
        .replace("Paracetamol 500mg", "Paracetamol 501mg")
}

fn component(prescription: &str, template: &str) -> String {
    format!(
        r#"<hl7:component typeCode="PERT"><hl7:templateId root="2.16.840.1.113883.2.1.3.2.4.18.2" extension="{template}"/>{}</hl7:component>"#,
        strip_declaration(prescription)
    )
}

pub fn release_response(prescriptions: &[String]) -> String {
    let components: String = prescriptions
        .iter()
        .map(|p| component(p, "PORX_MT122003UK32"))
        .collect();
    read_fixture("release_response.xml").replace("{COMPONENTS}", &components)
}

pub fn patient_release_response(prescriptions: &[String]) -> String {
    release_response(prescriptions).replace("PORX_IN070101UK31", "PORX_IN070103UK31")
}

pub fn cancellation_response(code: &str, display_name: &str) -> String {
    read_fixture("cancellation_response.xml")
        .replace(r#"code="0001""#, &format!(r#"code="{code}""#))
        .replace(
            r#"displayName="Prescription/item was cancelled""#,
            &format!(r#"displayName="{display_name}""#),
        )
}

/// Records every message; answers 200.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingTransport {
    pub fn sent_bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| String::from_utf8_lossy(&m.body).into_owned())
            .collect()
    }
}

#[async_trait]
impl SpineTransport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> eps_spine_client::Result<TransportResponse> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(TransportResponse::Terminal(TerminalResponse {
            status_code: 200,
            body: Bytes::new(),
        }))
    }

    async fn poll(&self, _polling_url: &str) -> eps_spine_client::Result<TransportResponse> {
        panic!("returns are never polled")
    }

    async fn status(&self) -> eps_spine_client::Result<HealthStatus> {
        Ok(HealthStatus { pass: true, status_code: 200 })
    }
}

/// Every send fails as if the backbone had gone away.
pub struct FailingTransport;

#[async_trait]
impl SpineTransport for FailingTransport {
    async fn send(&self, _message: &OutboundMessage) -> eps_spine_client::Result<TransportResponse> {
        Err(eps_spine_client::Error::ClassificationAmbiguity(
            "backbone unavailable".to_string(),
        ))
    }

    async fn poll(&self, _polling_url: &str) -> eps_spine_client::Result<TransportResponse> {
        panic!("returns are never polled")
    }

    async fn status(&self) -> eps_spine_client::Result<HealthStatus> {
        Ok(HealthStatus { pass: false, status_code: 503 })
    }
}

pub fn return_sender(transport: Arc<dyn SpineTransport>) -> Arc<DispenseReturnSender> {
    let routing = RoutingTable::from_pairs([(DISPENSE_PROPOSAL_RETURN, "S20001A000182")]).unwrap();
    Arc::new(DispenseReturnSender::new(
        transport,
        EnvelopeBuilder::new(Arc::new(routing), "T141D-822234", "YES-0000806"),
        RequestContext::from_headers([("nhsd-asid", "200000001285"), ("nhsd-session-urid", "555086718101")]),
        "999000000000",
        "990101234567",
    ))
}

/// Log output collected by a test-local subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Installs a subscriber writing here for the rest of the current thread's
    /// scope.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
