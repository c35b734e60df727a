//! Locating the HL7 payload in a Spine response body.
//!
//! Spine answers either with bare XML, a SOAP envelope, or a
//! `multipart/related` body whose first part is the ebXML header. The payload
//! is the first HL7 element found, and its local name is the interaction id.

use eps_spine_client::envelope::{EB_NS, SOAP_ENV_NS};
use eps_xml::Element;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct SpineMessage {
    payload: Element,
}

impl SpineMessage {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut last_error = None;
        for part in mime_parts(body) {
            match eps_xml::parse(part) {
                Ok(root) => {
                    if let Some(payload) = hl7_payload(root) {
                        return Ok(Self { payload });
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(e) => Err(e.into()),
            None => Err(Error::Malformed("no HL7 payload in response".to_string())),
        }
    }

    pub fn interaction_id(&self) -> &str {
        self.payload.local_name()
    }

    pub fn payload(&self) -> &Element {
        &self.payload
    }

    /// `path` resolved from the payload root, or a malformed-message error.
    pub fn require(&self, path: &str) -> Result<&Element> {
        self.payload
            .find(path)
            .ok_or_else(|| Error::Malformed(format!("{} has no {path}", self.interaction_id())))
    }
}

fn hl7_payload(root: Element) -> Option<Element> {
    let candidate = if root.namespace.as_deref() == Some(SOAP_ENV_NS) {
        root.child("Body")?.elements().next()?.clone()
    } else {
        root
    };
    (candidate.namespace.as_deref() != Some(EB_NS)).then_some(candidate)
}

/// Bodies of a MIME multipart message, or the whole body when it is not one.
fn mime_parts(body: &[u8]) -> Vec<&[u8]> {
    let trimmed = trim_start(body);
    if !trimmed.starts_with(b"--") {
        return vec![body];
    }

    let line_end = trimmed
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(trimmed.len());
    let delimiter = trim_end(&trimmed[..line_end]);

    split_on(trimmed, delimiter)
        .into_iter()
        .filter(|segment| !segment.starts_with(b"--"))
        .filter_map(|segment| {
            let headers_end = find(segment, b"\r\n\r\n")
                .map(|i| i + 4)
                .or_else(|| find(segment, b"\n\n").map(|i| i + 2))?;
            let content = trim_end(trim_start(&segment[headers_end..]));
            (!content.is_empty()).then_some(content)
        })
        .collect()
}

fn split_on<'a>(haystack: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut segments = Vec::new();
    let mut rest = haystack;
    while let Some(index) = find(rest, delimiter) {
        segments.push(&rest[..index]);
        rest = &rest[index + delimiter.len()..];
    }
    segments.push(rest);
    segments.into_iter().filter(|s| !trim_start(s).is_empty()).collect()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn trim_end(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}
