//! Signed fragments of a ParentPrescription and their digest.

use base64::{engine::general_purpose, Engine as _};
use eps_xml::{canonicalize, Element, Node};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::record::DigestAlgorithm;

pub const HL7_NS: &str = "urn:hl7-org:v3";

const PRESCRIPTION_PATH: &str = "pertinentInformation1/pertinentPrescription";

/// The parts of a prescription covered by the prescriber's signature, in
/// hashing order: author time, author AgentPerson, recordTarget, then every
/// line item in document order. Each fragment is re-homed into the HL7
/// default namespace.
pub fn extract_fragments(parent_prescription: &Element) -> Result<Vec<Element>> {
    let prescription = parent_prescription
        .find(PRESCRIPTION_PATH)
        .ok_or_else(|| missing("pertinentInformation1/pertinentPrescription"))?;
    let author = prescription.child("author").ok_or_else(|| missing("author"))?;

    let mut fragments = vec![
        author.child("time").ok_or_else(|| missing("author/time"))?,
        author
            .child("AgentPerson")
            .ok_or_else(|| missing("author/AgentPerson"))?,
        parent_prescription
            .child("recordTarget")
            .ok_or_else(|| missing("recordTarget"))?,
    ];
    fragments.extend(prescription.find_all("pertinentInformation2/pertinentLineItem"));

    Ok(fragments.into_iter().map(into_hl7_default_namespace).collect())
}

/// `<FragmentsToBeHashed><Fragment>…</Fragment>…</FragmentsToBeHashed>`
pub fn fragments_to_be_hashed(fragments: Vec<Element>) -> Element {
    Element::new("FragmentsToBeHashed").with_children(
        fragments
            .into_iter()
            .map(|fragment| Element::new("Fragment").with_child(fragment)),
    )
}

/// Canonical bytes of the hashable fragment document.
pub fn canonical_fragments(parent_prescription: &Element) -> Result<Vec<u8>> {
    let fragments = extract_fragments(parent_prescription)?;
    Ok(canonicalize(&fragments_to_be_hashed(fragments))?)
}

/// Base64 digest of the canonical fragments.
pub fn compute_digest(parent_prescription: &Element, algorithm: DigestAlgorithm) -> Result<String> {
    let canonical = canonical_fragments(parent_prescription)?;
    let digest = match algorithm {
        DigestAlgorithm::Sha1 => Sha1::digest(&canonical).to_vec(),
        DigestAlgorithm::Sha256 => Sha256::digest(&canonical).to_vec(),
    };
    Ok(general_purpose::STANDARD.encode(digest))
}

fn into_hl7_default_namespace(fragment: &Element) -> Element {
    let mut fragment = fragment.clone();
    adopt_unqualified(&mut fragment);
    fragment.rehome_default_namespace(HL7_NS);
    fragment
}

/// Messages that omit the HL7 namespace entirely are hashed as if it had
/// been declared.
fn adopt_unqualified(element: &mut Element) {
    if element.namespace.is_none() && element.prefix.is_none() {
        element.namespace = Some(HL7_NS.to_string());
    }
    for child in &mut element.children {
        if let Node::Element(child) = child {
            adopt_unqualified(child);
        }
    }
}

fn missing(path: &str) -> Error {
    Error::MalformedSignature(format!("prescription has no {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eps_xml::{canonical_string, parse_str};

    const PRESCRIPTION: &str = r#"<hl7:ParentPrescription xmlns:hl7="urn:hl7-org:v3">
        <hl7:recordTarget><hl7:Patient><hl7:id extension="9449304130"/></hl7:Patient></hl7:recordTarget>
        <hl7:pertinentInformation1>
            <hl7:pertinentPrescription>
                <hl7:author>
                    <hl7:time value="20210824100522"/>
                    <hl7:signatureText/>
                    <hl7:AgentPerson><hl7:id extension="100102238986"/></hl7:AgentPerson>
                </hl7:author>
                <hl7:pertinentInformation2><hl7:pertinentLineItem><hl7:id root="A"/></hl7:pertinentLineItem></hl7:pertinentInformation2>
                <hl7:pertinentInformation2><hl7:pertinentLineItem><hl7:id root="B"/></hl7:pertinentLineItem></hl7:pertinentInformation2>
            </hl7:pertinentPrescription>
        </hl7:pertinentInformation1>
    </hl7:ParentPrescription>"#;

    #[test]
    fn fragments_follow_hashing_order() {
        let parent = parse_str(PRESCRIPTION).unwrap();
        let names: Vec<String> = extract_fragments(&parent)
            .unwrap()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(
            names,
            vec!["time", "AgentPerson", "recordTarget", "pertinentLineItem", "pertinentLineItem"]
        );
    }

    #[test]
    fn hashable_document_declares_hl7_namespace_per_fragment() {
        let parent = parse_str(PRESCRIPTION).unwrap();
        let doc = fragments_to_be_hashed(extract_fragments(&parent).unwrap());
        let out = canonical_string(&doc).unwrap();
        assert!(out.starts_with(
            r#"<FragmentsToBeHashed><Fragment><time xmlns="urn:hl7-org:v3" value="20210824100522"></time></Fragment>"#
        ));
        assert!(!out.contains("hl7:"));
        assert_eq!(out.matches("<Fragment>").count(), 5);
    }

    #[test]
    fn prefix_choice_does_not_change_digest() {
        let prefixed = parse_str(PRESCRIPTION).unwrap();
        let default_ns = parse_str(
            &PRESCRIPTION
                .replace("hl7:", "")
                .replace("xmlns:hl7", "xmlns"),
        )
        .unwrap();
        assert_eq!(
            compute_digest(&prefixed, DigestAlgorithm::Sha1).unwrap(),
            compute_digest(&default_ns, DigestAlgorithm::Sha1).unwrap()
        );
    }

    #[test]
    fn missing_author_is_malformed() {
        let parent = parse_str(
            r#"<ParentPrescription xmlns="urn:hl7-org:v3"><pertinentInformation1><pertinentPrescription/></pertinentInformation1></ParentPrescription>"#,
        )
        .unwrap();
        assert!(matches!(extract_fragments(&parent), Err(Error::MalformedSignature(_))));
    }
}
