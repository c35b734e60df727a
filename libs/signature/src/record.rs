//! Read-only view of the XML-DSig block embedded in a prescription.

use base64::{engine::general_purpose, Engine as _};
use eps_xml::{canonicalize, Element};

use crate::error::{Error, Result};

const SIGNATURE_PATH: &str = "pertinentInformation1/pertinentPrescription/author/signatureText/Signature";

pub const DSIG_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const XMLENC_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const DSIG_RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const DSIG_MORE_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    /// SHA-1 unless SHA-256 is declared. Backbone interop still signs with
    /// SHA-1.
    pub fn from_uri(uri: Option<&str>) -> Self {
        match uri {
            Some(XMLENC_SHA256) => Self::Sha256,
            _ => Self::Sha1,
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::Sha1 => DSIG_SHA1,
            Self::Sha256 => XMLENC_SHA256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSha1,
    RsaSha256,
}

impl SignatureAlgorithm {
    pub fn from_uri(uri: Option<&str>) -> Self {
        match uri {
            Some(DSIG_MORE_RSA_SHA256) => Self::RsaSha256,
            _ => Self::RsaSha1,
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha1 => DSIG_RSA_SHA1,
            Self::RsaSha256 => DSIG_MORE_RSA_SHA256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignatureRecord {
    pub signed_info_canonical: Vec<u8>,
    pub digest_value: String,
    pub digest_algorithm: DigestAlgorithm,
    pub signature_algorithm: SignatureAlgorithm,
    pub signature_value_base64: String,
    pub certificate_der: Vec<u8>,
    pub certificate_pem: String,
}

impl SignatureRecord {
    /// Pulls the signature block out of a ParentPrescription. Fails with
    /// [`Error::MalformedSignature`] unless SignedInfo, a non-empty
    /// SignatureValue and an X509Certificate are all present.
    pub fn extract(parent_prescription: &Element) -> Result<Self> {
        let signature = parent_prescription
            .find(SIGNATURE_PATH)
            .ok_or_else(|| malformed("no Signature in author/signatureText"))?;
        let signed_info = signature
            .child("SignedInfo")
            .ok_or_else(|| malformed("no SignedInfo"))?;
        let signature_value_base64 = compact_base64(&signature.find("SignatureValue").map(Element::text).unwrap_or_default());
        if signature_value_base64.is_empty() {
            return Err(malformed("no SignatureValue"));
        }
        let certificate_base64 = compact_base64(
            &signature
                .find("KeyInfo/X509Data/X509Certificate")
                .map(Element::text)
                .unwrap_or_default(),
        );
        if certificate_base64.is_empty() {
            return Err(malformed("no X509Certificate"));
        }

        let digest_value = signed_info
            .find("Reference/DigestValue")
            .map(|e| compact_base64(&e.text()))
            .ok_or_else(|| malformed("no Reference/DigestValue"))?;
        let digest_algorithm = DigestAlgorithm::from_uri(
            signed_info
                .find("Reference/DigestMethod")
                .and_then(|e| e.attribute("Algorithm")),
        );
        let signature_algorithm = SignatureAlgorithm::from_uri(
            signed_info
                .child("SignatureMethod")
                .and_then(|e| e.attribute("Algorithm")),
        );

        let certificate_der = general_purpose::STANDARD
            .decode(&certificate_base64)
            .map_err(|e| malformed(&format!("X509Certificate is not base64: {e}")))?;

        Ok(Self {
            signed_info_canonical: canonicalize(signed_info)?,
            digest_value,
            digest_algorithm,
            signature_algorithm,
            certificate_pem: to_pem(&certificate_base64),
            signature_value_base64,
            certificate_der,
        })
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        general_purpose::STANDARD
            .decode(&self.signature_value_base64)
            .map_err(|e| malformed(&format!("SignatureValue is not base64: {e}")))
    }
}

fn compact_base64(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn to_pem(base64_body: &str) -> String {
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in base64_body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

fn malformed(reason: &str) -> Error {
    Error::MalformedSignature(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eps_xml::parse_str;

    fn prescription(signature: &str) -> Element {
        parse_str(&format!(
            r#"<ParentPrescription xmlns="urn:hl7-org:v3"><pertinentInformation1><pertinentPrescription><author><signatureText>{signature}</signatureText></author></pertinentPrescription></pertinentInformation1></ParentPrescription>"#
        ))
        .unwrap()
    }

    const SIGNED_INFO: &str = r#"<SignedInfo><CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/><Reference><DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><DigestValue>
        ZGlnZXN0
    </DigestValue></Reference></SignedInfo>"#;

    #[test]
    fn extracts_declared_algorithms_and_values() {
        let el = prescription(&format!(
            r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#">{SIGNED_INFO}<SignatureValue>c2ln
bmF0dXJl</SignatureValue><KeyInfo><X509Data><X509Certificate>Y2VydA==</X509Certificate></X509Data></KeyInfo></Signature>"#
        ));
        let record = SignatureRecord::extract(&el).unwrap();
        assert_eq!(record.digest_value, "ZGlnZXN0");
        assert_eq!(record.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(record.signature_algorithm, SignatureAlgorithm::RsaSha256);
        assert_eq!(record.signature_bytes().unwrap(), b"signature");
        assert_eq!(record.certificate_der, b"cert");
        assert!(record.certificate_pem.starts_with("-----BEGIN CERTIFICATE-----\nY2VydA==\n"));
        let canonical = String::from_utf8(record.signed_info_canonical).unwrap();
        assert!(canonical.starts_with(r#"<SignedInfo xmlns="http://www.w3.org/2000/09/xmldsig#">"#));
    }

    #[test]
    fn defaults_to_sha1() {
        assert_eq!(DigestAlgorithm::from_uri(None), DigestAlgorithm::Sha1);
        assert_eq!(SignatureAlgorithm::from_uri(Some(DSIG_RSA_SHA1)), SignatureAlgorithm::RsaSha1);
    }

    #[test]
    fn missing_parts_are_malformed() {
        let no_value = prescription(&format!(
            r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#">{SIGNED_INFO}<SignatureValue/><KeyInfo><X509Data><X509Certificate>Y2VydA==</X509Certificate></X509Data></KeyInfo></Signature>"#
        ));
        let no_cert = prescription(&format!(
            r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#">{SIGNED_INFO}<SignatureValue>c2ln</SignatureValue></Signature>"#
        ));
        let no_signed_info = prescription(
            r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#"><SignatureValue>c2ln</SignatureValue></Signature>"#,
        );
        for el in [no_value, no_cert, no_signed_info, prescription("")] {
            assert!(matches!(SignatureRecord::extract(&el), Err(Error::MalformedSignature(_))));
        }
    }
}
