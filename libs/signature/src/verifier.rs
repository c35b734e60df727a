//! Prescription signature verification.
//!
//! Checks run in a fixed order and the first failure is reported:
//! format, digest, cryptographic signature, certificate validity at the
//! signing time, then trust (only when trusted issuers are configured).

use chrono::{DateTime, Utc};
use eps_xml::Element;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::Sha256;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

use crate::error::{Error, Result};
use crate::fragments::compute_digest;
use crate::record::{DigestAlgorithm, SignatureAlgorithm, SignatureRecord};
use crate::timestamp::parse_hl7_timestamp;

const SIGNING_TIME_PATH: &str = "pertinentInformation1/pertinentPrescription/author/time";

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    pub digest_value: String,
    pub digest_algorithm: DigestAlgorithm,
    pub signature_algorithm: SignatureAlgorithm,
    pub signer_subject: String,
    pub signing_time: DateTime<Utc>,
}

/// Verifies prescription signatures, optionally requiring the signer's
/// certificate to be issued by one of a set of trusted issuers.
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    trusted_issuers: Vec<Vec<u8>>,
}

impl SignatureVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a trusted issuer certificate (PEM).
    pub fn with_trusted_issuer_pem(mut self, pem: &[u8]) -> Result<Self> {
        let (_, pem) = parse_x509_pem(pem).map_err(|e| Error::Certificate(e.to_string()))?;
        X509Certificate::from_der(&pem.contents).map_err(|e| Error::Certificate(e.to_string()))?;
        self.trusted_issuers.push(pem.contents);
        Ok(self)
    }

    pub fn trusted_issuer_count(&self) -> usize {
        self.trusted_issuers.len()
    }

    /// Verifies the signature of a ParentPrescription. `root` may be the
    /// ParentPrescription itself or any element containing one.
    pub fn verify(&self, root: &Element) -> Result<VerifiedSignature> {
        let parent = root
            .descendant("ParentPrescription")
            .ok_or_else(|| Error::MalformedSignature("no ParentPrescription".to_string()))?;

        let record = SignatureRecord::extract(parent)?;

        let actual = compute_digest(parent, record.digest_algorithm)?;
        if actual != record.digest_value {
            tracing::warn!(
                expected = %record.digest_value,
                actual = %actual,
                "Signature doesn't match prescription"
            );
            return Err(Error::DigestMismatch {
                expected: record.digest_value,
                actual,
            });
        }

        let (_, certificate) = X509Certificate::from_der(&record.certificate_der)
            .map_err(|e| Error::Certificate(e.to_string()))?;
        verify_signature_value(&record, &certificate)?;

        let signing_time = parent
            .find(SIGNING_TIME_PATH)
            .and_then(|time| time.attribute("value"))
            .and_then(parse_hl7_timestamp)
            .ok_or_else(|| Error::MalformedSignature("author/time is missing or invalid".to_string()))?;
        check_validity(&certificate, signing_time)?;

        if !self.trusted_issuers.is_empty() {
            self.check_trust(&certificate)?;
        }

        let signer_subject = certificate.subject().to_string();
        tracing::debug!(subject = %signer_subject, "Prescription signature verified");

        Ok(VerifiedSignature {
            digest_value: record.digest_value,
            digest_algorithm: record.digest_algorithm,
            signature_algorithm: record.signature_algorithm,
            signer_subject,
            signing_time,
        })
    }

    fn check_trust(&self, certificate: &X509Certificate<'_>) -> Result<()> {
        let trusted = self.trusted_issuers.iter().any(|der| {
            X509Certificate::from_der(der)
                .map(|(_, issuer)| {
                    certificate.issuer().as_raw() == issuer.subject().as_raw()
                        && certificate.verify_signature(Some(issuer.public_key())).is_ok()
                })
                .unwrap_or(false)
        });
        if trusted {
            Ok(())
        } else {
            Err(Error::UntrustedCertificate(format!(
                "{} is not issued by a trusted issuer",
                certificate.subject()
            )))
        }
    }
}

/// Verifies with no trust anchors configured.
pub fn verify(root: &Element) -> Result<VerifiedSignature> {
    SignatureVerifier::new().verify(root)
}

fn verify_signature_value(record: &SignatureRecord, certificate: &X509Certificate<'_>) -> Result<()> {
    let public_key = RsaPublicKey::from_public_key_der(certificate.public_key().raw)
        .map_err(|e| Error::Certificate(format!("certificate key is not RSA: {e}")))?;
    let signature_bytes = record.signature_bytes()?;
    let signature = Signature::try_from(signature_bytes.as_slice())
        .map_err(|e| Error::SignatureInvalid(e.to_string()))?;

    let outcome = match record.signature_algorithm {
        SignatureAlgorithm::RsaSha1 => {
            VerifyingKey::<Sha1>::new(public_key).verify(&record.signed_info_canonical, &signature)
        }
        SignatureAlgorithm::RsaSha256 => {
            VerifyingKey::<Sha256>::new(public_key).verify(&record.signed_info_canonical, &signature)
        }
    };
    outcome.map_err(|e| {
        tracing::warn!(error = %e, "Signature is invalid");
        Error::SignatureInvalid(e.to_string())
    })
}

fn check_validity(certificate: &X509Certificate<'_>, signing_time: DateTime<Utc>) -> Result<()> {
    let validity = certificate.validity();
    let not_before = asn1_to_utc(&validity.not_before)?;
    let not_after = asn1_to_utc(&validity.not_after)?;
    if signing_time < not_before || signing_time > not_after {
        return Err(Error::CertificateExpired {
            signing_time,
            not_before,
            not_after,
        });
    }
    Ok(())
}

fn asn1_to_utc(time: &ASN1Time) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(time.timestamp(), 0)
        .ok_or_else(|| Error::Certificate(format!("certificate time out of range: {time}")))
}
