//! Error types for signature verification

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// SignedInfo, SignatureValue or the certificate is missing or unreadable.
    #[error("invalid signature format: {0}")]
    MalformedSignature(String),

    #[error("signature doesn't match prescription: expected digest {expected}, calculated {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("signature is invalid: {0}")]
    SignatureInvalid(String),

    #[error("certificate expired when signed: signed at {signing_time}, valid {not_before} to {not_after}")]
    CertificateExpired {
        signing_time: DateTime<Utc>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    },

    #[error("certificate not trusted: {0}")]
    UntrustedCertificate(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("XML error: {0}")]
    Xml(#[from] eps_xml::Error),
}

