//! Verification of the XML-DSig signatures carried by HL7v3 prescriptions.
//!
//! The signed content is not the document itself but a set of fragments
//! (author time, author, patient, line items) that are re-homed into the HL7
//! default namespace, wrapped in `FragmentsToBeHashed` and canonicalized with
//! [`eps_xml::canonicalize`]. The digest of that document must match the
//! `DigestValue` in SignedInfo, and the RSA signature must verify over the
//! canonical SignedInfo with the embedded certificate's key.

pub mod error;
pub mod fragments;
pub mod record;
pub mod timestamp;
pub mod verifier;

pub use error::{Error, Result};
pub use fragments::{canonical_fragments, compute_digest, extract_fragments, fragments_to_be_hashed, HL7_NS};
pub use record::{DigestAlgorithm, SignatureAlgorithm, SignatureRecord};
pub use timestamp::{hl7_timestamp_to_rfc3339, parse_hl7_timestamp};
pub use verifier::{verify, SignatureVerifier, VerifiedSignature};
