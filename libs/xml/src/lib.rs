//! XML tree and canonical form for HL7v3 and ebXML messages.
//!
//! - [`parse`] reads bytes into an order-preserving [`Element`] tree.
//!   Prefixes are kept verbatim and resolved to namespace URIs.
//! - [`canonicalize`] writes a deterministic byte form suitable for digests:
//!   `canonicalize(parse(canonicalize(parse(x)))) == canonicalize(parse(x))`.
//! - [`to_document_string`] is the same serialization with an XML
//!   declaration, used for outbound documents.

pub mod canonical;
pub mod element;
pub mod error;
pub mod parse;

pub use canonical::{canonical_string, canonicalize, to_document_string};
pub use element::{Attribute, Element, NamespaceDeclaration, Node, XML_NS};
pub use error::{Error, Result};
pub use parse::{parse, parse_str};
