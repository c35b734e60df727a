//! Builds signed prescriptions from the fixture template using the test
//! signer key, so golden cases never go stale.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use eps_signature::{compute_digest, DigestAlgorithm, SignatureAlgorithm};
use eps_xml::{canonicalize, parse_str};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha1::Sha1;
use sha2::Sha256;

pub const SIGNING_TIME: &str = "20210824100522";

pub fn test_data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
}

pub fn read_fixture(name: &str) -> String {
    fs::read_to_string(test_data_dir().join(name)).expect("fixture should exist")
}

pub fn certificate_base64() -> String {
    read_fixture("signer_cert.pem")
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect()
}

fn signer_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(&read_fixture("signer_key.pem")).expect("signer key should load")
}

pub fn template(signing_time: &str) -> String {
    read_fixture("parent_prescription.xml").replace("{SIGNING_TIME}", signing_time)
}

pub fn signed_info_xml(digest_value: &str, digest: DigestAlgorithm, signature: SignatureAlgorithm) -> String {
    format!(
        concat!(
            r#"<SignedInfo xmlns="http://www.w3.org/2000/09/xmldsig#">"#,
            r#"<CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"></CanonicalizationMethod>"#,
            r#"<SignatureMethod Algorithm="{}"></SignatureMethod>"#,
            r#"<Reference><Transforms><Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"></Transform></Transforms>"#,
            r#"<DigestMethod Algorithm="{}"></DigestMethod><DigestValue>{}</DigestValue></Reference>"#,
            r#"</SignedInfo>"#
        ),
        signature.uri(),
        digest.uri(),
        digest_value
    )
}

/// Base64 RSA PKCS#1 v1.5 signature over `bytes` with the test signer key.
pub fn sign_bytes(bytes: &[u8], algorithm: SignatureAlgorithm) -> String {
    let key = signer_key();
    let signature = match algorithm {
        SignatureAlgorithm::RsaSha1 => SigningKey::<Sha1>::new(key).sign(bytes).to_bytes(),
        SignatureAlgorithm::RsaSha256 => SigningKey::<Sha256>::new(key).sign(bytes).to_bytes(),
    };
    general_purpose::STANDARD.encode(signature)
}

/// The template signed at `signing_time` with the given algorithms.
pub fn signed_prescription(signing_time: &str, digest: DigestAlgorithm, signature: SignatureAlgorithm) -> String {
    let unsigned = template(signing_time).replace("{SIGNATURE}", "");
    let digest_value = compute_digest(&parse_str(&unsigned).expect("template parses"), digest).expect("digest");

    let signed_info = signed_info_xml(&digest_value, digest, signature);
    let canonical = canonicalize(&parse_str(&signed_info).expect("SignedInfo parses")).expect("canonical SignedInfo");
    let signature_value = sign_bytes(&canonical, signature);

    let signature_block = format!(
        concat!(
            r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#">{}"#,
            r#"<SignatureValue>{}</SignatureValue>"#,
            r#"<KeyInfo><X509Data><X509Certificate>{}</X509Certificate></X509Data></KeyInfo>"#,
            r#"</Signature>"#
        ),
        signed_info,
        signature_value,
        certificate_base64()
    );
    template(signing_time).replace("{SIGNATURE}", &signature_block)
}

pub fn golden_prescription() -> String {
    signed_prescription(SIGNING_TIME, DigestAlgorithm::Sha1, SignatureAlgorithm::RsaSha1)
}

/// Swaps the SignatureValue content.
pub fn replace_signature_value(xml: &str, new_value: &str) -> String {
    let start = xml.find("<SignatureValue>").expect("has SignatureValue") + "<SignatureValue>".len();
    let end = xml.find("</SignatureValue>").expect("has SignatureValue end");
    format!("{}{}{}", &xml[..start], new_value, &xml[end..])
}

/// Removes indentation and line breaks between elements.
pub fn compact(xml: &str) -> String {
    xml.lines().map(str::trim).collect()
}
