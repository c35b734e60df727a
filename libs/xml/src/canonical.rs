//! Canonical serialization.
//!
//! Exclusive-c14n style output with one deliberate difference: ordinary
//! attributes keep their source order instead of being sorted. Namespace
//! declarations are emitted on the outermost element that visibly uses them,
//! sorted by prefix (default first), ahead of the ordinary attributes.

use std::borrow::Cow;
use std::collections::HashMap;

use quick_xml::events::attributes::Attribute as RawAttribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::Writer;

use crate::element::{Element, Node, XML_NS};
use crate::error::{Error, Result};

/// Namespace bindings rendered by output ancestors, keyed by prefix.
type Rendered = HashMap<Option<String>, String>;

pub fn canonicalize(element: &Element) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, element, &Rendered::new())?;
    Ok(writer.into_inner())
}

pub fn canonical_string(element: &Element) -> Result<String> {
    let bytes = canonicalize(element)?;
    String::from_utf8(bytes).map_err(|e| Error::Write(e.to_string()))
}

/// Canonical body preceded by an XML declaration, for documents put on the
/// wire rather than hashed.
pub fn to_document_string(element: &Element) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| Error::Write(e.to_string()))?;
    write_element(&mut writer, element, &Rendered::new())?;
    String::from_utf8(writer.into_inner()).map_err(|e| Error::Write(e.to_string()))
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element, inherited: &Rendered) -> Result<()> {
    let qname = element.qualified_name();
    let mut rendered = inherited.clone();
    let mut declarations: Vec<(Option<String>, String)> = Vec::new();

    for (prefix, uri) in visibly_used(element) {
        let already = rendered.get(&prefix).map(String::as_str).unwrap_or("");
        if already != uri {
            rendered.insert(prefix.clone(), uri.clone());
            declarations.push((prefix, uri));
        }
    }
    declarations.sort_by(|a, b| a.0.cmp(&b.0));

    let mut start = BytesStart::new(qname.as_str());
    for (prefix, uri) in &declarations {
        let key = match prefix {
            Some(p) => format!("xmlns:{p}"),
            None => "xmlns".to_string(),
        };
        push_raw_attribute(&mut start, &key, escape_attribute(uri));
    }
    for attr in &element.attributes {
        push_raw_attribute(&mut start, &attr.qualified_name(), escape_attribute(&attr.value));
    }

    let write = |writer: &mut Writer<Vec<u8>>, event: Event<'_>| {
        writer.write_event(event).map_err(|e| Error::Write(e.to_string()))
    };

    write(writer, Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(child) => write_element(writer, child, &rendered)?,
            Node::Text(text) => write(writer, Event::Text(BytesText::from_escaped(escape_text(text))))?,
        }
    }
    write(writer, Event::End(BytesEnd::new(qname.as_str())))
}

/// Prefix bindings this element's own name and attributes rely on. An
/// unprefixed element in no namespace uses the empty default namespace.
fn visibly_used(element: &Element) -> Vec<(Option<String>, String)> {
    let mut used = Vec::new();
    match (&element.prefix, &element.namespace) {
        (None, None) => used.push((None, String::new())),
        (prefix, Some(uri)) if prefix.as_deref() != Some("xml") => {
            used.push((prefix.clone(), uri.clone()));
        }
        _ => {}
    }
    for attr in &element.attributes {
        if let (Some(prefix), Some(uri)) = (&attr.prefix, &attr.namespace) {
            if prefix != "xml" && uri != XML_NS && !used.iter().any(|(p, _)| p.as_deref() == Some(prefix)) {
                used.push((Some(prefix.clone()), uri.clone()));
            }
        }
    }
    used
}

fn push_raw_attribute(start: &mut BytesStart<'_>, key: &str, escaped: String) {
    start.push_attribute(RawAttribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escaped.into_bytes()),
    });
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}
