//! XML bytes → [`Element`] tree.
//!
//! Comments, processing instructions, the XML declaration and DOCTYPE are
//! dropped. Adjacent text and CDATA sections are merged into a single text
//! node. Whitespace-only text inside an element that also has element
//! children is treated as formatting and removed, including between elements
//! of mixed content (`<a>x <b/> <c/></a>` keeps `x ` but not the space
//! between `b` and `c`). HL7v3 and ebXML content is element-only, so nothing
//! significant is lost there.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::element::{Attribute, Element, NamespaceDeclaration, Node, XML_NS};
use crate::error::{Error, Result};

const BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn parse_str(input: &str) -> Result<Element> {
    parse(input.as_bytes())
}

pub fn parse(input: &[u8]) -> Result<Element> {
    let input = input.strip_prefix(BOM).unwrap_or(input);
    let normalized = normalize_line_endings(input);
    let mut reader = Reader::from_reader(normalized.as_slice());
    let mut builder = TreeBuilder::default();

    loop {
        match reader.read_event()? {
            Event::Start(start) => builder.open(&start)?,
            Event::Empty(start) => {
                builder.open(&start)?;
                builder.close(None)?;
            }
            Event::End(end) => {
                let name = std::str::from_utf8(end.name().as_ref())?.to_string();
                builder.close(Some(name))?;
            }
            Event::Text(text) => builder.text(&text.unescape()?),
            Event::CData(cdata) => {
                let raw = cdata.into_inner();
                builder.text(std::str::from_utf8(&raw)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    builder.finish()
}

/// XML processors hand the application `\n` for every literal `\r\n` or
/// lone `\r`. Character references (`&#xD;`) are unaffected.
fn normalize_line_endings(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.iter().copied().peekable();
    while let Some(b) = bytes.next() {
        if b == b'\r' {
            if bytes.peek() == Some(&b'\n') {
                bytes.next();
            }
            out.push(b'\n');
        } else {
            out.push(b);
        }
    }
    out
}

/// Attribute-value normalization for CDATA-typed attributes: literal tab and
/// newline become spaces before references are expanded.
fn normalize_attribute_value(raw: &str) -> String {
    raw.replace(['\t', '\n'], " ")
}

fn split_qname(qname: &str) -> (Option<String>, String) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, qname.to_string()),
    }
}

#[derive(Default)]
struct TreeBuilder {
    open: Vec<Element>,
    scopes: Vec<Vec<NamespaceDeclaration>>,
    root: Option<Element>,
}

impl TreeBuilder {
    fn open(&mut self, start: &BytesStart<'_>) -> Result<()> {
        let qname = std::str::from_utf8(start.name().as_ref())?.to_string();
        let (prefix, name) = split_qname(&qname);

        let mut declarations = Vec::new();
        let mut raw_attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let raw = std::str::from_utf8(&attr.value)?;
            let value = unescape(&normalize_attribute_value(raw))?.into_owned();

            if key == "xmlns" {
                declarations.push(NamespaceDeclaration { prefix: None, uri: value });
            } else if let Some(declared) = key.strip_prefix("xmlns:") {
                declarations.push(NamespaceDeclaration {
                    prefix: Some(declared.to_string()),
                    uri: value,
                });
            } else {
                raw_attributes.push((key, value));
            }
        }
        self.scopes.push(declarations.clone());

        let namespace = self.resolve(prefix.as_deref())?;
        let mut attributes = Vec::with_capacity(raw_attributes.len());
        for (key, value) in raw_attributes {
            let (attr_prefix, attr_name) = split_qname(&key);
            let attr_namespace = match attr_prefix.as_deref() {
                Some(p) => self.resolve(Some(p))?,
                None => None,
            };
            attributes.push(Attribute {
                prefix: attr_prefix,
                name: attr_name,
                namespace: attr_namespace,
                value,
            });
        }

        self.open.push(Element {
            prefix,
            name,
            namespace,
            namespace_declarations: declarations,
            attributes,
            children: Vec::new(),
        });
        Ok(())
    }

    fn close(&mut self, end_name: Option<String>) -> Result<()> {
        let mut element = match self.open.pop() {
            Some(element) => element,
            None => return Err(Error::UnexpectedEnd(end_name.unwrap_or_default())),
        };
        self.scopes.pop();

        if let Some(end_name) = end_name {
            if end_name != element.qualified_name() {
                return Err(Error::UnexpectedEnd(end_name));
            }
        }

        drop_formatting_whitespace(&mut element);

        match self.open.last_mut() {
            Some(parent) => parent.push_child(element),
            None if self.root.is_some() => return Err(Error::MultipleRoots),
            None => self.root = Some(element),
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        // Text outside the root element (whitespace between prolog items) is
        // not part of the tree.
        if let Some(current) = self.open.last_mut() {
            current.push_text(text);
        }
    }

    fn finish(mut self) -> Result<Element> {
        if let Some(unclosed) = self.open.pop() {
            return Err(Error::Unclosed(unclosed.qualified_name()));
        }
        self.root.ok_or(Error::MissingRoot)
    }

    /// Resolves a prefix (or the default namespace for `None`) against the
    /// declarations currently in scope.
    fn resolve(&self, prefix: Option<&str>) -> Result<Option<String>> {
        if prefix == Some("xml") {
            return Ok(Some(XML_NS.to_string()));
        }
        let found = self
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|decl| decl.prefix.as_deref() == prefix);

        match (found, prefix) {
            (Some(decl), _) if decl.uri.is_empty() => Ok(None),
            (Some(decl), _) => Ok(Some(decl.uri.clone())),
            (None, None) => Ok(None),
            (None, Some(p)) => Err(Error::UnboundPrefix(p.to_string())),
        }
    }
}

fn drop_formatting_whitespace(element: &mut Element) {
    let has_elements = element
        .children
        .iter()
        .any(|n| matches!(n, Node::Element(_)));
    if has_elements {
        element
            .children
            .retain(|n| !matches!(n, Node::Text(t) if t.trim().is_empty()));
    }
}
