//! Order-preserving element tree.
//!
//! Attributes and children keep the order they were parsed or built in.
//! Nothing is sorted or deduplicated here; canonical ordering decisions are
//! made only when serializing (see [`crate::canonical`]).

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// `xmlns` / `xmlns:prefix` declaration exactly as it appeared in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDeclaration {
    pub prefix: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub name: String,
    /// Resolved namespace URI. Unprefixed attributes never carry one.
    pub namespace: Option<String>,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            prefix: None,
            name: name.into(),
            namespace: None,
            value: value.into(),
        }
    }

    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub prefix: Option<String>,
    pub name: String,
    /// Resolved namespace URI of the element (`None` when in no namespace).
    pub namespace: Option<String>,
    pub namespace_declarations: Vec<NamespaceDeclaration>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    /// Element in no namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            prefix: None,
            name: name.into(),
            namespace: None,
            namespace_declarations: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element bound to `uri`, written with `prefix` (or as the default
    /// namespace when `prefix` is `None`).
    pub fn namespaced(prefix: Option<&str>, name: impl Into<String>, uri: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            namespace: Some(uri.to_string()),
            ..Self::new(name)
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    /// Adds a prefixed attribute, e.g. `eb:version`.
    pub fn with_namespaced_attribute(
        mut self,
        prefix: &str,
        name: impl Into<String>,
        uri: &str,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.push(Attribute {
            prefix: Some(prefix.to_string()),
            name: name.into(),
            namespace: Some(uri.to_string()),
            value: value.into(),
        });
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children
            .extend(children.into_iter().map(Node::Element));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Appends text, merging with a trailing text node so that adjacent text
    /// is always held as a single node.
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(Node::Text(existing)) => existing.push_str(&text),
            _ => self.children.push(Node::Text(text)),
        }
    }

    pub fn local_name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.name)
    }

    /// Value of an unprefixed attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.prefix.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    /// Follows a `/`-separated path of local names, taking the first match at
    /// each step.
    pub fn find(&self, path: &str) -> Option<&Element> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |current, step| current.child(step))
    }

    /// All elements reachable through `path`, fanning out over repeated
    /// elements at every step.
    pub fn find_all(&self, path: &str) -> Vec<&Element> {
        let mut current = vec![self];
        for step in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|e| e.elements().filter(move |c| c.name == step))
                .collect();
        }
        current
    }

    /// Depth-first search for the first descendant (or self) with this local
    /// name.
    pub fn descendant(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.elements().find_map(|e| e.descendant(name))
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Rewrites every element in `uri` to use the default namespace, so the
    /// canonical form no longer depends on which prefix the sender chose.
    pub fn rehome_default_namespace(&mut self, uri: &str) {
        if self.namespace.as_deref() == Some(uri) {
            self.prefix = None;
        }
        self.namespace_declarations.clear();
        for child in &mut self.children {
            if let Node::Element(e) = child {
                e.rehome_default_namespace(uri);
            }
        }
    }

    /// Owned copy of this subtree re-homed into `uri` as default namespace.
    pub fn rehomed(&self, uri: &str) -> Element {
        let mut copy = self.clone();
        copy.rehome_default_namespace(uri);
        copy
    }
}

fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{name}"),
        None => name.to_string(),
    }
}
