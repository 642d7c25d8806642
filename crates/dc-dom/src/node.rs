//! Tree node types.

use std::collections::BTreeMap;

use crate::error::ParseError;
use crate::parser::parse_document;

/// Elements that never have children or an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// A node in a document tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Element with attributes and children.
    Element(Element),
    /// Character data.
    Text(String),
    /// `<!-- comment -->` content.
    Comment(String),
}

impl Node {
    /// Create a text node.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Borrow the element, if this node is one.
    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Mutably borrow the element, if this node is one.
    #[must_use]
    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    /// True for an element with the given (lower-case) name.
    #[must_use]
    pub fn is_element_named(&self, name: &str) -> bool {
        self.as_element().is_some_and(|e| e.name == name)
    }

    /// True for a text node holding only whitespace.
    #[must_use]
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Element(element) => {
                for child in &element.children {
                    child.collect_text(out);
                }
            }
            Self::Text(text) => out.push_str(text),
            Self::Comment(_) => {}
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

/// An element: tag name, attributes and ordered children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    /// Lower-case tag name.
    pub name: String,
    /// Attribute name to value.
    pub attrs: BTreeMap<String, String>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element. The name is lower-cased.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Set an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Append a child.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append a text child.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// True if the element is a void element (`meta`, `br`, ...).
    #[must_use]
    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }

    /// Attribute value by name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Set an attribute, replacing any previous value.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attrs.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Remove an attribute, returning its value.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attrs.remove(name)
    }

    /// Child elements, skipping text and comments.
    pub fn element_children(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Child elements, mutably.
    pub fn element_children_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(Node::as_element_mut)
    }

    /// First child element.
    #[must_use]
    pub fn first_element_child(&self) -> Option<&Element> {
        self.element_children().next()
    }

    /// Last child element.
    #[must_use]
    pub fn last_element_child(&self) -> Option<&Element> {
        self.element_children().last()
    }

    /// Index into `children` of the first child element.
    #[must_use]
    pub fn first_element_index(&self) -> Option<usize> {
        self.children
            .iter()
            .position(|node| matches!(node, Node::Element(_)))
    }

    /// Append a child at the end.
    pub fn append_child(&mut self, child: impl Into<Node>) {
        self.children.push(child.into());
    }

    /// Insert a child before the first child element.
    ///
    /// Leading text (usually indentation) stays in front, the same way
    /// `insertBefore(node, firstElementChild)` behaves in a DOM. Appends when
    /// there is no child element.
    pub fn prepend_child(&mut self, child: impl Into<Node>) {
        match self.first_element_index() {
            Some(index) => self.children.insert(index, child.into()),
            None => self.children.push(child.into()),
        }
    }

    /// Insert a child at `index` in `children`, clamped to the end.
    pub fn insert_child(&mut self, index: usize, child: impl Into<Node>) {
        let index = index.min(self.children.len());
        self.children.insert(index, child.into());
    }

    /// Remove the child at `index` in `children`.
    pub fn remove_child(&mut self, index: usize) -> Option<Node> {
        (index < self.children.len()).then(|| self.children.remove(index))
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.collect_text(&mut out);
        }
        out
    }

    /// First descendant element with the given name, in document order.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.element_children()
            .find_map(|child| (child.name == name).then_some(child).or_else(|| child.find(name)))
    }

    /// First descendant element with the given name, mutably.
    #[must_use]
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        for child in self.element_children_mut() {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find_mut(name) {
                return Some(found);
            }
        }
        None
    }

    /// All descendant elements with the given name, in document order.
    #[must_use]
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in self.element_children() {
            if child.name == name {
                found.push(child);
            }
            child.collect_named(name, found);
        }
    }
}

/// A parsed page.
///
/// The root is always an `html` element holding a `head` and a `body`;
/// [`parse_document`] synthesizes whichever wrappers the markup omits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// Doctype declaration content (e.g. `html`), if present.
    pub doctype: Option<String>,
    /// The `html` element.
    pub root: Element,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty `<!DOCTYPE html>` document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            doctype: Some("html".to_owned()),
            root: Element::new("html")
                .with_child(Element::new("head"))
                .with_child(Element::new("body")),
        }
    }

    /// Parse markup into a document.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the markup cannot be tokenized.
    pub fn parse(html: &str) -> Result<Self, ParseError> {
        parse_document(html)
    }

    /// Parse UTF-8 encoded markup into a document.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Utf8`] for invalid UTF-8, otherwise as [`Document::parse`].
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        parse_document(std::str::from_utf8(bytes)?)
    }

    /// The `head` element.
    #[must_use]
    pub fn head(&self) -> Option<&Element> {
        self.root.element_children().find(|e| e.name == "head")
    }

    /// The `body` element.
    #[must_use]
    pub fn body(&self) -> Option<&Element> {
        self.root.element_children().find(|e| e.name == "body")
    }

    /// The `head` element, created as the first child of `html` if missing.
    pub fn head_mut(&mut self) -> &mut Element {
        self.section_mut("head", 0)
    }

    /// The `body` element, appended to `html` if missing.
    pub fn body_mut(&mut self) -> &mut Element {
        let end = self.root.children.len();
        self.section_mut("body", end)
    }

    fn section_mut(&mut self, name: &str, insert_at: usize) -> &mut Element {
        let index = if let Some(index) = self
            .root
            .children
            .iter()
            .position(|node| node.is_element_named(name))
        {
            index
        } else {
            self.root.insert_child(insert_at, Element::new(name));
            insert_at.min(self.root.children.len() - 1)
        };
        match &mut self.root.children[index] {
            Node::Element(element) => element,
            _ => unreachable!("position matched an element"),
        }
    }

    /// Text of the first `title` element.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.root.find("title").map(Element::text_content)
    }

    /// First element with the given name anywhere in the document.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.root.name == name {
            return Some(&self.root);
        }
        self.root.find(name)
    }

    /// First element with the given name anywhere in the document, mutably.
    #[must_use]
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        if self.root.name == name {
            return Some(&mut self.root);
        }
        self.root.find_mut(name)
    }

    /// All elements with the given name, in document order.
    #[must_use]
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut found = self.root.find_all(name);
        if self.root.name == name {
            found.insert(0, &self.root);
        }
        found
    }

    /// Serialize to HTML.
    #[must_use]
    pub fn to_html(&self) -> String {
        self.to_string()
    }
}
