//! Lenient HTML parser.
//!
//! Builds a [`Document`] from markup using `quick-xml` as the tokenizer, with
//! the relaxations real pages need: void elements without end tags, ignored
//! stray end tags, raw-text `script`/`style` bodies and HTML named entities.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::entities::{decode_entity, prepare};
use crate::error::ParseError;
use crate::node::{Document, Element, Node};

/// Elements whose content is not markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Start tags that close an open `p`.
const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "main", "menu", "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// Open elements an implied end tag never reaches past.
const SCOPE_BOUNDARIES: &[&str] = &[
    "applet", "button", "caption", "html", "marquee", "object", "table", "td", "template", "th",
];

/// Elements that belong in `head` when they appear before body content.
const HEAD_ELEMENTS: &[&str] = &["title", "meta", "link", "base", "style", "script"];

/// Parse markup into a normalized [`Document`].
///
/// # Errors
///
/// Returns [`ParseError`] if the tokenizer rejects the markup, for example an
/// unterminated tag or comment at end of input.
pub fn parse_document(html: &str) -> Result<Document, ParseError> {
    let source = prepare(html);
    let mut reader = Reader::from_str(&source);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.check_comments = false;

    let mut builder = TreeBuilder::default();

    loop {
        let event = reader
            .read_event()
            .map_err(|source| markup_error(&reader, source))?;
        match event {
            Event::Start(e) => {
                let mut element = decode_element(&reader, &e)?;
                builder.close_implied(&element.name);
                if element.is_void() {
                    builder.append(element.into());
                } else if RAW_TEXT_ELEMENTS.contains(&element.name.as_str()) {
                    let text = reader
                        .read_text(e.name())
                        .map_err(|source| markup_error(&reader, source))?;
                    if !text.is_empty() {
                        element.children.push(Node::Text(text.into_owned()));
                    }
                    builder.append(element.into());
                } else {
                    builder.open(element);
                }
            }
            Event::Empty(e) => {
                let element = decode_element(&reader, &e)?;
                builder.append(element.into());
            }
            Event::End(e) => {
                let name = decode_name(&reader, e.name().as_ref());
                builder.close(&name);
            }
            Event::Text(e) => {
                let text = reader.decoder().decode(&e)?;
                builder.text(&text);
            }
            Event::GeneralRef(e) => {
                let entity = reader.decoder().decode(&e)?;
                builder.text(&decode_entity(&entity));
            }
            Event::CData(e) => {
                builder.text(&String::from_utf8_lossy(&e));
            }
            Event::Comment(e) => {
                let comment = reader.decoder().decode(&e)?.into_owned();
                builder.append(Node::Comment(comment));
            }
            Event::DocType(e) => {
                let doctype = reader.decoder().decode(&e)?;
                builder.doctype = Some(doctype.trim().to_owned());
            }
            Event::Decl(_) | Event::PI(_) => {}
            Event::Eof => break,
        }
    }

    Ok(builder.finish())
}

fn markup_error<R>(reader: &Reader<R>, source: quick_xml::Error) -> ParseError {
    ParseError::Markup {
        position: reader.error_position(),
        source,
    }
}

fn decode_name<R>(reader: &Reader<R>, name: &[u8]) -> String {
    reader
        .decoder()
        .decode(name)
        .map_or_else(|_| String::from_utf8_lossy(name).into_owned(), Cow::into_owned)
        .to_ascii_lowercase()
}

fn decode_element<R>(reader: &Reader<R>, e: &BytesStart) -> Result<Element, ParseError> {
    let mut element = Element::new(&decode_name(reader, e.name().as_ref()));
    for attr in e.html_attributes().with_checks(false) {
        let attr = attr?;
        let key = decode_name(reader, attr.key.as_ref());
        let value = attr.unescape_value().map_or_else(
            |_| String::from_utf8_lossy(&attr.value).into_owned(),
            Cow::into_owned,
        );
        element.attrs.insert(key, value);
    }
    Ok(element)
}

/// Stack of open elements plus the nodes already closed at top level.
#[derive(Default)]
struct TreeBuilder {
    doctype: Option<String>,
    open: Vec<Element>,
    top: Vec<Node>,
}

impl TreeBuilder {
    fn target(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.top,
        }
    }

    fn append(&mut self, node: Node) {
        self.target().push(node);
    }

    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let target = self.target();
        if let Some(Node::Text(previous)) = target.last_mut() {
            previous.push_str(text);
        } else {
            target.push(Node::Text(text.to_owned()));
        }
    }

    fn open(&mut self, element: Element) {
        self.open.push(element);
    }

    /// Close what a start tag ends implicitly: an open `p` before a block,
    /// the previous `li` before a new one.
    fn close_implied(&mut self, name: &str) {
        if CLOSES_P.contains(&name) {
            self.close_in_scope("p", &[]);
        }
        if name == "li" {
            self.close_in_scope("li", &["ol", "ul"]);
        }
    }

    /// Close `name` if it is open and no boundary element sits above it.
    fn close_in_scope(&mut self, name: &str, boundaries: &[&str]) {
        let in_scope = self
            .open
            .iter()
            .rev()
            .find(|e| {
                let tag = e.name.as_str();
                tag == name || SCOPE_BOUNDARIES.contains(&tag) || boundaries.contains(&tag)
            })
            .is_some_and(|e| e.name == name);
        if in_scope {
            self.close(name);
        }
    }

    /// Close the innermost open element with this name and everything opened
    /// after it. End tags with no matching open element are dropped.
    fn close(&mut self, name: &str) {
        let Some(position) = self.open.iter().rposition(|e| e.name == name) else {
            return;
        };
        while self.open.len() > position {
            if let Some(element) = self.open.pop() {
                self.append(element.into());
            }
        }
    }

    fn finish(mut self) -> Document {
        while let Some(element) = self.open.pop() {
            self.append(element.into());
        }
        normalize(self.doctype, self.top)
    }
}

/// Arrange top-level nodes into `html > head, body`.
fn normalize(doctype: Option<String>, top: Vec<Node>) -> Document {
    let mut root = None;
    let mut strays = Vec::new();
    for node in top {
        match node {
            Node::Element(element) if element.name == "html" && root.is_none() => {
                root = Some(element);
            }
            other => strays.push(other),
        }
    }

    let mut root = root.unwrap_or_else(|| Element::new("html"));
    let children = std::mem::take(&mut root.children);

    let mut head: Option<Element> = None;
    let mut body: Option<Element> = None;
    let mut head_extra = Vec::new();
    let mut before_body = Vec::new();
    let mut after_body = Vec::new();
    let mut in_body = false;

    for node in children.into_iter().chain(strays) {
        match node {
            Node::Element(element) if element.name == "head" && head.is_none() && !in_body => {
                head = Some(element);
            }
            Node::Element(element) if element.name == "body" && body.is_none() => {
                in_body = true;
                body = Some(element);
            }
            Node::Element(element)
                if !in_body && HEAD_ELEMENTS.contains(&element.name.as_str()) =>
            {
                head_extra.push(Node::Element(element));
            }
            node if node.is_whitespace() => {}
            other => {
                in_body = true;
                if body.is_some() {
                    after_body.push(other);
                } else {
                    before_body.push(other);
                }
            }
        }
    }

    let mut head = head.unwrap_or_else(|| Element::new("head"));
    head.children.extend(head_extra);

    let mut body = body.unwrap_or_else(|| Element::new("body"));
    if !before_body.is_empty() {
        before_body.append(&mut body.children);
        body.children = before_body;
    }
    body.children.extend(after_body);

    root.children = vec![head.into(), body.into()];
    Document { doctype, root }
}
