//! HTML serialization.

use std::fmt::{self, Display, Formatter, Write};

use crate::node::{Document, Element, Node};

/// Elements whose text children are written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(doctype) = &self.doctype {
            writeln!(f, "<!DOCTYPE {doctype}>")?;
        }
        self.root.fmt(f)
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (key, value) in &self.attrs {
            if value.is_empty() {
                write!(f, " {key}")?;
            } else {
                write!(f, " {key}=\"")?;
                write_escaped(f, value, true)?;
                f.write_char('"')?;
            }
        }
        f.write_char('>')?;

        if self.is_void() {
            return Ok(());
        }

        let raw = RAW_TEXT_ELEMENTS.contains(&self.name.as_str());
        for child in &self.children {
            match child {
                Node::Text(text) if raw => f.write_str(text)?,
                other => other.fmt(f)?,
            }
        }
        write!(f, "</{}>", self.name)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(element) => element.fmt(f),
            Self::Text(text) => write_escaped(f, text, false),
            Self::Comment(comment) => write!(f, "<!--{comment}-->"),
        }
    }
}

/// Write text with HTML special characters escaped.
fn write_escaped(f: &mut Formatter<'_>, text: &str, escape_quotes: bool) -> fmt::Result {
    for ch in text.chars() {
        match ch {
            '&' => f.write_str("&amp;")?,
            '<' => f.write_str("&lt;")?,
            '>' => f.write_str("&gt;")?,
            '"' if escape_quotes => f.write_str("&quot;")?,
            '\u{00a0}' => f.write_str("&nbsp;")?,
            _ => f.write_char(ch)?,
        }
    }
    Ok(())
}
