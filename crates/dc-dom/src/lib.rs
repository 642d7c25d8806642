//! Mutable document tree for dom-cache.
//!
//! This crate provides the in-memory representation that the cache stores and
//! hands out to callers:
//!
//! - [`Document`]: a parsed page, always normalized to `html > head, body`
//! - [`Element`] / [`Node`]: owned, mutable tree nodes
//! - [`parse_document`]: lenient HTML parser built on `quick-xml`
//!
//! Trees own all of their data. Cloning a [`Document`] produces a deep copy
//! that shares nothing with the original, which is what lets the cache hand
//! out independently mutable copies of a cached page.
//!
//! # Example
//!
//! ```
//! use dc_dom::{Document, Element};
//!
//! let mut doc = Document::parse("<title>Hi</title><h1>Hello</h1>").unwrap();
//! assert_eq!(doc.title().as_deref(), Some("Hi"));
//!
//! doc.body_mut().append_child(Element::new("p").with_text("more"));
//! assert!(doc.to_html().contains("<p>more</p>"));
//! ```

mod entities;
mod error;
mod node;
mod parser;
mod serializer;

pub use error::ParseError;
pub use node::{Document, Element, Node};
pub use parser::parse_document;
