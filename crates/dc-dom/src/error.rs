//! Error types for document parsing.

/// Error raised when markup cannot be turned into a [`Document`](crate::Document).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The tokenizer rejected the markup (unterminated tag, comment, ...).
    ///
    /// `position` is the byte offset where the offending markup starts, counted
    /// in the input after named entities are decoded.
    #[error("malformed markup at byte {position}: {source}")]
    Markup {
        /// Byte offset of the offending markup.
        position: u64,
        /// Tokenizer error.
        #[source]
        source: quick_xml::Error,
    },

    /// An attribute list could not be read.
    #[error("malformed attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    /// The input is not UTF-8.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Text could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] quick_xml::encoding::EncodingError),
}
