/// Core domain types for idref events, identifiers, and spans.
use std::fmt;
use std::ops::Range;

use serde::Serialize;

/// Declared-value keyword of an attribute as reported by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AttributeKind {
    /// The attribute is declared with value `ID`.
    Id,
    /// Any other declared value (`CDATA`, `TOKEN`, `IMPLIED`, ...).
    Other(String),
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            AttributeKind::Id => f.write_str("ID"),
            AttributeKind::Other(keyword) => f.write_str(keyword),
        };
    }
}

/// Parsed from one line of the parser's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventRecord {
    /// An attribute of the element whose start line follows.
    Attribute {
        /// Declared-value keyword.
        kind: AttributeKind,
        /// Attribute name as written by the parser.
        name: String,
        /// Attribute value, escapes decoded.
        value: String,
    },
    /// Start of an element.
    ElementStart {
        /// Generic identifier of the element.
        name: String,
    },
}

impl EventRecord {
    /// Shorthand for an `ID` attribute record.
    pub fn id_attribute(name: &str, value: &str) -> Self {
        return EventRecord::Attribute {
            kind: AttributeKind::Id,
            name: name.to_string(),
            value: value.to_string(),
        };
    }

    /// Shorthand for an element start record.
    pub fn element_start(name: &str) -> Self {
        return EventRecord::ElementStart { name: name.to_string() };
    }
}

/// One declaration in the index listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierEntry {
    /// Name of the attribute carrying the identifier.
    pub attribute_name: String,
    /// Name of the element that owns the attribute.
    pub element_name: String,
    /// The declared identifier.
    pub identifier: String,
}

/// What the index maps an identifier to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    /// Name of the attribute carrying the identifier.
    pub attribute_name: String,
    /// Name of the element that owns the attribute.
    pub element_name: String,
}

/// Non-fatal problem found while building an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Anomaly {
    /// An `ID` attribute with no element start after it.
    UnownedIdentifier {
        /// Attribute name, folded like the index.
        attribute_name: String,
        /// Identifier value, folded like the index.
        identifier: String,
        /// Zero-based position of the attribute in the record sequence.
        record: usize,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Anomaly::UnownedIdentifier { attribute_name, identifier, record } => write!(
                f,
                "record {record}: {attribute_name}={identifier} has no owning element"
            ),
        };
    }
}

/// Attribute assignment to search for in the document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionTarget {
    /// Attribute name the identifier was declared with.
    pub attribute_name: String,
    /// The identifier value.
    pub identifier: String,
}

impl ResolutionTarget {
    /// Regex source matching `attribute="identifier"` with optional quotes.
    pub fn pattern(&self) -> String {
        return format!(
            "{}=\"?{}\"?",
            regex::escape(&self.attribute_name),
            regex::escape(&self.identifier)
        );
    }
}

/// Location of a declaration in the document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSpan {
    /// Byte offset range of the match in the document text.
    pub byte_range: Range<usize>,
    /// One-based column (in characters) of the match start.
    pub column: usize,
    /// One-based line of the match start.
    pub line: usize,
    /// The matched text.
    pub text: String,
}
