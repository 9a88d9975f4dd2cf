//! Identifier index: one pass over the event records builds both the lookup
//! map and the ordered listing shown to the user.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::types::{
    Anomaly, AttributeKind, Binding, EventRecord, IdentifierEntry, ResolutionTarget,
};

/// First caption line of a rendered listing.
pub const LISTING_CAPTION: &str = "Identifier (element)";

/// Second caption line of a rendered listing.
pub const LISTING_RULE: &str = "--------------------";

/// Byte-order mark some editors put before an XML declaration.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Options controlling how identifiers are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Keep names and values as written instead of folding them to lowercase.
    pub case_sensitive: bool,
}

impl BuildOptions {
    /// Pick the case policy from the document's dialect.
    ///
    /// XML names are case-sensitive; SGML with the reference concrete syntax
    /// folds general names, so anything not recognisably XML folds. `head` is
    /// the start of the document in whatever encoding it is stored.
    pub fn for_document(path: &Path, head: &[u8]) -> Self {
        let xml_extension = path
            .extension()
            .and_then(|e| return e.to_str())
            .is_some_and(|ext| return ext.eq_ignore_ascii_case("xml") || ext.eq_ignore_ascii_case("xhtml"));
        let xml_declaration = head.strip_prefix(UTF8_BOM).unwrap_or(head).starts_with(b"<?xml");
        return Self { case_sensitive: xml_extension || xml_declaration };
    }
}

/// Lookup map plus declaration-ordered listing for one document.
#[derive(Debug, Clone, Default)]
pub struct Index {
    /// Identifier to owning attribute and element. Last declaration wins.
    bindings: HashMap<String, Binding>,
    /// Whether keys were stored without folding.
    case_sensitive: bool,
    /// Every declaration in the order it was seen, duplicates included.
    entries: Vec<IdentifierEntry>,
}

impl Index {
    /// Look up the binding of an identifier, folding it like the index was built.
    pub fn binding(&self, identifier: &str) -> Option<&Binding> {
        return self.bindings.get(&self.fold(identifier));
    }

    /// Number of distinct identifiers in the lookup map.
    pub fn distinct_len(&self) -> usize {
        return self.bindings.len();
    }

    /// Every declaration in first-seen order.
    pub fn entries(&self) -> &[IdentifierEntry] {
        return &self.entries;
    }

    /// Apply the index's case policy to a name or value.
    pub fn fold(&self, text: &str) -> String {
        if self.case_sensitive {
            return text.to_string();
        }
        return text.to_lowercase();
    }

    /// Distinct identifiers in the lookup map, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        ids.sort_unstable();
        return ids;
    }

    /// Record one declaration in both the map and the listing.
    fn insert(&mut self, entry: IdentifierEntry) {
        let binding = Binding {
            attribute_name: entry.attribute_name.clone(),
            element_name: entry.element_name.clone(),
        };
        if let Some(previous) = self.bindings.insert(entry.identifier.clone(), binding) {
            debug!(
                identifier = %entry.identifier,
                previous_attribute = %previous.attribute_name,
                attribute = %entry.attribute_name,
                "identifier declared again, later declaration wins"
            );
        }
        self.entries.push(entry);
    }

    /// Whether the index compares identifiers case-sensitively.
    pub const fn is_case_sensitive(&self) -> bool {
        return self.case_sensitive;
    }

    /// Whether no declarations were found.
    pub fn is_empty(&self) -> bool {
        return self.entries.is_empty();
    }

    /// Number of declarations in the listing, duplicates included.
    pub fn len(&self) -> usize {
        return self.entries.len();
    }

    /// The attribute assignment to search for when resolving `identifier`.
    pub fn target(&self, identifier: &str) -> Option<ResolutionTarget> {
        let folded = self.fold(identifier);
        let binding = self.bindings.get(&folded)?;
        return Some(ResolutionTarget {
            attribute_name: binding.attribute_name.clone(),
            identifier: folded,
        });
    }
}

/// Partial-success result of a build: a usable index plus anything odd seen on the way.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Problems that did not stop the build.
    pub anomalies: Vec<Anomaly>,
    /// The freshly built index.
    pub index: Index,
}

/// An `ID` attribute waiting for the element start that owns it.
struct PendingIdentifier {
    /// Folded attribute name.
    attribute_name: String,
    /// Folded identifier value.
    identifier: String,
    /// Position of the attribute record in the input.
    record: usize,
}

/// Build an index from a complete record sequence in a single forward pass.
///
/// The parser lists an element's attributes before its start line, so each
/// `ID` attribute is owned by the next element start. Attributes still
/// waiting when the records run out become anomalies, not entries.
pub fn build<I>(records: I, options: BuildOptions) -> BuildReport
where
    I: IntoIterator<Item = EventRecord>,
{
    let mut index = Index {
        case_sensitive: options.case_sensitive,
        ..Index::default()
    };
    let mut pending: Vec<PendingIdentifier> = Vec::new();

    for (record, event) in records.into_iter().enumerate() {
        match event {
            EventRecord::Attribute { kind: AttributeKind::Id, name, value } => {
                pending.push(PendingIdentifier {
                    attribute_name: index.fold(&name),
                    identifier: index.fold(&value),
                    record,
                });
            },
            EventRecord::Attribute { kind: AttributeKind::Other(_), .. } => {},
            EventRecord::ElementStart { name } => {
                if pending.is_empty() {
                    continue;
                }
                let element_name = index.fold(&name);
                for waiting in pending.drain(..) {
                    index.insert(IdentifierEntry {
                        attribute_name: waiting.attribute_name,
                        element_name: element_name.clone(),
                        identifier: waiting.identifier,
                    });
                }
            },
        }
    }

    let anomalies: Vec<Anomaly> = pending
        .into_iter()
        .map(|waiting| {
            return Anomaly::UnownedIdentifier {
                attribute_name: waiting.attribute_name,
                identifier: waiting.identifier,
                record: waiting.record,
            };
        })
        .collect();

    for anomaly in &anomalies {
        debug!(%anomaly, "dropping identifier without owning element");
    }
    debug!(
        entries = index.len(),
        distinct = index.distinct_len(),
        anomalies = anomalies.len(),
        "index built"
    );

    return BuildReport { anomalies, index };
}

/// Render the listing: two caption lines, then `identifier (element)` per declaration.
pub fn render(index: &Index) -> Vec<String> {
    let mut lines = Vec::with_capacity(index.len().saturating_add(2));
    lines.push(LISTING_CAPTION.to_string());
    lines.push(LISTING_RULE.to_string());
    lines.extend(
        index
            .entries()
            .iter()
            .map(|entry| return format!("{} ({})", entry.identifier, entry.element_name)),
    );
    return lines;
}

/// Recover the identifier from one rendered listing line.
/// Caption, rule and blank lines have no identifier.
pub fn identifier_on_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line == LISTING_CAPTION || line == LISTING_RULE {
        return None;
    }
    let (identifier, element) = line.strip_suffix(')')?.rsplit_once(" (")?;
    if identifier.is_empty() || element.is_empty() {
        return None;
    }
    return Some(identifier);
}
