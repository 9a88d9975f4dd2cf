//! Event-stream parsing: turns the parser's line-oriented ESIS output into records.
//!
//! Only two line shapes matter for the identifier index:
//!
//! ```text
//! Aid ID box1        attribute `id`, declared value ID, value `box1`
//! Alang IMPLIED      attribute `lang`, no value
//! (para              start of element `para`
//! ```
//!
//! Every other line (data, end tags, entity and location lines) is skipped.
//! Attributes of any declared value are reported; the index keeps the `ID` ones.

use std::str::Lines;

use crate::types::{AttributeKind, EventRecord};

/// Declared-value keyword the parser prints for ID attributes.
const ID_KEYWORD: &str = "ID";

/// Lazy sequence of records over captured parser output.
/// Finite and single-pass: iterate again by calling [`events`] again.
pub struct EventStream<'a> {
    /// Remaining unparsed lines.
    lines: Lines<'a>,
}

impl Iterator for EventStream<'_> {
    type Item = EventRecord;

    fn next(&mut self) -> Option<EventRecord> {
        for line in self.lines.by_ref() {
            if let Some(record) = parse_line(line) {
                return Some(record);
            }
        }
        return None;
    }
}

/// Stream the records contained in `output`.
pub fn events(output: &str) -> EventStream<'_> {
    return EventStream { lines: output.lines() };
}

/// Parse a single output line. Returns `None` unless it is an attribute or element start.
pub fn parse_line(line: &str) -> Option<EventRecord> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if let Some(rest) = line.strip_prefix('A') {
        return parse_attribute_line(rest);
    }
    if let Some(rest) = line.strip_prefix('(') {
        return parse_element_start_line(rest);
    }
    return None;
}

/// Parse the part of an attribute line after the leading `A`.
/// An `ID` attribute without a value carries no identifier and is skipped.
fn parse_attribute_line(rest: &str) -> Option<EventRecord> {
    let (name, rest) = rest.split_once(' ')?;
    let (keyword, value) = rest.split_once(' ').unwrap_or((rest, ""));
    if name.is_empty() || keyword.is_empty() {
        return None;
    }
    let kind = if keyword == ID_KEYWORD {
        if value.is_empty() {
            return None;
        }
        AttributeKind::Id
    } else {
        AttributeKind::Other(keyword.to_string())
    };
    return Some(EventRecord::Attribute {
        kind,
        name: name.to_string(),
        value: unescape_value(value),
    });
}

/// Parse the part of an element start line after the leading `(`.
fn parse_element_start_line(rest: &str) -> Option<EventRecord> {
    let name = rest.split_whitespace().next()?;
    return Some(EventRecord::ElementStart { name: name.to_string() });
}

/// Decode ESIS escapes in an attribute value.
///
/// `\\` is a backslash, `\n` a record end, `\|` brackets system data and is
/// dropped, `\nnn` is an octal character and `\#n;` a decimal one.
/// Unknown or undecodable escapes are kept verbatim.
fn unescape_value(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('\\') => {
                chars.next();
                out.push('\\');
            },
            Some('n') => {
                chars.next();
                out.push('\n');
            },
            Some('|') => {
                chars.next();
            },
            Some('#') => {
                chars.next();
                let mut digits = String::new();
                while let Some(d) = chars.next_if(|d| return *d != ';') {
                    digits.push(d);
                }
                let terminated = chars.next_if_eq(&';').is_some();
                let decoded = digits.parse::<u32>().ok().and_then(char::from_u32);
                match decoded.filter(|_| return terminated) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\#");
                        out.push_str(&digits);
                        if terminated {
                            out.push(';');
                        }
                    },
                }
            },
            Some(d) if d.is_digit(8) => {
                let mut digits = String::with_capacity(3);
                while digits.len() < 3 {
                    match chars.next_if(|o| return o.is_digit(8)) {
                        Some(o) => digits.push(o),
                        None => break,
                    }
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push_str(&digits);
                    },
                }
            },
            _ => out.push('\\'),
        }
    }
    return out;
}
