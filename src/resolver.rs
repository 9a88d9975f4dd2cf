use regex::RegexBuilder;
use tracing::debug;

use crate::diagnostics;
use crate::error::Error;
use crate::index::Index;
use crate::types::TextSpan;

/// Maximum number of suggestions attached to an unknown-identifier error.
const MAX_SUGGESTIONS: usize = 5;

/// Find where `identifier` is declared in `document_text`.
///
/// The search is textual: it looks for the attribute assignment
/// `attribute="identifier"` (quotes optional) from the start of the text and
/// returns the first match. Case is ignored when the index folds case.
///
/// # Errors
///
/// Returns `Error::UnknownIdentifier` if the index has no such identifier,
/// or `Error::StaleIndex` if it does but the assignment is not in the text.
pub fn resolve(index: &Index, identifier: &str, document_text: &str) -> Result<TextSpan, Error> {
    let Some(target) = index.target(identifier) else {
        return Err(Error::UnknownIdentifier {
            identifier: identifier.to_string(),
            suggestions: suggest_identifiers(index, identifier),
        });
    };

    let pattern = target.pattern();
    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(!index.is_case_sensitive())
        .build()
        .map_err(|_err| {
            return Error::StaleIndex {
                identifier: target.identifier.clone(),
                pattern: pattern.clone(),
            };
        })?;

    let Some(found) = regex.find(document_text) else {
        return Err(Error::StaleIndex { identifier: target.identifier, pattern });
    };

    let (line, column) = line_and_column(document_text, found.start());
    debug!(identifier = %target.identifier, line, column, "resolved declaration");

    return Ok(TextSpan {
        byte_range: found.range(),
        column,
        line,
        text: found.as_str().to_string(),
    });
}

/// One-based line and character column of a byte offset.
fn line_and_column(text: &str, offset: usize) -> (usize, usize) {
    let before = text.get(..offset).unwrap_or(text);
    let line = before.matches('\n').count().saturating_add(1);
    let line_start = before.rfind('\n').map_or(0, |nl| return nl.saturating_add(1));
    let column = before.get(line_start..).map_or(0, |s| return s.chars().count()).saturating_add(1);
    return (line, column);
}

/// Indexed identifiers that look like a misspelling of `identifier`.
fn suggest_identifiers(index: &Index, identifier: &str) -> Vec<String> {
    let wanted = index.fold(identifier);
    let mut ranked: Vec<(usize, &str)> = index
        .identifiers()
        .into_iter()
        .filter_map(|candidate| {
            let distance = diagnostics::edit_distance(&wanted, candidate);
            let close = distance <= wanted.chars().count().div_ceil(3).max(1)
                || candidate.contains(wanted.as_str())
                || (!candidate.is_empty() && wanted.contains(candidate));
            return close.then_some((distance, candidate));
        })
        .collect();
    ranked.sort_unstable();
    return ranked
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| return candidate.to_string())
        .collect();
}
