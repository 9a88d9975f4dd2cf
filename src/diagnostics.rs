use std::fmt::Write as _;
use std::time::Duration;

use crate::error::Error;
use crate::session::SessionState;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic: what happened, then how to fix it.
pub fn render_error(e: &Error) -> String {
    match e {
        Error::UnknownIdentifier { identifier, suggestions } => {
            render_unknown_identifier(identifier, suggestions)
        },
        Error::StaleIndex { identifier, pattern } => render_stale_index(identifier, pattern),
        Error::ToolInvocation { program, reason } => render_tool_invocation(program, reason),
        Error::ToolTimeout { program, timeout } => render_tool_timeout(program, *timeout),
        Error::MalformedStream { count } => render_malformed_stream(*count),
        Error::NotReady { state } => render_not_ready(*state),
        _ => render_generic(e),
    }
}

fn render_generic(e: &Error) -> String {
    match e {
        Error::FileNotFound { path } => format!("\
# Error: File Not Found

`{}` does not exist.
", path.display()),

        Error::ConfigNotFound { path } => format!("\
# Error: Config Not Found

`{}` does not exist.

## Fix

Check the `--config` path, or drop it to use `.idref.toml`.
", path.display()),

        Error::Io(e) => format!("\
# Error: I/O

{e}
"),
        Error::TomlDe(e) => format!("\
# Error: Invalid TOML

{e}
"),
        Error::Json(e) => format!("\
# Error: JSON Output

{e}
"),
        _ => format!("\
# Error

{e}
"),
    }
}

fn render_malformed_stream(count: usize) -> String {
    format!("\
# Error: Malformed Event Stream

{count} identifier attribute(s) were not followed by an element start.
The parser output was probably cut short.

## Fix

Check the parser's exit status and stderr, or rerun without `--strict`
to index the well-formed declarations.
")
}

fn render_not_ready(state: SessionState) -> String {
    format!("\
# Error: Index Not Ready

The document session is `{state}`; lookups need a built index.

## Fix

Rebuild the index before resolving.
")
}

fn render_stale_index(identifier: &str, pattern: &str) -> String {
    format!("\
# Error: Stale Index

`{identifier}` is in the index, but `{pattern}` does not occur in the document.
The document changed since the index was built, or the declaration uses
spacing or quoting the search does not expect.

## Fix

Rebuild the index:

    idref index <document>
")
}

fn render_tool_invocation(program: &str, reason: &str) -> String {
    format!("\
# Error: Parser Failed

Could not run `{program}`: {reason}

No index was built. The previous index, if any, is unchanged.

## Fix

Install an ESIS-producing parser (`onsgmls` from OpenSP), or point
`[parser] program` in `.idref.toml` at one.
")
}

fn render_tool_timeout(program: &str, timeout: Duration) -> String {
    format!("\
# Error: Parser Timed Out

`{program}` did not finish within {}s and was stopped.

## Fix

Raise `[parser] timeout_secs` in `.idref.toml`, or check the document's
entity declarations for unreachable system identifiers.
", timeout.as_secs())
}

fn render_unknown_identifier(identifier: &str, suggestions: &[String]) -> String {
    let mut out = format!("\
# Error: Unknown Identifier

No element declares `{identifier}` as an ID.
");

    if let Some(best) = suggestions.first() {
        let _ = write!(out, "\n## Did you mean `{best}`?\n");
        if suggestions.len() > 1 {
            out.push_str("\n## Close matches\n\n");
            for s in suggestions {
                let _ = writeln!(out, "- `{s}`");
            }
        }
    }

    out.push_str("\
\n## Fix

If the document gained this identifier recently, rebuild the index.
");
    out
}

/// Levenshtein distance between two strings, counted in characters.
pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0_usize; b_chars.len().saturating_add(1)];

    for (i, ca) in a.chars().enumerate() {
        let mut row = Vec::with_capacity(current.len());
        row.push(i.saturating_add(1));
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution = previous.get(j).copied().unwrap_or(0).saturating_add(usize::from(ca != *cb));
            let deletion = previous.get(j.saturating_add(1)).copied().unwrap_or(0).saturating_add(1);
            let insertion = row.get(j).copied().unwrap_or(0).saturating_add(1);
            row.push(substitution.min(deletion).min(insertion));
        }
        current = row;
        std::mem::swap(&mut previous, &mut current);
    }

    previous.last().copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_basics() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("box1", "box1"), 0);
        assert_eq!(edit_distance("box1", "box2"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn unknown_identifier_offers_best_match() {
        let md = render_error(&Error::UnknownIdentifier {
            identifier: "intro".into(),
            suggestions: vec!["intro1".into()],
        });
        assert!(md.contains("Did you mean `intro1`?"), "{md}");
        assert!(!md.contains("Close matches"), "{md}");
    }

    #[test]
    fn stale_index_suggests_rebuild() {
        let md = render_error(&Error::StaleIndex {
            identifier: "box1".into(),
            pattern: "id=\"?box1\"?".into(),
        });
        assert!(md.starts_with("# Error: Stale Index"), "{md}");
        assert!(md.contains("idref index"), "{md}");
    }
}
