//! CLI commands for idref: index, resolve, line, events.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;

use idref::config::Config;
use idref::error::Error;
use idref::events::events as parse_events;
use idref::index::BuildOptions;
use idref::session::DocumentSession;
use idref::types::{Anomaly, EventRecord, IdentifierEntry, TextSpan};

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// One JSON document on stdout.
    Json,
    /// Human-readable lines.
    Text,
}

/// The document a command works on and where its events come from.
pub struct Source<'a> {
    /// Case policy forced on the command line, if any.
    pub case_sensitive: Option<bool>,
    /// The markup document.
    pub document: &'a Path,
    /// Pre-captured parser output to use instead of running the parser.
    pub events: Option<&'a Path>,
}

/// JSON shape of `idref index`.
#[derive(Serialize)]
struct IndexOutput<'a> {
    /// Identifiers dropped for lack of an owning element.
    anomalies: &'a [Anomaly],
    /// The indexed document.
    document: &'a Path,
    /// Every declaration in document order.
    entries: &'a [IdentifierEntry],
}

/// JSON shape of `idref resolve` and `idref line`.
#[derive(Serialize)]
struct ResolveOutput<'a> {
    /// The indexed document.
    document: &'a Path,
    /// Identifier as requested.
    identifier: &'a str,
    /// Where its declaration is.
    span: &'a TextSpan,
}

/// Print the parsed event records of a document.
///
/// # Errors
///
/// Returns errors from reading the events file or running the parser.
pub fn events(config: &Config, source: &Source<'_>, format: Format) -> Result<ExitCode, Error> {
    let output = match source.events {
        Some(path) => read_file(path)?,
        None => config.tool.run(source.document)?,
    };
    let records: Vec<EventRecord> = parse_events(&output).collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        Format::Text => {
            for record in &records {
                println!("{}", describe_record(record));
            }
        },
    }
    return Ok(ExitCode::SUCCESS);
}

/// Build the index of a document and print its listing.
///
/// # Errors
///
/// Returns build errors, or `Error::MalformedStream` in strict mode when
/// some identifiers had no owning element.
pub fn index(
    config: &Config,
    source: &Source<'_>,
    strict: bool,
    format: Format,
) -> Result<ExitCode, Error> {
    let (session, anomalies) = open_session(config, source)?;
    if strict && !anomalies.is_empty() {
        return Err(Error::MalformedStream { count: anomalies.len() });
    }

    match format {
        Format::Json => {
            let index = session.index()?;
            let output = IndexOutput {
                anomalies: &anomalies,
                document: source.document,
                entries: index.entries(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        },
        Format::Text => {
            for line in session.render()? {
                println!("{line}");
            }
        },
    }
    return Ok(ExitCode::SUCCESS);
}

/// Resolve the identifier shown on a listing line.
///
/// # Errors
///
/// Returns build errors, `Error::UnknownIdentifier` for lines without an
/// identifier, or `Error::StaleIndex`.
pub fn line(
    config: &Config,
    source: &Source<'_>,
    listing_line: &str,
    format: Format,
) -> Result<ExitCode, Error> {
    let (session, _anomalies) = open_session(config, source)?;
    let text = read_file(source.document)?;
    let span = session.resolve_listing_line(listing_line, &text)?;
    let identifier = idref::index::identifier_on_line(listing_line).unwrap_or(listing_line);
    print_span(source.document, identifier, &span, format)?;
    return Ok(ExitCode::SUCCESS);
}

/// Build a session for the document from the parser or an events file.
/// Anomalies are printed as warnings and returned.
///
/// # Errors
///
/// Returns errors from reading the events file or running the parser.
fn open_session(config: &Config, source: &Source<'_>) -> Result<(DocumentSession, Vec<Anomaly>), Error> {
    let options = source
        .case_sensitive
        .map(|case_sensitive| return BuildOptions { case_sensitive })
        .or_else(|| return config.build_options());
    let session = DocumentSession::new(source.document, config.tool.clone(), options);

    let anomalies = match source.events {
        Some(path) => session.rebuild_from_events(&read_file(path)?),
        None => session.rebuild()?,
    };
    for anomaly in &anomalies {
        eprintln!("warning: {anomaly}");
    }
    return Ok((session, anomalies));
}

/// One-line description of a record for text output.
fn describe_record(record: &EventRecord) -> String {
    return match record {
        EventRecord::Attribute { kind, name, value } => format!("attribute {name}={value} ({kind})"),
        EventRecord::ElementStart { name } => format!("start {name}"),
    };
}

/// Print a resolved span.
///
/// # Errors
///
/// Returns `Error::Json` if JSON serialization fails.
fn print_span(document: &Path, identifier: &str, span: &TextSpan, format: Format) -> Result<(), Error> {
    match format {
        Format::Json => {
            let output = ResolveOutput { document, identifier, span };
            println!("{}", serde_json::to_string_pretty(&output)?);
        },
        Format::Text => {
            println!("{}:{}:{}: {}", document.display(), span.line, span.column, span.text);
        },
    }
    return Ok(());
}

/// Read a whole file, reporting a missing one by name.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the file does not exist, `Error::Io` otherwise.
fn read_file(path: &Path) -> Result<String, Error> {
    return match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::FileNotFound { path: PathBuf::from(path) })
        },
        Err(e) => Err(Error::Io(e)),
    };
}

/// Find where an identifier is declared in a document.
///
/// # Errors
///
/// Returns build errors, `Error::UnknownIdentifier`, or `Error::StaleIndex`.
pub fn resolve(
    config: &Config,
    source: &Source<'_>,
    identifier: &str,
    format: Format,
) -> Result<ExitCode, Error> {
    let (session, _anomalies) = open_session(config, source)?;
    let text = read_file(source.document)?;
    let span = session.resolve(identifier, &text)?;
    print_span(source.document, identifier, &span, format)?;
    return Ok(ExitCode::SUCCESS);
}
