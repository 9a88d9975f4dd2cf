mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use idref::config::Config;
use idref::diagnostics;
use idref::error::Error;

use crate::commands::{Format, Source};

#[derive(Parser)]
#[command(name = "idref", version, about = "Identifier cross-reference index for SGML and XML documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Config file to use instead of `.idref.toml` in the working directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the parsed event records of a document
    Events {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Build the identifier index and print the listing
    Index {
        #[command(flatten)]
        source: SourceArgs,
        /// Fail if any identifier has no owning element
        #[arg(long)]
        strict: bool,
    },
    /// Resolve the identifier on a rendered listing line
    Line {
        #[command(flatten)]
        source: SourceArgs,
        /// A line as printed by `idref index`, e.g. "intro (sect1)"
        listing_line: String,
    },
    /// Find where an identifier is declared
    Resolve {
        #[command(flatten)]
        source: SourceArgs,
        /// Identifier to look up
        identifier: String,
    },
}

/// Arguments shared by every command.
#[derive(Args)]
struct SourceArgs {
    /// Compare identifiers case-sensitively (default: detect from the document)
    #[arg(long, conflicts_with = "fold_case")]
    case_sensitive: bool,
    /// The markup document
    document: PathBuf,
    /// Read parser output from this file instead of running the parser
    #[arg(long, value_name = "FILE")]
    events: Option<PathBuf>,
    /// Fold identifiers to lowercase (default: detect from the document)
    #[arg(long)]
    fold_case: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

impl SourceArgs {
    /// Borrow as the command-layer source description.
    fn source(&self) -> Source<'_> {
        let case_sensitive = if self.case_sensitive {
            Some(true)
        } else if self.fold_case {
            Some(false)
        } else {
            None
        };
        return Source {
            case_sensitive,
            document: &self.document,
            events: self.events.as_deref(),
        };
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    return match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            exit_code_for(&e)
        },
    };
}

/// Load config and dispatch to the selected command.
///
/// # Errors
///
/// Returns whatever the command returns.
fn run(cli: &Cli) -> Result<ExitCode, Error> {
    let config = match &cli.config {
        Some(path) => Config::load_file(path)?,
        None => Config::load(&PathBuf::from("."))?,
    };

    return match &cli.command {
        Commands::Events { source } => commands::events(&config, &source.source(), source.format),
        Commands::Index { source, strict } => {
            commands::index(&config, &source.source(), *strict, source.format)
        },
        Commands::Line { source, listing_line } => {
            commands::line(&config, &source.source(), listing_line, source.format)
        },
        Commands::Resolve { source, identifier } => {
            commands::resolve(&config, &source.source(), identifier, source.format)
        },
    };
}

/// Exit code priority: lookup miss (1) < everything else (2).
fn exit_code_for(e: &Error) -> ExitCode {
    return match e {
        Error::StaleIndex { .. } | Error::UnknownIdentifier { .. } => ExitCode::from(1),
        _ => ExitCode::from(2),
    };
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
