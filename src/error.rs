/// Crate-level error types for idref diagnostics.
use std::path::PathBuf;
use std::time::Duration;

use crate::session::SessionState;

/// All errors in idref carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the tool, file, or identifier involved.
#[allow(clippy::error_impl_error, reason = "crate-level error type re-exported as idref::Error")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An explicitly requested config file does not exist on disk.
    #[error("config not found: {}", path.display())]
    ConfigNotFound {
        /// Path to the missing config file.
        path: PathBuf,
    },

    /// A document or event file does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Underlying I/O error from the filesystem or a pipe.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON serialization failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// The event stream declared identifiers that no element owns.
    /// Only raised when the caller asks for strict builds.
    #[error("malformed event stream: {count} identifier(s) without an owning element")]
    MalformedStream {
        /// Number of identifier attributes left without an owner.
        count: usize,
    },

    /// The session has no usable index yet.
    #[error("index not ready (state: {state})")]
    NotReady {
        /// Lifecycle state the session was in when the call was rejected.
        state: SessionState,
    },

    /// The identifier is in the index but its declaration is not in the text.
    #[error("stale index: `{identifier}` is indexed but `{pattern}` does not occur in the document")]
    StaleIndex {
        /// Identifier that was looked up.
        identifier: String,
        /// Search pattern that failed to match.
        pattern: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// The external parser could not be started or exited abnormally.
    #[error("failed to run `{program}`: {reason}")]
    ToolInvocation {
        /// Program that was invoked.
        program: String,
        /// Description of the failure, including captured stderr when present.
        reason: String,
    },

    /// The external parser did not finish within its deadline and was killed.
    #[error("`{program}` timed out after {}s", timeout.as_secs())]
    ToolTimeout {
        /// Program that was invoked.
        program: String,
        /// Deadline that expired.
        timeout: Duration,
    },

    /// No identifier with this name was declared in the document.
    #[error("unknown identifier: `{identifier}`")]
    UnknownIdentifier {
        /// Identifier that was looked up.
        identifier: String,
        /// Indexed identifiers close to the one requested.
        suggestions: Vec<String>,
    },
}
