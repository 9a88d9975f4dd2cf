use std::path::Path;
use std::time::Duration;

use crate::error::Error;
use crate::index::BuildOptions;
use crate::tool::{self, ParserTool};

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE: &str = ".idref.toml";

/// Project configuration loaded from `.idref.toml`.
#[derive(Debug, Default)]
pub struct Config {
    /// Case policy override. `None` lets each document's dialect decide.
    pub case_sensitive: Option<bool>,
    /// How to run the external parser.
    pub tool: ParserTool,
}

/// Raw TOML structure for `.idref.toml`.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct IdrefTomlConfig {
    #[serde(default)]
    index: IndexSection,
    #[serde(default)]
    parser: ParserSection,
}

/// `[index]` table.
#[derive(Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexSection {
    case_sensitive: Option<bool>,
}

/// `[parser]` table.
#[derive(Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ParserSection {
    args: Option<Vec<String>>,
    program: Option<String>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// Load `.idref.toml` from the given root directory.
    /// Returns defaults if the file doesn't exist, and an error if it exists
    /// but is malformed: a config the user wrote is never silently ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
        };
        return Self::parse(&content);
    }

    /// Load an explicitly named config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigNotFound` if the file does not exist,
    /// `Error::Io` for other read failures, or `Error::TomlDe` if malformed.
    pub fn load_file(path: &Path) -> Result<Self, Error> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
        };
        return Self::parse(&content);
    }

    /// Build options forced by config, if any.
    pub fn build_options(&self) -> Option<BuildOptions> {
        return self.case_sensitive.map(|case_sensitive| return BuildOptions { case_sensitive });
    }

    /// Parse config TOML, filling unset keys with defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed or has unknown keys.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let raw: IdrefTomlConfig = toml::from_str(content)?;
        let tool = ParserTool {
            args: raw.parser.args.unwrap_or_else(tool::default_args),
            program: raw.parser.program.unwrap_or_else(|| return tool::DEFAULT_PROGRAM.to_string()),
            timeout: raw.parser.timeout_secs.map_or(tool::DEFAULT_TIMEOUT, Duration::from_secs),
        };
        return Ok(Self { case_sensitive: raw.index.case_sensitive, tool });
    }
}
