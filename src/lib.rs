//! Identifier cross-reference index for SGML and XML documents.
//!
//! An external validating parser turns the document into an ESIS event
//! stream; [`events`] reads it, [`index`] builds the identifier map and
//! listing, and [`resolver`] finds the attribute assignment that declares an
//! identifier in the document text. [`session::DocumentSession`] ties these
//! together per document.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod index;
pub mod resolver;
pub mod session;
pub mod tool;
pub mod types;

pub use error::Error;
pub use index::{BuildOptions, BuildReport, Index};
pub use session::{DocumentSession, SessionRegistry, SessionState};
pub use types::{Anomaly, EventRecord, IdentifierEntry, TextSpan};
