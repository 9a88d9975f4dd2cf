//! Per-document sessions: each owns the index built from one document and
//! walks it through `Empty -> Building -> Ready`.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::events::events;
use crate::index::{self, BuildOptions, Index};
use crate::resolver;
use crate::tool::ParserTool;
use crate::types::{Anomaly, TextSpan};

/// How many leading bytes of a document are read to detect its dialect.
const DIALECT_HEAD_LEN: u64 = 64;

/// Lifecycle state of a session's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A rebuild is in progress.
    Building,
    /// Nothing has been built yet.
    Empty,
    /// An index is available for lookups.
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Building => "building",
            SessionState::Empty => "empty",
            SessionState::Ready => "ready",
        };
        return f.write_str(name);
    }
}

/// What the session holds in each state.
enum Slot {
    /// A rebuild is running; the index it replaces is parked here.
    Building {
        /// Index to restore if the rebuild fails.
        previous: Option<Index>,
    },
    /// Nothing built.
    Empty,
    /// Built and usable.
    Ready(Index),
}

impl Slot {
    /// The public state this slot corresponds to.
    const fn state(&self) -> SessionState {
        return match self {
            Slot::Building { .. } => SessionState::Building,
            Slot::Empty => SessionState::Empty,
            Slot::Ready(_) => SessionState::Ready,
        };
    }
}

/// One document and the index built from it.
pub struct DocumentSession {
    /// Case policy override. `None` detects it from the document.
    options: Option<BuildOptions>,
    /// Backing file handed to the parser.
    path: PathBuf,
    /// Held for the whole of a rebuild so rebuilds never overlap.
    rebuild_lock: Mutex<()>,
    /// Current index and lifecycle state.
    slot: Mutex<Slot>,
    /// How to run the external parser.
    tool: ParserTool,
}

impl DocumentSession {
    /// Create an empty session for the document at `path`.
    pub fn new(path: &Path, tool: ParserTool, options: Option<BuildOptions>) -> Self {
        return Self {
            options,
            path: path.to_path_buf(),
            rebuild_lock: Mutex::new(()),
            slot: Mutex::new(Slot::Empty),
            tool,
        };
    }

    /// Park the current index and enter `Building`.
    fn begin_building(&self) {
        let mut slot = lock(&self.slot);
        let previous = match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Building { previous } => previous,
            Slot::Empty => None,
            Slot::Ready(index) => Some(index),
        };
        *slot = Slot::Building { previous };
    }

    /// Case policy for the next build: the override, else the document's dialect.
    fn build_options(&self) -> BuildOptions {
        if let Some(options) = self.options {
            return options;
        }
        let head = read_head(&self.path).unwrap_or_else(|e| {
            warn!(
                document = %self.path.display(),
                error = %e,
                "cannot read document to detect its dialect, going by extension"
            );
            return Vec::new();
        });
        return BuildOptions::for_document(&self.path, &head);
    }

    /// Leave `Building`: install the new index, or restore the parked one.
    fn finish_building(&self, built: Option<Index>) {
        let mut slot = lock(&self.slot);
        let previous = match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Building { previous } => previous,
            Slot::Empty => None,
            Slot::Ready(index) => Some(index),
        };
        *slot = match built.or(previous) {
            Some(index) => Slot::Ready(index),
            None => Slot::Empty,
        };
    }

    /// Rebuild only if no index is ready yet.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`DocumentSession::rebuild`].
    pub fn ensure_ready(&self) -> Result<Vec<Anomaly>, Error> {
        if self.state() == SessionState::Ready {
            return Ok(Vec::new());
        }
        return self.rebuild();
    }

    /// A copy of the ready index.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotReady` unless the session is `Ready`.
    pub fn index(&self) -> Result<Index, Error> {
        return self.with_index(|index| return Ok(index.clone()));
    }

    /// Backing file of this session.
    pub fn path(&self) -> &Path {
        return &self.path;
    }

    /// Run the parser on the document and replace the index with a fresh one.
    ///
    /// Rebuilds of the same session run one at a time. If the parser fails
    /// the previous index, if any, stays in place.
    ///
    /// # Errors
    ///
    /// Returns `Error::ToolInvocation` or `Error::ToolTimeout` from the parser.
    pub fn rebuild(&self) -> Result<Vec<Anomaly>, Error> {
        let _serial = lock(&self.rebuild_lock);
        self.begin_building();
        debug!(document = %self.path.display(), "rebuilding index");

        let output = match self.tool.run(&self.path) {
            Ok(output) => output,
            Err(e) => {
                warn!(document = %self.path.display(), error = %e, "rebuild failed, keeping previous index");
                self.finish_building(None);
                return Err(e);
            },
        };
        return Ok(self.install(&output));
    }

    /// Replace the index using already captured parser output.
    pub fn rebuild_from_events(&self, output: &str) -> Vec<Anomaly> {
        let _serial = lock(&self.rebuild_lock);
        self.begin_building();
        return self.install(output);
    }

    /// Build from `output` and make the result the ready index.
    fn install(&self, output: &str) -> Vec<Anomaly> {
        let report = index::build(events(output), self.build_options());
        info!(
            document = %self.path.display(),
            identifiers = report.index.len(),
            anomalies = report.anomalies.len(),
            "index ready"
        );
        self.finish_building(Some(report.index));
        return report.anomalies;
    }

    /// Rendered listing of the ready index.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotReady` unless the session is `Ready`.
    pub fn render(&self) -> Result<Vec<String>, Error> {
        return self.with_index(|index| return Ok(index::render(index)));
    }

    /// Find the declaration of `identifier` in `document_text`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotReady` unless the session is `Ready`, otherwise the
    /// errors of [`resolver::resolve`].
    pub fn resolve(&self, identifier: &str, document_text: &str) -> Result<TextSpan, Error> {
        return self.with_index(|index| return resolver::resolve(index, identifier, document_text));
    }

    /// Resolve the identifier shown on one line of the rendered listing.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownIdentifier` for caption or blank lines, and the
    /// errors of [`DocumentSession::resolve`] otherwise.
    pub fn resolve_listing_line(&self, line: &str, document_text: &str) -> Result<TextSpan, Error> {
        let Some(identifier) = index::identifier_on_line(line) else {
            return Err(Error::UnknownIdentifier {
                identifier: line.trim().to_string(),
                suggestions: Vec::new(),
            });
        };
        return self.resolve(identifier, document_text);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        return lock(&self.slot).state();
    }

    /// Run `f` against the ready index.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotReady` unless the session is `Ready`, or whatever `f` returns.
    fn with_index<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Index) -> Result<T, Error>,
    {
        let slot = lock(&self.slot);
        let Slot::Ready(index) = &*slot else {
            return Err(Error::NotReady { state: slot.state() });
        };
        return f(index);
    }
}

/// Sessions keyed by document path, so several documents stay independent.
pub struct SessionRegistry {
    /// Case policy override handed to new sessions.
    options: Option<BuildOptions>,
    /// Open sessions.
    sessions: Mutex<HashMap<PathBuf, Arc<DocumentSession>>>,
    /// Parser configuration handed to new sessions.
    tool: ParserTool,
}

impl SessionRegistry {
    /// Drop the session for `path`, discarding its index.
    pub fn close(&self, path: &Path) -> bool {
        return lock(&self.sessions).remove(path).is_some();
    }

    /// Whether no sessions are open.
    pub fn is_empty(&self) -> bool {
        return lock(&self.sessions).is_empty();
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        return lock(&self.sessions).len();
    }

    /// Create a registry whose sessions share one parser configuration.
    pub fn new(tool: ParserTool, options: Option<BuildOptions>) -> Self {
        return Self {
            options,
            sessions: Mutex::new(HashMap::new()),
            tool,
        };
    }

    /// The session for `path`, created empty on first use.
    pub fn session(&self, path: &Path) -> Arc<DocumentSession> {
        let mut sessions = lock(&self.sessions);
        let session = sessions.entry(path.to_path_buf()).or_insert_with(|| {
            return Arc::new(DocumentSession::new(path, self.tool.clone(), self.options));
        });
        return Arc::clone(session);
    }
}

/// The first bytes of a document, whatever its encoding.
fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::new();
    File::open(path)?.take(DIALECT_HEAD_LEN).read_to_end(&mut head)?;
    return Ok(head);
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    return mutex.lock().unwrap_or_else(PoisonError::into_inner);
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESIS: &str = "Aid ID box1\n(para\nAid ID box2\n(para\n";

    fn offline_session() -> DocumentSession {
        let tool = ParserTool {
            program: "idref-no-such-parser".to_string(),
            ..ParserTool::default()
        };
        return DocumentSession::new(Path::new("doc.sgml"), tool, None);
    }

    #[test]
    fn empty_session_rejects_lookups() {
        let session = offline_session();
        assert_eq!(session.state(), SessionState::Empty);
        assert!(matches!(session.render(), Err(Error::NotReady { state: SessionState::Empty })));
        assert!(matches!(
            session.resolve("box1", "id=box1"),
            Err(Error::NotReady { state: SessionState::Empty })
        ));
    }

    #[test]
    fn rebuild_from_events_makes_session_ready() {
        let session = offline_session();
        let anomalies = session.rebuild_from_events(ESIS);

        assert!(anomalies.is_empty());
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.render().unwrap()[2..], ["box1 (para)", "box2 (para)"]);
        let span = session.resolve("BOX2", "<para id=\"box1\"><para id=\"box2\">").unwrap();
        assert_eq!(span.byte_range.start, 22);
    }

    #[test]
    fn failed_rebuild_keeps_previous_index() {
        let session = offline_session();
        session.rebuild_from_events(ESIS);

        let err = session.rebuild().unwrap_err();
        assert!(matches!(err, Error::ToolInvocation { .. }), "got {err:?}");
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.index().unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn timed_out_rebuild_keeps_previous_index() {
        let tool = ParserTool {
            args: vec!["-c".to_string(), "sleep 8; echo done".to_string(), "sh".to_string()],
            program: "sh".to_string(),
            timeout: std::time::Duration::from_millis(300),
        };
        let session = DocumentSession::new(Path::new("doc.sgml"), tool, None);
        session.rebuild_from_events(ESIS);

        let err = session.rebuild().unwrap_err();
        assert!(matches!(err, Error::ToolTimeout { .. }), "got {err:?}");
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.index().unwrap().len(), 2);
    }

    #[test]
    fn xml_declaration_in_non_utf8_document_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.sgm");
        let mut bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<doc id=\"Caf\xE9\"/>\n".to_vec();
        bytes.extend_from_slice(b"<para id=\"Box1\"/>\n");
        std::fs::write(&path, &bytes).unwrap();
        assert!(std::str::from_utf8(&bytes).is_err());

        let session = DocumentSession::new(&path, ParserTool::default(), None);
        session.rebuild_from_events("AID ID Box1\n(para\n");
        let index = session.index().unwrap();
        assert!(index.is_case_sensitive());
        assert!(index.binding("box1").is_none());
    }

    #[test]
    fn unreadable_document_falls_back_to_extension() {
        let dir = tempfile::tempdir().unwrap();
        let session = DocumentSession::new(&dir.path().join("missing.xml"), ParserTool::default(), None);
        session.rebuild_from_events(ESIS);
        assert!(session.index().unwrap().is_case_sensitive());
    }

    #[test]
    fn failed_first_build_is_not_an_empty_index() {
        let session = offline_session();
        assert!(session.ensure_ready().is_err());
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn ensure_ready_skips_rebuild_when_ready() {
        let session = offline_session();
        session.rebuild_from_events(ESIS);
        assert!(session.ensure_ready().unwrap().is_empty());
    }

    #[test]
    fn rebuild_replaces_rather_than_merges() {
        let session = offline_session();
        session.rebuild_from_events(ESIS);
        session.rebuild_from_events("Aid ID other\n(fig\n");

        let index = session.index().unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.binding("box1").is_none());
    }

    #[test]
    fn listing_line_resolves_its_identifier() {
        let session = offline_session();
        session.rebuild_from_events(ESIS);
        let text = "<para id=box1><para id=box2>";

        let span = session.resolve_listing_line("box2 (para)", text).unwrap();
        assert_eq!(span.text, "id=box2");
        assert!(matches!(
            session.resolve_listing_line(index::LISTING_CAPTION, text),
            Err(Error::UnknownIdentifier { .. })
        ));
    }

    #[test]
    fn anomalies_are_reported_with_usable_index() {
        let session = offline_session();
        let anomalies = session.rebuild_from_events("Aid ID a\n(para\nAid ID dangling\n");
        assert_eq!(anomalies.len(), 1);
        assert_eq!(session.index().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_rebuilds_are_serialized() {
        let session = Arc::new(offline_session());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let session = Arc::clone(&session);
                return std::thread::spawn(move || {
                    let output = format!("Aid ID id{i}\n(para\n");
                    session.rebuild_from_events(&output);
                });
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.index().unwrap().len(), 1);
    }

    #[test]
    fn registry_keeps_documents_apart() {
        let registry = SessionRegistry::new(ParserTool::default(), None);
        let first = registry.session(Path::new("a.sgml"));
        let second = registry.session(Path::new("b.sgml"));
        first.rebuild_from_events(ESIS);

        assert_eq!(registry.len(), 2);
        assert_eq!(second.state(), SessionState::Empty);
        assert!(Arc::ptr_eq(&first, &registry.session(Path::new("a.sgml"))));
        assert!(registry.close(Path::new("a.sgml")));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }
}
