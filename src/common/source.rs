//! Source-file representation shared by the lexer, compiler, and diagnostics.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A chunk of Tapas source: the file's contents plus the path it came from
/// (used only for diagnostics and for resolving relative `import`s).
#[derive(Debug, PartialEq, Eq)]
pub struct Source {
    pub contents: String,
    pub path: PathBuf,
}

impl Source {
    pub fn new(contents: &str, path: &Path) -> Rc<Source> {
        Rc::new(Source { contents: contents.to_string(), path: path.to_owned() })
    }

    /// Reads a file from disk. Fails with `session-io` (see
    /// [`crate::session::SessionError`]) on the caller's side if the read fails.
    pub fn path(path: &Path) -> std::io::Result<Rc<Source>> {
        let contents = fs::read_to_string(path)?;
        Ok(Source::new(&contents, path))
    }

    /// Builds a source from a literal string, useful for tests and the REPL
    /// collaborator. Points at the synthetic path `./source`.
    pub fn source(contents: &str) -> Rc<Source> {
        Source::new(contents, &PathBuf::from("./source"))
    }

    /// The file suffix policy from §4.3: `.tap`/`.Tap`/`.TAP` are plain
    /// source, `.md`/`.Md`/`.MD` route through the Markdown-aware lexer.
    pub fn kind(&self) -> Option<SourceKind> {
        match self.path.extension().and_then(|e| e.to_str()) {
            Some("tap") | Some("Tap") | Some("TAP") => Some(SourceKind::Plain),
            Some("md") | Some("Md") | Some("MD") => Some(SourceKind::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Plain,
    Markdown,
}
