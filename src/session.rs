//! The session façade (spec §3): owns the root library, wires the host's
//! default-name registry in, and drives compile/run cycles. A plain
//! construct-then-run embedding shape rather than a builder or
//! config-file dependency.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::common::artifact::{Artifact, ArtifactError};
use crate::common::data::Value;
use crate::common::source::Source;
use crate::compiler::{Compiler, Syntax};
use crate::kernel;
use crate::vm::environment::Environment;
use crate::vm::{EnvRef, Trace, Vm};

/// The default on-disk suffix for compiled artifacts (spec §4.4).
pub const ARTIFACT_EXTENSION: &str = "tapc";

/// Errors that can only happen at the session boundary, not inside the
/// compiler or VM proper — currently just artifact/source I/O (spec §7's
/// `session-io` family).
#[derive(Debug)]
pub enum SessionError {
    Io(String),
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> SessionError {
        SessionError::Io(e.to_string())
    }
}

impl From<ArtifactError> for SessionError {
    fn from(e: ArtifactError) -> SessionError {
        SessionError::Io(e.to_string())
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Io(msg) => write!(f, "Session Error [session-io]: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

/// Any failure a full compile-then-run cycle can raise, bundled so
/// `main.rs` can print whichever family actually fired without three
/// separate match arms at every call site.
#[derive(Debug)]
pub enum SessionOutcome {
    Syntax(Syntax),
    Trace(Trace),
    Session(SessionError),
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionOutcome::Syntax(e) => write!(f, "{}", e),
            SessionOutcome::Trace(e) => write!(f, "{}", e),
            SessionOutcome::Session(e) => write!(f, "{}", e),
        }
    }
}

impl From<Syntax> for SessionOutcome {
    fn from(e: Syntax) -> SessionOutcome {
        SessionOutcome::Syntax(e)
    }
}
impl From<Trace> for SessionOutcome {
    fn from(e: Trace) -> SessionOutcome {
        SessionOutcome::Trace(e)
    }
}
impl From<SessionError> for SessionOutcome {
    fn from(e: SessionError) -> SessionOutcome {
        SessionOutcome::Session(e)
    }
}

/// Owns the root library (with the kernel's default bindings already
/// registered) and the search-path list `import` resolves against.
pub struct Session {
    root: EnvRef,
}

impl Session {
    /// Builds a session with the kernel's default registries bound, and the
    /// given directories (tried in order, after `.`) available to `import`.
    pub fn new(search_paths: Vec<PathBuf>) -> Session {
        let bindings = kernel::default_bindings();
        let default_names = bindings.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>();
        let default_values = bindings.into_iter().map(|(_, v)| v).collect::<Vec<_>>();
        let root = Environment::root_library(search_paths, default_names, default_values);
        Session { root }
    }

    fn compiler(&self) -> Compiler {
        let default_names =
            self.root.borrow().library.as_ref().map(|l| l.default_names.clone()).unwrap_or_default();
        Compiler::with_defaults(&default_names)
    }

    /// Compiles and immediately runs a literal snippet of source, the way
    /// a one-shot embedding or the boundary-scenario harness uses a session.
    pub fn run_source(&mut self, text: &str) -> Result<Value, SessionOutcome> {
        let source = Source::source(text);
        let artifact = self.compiler().compile_source(&source)?;
        let mut vm = Vm::new(Rc::clone(&self.root));
        Ok(vm.run(Rc::new(artifact), Rc::clone(&self.root))?)
    }

    /// Compiles and runs a `.tap`/`.md` source file from disk.
    pub fn run_file(&mut self, path: &Path) -> Result<Value, SessionOutcome> {
        let source = Source::path(path).map_err(SessionError::from)?;
        let artifact = self.compiler().compile_source(&source)?;
        let mut vm = Vm::new(Rc::clone(&self.root));
        Ok(vm.run(Rc::new(artifact), Rc::clone(&self.root))?)
    }

    /// Compiles a source file to a `.tapc` artifact on disk without running
    /// it (spec §4.4's persistent bytecode artifact).
    pub fn compile_to_artifact(&mut self, path: &Path, out: &Path) -> Result<(), SessionOutcome> {
        let source = Source::path(path).map_err(SessionError::from)?;
        let artifact = self.compiler().compile_source(&source)?;
        let mut file = File::create(out).map_err(SessionError::from)?;
        artifact.save(&mut file).map_err(SessionError::from)?;
        Ok(())
    }

    /// Loads and runs a previously saved `.tapc` artifact.
    pub fn run_artifact(&mut self, path: &Path) -> Result<Value, SessionOutcome> {
        let mut file = File::open(path).map_err(SessionError::from)?;
        let artifact = Artifact::load(&mut file).map_err(SessionError::from)?;
        let mut vm = Vm::new(Rc::clone(&self.root));
        Ok(vm.run(Rc::new(artifact), Rc::clone(&self.root))?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn runs_arithmetic_snippet() {
        let mut session = Session::new(Vec::new());
        let result = session.run_source("var x: int = 1 + 2; return x").unwrap();
        assert_eq!(result, Value::Int(3));
    }

    #[test]
    fn division_by_zero_raises_trace() {
        let mut session = Session::new(Vec::new());
        let err = session.run_source("return 10 / 0").unwrap_err();
        assert!(matches!(err, SessionOutcome::Trace(_)));
    }

    #[test]
    fn assigning_a_default_name_is_rejected() {
        let mut session = Session::new(Vec::new());
        let err = session.run_source("print = 1").unwrap_err();
        assert!(matches!(err, SessionOutcome::Syntax(_)));
    }
}
