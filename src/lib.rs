//! # Tapas
//! This crate contains the core of the Tapas scripting language: its lexer,
//! single-pass bytecode compiler, persistent `.tapc` artifact format, and
//! stack-based virtual machine.
//!
//! ## Embedding Tapas in Rust
//! ```no_run
//! use tapas::session::Session;
//!
//! let mut session = Session::new(Vec::new());
//! session.run_source("print('Hello from Tapas!')").unwrap();
//! ```
//!
//! ## Overview of the compilation process
//! Source code is represented as a `common::source::Source`: contents plus
//! the path they came from, used for diagnostics and for resolving relative
//! `import`s.
//!
//! The lexer (`compiler::lex`) splits source into top-level statement units.
//! The compiler (`compiler::compile`) walks those units directly into
//! bytecode in a single pass — there is no separate parse-to-AST stage.
//! Bytecode is a vector of fixed-width 32-bit instruction words
//! (`common::opcode`), collected with their literal pools into an
//! `common::artifact::Artifact`.
//!
//! ## Execution
//! The VM (`vm::vm::Vm`) runs an `Artifact` against an environment tree
//! (`vm::environment`) of named-slot object arrays chained by parent
//! pointers. Runtime errors are raised as `vm::trace::Trace`; compile-time
//! errors as `compiler::syntax::Syntax`.
//!
//! The `session` module ties compilation and execution together behind a
//! single façade that also owns the kernel's default host-function bindings.

pub mod common;
pub mod compiler;
pub mod kernel;
pub mod session;
pub mod vm;

pub use common::source::Source;
pub use compiler::{Compiler, Syntax, SyntaxKind};
pub use session::{Session, SessionError};
pub use vm::{Trace, TraceKind, Vm};
