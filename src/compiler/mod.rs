pub mod compile;
pub mod lex;
pub mod scope;
pub mod syntax;
pub mod token;

pub use compile::Compiler;
pub use syntax::{Syntax, SyntaxKind};
