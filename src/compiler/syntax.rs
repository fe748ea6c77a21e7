//! Compile-time errors (spec §7, compile-time family).

use std::fmt;

use crate::common::span::Span;

/// The closed set of compile-time error kinds from spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    Other,
    UnfoundFile,
    BracketsOpen,
    VarNoType,
    DblDeclare,
    InBlockVarDef,
    ObjUnfound,
    InvalidVname,
    InvalidLiter,
    AsgDefault,
    RegOverflow,
    CmdOverflow,
    ObjOverflow,
    CstOverflow,
    ReturnTmpObj,
    InvalidFile,
}

impl SyntaxKind {
    pub fn tag(self) -> &'static str {
        use SyntaxKind::*;
        match self {
            Other => "other",
            UnfoundFile => "unfound-file",
            BracketsOpen => "brackets-open",
            VarNoType => "var-no-type",
            DblDeclare => "dbl-declare",
            InBlockVarDef => "in-block-var-def",
            ObjUnfound => "obj-unfound",
            InvalidVname => "invalid-vname",
            InvalidLiter => "invalid-liter",
            AsgDefault => "assign-default",
            RegOverflow => "reg-overflow",
            CmdOverflow => "cmd-overflow",
            ObjOverflow => "obj-overflow",
            CstOverflow => "cst-overflow",
            ReturnTmpObj => "return-tmp-obj",
            InvalidFile => "invalid-file",
        }
    }
}

/// A compile-time error: kind, human-readable reason, and the span it was
/// raised at (empty span if none is applicable, e.g. `invalid-file`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub kind: SyntaxKind,
    pub reason: String,
    pub span: Span,
}

impl Syntax {
    pub fn error(kind: SyntaxKind, reason: &str, span: &Span) -> Syntax {
        Syntax { kind, reason: reason.to_string(), span: span.clone() }
    }

    pub fn plain(kind: SyntaxKind, reason: &str) -> Syntax {
        Syntax { kind, reason: reason.to_string(), span: Span::empty() }
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.span.is_empty() {
            fmt::Display::fmt(&self.span, f)?;
        }
        write!(f, "Syntax Error [{}]: {}", self.kind.tag(), self.reason)
    }
}

impl std::error::Error for Syntax {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;

    #[test]
    fn renders_span_then_message() {
        let source = Source::source("x = \"Hello, world\" -> y + 1");
        let error = Syntax::error(
            SyntaxKind::Other,
            "unexpected token",
            &Span::new(&source, 4, 14),
        );
        let rendered = format!("{}", error);
        assert!(rendered.contains("Syntax Error [other]: unexpected token"));
        assert!(rendered.contains("^^^^^^^^^^^^^^"));
    }

    #[test]
    fn plain_has_no_location() {
        let error = Syntax::plain(SyntaxKind::InvalidFile, "unrecognized suffix");
        assert_eq!(format!("{}", error), "Syntax Error [invalid-file]: unrecognized suffix");
    }
}
