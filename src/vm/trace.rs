//! Runtime errors (spec §7, runtime family): a traceback of call-site spans
//! plus the error kind and message.

use std::fmt;

use crate::common::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Other,
    DivIntZero,
    ParamsCtr,
    ParamsType,
    IdxOutRange,
    InvalidIndex,
    LoopRef,
    RefType,
    LenInconsis,
    AssignNil,
    ObjUnfound,
    IntOutOfRange,
    RefEmptySet,
    StringEval,
    EnvInconsis,
    RecurseRefRet,
}

impl TraceKind {
    pub fn tag(self) -> &'static str {
        use TraceKind::*;
        match self {
            Other => "other",
            DivIntZero => "div-int-zero",
            ParamsCtr => "params-ctr",
            ParamsType => "params-type",
            IdxOutRange => "idx-out-range",
            InvalidIndex => "invalid-index",
            LoopRef => "loop-ref",
            RefType => "ref-type",
            LenInconsis => "len-inconsis",
            AssignNil => "assign-nil",
            ObjUnfound => "obj-unfound",
            IntOutOfRange => "int-out-of-range",
            RefEmptySet => "ref-empty-set",
            StringEval => "string-eval",
            EnvInconsis => "env-inconsis",
            RecurseRefRet => "recurse-ref-ret",
        }
    }
}

/// A runtime error carrying a traceback: one span per call frame still on
/// the VM's call stack at the moment the error was raised, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub kind: TraceKind,
    pub message: String,
    pub spans: Vec<Span>,
}

impl Trace {
    pub fn error(kind: TraceKind, message: &str, spans: Vec<Span>) -> Trace {
        Trace { kind, message: message.to_string(), spans }
    }

    pub fn simple(kind: TraceKind, message: &str) -> Trace {
        Trace::error(kind, message, Vec::new())
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback, most recent call last:")?;
        for span in &self.spans {
            fmt::Display::fmt(span, f)?;
        }
        write!(f, "Runtime Error [{}]: {}", self.kind.tag(), self.message)
    }
}

impl std::error::Error for Trace {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;

    #[test]
    fn renders_traceback_and_message() {
        let source = Source::source("print(10 / 0)");
        let trace = Trace::error(
            TraceKind::DivIntZero,
            "division by zero",
            vec![Span::new(&source, 6, 6)],
        );
        let rendered = format!("{}", trace);
        assert!(rendered.starts_with("Traceback, most recent call last:"));
        assert!(rendered.contains("Runtime Error [div-int-zero]: division by zero"));
    }
}
