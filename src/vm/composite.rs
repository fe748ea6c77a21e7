//! The closed set of composite object kinds (spec §3) and their optional
//! capabilities, dispatched per-variant rather than through trait objects
//! (per the reference design notes: a tagged enum with a fast-path switch
//! on the variant before any capability is invoked).

use std::cell::RefCell;
use std::rc::Rc;

use crate::common::artifact::Artifact;
use crate::common::data::Value;
use crate::vm::environment::{EnvRef, Library};
use crate::vm::trace::{Trace, TraceKind};
use crate::vm::vm::Vm;

pub type CompositeRef = Rc<RefCell<Composite>>;

/// Sentinel `param_count` meaning "variadic" (spec §4.5, `UNDEF_NPARAMS`).
pub const UNDEF_NPARAMS: u32 = u32::MAX;

/// A compiled closure: a slice of a shared artifact's instruction stream
/// plus the environment it captured when the enclosing `PUSHF` ran.
pub struct FunctionData {
    pub artifact: Rc<Artifact>,
    pub captured: EnvRef,
    pub base_pc: usize,
    pub end_pc: usize,
    pub named_max: u32,
    pub temp_max: u32,
    pub stack_max: u8,
    pub param_count: u32,
}

pub type HostGeneralFn = dyn Fn(&mut Vm, Vec<Value>) -> Result<Value, Trace>;
pub type HostSessionFn = dyn Fn(&mut Vm, &EnvRef, Vec<Value>) -> Result<Value, Trace>;

/// A live iterator: a cursor over a range, a list, or a matrix's row-major
/// elements. `next` advances the cursor and reports whether an element was
/// available; `current` re-reads the element `next` last advanced onto.
#[derive(Debug, Clone)]
pub enum IterState {
    Range { start: i64, current: i64, end: i64, exhausted: bool },
    List { list: CompositeRef, cursor: usize },
    Matrix { matrix: CompositeRef, cursor: usize },
}

impl IterState {
    pub fn next(&mut self) -> bool {
        match self {
            IterState::Range { current, end, exhausted, .. } => {
                if *exhausted {
                    return false;
                }
                if *current > *end {
                    *exhausted = true;
                    return false;
                }
                true
            }
            IterState::List { list, cursor } => {
                let len = match &*list.borrow() {
                    Composite::List(v) => v.len(),
                    _ => 0,
                };
                *cursor < len
            }
            IterState::Matrix { matrix, cursor } => {
                let len = match &*matrix.borrow() {
                    Composite::MatrixReal { data, .. } => data.len(),
                    Composite::MatrixBool { data, .. } => data.len(),
                    _ => 0,
                };
                *cursor < len
            }
        }
    }

    /// Advances the cursor one step, to be called after `current` consumes
    /// the element the cursor was pointing at.
    pub fn advance(&mut self) {
        match self {
            IterState::Range { current, .. } => *current += 1,
            IterState::List { cursor, .. } | IterState::Matrix { cursor, .. } => *cursor += 1,
        }
    }

    pub fn current(&self) -> Value {
        match self {
            IterState::Range { current, .. } => Value::Int(*current),
            IterState::List { list, cursor } => match &*list.borrow() {
                Composite::List(v) => v.get(*cursor).cloned().unwrap_or(Value::Nil),
                _ => Value::Nil,
            },
            IterState::Matrix { matrix, cursor } => match &*matrix.borrow() {
                Composite::MatrixReal { data, .. } => {
                    data.get(*cursor).map(|f| Value::Float(*f)).unwrap_or(Value::Nil)
                }
                Composite::MatrixBool { data, .. } => {
                    data.get(*cursor).map(|b| Value::Bool(*b)).unwrap_or(Value::Nil)
                }
                _ => Value::Nil,
            },
        }
    }

    /// Resets the cursor to the start, implementing automatic `iter_restore`.
    pub fn restore(&mut self) {
        match self {
            IterState::Range { start, current, exhausted, .. } => {
                *current = *start;
                *exhausted = false;
            }
            IterState::List { cursor, .. } | IterState::Matrix { cursor, .. } => *cursor = 0,
        }
    }
}

pub enum Composite {
    Pair(Value, Value),
    Str(String),
    List(Vec<Value>),
    Dict(Vec<(String, Value)>),
    Iter(IterState),
    Function(Rc<FunctionData>),
    HostFuncGeneral(Rc<HostGeneralFn>),
    HostFuncSession(Rc<HostSessionFn>),
    Library(Rc<RefCell<Library>>),
    MatrixReal { rows: usize, cols: usize, data: Vec<f64> },
    MatrixBool { rows: usize, cols: usize, data: Vec<bool> },
    Time(f64),
}

impl Composite {
    pub fn type_name(&self) -> &'static str {
        match self {
            Composite::Pair(..) => "pair",
            Composite::Str(_) => "str",
            Composite::List(_) => "list",
            Composite::Dict(_) => "dict",
            Composite::Iter(_) => "iter",
            Composite::Function(_) => "function",
            Composite::HostFuncGeneral(_) => "host-func-general",
            Composite::HostFuncSession(_) => "host-func-session",
            Composite::Library(_) => "library",
            Composite::MatrixReal { .. } => "matrix-real",
            Composite::MatrixBool { .. } => "matrix-bool",
            Composite::Time(_) => "time",
        }
    }

    pub fn brief_render(&self) -> String {
        match self {
            Composite::Pair(a, b) => format!("{}:{}", a, b),
            Composite::Str(s) => s.clone(),
            Composite::List(v) => {
                format!("[{}]", v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", "))
            }
            Composite::Dict(entries) => format!(
                "{{{}}}",
                entries.iter().map(|(k, v)| format!("{}: {}", k, v)).collect::<Vec<_>>().join(", ")
            ),
            Composite::Iter(_) => "<iter>".to_string(),
            Composite::Function(_) => "<function>".to_string(),
            Composite::HostFuncGeneral(_) => "<host-func>".to_string(),
            Composite::HostFuncSession(_) => "<host-func-session>".to_string(),
            Composite::Library(_) => "<library>".to_string(),
            Composite::MatrixReal { rows, cols, .. } => format!("<matrix {}x{}>", rows, cols),
            Composite::MatrixBool { rows, cols, .. } => format!("<bool-matrix {}x{}>", rows, cols),
            Composite::Time(t) => format!("<time {}>", t),
        }
    }

    pub fn full_render(&self) -> String {
        match self {
            Composite::Str(s) => format!("'{}'", s),
            other => other.brief_render(),
        }
    }

    pub fn length(&self) -> Option<usize> {
        match self {
            Composite::Str(s) => Some(s.chars().count()),
            Composite::List(v) => Some(v.len()),
            Composite::Dict(entries) => Some(entries.len()),
            Composite::MatrixReal { data, .. } => Some(data.len()),
            Composite::MatrixBool { data, .. } => Some(data.len()),
            _ => None,
        }
    }

    pub fn deep_copy(&self) -> Composite {
        match self {
            Composite::Pair(a, b) => Composite::Pair(a.clone(), b.clone()),
            Composite::Str(s) => Composite::Str(s.clone()),
            Composite::List(v) => Composite::List(v.clone()),
            Composite::Dict(entries) => Composite::Dict(entries.clone()),
            Composite::MatrixReal { rows, cols, data } => {
                Composite::MatrixReal { rows: *rows, cols: *cols, data: data.clone() }
            }
            Composite::MatrixBool { rows, cols, data } => {
                Composite::MatrixBool { rows: *rows, cols: *cols, data: data.clone() }
            }
            Composite::Time(t) => Composite::Time(*t),
            // functions, host funcs, libraries, and live iterators are
            // reference-identity objects: "deep copy" is a shallow clone of
            // the handle, matching the reference's treatment of callables.
            Composite::Iter(s) => Composite::Iter(s.clone()),
            Composite::Function(f) => Composite::Function(Rc::clone(f)),
            Composite::HostFuncGeneral(f) => Composite::HostFuncGeneral(Rc::clone(f)),
            Composite::HostFuncSession(f) => Composite::HostFuncSession(Rc::clone(f)),
            Composite::Library(l) => Composite::Library(Rc::clone(l)),
        }
    }

    pub fn structural_eq(&self, other: &Composite) -> bool {
        match (self, other) {
            (Composite::Pair(a1, b1), Composite::Pair(a2, b2)) => a1 == a2 && b1 == b2,
            (Composite::Str(a), Composite::Str(b)) => a == b,
            (Composite::List(a), Composite::List(b)) => a == b,
            (Composite::Dict(a), Composite::Dict(b)) => a == b,
            (Composite::MatrixReal { rows: r1, cols: c1, data: d1 },
             Composite::MatrixReal { rows: r2, cols: c2, data: d2 }) => r1 == r2 && c1 == c2 && d1 == d2,
            (Composite::MatrixBool { rows: r1, cols: c1, data: d1 },
             Composite::MatrixBool { rows: r2, cols: c2, data: d2 }) => r1 == r2 && c1 == c2 && d1 == d2,
            (Composite::Time(a), Composite::Time(b)) => a == b,
            // functions/host-funcs/libraries/iterators compare by identity only.
            (Composite::Function(a), Composite::Function(b)) => Rc::ptr_eq(a, b),
            (Composite::Library(a), Composite::Library(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    // -- indexable --------------------------------------------------------

    pub fn get_index(&self, key: &Value) -> Result<Value, Trace> {
        match self {
            Composite::List(v) => {
                let i = index_as_usize(key, v.len())?;
                Ok(v[i].clone())
            }
            Composite::Dict(entries) => {
                let k = key_as_str(key)?;
                entries
                    .iter()
                    .find(|(k2, _)| k2 == &k)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| Trace::simple(TraceKind::ObjUnfound, &format!("no such key '{}'", k)))
            }
            Composite::Pair(a, b) => match key {
                Value::Int(0) => Ok(a.clone()),
                Value::Int(1) => Ok(b.clone()),
                _ => Err(Trace::simple(TraceKind::InvalidIndex, "pair index must be 0 or 1")),
            },
            Composite::Str(s) => {
                let i = index_as_usize(key, s.chars().count())?;
                Ok(Value::Composite(Rc::new(RefCell::new(Composite::Str(
                    s.chars().nth(i).unwrap().to_string(),
                )))))
            }
            Composite::Library(env) => {
                let k = key_as_str(key)?;
                let node = env.borrow();
                node.library
                    .as_ref()
                    .and_then(|lib| lib.exposed.iter().find(|(k2, _)| k2 == &k))
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| Trace::simple(TraceKind::ObjUnfound, &format!("library does not expose '{}'", k)))
            }
            _ => Err(Trace::simple(TraceKind::RefType, &format!("{} is not indexable", self.type_name()))),
        }
    }

    pub fn set_index(&mut self, key: &Value, value: Value) -> Result<(), Trace> {
        if value.is_nil() {
            return Err(Trace::simple(TraceKind::AssignNil, "cannot store nil into a slot"));
        }
        match self {
            Composite::List(v) => {
                let i = index_as_usize(key, v.len())?;
                v[i] = value;
                Ok(())
            }
            Composite::Dict(entries) => {
                let k = key_as_str(key)?;
                if let Some(slot) = entries.iter_mut().find(|(k2, _)| k2 == &k) {
                    slot.1 = value;
                } else {
                    entries.push((k, value));
                }
                Ok(())
            }
            _ => Err(Trace::simple(TraceKind::RefType, &format!("{} is not settable by index", self.type_name()))),
        }
    }

    // -- iterable -----------------------------------------------------------

    pub fn contains(&self, needle: &Value) -> Result<bool, Trace> {
        match self {
            Composite::List(v) => Ok(v.contains(needle)),
            Composite::Dict(entries) => {
                let k = key_as_str(needle)?;
                Ok(entries.iter().any(|(k2, _)| k2 == &k))
            }
            Composite::Str(s) => {
                if let Value::Composite(c) = needle {
                    if let Composite::Str(needle) = &*c.borrow() {
                        return Ok(s.contains(needle.as_str()));
                    }
                }
                Ok(false)
            }
            _ => Err(Trace::simple(TraceKind::RefType, &format!("{} is not iterable", self.type_name()))),
        }
    }
}

fn index_as_usize(key: &Value, len: usize) -> Result<usize, Trace> {
    match key {
        Value::Int(i) if *i >= 0 && (*i as usize) < len => Ok(*i as usize),
        Value::Int(_) => Err(Trace::simple(TraceKind::IdxOutRange, "index out of range")),
        _ => Err(Trace::simple(TraceKind::InvalidIndex, "index must be an int")),
    }
}

fn key_as_str(key: &Value) -> Result<String, Trace> {
    match key {
        Value::Composite(c) => match &*c.borrow() {
            Composite::Str(s) => Ok(s.clone()),
            _ => Err(Trace::simple(TraceKind::InvalidIndex, "dict key must be a string")),
        },
        _ => Err(Trace::simple(TraceKind::InvalidIndex, "dict key must be a string")),
    }
}

/// Builds the inclusive-range iterable backing `a to b` and `for (x in r)`.
pub fn range_iter(start: i64, end: i64) -> CompositeRef {
    Rc::new(RefCell::new(Composite::Iter(IterState::Range {
        start,
        current: start,
        end,
        exhausted: start > end,
    })))
}

pub fn list_iter(list: CompositeRef) -> CompositeRef {
    Rc::new(RefCell::new(Composite::Iter(IterState::List { list, cursor: 0 })))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn list_get_and_set() {
        let mut list = Composite::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(list.get_index(&Value::Int(1)).unwrap(), Value::Int(2));
        list.set_index(&Value::Int(0), Value::Int(9)).unwrap();
        assert_eq!(list.get_index(&Value::Int(0)).unwrap(), Value::Int(9));
    }

    #[test]
    fn set_nil_is_rejected() {
        let mut list = Composite::List(vec![Value::Int(1)]);
        assert!(list.set_index(&Value::Int(0), Value::Nil).is_err());
    }

    #[test]
    fn range_iteration_is_inclusive() {
        let r = range_iter(0, 2);
        let mut seen = Vec::new();
        loop {
            let more = match &mut *r.borrow_mut() {
                Composite::Iter(s) => s.next(),
                _ => unreachable!(),
            };
            if !more {
                break;
            }
            let v = match &*r.borrow() {
                Composite::Iter(s) => s.current(),
                _ => unreachable!(),
            };
            seen.push(v);
            match &mut *r.borrow_mut() {
                Composite::Iter(s) => s.advance(),
                _ => unreachable!(),
            }
        }
        assert_eq!(seen, vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
    }

    fn drain(r: &CompositeRef) -> Vec<Value> {
        let mut seen = Vec::new();
        loop {
            let more = match &mut *r.borrow_mut() {
                Composite::Iter(s) => s.next(),
                _ => unreachable!(),
            };
            if !more {
                break;
            }
            let v = match &*r.borrow() {
                Composite::Iter(s) => s.current(),
                _ => unreachable!(),
            };
            seen.push(v);
            match &mut *r.borrow_mut() {
                Composite::Iter(s) => s.advance(),
                _ => unreachable!(),
            }
        }
        seen
    }

    #[test]
    fn range_restore_repeats_the_original_sequence() {
        let r = range_iter(1, 3);
        let first_pass = drain(&r);
        match &mut *r.borrow_mut() {
            Composite::Iter(s) => s.restore(),
            _ => unreachable!(),
        }
        let second_pass = drain(&r);
        assert_eq!(first_pass, second_pass);
        assert_eq!(second_pass, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }
}
