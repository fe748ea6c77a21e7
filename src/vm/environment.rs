//! The environment tree (spec §3): named-slot object arrays chained by
//! parent pointers, with libraries as a specialized root node.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::common::artifact::Artifact;
use crate::common::data::Value;
use crate::vm::trace::{Trace, TraceKind};

pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Function,
    Library,
    Other,
}

/// Extra state a library-category environment carries on top of a plain
/// node's object array and parent pointer (spec §3 "Library").
pub struct LibraryExt {
    pub artifact: Option<Rc<Artifact>>,
    pub search_paths: Vec<PathBuf>,
    pub exposed: Vec<(String, Value)>,
    /// The built-ins the host registered before any user code ran, in
    /// declaration order — both their names (so a nested compiler can
    /// pre-seed its named table to match) and their values (so a sibling
    /// library created for an import starts with the same bindings).
    pub default_names: Vec<String>,
    pub default_values: Vec<Value>,
}

pub struct Environment {
    pub objects: Vec<Value>,
    pub parent: Option<EnvRef>,
    pub category: Category,
    pub library: Option<LibraryExt>,
}

/// A library is just an environment in the library category; kept as a
/// type alias so call sites documenting intent can say `Library` while the
/// tree-walking code stays uniform over `Environment`.
pub type Library = Environment;

const MAX_CHAIN_DEPTH: usize = 1 << 20;

impl Environment {
    pub fn root_library(
        search_paths: Vec<PathBuf>,
        default_names: Vec<String>,
        default_values: Vec<Value>,
    ) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            objects: default_values.clone(),
            parent: None,
            category: Category::Library,
            library: Some(LibraryExt {
                artifact: None,
                search_paths,
                exposed: Vec::new(),
                default_names,
                default_values,
            }),
        }))
    }

    /// A fresh library seeded with the same default bindings as `self`,
    /// for `import` (spec §4.5: "constructs a new library sharing the
    /// current library's default-name registrations only").
    pub fn sibling_library(&self) -> EnvRef {
        let (search_paths, default_names, default_values) = self
            .library
            .as_ref()
            .map(|l| (l.search_paths.clone(), l.default_names.clone(), l.default_values.clone()))
            .unwrap_or_default();
        Environment::root_library(search_paths, default_names, default_values)
    }

    pub fn child(parent: &EnvRef, category: Category) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            objects: Vec::new(),
            parent: Some(Rc::clone(parent)),
            category,
            library: None,
        }))
    }

    /// Checks the parent chain terminates within a generous bound, per
    /// spec §3's "environment's parent chain is acyclic" invariant.
    pub fn check_acyclic(env: &EnvRef) -> Result<(), Trace> {
        let mut current = Rc::clone(env);
        for _ in 0..MAX_CHAIN_DEPTH {
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return Ok(()),
            }
        }
        Err(Trace::simple(TraceKind::LoopRef, "environment parent chain did not terminate"))
    }
}

/// Reads the named slot at linear offset `offset` from `env`'s own object
/// array, recursing to the parent when the offset exceeds the local length.
pub fn get(env: &EnvRef, offset: u32) -> Result<Value, Trace> {
    let node = env.borrow();
    let local_len = node.objects.len() as u32;
    if offset < local_len {
        Ok(node.objects[offset as usize].clone())
    } else if let Some(parent) = &node.parent {
        get(parent, offset - local_len)
    } else {
        Err(Trace::simple(TraceKind::EnvInconsis, "named slot offset exceeds the environment chain"))
    }
}

pub fn set(env: &EnvRef, offset: u32, value: Value) -> Result<(), Trace> {
    let local_len = env.borrow().objects.len() as u32;
    if offset < local_len {
        env.borrow_mut().objects[offset as usize] = value;
        Ok(())
    } else {
        let parent = env.borrow().parent.clone();
        match parent {
            Some(p) => set(&p, offset - local_len, value),
            None => Err(Trace::simple(TraceKind::EnvInconsis, "named slot offset exceeds the environment chain")),
        }
    }
}

/// Grows the object array to make room for `index`, used by `VCRT` when a
/// new named slot is declared at an offset the array hasn't reached yet.
pub fn ensure_local_slot(env: &EnvRef, index: u32) {
    let mut node = env.borrow_mut();
    let needed = index as usize + 1;
    if node.objects.len() < needed {
        node.objects.resize(needed, Value::Nil);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slot_lookup_crosses_to_parent() {
        let root = Environment::root_library(Vec::new(), Vec::new(), Vec::new());
        root.borrow_mut().objects = vec![Value::Int(1), Value::Int(2)];
        let child = Environment::child(&root, Category::Function);
        ensure_local_slot(&child, 0);
        child.borrow_mut().objects[0] = Value::Int(10);

        assert_eq!(get(&child, 0).unwrap(), Value::Int(10));
        assert_eq!(get(&child, 1).unwrap(), Value::Int(1));
        assert_eq!(get(&child, 2).unwrap(), Value::Int(2));
    }

    #[test]
    fn acyclic_chain_terminates() {
        let root = Environment::root_library(Vec::new(), Vec::new(), Vec::new());
        let child = Environment::child(&root, Category::Other);
        assert!(Environment::check_acyclic(&child).is_ok());
    }
}
