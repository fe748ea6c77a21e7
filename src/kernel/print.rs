//! `print`: the one built-in the boundary scenarios exercise directly.
//! Blocks on the host's standard output, per spec §6's "Blocking" note.

use std::cell::RefCell;
use std::rc::Rc;

use crate::common::data::Value;
use crate::vm::composite::Composite;
use crate::vm::trace::Trace;

pub fn register(bindings: &mut Vec<(String, Value)>) {
    let print = Composite::HostFuncGeneral(Rc::new(|_vm, args| -> Result<Value, Trace> {
        let rendered = args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
        println!("{}", rendered);
        Ok(Value::Nil)
    }));
    bindings.push(("print".to_string(), Value::Composite(Rc::new(RefCell::new(print)))));
}
