//! `time`: wall-clock access (spec §1's external-collaborator stdlib,
//! `time` composite per spec §3's closed composite set).

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::common::data::Value;
use crate::vm::composite::Composite;
use crate::vm::trace::Trace;

pub fn register(bindings: &mut Vec<(String, Value)>) {
    let time_fn = Composite::HostFuncGeneral(Rc::new(|_vm, _args| -> Result<Value, Trace> {
        let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0);
        Ok(Value::Composite(Rc::new(RefCell::new(Composite::Time(secs)))))
    }));
    bindings.push(("time".to_string(), Value::Composite(Rc::new(RefCell::new(time_fn)))));
}
