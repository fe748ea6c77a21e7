//! String/number conversions ("string conversions" in spec §1's external
//! collaborator list).

use std::cell::RefCell;
use std::rc::Rc;

use crate::common::data::Value;
use crate::vm::composite::Composite;
use crate::vm::trace::{Trace, TraceKind};

fn arg1(args: Vec<Value>) -> Result<Value, Trace> {
    let mut it = args.into_iter();
    it.next().ok_or_else(|| Trace::simple(TraceKind::ParamsCtr, "expected one argument"))
}

pub fn register(bindings: &mut Vec<(String, Value)>) {
    let str_fn = Composite::HostFuncGeneral(Rc::new(|_vm, args| -> Result<Value, Trace> {
        let v = arg1(args)?;
        Ok(Value::Composite(Rc::new(RefCell::new(Composite::Str(v.to_string())))))
    }));
    bindings.push(("str".to_string(), Value::Composite(Rc::new(RefCell::new(str_fn)))));

    let int_fn = Composite::HostFuncGeneral(Rc::new(|_vm, args| -> Result<Value, Trace> {
        match arg1(args)? {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Float(f) => Ok(Value::Int(f as i64)),
            Value::Composite(c) => match &*c.borrow() {
                Composite::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| Trace::simple(TraceKind::ParamsType, "string does not parse as an int")),
                _ => Err(Trace::simple(TraceKind::ParamsType, "value cannot be converted to int")),
            },
            _ => Err(Trace::simple(TraceKind::ParamsType, "value cannot be converted to int")),
        }
    }));
    bindings.push(("int".to_string(), Value::Composite(Rc::new(RefCell::new(int_fn)))));

    let float_fn = Composite::HostFuncGeneral(Rc::new(|_vm, args| -> Result<Value, Trace> {
        match arg1(args)? {
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Composite(c) => match &*c.borrow() {
                Composite::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| Trace::simple(TraceKind::ParamsType, "string does not parse as a float")),
                _ => Err(Trace::simple(TraceKind::ParamsType, "value cannot be converted to float")),
            },
            _ => Err(Trace::simple(TraceKind::ParamsType, "value cannot be converted to float")),
        }
    }));
    bindings.push(("float".to_string(), Value::Composite(Rc::new(RefCell::new(float_fn)))));
}
