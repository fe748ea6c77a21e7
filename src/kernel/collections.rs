//! List/dict helpers (spec §1's external-collaborator stdlib).

use std::cell::RefCell;
use std::rc::Rc;

use crate::common::data::Value;
use crate::vm::composite::Composite;
use crate::vm::trace::{Trace, TraceKind};

fn expect_args2(args: Vec<Value>) -> Result<(Value, Value), Trace> {
    let mut it = args.into_iter();
    let a = it.next().ok_or_else(|| Trace::simple(TraceKind::ParamsCtr, "expected two arguments"))?;
    let b = it.next().ok_or_else(|| Trace::simple(TraceKind::ParamsCtr, "expected two arguments"))?;
    Ok((a, b))
}

pub fn register(bindings: &mut Vec<(String, Value)>) {
    let len_fn = Composite::HostFuncGeneral(Rc::new(|_vm, args| -> Result<Value, Trace> {
        let v = args
            .into_iter()
            .next()
            .ok_or_else(|| Trace::simple(TraceKind::ParamsCtr, "expected one argument"))?;
        let len = match &v {
            Value::Composite(c) => c
                .borrow()
                .length()
                .ok_or_else(|| Trace::simple(TraceKind::LenInconsis, "value has no semantic length"))?,
            _ => return Err(Trace::simple(TraceKind::RefType, "value has no semantic length")),
        };
        Ok(Value::Int(len as i64))
    }));
    bindings.push(("len".to_string(), Value::Composite(Rc::new(RefCell::new(len_fn)))));

    let push_fn = Composite::HostFuncGeneral(Rc::new(|_vm, args| -> Result<Value, Trace> {
        let (list, item) = expect_args2(args)?;
        match &list {
            Value::Composite(c) => {
                let mut node = c.borrow_mut();
                match &mut *node {
                    Composite::List(v) => {
                        v.push(item);
                        Ok(())
                    }
                    _ => Err(Trace::simple(TraceKind::RefType, "push requires a list")),
                }
            }
            _ => Err(Trace::simple(TraceKind::RefType, "push requires a list")),
        }?;
        Ok(list)
    }));
    bindings.push(("push".to_string(), Value::Composite(Rc::new(RefCell::new(push_fn)))));

    let keys_fn = Composite::HostFuncGeneral(Rc::new(|_vm, args| -> Result<Value, Trace> {
        let v = args
            .into_iter()
            .next()
            .ok_or_else(|| Trace::simple(TraceKind::ParamsCtr, "expected one argument"))?;
        match &v {
            Value::Composite(c) => match &*c.borrow() {
                Composite::Dict(entries) => {
                    let keys = entries
                        .iter()
                        .map(|(k, _)| Value::Composite(Rc::new(RefCell::new(Composite::Str(k.clone())))))
                        .collect();
                    Ok(Value::Composite(Rc::new(RefCell::new(Composite::List(keys)))))
                }
                _ => Err(Trace::simple(TraceKind::RefType, "keys requires a dict")),
            },
            _ => Err(Trace::simple(TraceKind::RefType, "keys requires a dict")),
        }
    }));
    bindings.push(("keys".to_string(), Value::Composite(Rc::new(RefCell::new(keys_fn)))));

    let values_fn = Composite::HostFuncGeneral(Rc::new(|_vm, args| -> Result<Value, Trace> {
        let v = args
            .into_iter()
            .next()
            .ok_or_else(|| Trace::simple(TraceKind::ParamsCtr, "expected one argument"))?;
        match &v {
            Value::Composite(c) => match &*c.borrow() {
                Composite::Dict(entries) => {
                    let values = entries.iter().map(|(_, v)| v.clone()).collect();
                    Ok(Value::Composite(Rc::new(RefCell::new(Composite::List(values)))))
                }
                _ => Err(Trace::simple(TraceKind::RefType, "values requires a dict")),
            },
            _ => Err(Trace::simple(TraceKind::RefType, "values requires a dict")),
        }
    }));
    bindings.push(("values".to_string(), Value::Composite(Rc::new(RefCell::new(values_fn)))));
}
