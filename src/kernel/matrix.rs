//! The numerical-array extension (spec §1's "matrix primitives" external
//! collaborator), reduced to one constructor: enough for `@` (`MMUL`) to have
//! something to operate on, matching spec.md's framing that the matrix
//! extension's individual operations beyond that are unspecified.

use std::cell::RefCell;
use std::rc::Rc;

use crate::common::data::Value;
use crate::vm::composite::Composite;
use crate::vm::trace::{Trace, TraceKind};

pub fn register(bindings: &mut Vec<(String, Value)>) {
    let matrix_fn = Composite::HostFuncGeneral(Rc::new(|_vm, args| -> Result<Value, Trace> {
        let rows_value = args
            .into_iter()
            .next()
            .ok_or_else(|| Trace::simple(TraceKind::ParamsCtr, "expected a list of rows"))?;
        let Value::Composite(outer) = &rows_value else {
            return Err(Trace::simple(TraceKind::RefType, "matrix requires a list of rows"));
        };
        let Composite::List(rows) = &*outer.borrow() else {
            return Err(Trace::simple(TraceKind::RefType, "matrix requires a list of rows"));
        };
        let nrows = rows.len();
        let mut ncols = None;
        let mut data = Vec::new();
        for row in rows {
            let Value::Composite(rc) = row else {
                return Err(Trace::simple(TraceKind::RefType, "each matrix row must be a list"));
            };
            let Composite::List(cells) = &*rc.borrow() else {
                return Err(Trace::simple(TraceKind::RefType, "each matrix row must be a list"));
            };
            match ncols {
                None => ncols = Some(cells.len()),
                Some(n) if n != cells.len() => {
                    return Err(Trace::simple(TraceKind::LenInconsis, "matrix rows have inconsistent lengths"));
                }
                _ => {}
            }
            for cell in cells {
                let f = match cell {
                    Value::Int(i) => *i as f64,
                    Value::Float(f) => *f,
                    _ => return Err(Trace::simple(TraceKind::RefType, "matrix cells must be numeric")),
                };
                data.push(f);
            }
        }
        Ok(Value::Composite(Rc::new(RefCell::new(Composite::MatrixReal {
            rows: nrows,
            cols: ncols.unwrap_or(0),
            data,
        }))))
    }));
    bindings.push(("matrix".to_string(), Value::Composite(Rc::new(RefCell::new(matrix_fn)))));
}
