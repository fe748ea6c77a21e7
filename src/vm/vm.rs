//! The stack-based virtual machine (spec §4.5).

use std::cell::RefCell;
use std::rc::Rc;

use crate::common::artifact::{index_of, Artifact};
use crate::common::data::Value;
use crate::common::opcode::{Opcode, Operands};
use crate::vm::composite::{
    range_iter, Composite, CompositeRef, FunctionData, IterState, UNDEF_NPARAMS,
};
use crate::vm::environment::{self, Category, EnvRef, Environment};
use crate::vm::trace::{Trace, TraceKind};

/// One live call: the instruction window it executes over (a slice of a
/// shared artifact, per §4.3's "append inline" closure compilation), its
/// environment, its evaluation stack, and its temporary array.
struct CallFrame {
    artifact: Rc<Artifact>,
    env: EnvRef,
    eval: Vec<Value>,
    temp: Vec<Value>,
    pc: usize,
    end_pc: usize,
    /// Values staged by `PUSHINFO`, drained by whichever opcode follows:
    /// one value for a fused binary op's origin code, or four (named_max,
    /// temp_max, stack_max, param_count) for a `PUSHF` preamble.
    pending_info: Vec<u32>,
}

impl CallFrame {
    fn top_level(artifact: Rc<Artifact>, env: EnvRef) -> CallFrame {
        let end_pc = artifact.instructions.len();
        CallFrame {
            eval: Vec::with_capacity(artifact.header.stack_max as usize),
            temp: vec![Value::Nil; artifact.header.temp_max as usize],
            artifact,
            env,
            pc: 0,
            end_pc,
            pending_info: Vec::new(),
        }
    }

    fn closure(func: &FunctionData, env: EnvRef) -> CallFrame {
        CallFrame {
            eval: Vec::with_capacity(func.stack_max as usize),
            temp: vec![Value::Nil; func.temp_max as usize],
            artifact: Rc::clone(&func.artifact),
            env,
            pc: func.base_pc,
            end_pc: func.end_pc,
            pending_info: Vec::new(),
        }
    }

    fn pop(&mut self) -> Result<Value, Trace> {
        self.eval.pop().ok_or_else(|| Trace::simple(TraceKind::Other, "evaluation stack underflow"))
    }

    /// Reads an L/R binary-op operand: `isenv=0` reads the current frame's
    /// temporary array at `loc`; `isenv=1` reads the environment chain.
    /// `0` in either position (with no corresponding PUSHINFO origin bit)
    /// means "read from the evaluation stack instead" — callers check the
    /// pending origin code to know which.
    fn read_located(&self, loc: u32, isenv: u32) -> Result<Value, Trace> {
        if isenv == 0 {
            self.temp
                .get(index_of(loc))
                .cloned()
                .ok_or_else(|| Trace::simple(TraceKind::EnvInconsis, "temp slot out of range"))
        } else {
            environment::get(&self.env, loc)
        }
    }

    fn write_located(&mut self, loc: u32, isenv: u32, value: Value) -> Result<(), Trace> {
        if isenv == 0 {
            let i = index_of(loc);
            if i >= self.temp.len() {
                return Err(Trace::simple(TraceKind::EnvInconsis, "temp slot out of range"));
            }
            self.temp[i] = value;
            Ok(())
        } else {
            environment::set(&self.env, loc, value)
        }
    }
}

pub struct Vm {
    pub root: EnvRef,
}

impl Vm {
    pub fn new(root: EnvRef) -> Vm {
        Vm { root }
    }

    pub fn run(&mut self, artifact: Rc<Artifact>, env: EnvRef) -> Result<Value, Trace> {
        let mut frame = CallFrame::top_level(artifact, env);
        self.exec(&mut frame)
    }

    fn exec(&mut self, frame: &mut CallFrame) -> Result<Value, Trace> {
        while frame.pc < frame.end_pc {
            let self_idx = frame.pc;
            let ins = frame.artifact.instructions[self_idx];
            frame.pc += 1;

            match ins.opcode {
                Opcode::Pass => {}
                Opcode::This | Opcode::Base => frame.eval.push(Value::Nil),
                Opcode::Break | Opcode::Conti | Opcode::TmpDel => {}
                Opcode::Ret => {
                    return Ok(frame.eval.pop().unwrap_or(Value::Nil));
                }
                Opcode::In => {
                    let needle = frame.pop()?;
                    let haystack = frame.pop()?;
                    let found = match &haystack {
                        Value::Composite(c) => c.borrow().contains(&needle)?,
                        _ => return Err(Trace::simple(TraceKind::RefType, "'in' requires a composite right operand")),
                    };
                    frame.eval.push(Value::Bool(found));
                }
                Opcode::Pair => {
                    let b = frame.pop()?;
                    let a = frame.pop()?;
                    frame.eval.push(Value::Composite(Rc::new(RefCell::new(Composite::Pair(a, b)))));
                }
                Opcode::To => {
                    let end = frame.pop()?;
                    let start = frame.pop()?;
                    let (s, e) = (as_int(&start)?, as_int(&end)?);
                    frame.eval.push(Value::Composite(range_iter(s, e)));
                }

                Opcode::Jpf => {
                    let Operands::U(n) = ins.operands else { unreachable!() };
                    frame.pc = self_idx + n as usize;
                }
                Opcode::Jpb => {
                    let Operands::U(n) = ins.operands else { unreachable!() };
                    frame.pc = self_idx - n as usize;
                }
                Opcode::CjpfPop => {
                    let Operands::U(n) = ins.operands else { unreachable!() };
                    let cond = as_bool(&frame.pop()?)?;
                    if !cond {
                        frame.pc = self_idx + n as usize;
                    }
                }
                Opcode::CjpbPop => {
                    let Operands::U(n) = ins.operands else { unreachable!() };
                    let cond = as_bool(&frame.pop()?)?;
                    if cond {
                        frame.pc = self_idx - n as usize;
                    }
                }

                Opcode::PushI => {
                    let Operands::U(i) = ins.operands else { unreachable!() };
                    frame.eval.push(Value::Int(frame.artifact.ints[index_of(i)]));
                }
                Opcode::PushD => {
                    let Operands::U(i) = ins.operands else { unreachable!() };
                    frame.eval.push(Value::Float(frame.artifact.floats[index_of(i)]));
                }
                Opcode::PushB => {
                    let Operands::U(b) = ins.operands else { unreachable!() };
                    frame.eval.push(Value::Bool(b != 0));
                }
                Opcode::PushS => {
                    let Operands::U(i) = ins.operands else { unreachable!() };
                    let s = frame.artifact.strings[index_of(i)].clone();
                    frame.eval.push(Value::Composite(Rc::new(RefCell::new(Composite::Str(s)))));
                }
                Opcode::PushDict => {
                    let Operands::U(n) = ins.operands else { unreachable!() };
                    let mut entries = Vec::with_capacity(index_of(n));
                    for _ in 0..n {
                        let value = frame.pop()?;
                        let key = frame.pop()?;
                        let key = match &key {
                            Value::Composite(c) => match &*c.borrow() {
                                Composite::Str(s) => s.clone(),
                                _ => return Err(Trace::simple(TraceKind::InvalidIndex, "dict key must be a string")),
                            },
                            _ => return Err(Trace::simple(TraceKind::InvalidIndex, "dict key must be a string")),
                        };
                        entries.push((key, value));
                    }
                    entries.reverse();
                    frame.eval.push(Value::Composite(Rc::new(RefCell::new(Composite::Dict(entries)))));
                }
                Opcode::PushInfo => {
                    let Operands::U(code) = ins.operands else { unreachable!() };
                    frame.pending_info.push(code);
                }
                Opcode::Import => {
                    let Operands::U(i) = ins.operands else { unreachable!() };
                    let path = frame.artifact.strings[index_of(i)].clone();
                    let lib = self.import_module(frame, &path)?;
                    frame.eval.push(lib);
                }
                Opcode::IdxR => {
                    // stack: [..args.., obj] — obj is pushed last, on top.
                    let Operands::U(n) = ins.operands else { unreachable!() };
                    let obj = frame.pop()?;
                    let mut args = Vec::with_capacity(index_of(n));
                    for _ in 0..n {
                        args.push(frame.pop()?);
                    }
                    args.reverse();
                    let key = args.into_iter().next().unwrap_or(Value::Nil);
                    let result = match &obj {
                        Value::Composite(c) => c.borrow().get_index(&key)?,
                        _ => return Err(Trace::simple(TraceKind::RefType, "value is not indexable")),
                    };
                    frame.eval.push(result);
                }
                Opcode::Eval | Opcode::EvalSf | Opcode::EvalCf | Opcode::EvalTf => {
                    // stack: [..args.., callee] — callee is pushed last, on top.
                    let Operands::U(n) = ins.operands else { unreachable!() };
                    let callee = frame.pop()?;
                    let mut args = Vec::with_capacity(index_of(n));
                    for _ in 0..n {
                        args.push(frame.pop()?);
                    }
                    args.reverse();
                    let result = self.call(&callee, args)?;
                    frame.eval.push(result);
                }
                Opcode::PushF => {
                    // the 4-value PUSHINFO preamble and the body both sit
                    // immediately before this instruction in the shared
                    // stream (the compiler jumps the enclosing code over
                    // both when the literal is merely declared).
                    let Operands::U(ncmds) = ins.operands else { unreachable!() };
                    if frame.pending_info.len() != 4 {
                        return Err(Trace::simple(TraceKind::Other, "PUSHF missing its PUSHINFO preamble"));
                    }
                    let mut info = frame.pending_info.drain(..);
                    let named_max = info.next().unwrap();
                    let temp_max = info.next().unwrap();
                    let stack_max = info.next().unwrap();
                    let param_count = info.next().unwrap();
                    drop(info);
                    let end_pc = self_idx - 4;
                    let base_pc = end_pc - index_of(ncmds);
                    let func = FunctionData {
                        artifact: Rc::clone(&frame.artifact),
                        captured: Rc::clone(&frame.env),
                        base_pc,
                        end_pc,
                        named_max,
                        temp_max,
                        stack_max: stack_max as u8,
                        param_count,
                    };
                    frame.eval.push(Value::Composite(Rc::new(RefCell::new(Composite::Function(Rc::new(func))))));
                }

                Opcode::Vcrt => {
                    let Operands::CP(nameloc, isenv) = ins.operands else { unreachable!() };
                    if isenv == 0 {
                        if index_of(nameloc) >= frame.temp.len() {
                            frame.temp.resize(index_of(nameloc) + 1, Value::Nil);
                        }
                        frame.temp[index_of(nameloc)] = Value::Nil;
                    } else {
                        environment::ensure_local_slot(&frame.env, nameloc);
                    }
                }
                Opcode::PopN => {
                    let Operands::LR(n, _print) = ins.operands else { unreachable!() };
                    for _ in 0..n {
                        frame.pop()?;
                    }
                }
                Opcode::PopCov => {
                    let Operands::LR(loc, isenv) = ins.operands else { unreachable!() };
                    let value = frame.pop()?;
                    frame.write_located(loc, isenv, value)?;
                }
                Opcode::PushX => {
                    let Operands::LR(loc, isenv) = ins.operands else { unreachable!() };
                    frame.eval.push(frame.read_located(loc, isenv)?);
                }
                Opcode::LoopAs | Opcode::LoopIAs | Opcode::LoopLAs | Opcode::LoopGAs => {
                    let Operands::LR(loc, isenv) = ins.operands else { unreachable!() };
                    let iterable = frame.eval.last().cloned().ok_or_else(|| {
                        Trace::simple(TraceKind::Other, "loop iterable missing from stack")
                    })?;
                    let Value::Composite(c) = &iterable else {
                        return Err(Trace::simple(TraceKind::RefType, "for-loop target is not iterable"));
                    };
                    let (has_more, current) = {
                        let mut inner = c.borrow_mut();
                        let Composite::Iter(state) = &mut *inner else {
                            return Err(Trace::simple(TraceKind::RefType, "for-loop target is not an iterator"));
                        };
                        let has_more = state.next();
                        let current = if has_more { Some(state.current()) } else { None };
                        if has_more {
                            state.advance();
                        } else {
                            state.restore();
                        }
                        (has_more, current)
                    };
                    if has_more {
                        frame.write_located(loc, isenv, current.unwrap())?;
                    }
                    frame.eval.push(Value::Bool(has_more));
                }

                Opcode::IdxL => {
                    let Operands::LBI(loc, nargs, isenv) = ins.operands else { unreachable!() };
                    let mut args = Vec::with_capacity(index_of(nargs));
                    for _ in 0..nargs {
                        args.push(frame.pop()?);
                    }
                    args.reverse();
                    let value = frame.pop()?;
                    let key = args.into_iter().next().unwrap_or(Value::Nil);
                    let obj = frame.read_located(loc, isenv)?;
                    match &obj {
                        Value::Composite(c) => c.borrow_mut().set_index(&key, value)?,
                        _ => return Err(Trace::simple(TraceKind::RefType, "value is not settable by index")),
                    }
                }

                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Pow
                | Opcode::MMul | Opcode::Eq | Opcode::Ne | Opcode::Ge | Opcode::Sg | Opcode::Le
                | Opcode::Sl | Opcode::And | Opcode::Or => {
                    let Operands::LR(l, r) = ins.operands else { unreachable!() };
                    let origin = frame.pending_info.pop().unwrap_or(0);
                    frame.pending_info.clear();
                    let (lv, rv) = self.binop_operands(frame, origin, l, r)?;
                    let result = apply_binop(ins.opcode, &lv, &rv)?;
                    frame.eval.push(result);
                }
            }
        }
        Ok(Value::Nil)
    }

    /// Reads the two operands for a (possibly fused) binary op according to
    /// the 0–8 origin-kind code left by the preceding `PUSHINFO`.
    fn binop_operands(&self, frame: &mut CallFrame, origin: u32, l: u32, r: u32) -> Result<(Value, Value), Trace> {
        // origin kinds: 0 value-value, 3 named-named, 4 temp-named,
        // 6 temp-temp, 8 named-temp (see compiler::compile::Compiler::origin_kind).
        let (left, right) = match origin {
            3 => (environment::get(&frame.env, l)?, environment::get(&frame.env, r)?),
            4 => (frame.temp[index_of(l)].clone(), environment::get(&frame.env, r)?),
            6 => (frame.temp[index_of(l)].clone(), frame.temp[index_of(r)].clone()),
            8 => (environment::get(&frame.env, l)?, frame.temp[index_of(r)].clone()),
            _ => (frame.pop()?, frame.pop()?).swap(),
        };
        Ok((left, right))
    }

    fn import_module(&mut self, frame: &mut CallFrame, path: &str) -> Result<Value, Trace> {
        let nearest = nearest_library(&frame.env)
            .ok_or_else(|| Trace::simple(TraceKind::ObjUnfound, "no enclosing library to import from"))?;

        let search_paths = nearest.borrow().library.as_ref().map(|l| l.search_paths.clone()).unwrap_or_default();
        let resolved = resolve_import_path(path, &search_paths)
            .ok_or_else(|| Trace::simple(TraceKind::ObjUnfound, &format!("module not found: {}", path)))?;

        let source = crate::common::source::Source::path(&resolved)
            .map_err(|e| Trace::simple(TraceKind::Other, &format!("cannot read module: {}", e)))?;

        // a nested compiler seeded with only the host's default names, not
        // the importer's locals (spec §4.5's "no access to the importer's
        // locals").
        let default_names = nearest.borrow().library.as_ref().map(|l| l.default_names.clone()).unwrap_or_default();
        let mut compiler = crate::compiler::Compiler::with_defaults(&default_names);
        let artifact = compiler
            .compile_source(&source)
            .map_err(|e| Trace::simple(TraceKind::Other, &format!("module failed to compile: {}", e)))?;

        let lib_env = nearest.borrow().sibling_library();
        let result = self.run(Rc::new(artifact), Rc::clone(&lib_env))?;

        if let Some(ext) = &mut lib_env.borrow_mut().library {
            match &result {
                Value::Composite(c) => {
                    if let Composite::Dict(entries) = &*c.borrow() {
                        ext.exposed = entries.clone();
                    }
                }
                _ => ext.exposed = Vec::new(),
            }
        }
        Ok(Value::Composite(Rc::new(RefCell::new(Composite::Library(lib_env)))))
    }

    fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, Trace> {
        let Value::Composite(c) = callee else {
            return Err(Trace::simple(TraceKind::RefType, "value is not callable"));
        };
        let composite = Rc::clone(c);
        let borrowed = composite.borrow();
        match &*borrowed {
            Composite::Function(func) => {
                let func = Rc::clone(func);
                drop(borrowed);
                self.call_closure(&func, args)
            }
            Composite::HostFuncGeneral(f) => {
                let f = Rc::clone(f);
                drop(borrowed);
                f(self, args)
            }
            Composite::HostFuncSession(f) => {
                let f = Rc::clone(f);
                let env = Rc::clone(&self.root);
                drop(borrowed);
                f(self, &env, args)
            }
            _ => Err(Trace::simple(TraceKind::RefType, "value is not callable")),
        }
    }

    fn call_closure(&mut self, func: &FunctionData, args: Vec<Value>) -> Result<Value, Trace> {
        if func.param_count != UNDEF_NPARAMS && args.len() as u32 != func.param_count {
            return Err(Trace::simple(TraceKind::ParamsCtr, "wrong number of arguments"));
        }
        let env = Environment::child(&func.captured, Category::Function);
        Environment::check_acyclic(&env)?;
        {
            let mut node = env.borrow_mut();
            node.objects = vec![Value::Nil; func.named_max as usize];
            for (i, a) in args.into_iter().enumerate() {
                if i < node.objects.len() {
                    node.objects[i] = a;
                }
            }
        }
        let mut frame = CallFrame::closure(func, env);
        self.exec(&mut frame)
    }
}

/// Walks the environment chain outward for the nearest library-category
/// node. A function's captured environment is never itself a library, so
/// `import` inside a closure must look past it to whichever library it was
/// ultimately compiled or invoked under.
fn nearest_library(env: &EnvRef) -> Option<EnvRef> {
    let mut current = Rc::clone(env);
    loop {
        let is_library = current.borrow().library.is_some();
        if is_library {
            return Some(current);
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => return None,
        }
    }
}

/// Resolves an import path against `.` then each search directory, trying
/// `<base>/<path>/__init__.tap` before `<base>/<path>` at each step (spec §4.5).
fn resolve_import_path(path: &str, search_paths: &[std::path::PathBuf]) -> Option<std::path::PathBuf> {
    use std::path::Path;
    let probes = |base: &Path| -> [std::path::PathBuf; 2] {
        [base.join(path).join("__init__.tap"), base.join(path)]
    };
    std::iter::once(Path::new(".").to_path_buf())
        .chain(search_paths.iter().cloned())
        .flat_map(|base| probes(&base).into_iter().collect::<Vec<_>>())
        .find(|c| c.exists())
}

fn as_int(v: &Value) -> Result<i64, Trace> {
    match v {
        Value::Int(i) => Ok(*i),
        _ => Err(Trace::simple(TraceKind::RefType, "expected an int")),
    }
}

fn as_bool(v: &Value) -> Result<bool, Trace> {
    match v {
        Value::Bool(b) => Ok(*b),
        _ => Err(Trace::simple(TraceKind::RefType, "expected a bool")),
    }
}

fn apply_binop(opcode: Opcode, l: &Value, r: &Value) -> Result<Value, Trace> {
    use Opcode::*;
    match opcode {
        Eq => return Ok(Value::Bool(l == r)),
        Ne => return Ok(Value::Bool(!(l == r))),
        _ => {}
    }
    match opcode {
        Ge | Sg | Le | Sl => return compare(opcode, l, r),
        And | Or => return logical(opcode, l, r),
        _ => {}
    }
    arithmetic(opcode, l, r)
}

fn compare(opcode: Opcode, l: &Value, r: &Value) -> Result<Value, Trace> {
    let (lf, rf) = (as_number(l)?, as_number(r)?);
    let result = match opcode {
        Opcode::Ge => lf >= rf,
        Opcode::Sg => lf > rf,
        Opcode::Le => lf <= rf,
        Opcode::Sl => lf < rf,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn logical(opcode: Opcode, l: &Value, r: &Value) -> Result<Value, Trace> {
    let (lb, rb) = (as_bool(l)?, as_bool(r)?);
    Ok(Value::Bool(match opcode {
        Opcode::And => lb && rb,
        Opcode::Or => lb || rb,
        _ => unreachable!(),
    }))
}

fn as_number(v: &Value) -> Result<f64, Trace> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        _ => Err(Trace::simple(TraceKind::RefType, "expected a number")),
    }
}

fn arithmetic(opcode: Opcode, l: &Value, r: &Value) -> Result<Value, Trace> {
    use Opcode::*;
    if let (Value::Composite(lc), _) = (l, r) {
        if matches!(opcode, Add) {
            if let (Composite::Str(a), Value::Composite(rc)) = (&*lc.borrow(), r) {
                if let Composite::Str(b) = &*rc.borrow() {
                    return Ok(Value::Composite(Rc::new(RefCell::new(Composite::Str(format!("{}{}", a, b))))));
                }
            }
            if let Composite::List(a) = &*lc.borrow() {
                if let Value::Composite(rc) = r {
                    if let Composite::List(b) = &*rc.borrow() {
                        let mut v = a.clone();
                        v.extend(b.clone());
                        return Ok(Value::Composite(Rc::new(RefCell::new(Composite::List(v)))));
                    }
                }
            }
        }
        if matches!(opcode, Sub) {
            if let Composite::Time(a) = &*lc.borrow() {
                if let Value::Composite(rc) = r {
                    if let Composite::Time(b) = &*rc.borrow() {
                        return Ok(Value::Float(a - b));
                    }
                }
            }
        }
        if matches!(opcode, MMul) {
            if let Composite::MatrixReal { rows: lr, cols: lc_, data: ldata } = &*lc.borrow() {
                if let Value::Composite(rc) = r {
                    if let Composite::MatrixReal { rows: rr, cols: rc_, data: rdata } = &*rc.borrow() {
                        if lc_ != rr {
                            return Err(Trace::simple(TraceKind::InvalidIndex, "matrix dimensions do not match for multiplication"));
                        }
                        let mut out = vec![0.0; lr * rc_];
                        for i in 0..*lr {
                            for j in 0..*rc_ {
                                let mut acc = 0.0;
                                for k in 0..*lc_ {
                                    acc += ldata[i * lc_ + k] * rdata[k * rc_ + j];
                                }
                                out[i * rc_ + j] = acc;
                            }
                        }
                        return Ok(Value::Composite(Rc::new(RefCell::new(Composite::MatrixReal {
                            rows: *lr,
                            cols: *rc_,
                            data: out,
                        }))));
                    }
                }
            }
            return Err(Trace::simple(TraceKind::RefType, "matrix-multiply requires composite operands"));
        }
    }
    if matches!(opcode, MMul) {
        return Err(Trace::simple(TraceKind::RefType, "matrix-multiply requires composite operands"));
    }
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => match opcode {
            Add => Ok(Value::Int(a.wrapping_add(*b))),
            Sub => Ok(Value::Int(a.wrapping_sub(*b))),
            Mul => Ok(Value::Int(a.wrapping_mul(*b))),
            Div => {
                if *b == 0 {
                    Err(Trace::simple(TraceKind::DivIntZero, "division by zero"))
                } else {
                    Ok(Value::Int(a / *b))
                }
            }
            Mod => Ok(Value::Float((*a as f64) % (*b as f64))),
            Pow => Ok(Value::Float((*a as f64).powf(*b as f64))),
            _ => unreachable!("comparison, logical, and MMul opcodes are handled before arithmetic"),
        },
        (a, b) => {
            let (af, bf) = (as_number(a)?, as_number(b)?);
            match opcode {
                Add => Ok(Value::Float(af + bf)),
                Sub => Ok(Value::Float(af - bf)),
                Mul => Ok(Value::Float(af * bf)),
                Div => Ok(Value::Float(af / bf)),
                Mod => Ok(Value::Float(af % bf)),
                Pow => Ok(Value::Float(af.powf(bf))),
                _ => unreachable!("comparison, logical, and MMul opcodes are handled before arithmetic"),
            }
        }
    }
}

trait SwapTuple {
    fn swap(self) -> Self;
}
impl SwapTuple for (Value, Value) {
    fn swap(self) -> Self {
        (self.1, self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::artifact::{Artifact, ArtifactHeader};
    use crate::common::opcode::{Instruction, Operands};

    fn artifact(instructions: Vec<Instruction>, ints: Vec<i64>) -> Rc<Artifact> {
        Rc::new(Artifact {
            header: ArtifactHeader { named_max: 0, temp_max: 0, stack_max: 8, param_count: 0 },
            instructions,
            ints,
            floats: Vec::new(),
            strings: Vec::new(),
        })
    }

    fn root() -> EnvRef {
        Environment::root_library(Vec::new(), Vec::new(), Vec::new())
    }

    #[test]
    fn adds_two_int_literals() {
        let ins = vec![
            Instruction::new(Opcode::PushI, Operands::U(0)).unwrap(),
            Instruction::new(Opcode::PushI, Operands::U(1)).unwrap(),
            Instruction::new(Opcode::PushInfo, Operands::U(0)).unwrap(),
            Instruction::new(Opcode::Add, Operands::LR(0, 0)).unwrap(),
            Instruction::new(Opcode::Ret, Operands::None).unwrap(),
        ];
        let mut vm = Vm::new(root());
        let result = vm.run(artifact(ins, vec![3, 4]), Rc::clone(&vm.root)).unwrap();
        assert_eq!(result, Value::Int(7));
    }

    #[test]
    fn division_by_zero_raises_a_trace() {
        let ins = vec![
            Instruction::new(Opcode::PushI, Operands::U(0)).unwrap(),
            Instruction::new(Opcode::PushI, Operands::U(1)).unwrap(),
            Instruction::new(Opcode::PushInfo, Operands::U(0)).unwrap(),
            Instruction::new(Opcode::Div, Operands::LR(0, 0)).unwrap(),
            Instruction::new(Opcode::Ret, Operands::None).unwrap(),
        ];
        let mut vm = Vm::new(root());
        let err = vm.run(artifact(ins, vec![1, 0]), Rc::clone(&vm.root)).unwrap_err();
        assert_eq!(err.kind, TraceKind::DivIntZero);
    }

    #[test]
    fn int_division_truncates_toward_zero() {
        let result = apply_binop(Opcode::Div, &Value::Int(-7), &Value::Int(2)).unwrap();
        assert_eq!(result, Value::Int(-3));
    }

    #[test]
    fn int_mod_keeps_the_dividends_sign() {
        let result = apply_binop(Opcode::Mod, &Value::Int(-7), &Value::Int(2)).unwrap();
        assert_eq!(result, Value::Float(-1.0));
    }

    #[test]
    fn float_mod_keeps_the_dividends_sign() {
        let result = apply_binop(Opcode::Mod, &Value::Float(-7.5), &Value::Float(2.0)).unwrap();
        assert_eq!(result, Value::Float(-1.5));
    }

    #[test]
    fn forward_jump_skips_the_next_instruction() {
        // PUSHI 0; JPF 2 (skip the next PUSHI); PUSHI 1; RET
        let ins = vec![
            Instruction::new(Opcode::PushI, Operands::U(0)).unwrap(),
            Instruction::new(Opcode::Jpf, Operands::U(2)).unwrap(),
            Instruction::new(Opcode::PushI, Operands::U(1)).unwrap(),
            Instruction::new(Opcode::Ret, Operands::None).unwrap(),
        ];
        let mut vm = Vm::new(root());
        let result = vm.run(artifact(ins, vec![10, 20]), Rc::clone(&vm.root)).unwrap();
        assert_eq!(result, Value::Int(10));
    }

    #[test]
    fn conditional_jump_pops_the_condition() {
        // PUSHB 1 (true); CJPF_POP 2 (jumps only when false); PUSHI 0; RET
        // -> condition is true, so the jump is not taken and PUSHI runs.
        let ins = vec![
            Instruction::new(Opcode::PushB, Operands::U(1)).unwrap(),
            Instruction::new(Opcode::CjpfPop, Operands::U(2)).unwrap(),
            Instruction::new(Opcode::PushI, Operands::U(0)).unwrap(),
            Instruction::new(Opcode::Ret, Operands::None).unwrap(),
        ];
        let mut vm = Vm::new(root());
        let result = vm.run(artifact(ins, vec![99]), Rc::clone(&vm.root)).unwrap();
        assert_eq!(result, Value::Int(99));

        // PUSHB 0 (false); CJPF_POP 2; PUSHI 0; RET -> the jump IS taken,
        // landing directly on RET with an empty stack (Nil).
        let ins = vec![
            Instruction::new(Opcode::PushB, Operands::U(0)).unwrap(),
            Instruction::new(Opcode::CjpfPop, Operands::U(2)).unwrap(),
            Instruction::new(Opcode::PushI, Operands::U(0)).unwrap(),
            Instruction::new(Opcode::Ret, Operands::None).unwrap(),
        ];
        let mut vm = Vm::new(root());
        let result = vm.run(artifact(ins, vec![99]), Rc::clone(&vm.root)).unwrap();
        assert_eq!(result, Value::Nil);
    }

    #[test]
    fn no_return_falls_off_the_end_as_nil() {
        let ins = vec![Instruction::new(Opcode::Pass, Operands::None).unwrap()];
        let mut vm = Vm::new(root());
        let result = vm.run(artifact(ins, Vec::new()), Rc::clone(&vm.root)).unwrap();
        assert_eq!(result, Value::Nil);
    }

    #[test]
    fn matrix_multiply_respects_dimensions() {
        let a = Composite::MatrixReal { rows: 1, cols: 2, data: vec![1.0, 2.0] };
        let b = Composite::MatrixReal { rows: 2, cols: 1, data: vec![3.0, 4.0] };
        let av = Value::Composite(Rc::new(RefCell::new(a)));
        let bv = Value::Composite(Rc::new(RefCell::new(b)));
        let result = apply_binop(Opcode::MMul, &av, &bv).unwrap();
        match result {
            Value::Composite(c) => match &*c.borrow() {
                Composite::MatrixReal { rows, cols, data } => {
                    assert_eq!((*rows, *cols), (1, 1));
                    assert_eq!(data[0], 11.0);
                }
                other => panic!("expected a matrix, got {:?}", other.type_name()),
            },
            other => panic!("expected a composite, got {:?}", other),
        }
    }

    #[test]
    fn matrix_multiply_rejects_mismatched_dimensions() {
        let a = Composite::MatrixReal { rows: 1, cols: 2, data: vec![1.0, 2.0] };
        let b = Composite::MatrixReal { rows: 3, cols: 1, data: vec![3.0, 4.0, 5.0] };
        let av = Value::Composite(Rc::new(RefCell::new(a)));
        let bv = Value::Composite(Rc::new(RefCell::new(b)));
        assert!(apply_binop(Opcode::MMul, &av, &bv).is_err());
    }
}
