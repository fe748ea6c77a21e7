//! Single-pass bytecode compiler (spec §4.3).

use std::rc::Rc;

use crate::common::artifact::{Artifact, ArtifactHeader};
use crate::common::opcode::{Instruction, Opcode, Operands, MAX_CP_C, MAX_U};
use crate::common::source::Source;
use crate::compiler::lex;
use crate::compiler::scope::{NamedTable, TempTable};
use crate::compiler::syntax::{Syntax, SyntaxKind};
use crate::compiler::token::{classify, BinOpKind, Keyword, Token};

/// One nested compilation frame: a function body, an imported file, or the
/// top level. Holds the named/temp tables for that frame and the static
/// stack-depth tracker used to size its header.
struct Frame {
    named: NamedTable,
    temp: TempTable,
    stack_depth: u32,
    stack_max: u8,
    param_count: u32,
}

impl Frame {
    fn new() -> Frame {
        Frame { named: NamedTable::default(), temp: TempTable::default(), stack_depth: 0, stack_max: 0, param_count: 0 }
    }

    fn push(&mut self, by: u32) -> Result<(), Syntax> {
        self.stack_depth += by;
        if self.stack_depth > 255 {
            return Err(Syntax::plain(SyntaxKind::RegOverflow, "evaluation stack exceeds 255 slots"));
        }
        self.stack_max = self.stack_max.max(self.stack_depth as u8);
        Ok(())
    }

    fn pop(&mut self, by: u32) {
        self.stack_depth = self.stack_depth.saturating_sub(by);
    }
}

/// Where a resolved name lives. `Temp` indexes the current frame's
/// transient temporary array (`isenv=false`); `Named` indexes the
/// environment-tree object array at the given linear offset from the
/// innermost scope (`isenv=true`), per spec §3's "single linear offset"
/// encoding — 0 for a name declared in the current frame, otherwise the
/// current frame's declared-name count plus the parent's offset.
enum Resolution {
    Temp(u32),
    Named(u32),
}

/// The compiler's frame stack, innermost (current) last. Named-variable
/// resolution walks this stack outward, accumulating each frame's local
/// length into the returned environment offset (spec §3's "each name's
/// bytecode operand is a single linear offset from the innermost scope").
pub struct Compiler {
    frames: Vec<Frame>,
    instructions: Vec<Instruction>,
    ints: Vec<i64>,
    floats: Vec<f64>,
    strings: Vec<String>,
    pub search_paths: Vec<std::path::PathBuf>,
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler {
            frames: vec![Frame::new()],
            instructions: Vec::new(),
            ints: Vec::new(),
            floats: Vec::new(),
            strings: Vec::new(),
            search_paths: Vec::new(),
        }
    }

    /// A compiler whose top-level named table is pre-seeded with the host's
    /// default names, in registration order, so its bytecode's named-slot
    /// offsets line up with a `Library` environment seeded the same way
    /// (spec §3's "default names").
    pub fn with_defaults(default_names: &[String]) -> Compiler {
        let mut compiler = Compiler::new();
        for name in default_names {
            compiler
                .frames
                .last_mut()
                .unwrap()
                .named
                .declare_default(name)
                .expect("duplicate or overflowing default name");
        }
        compiler
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().unwrap()
    }

    fn emit(&mut self, opcode: Opcode, operands: Operands) -> Result<usize, Syntax> {
        let ins = Instruction::new(opcode, operands)
            .map_err(|_| Syntax::plain(SyntaxKind::RegOverflow, "operand exceeds its encoding width"))?;
        if self.instructions.len() as u64 >= MAX_U as u64 {
            return Err(Syntax::plain(SyntaxKind::CmdOverflow, "too many instructions in one artifact"));
        }
        self.instructions.push(ins);
        Ok(self.instructions.len() - 1)
    }

    fn patch(&mut self, at: usize, operand: u32) {
        self.instructions[at] = Instruction::new(self.instructions[at].opcode, Operands::U(operand)).unwrap();
    }

    fn intern_int(&mut self, v: i64) -> Result<u32, Syntax> {
        if let Some(i) = self.ints.iter().position(|&x| x == v) {
            return Ok(i as u32);
        }
        let idx = self.ints.len() as u32;
        if idx > MAX_CP_C {
            return Err(Syntax::plain(SyntaxKind::CstOverflow, "integer literal pool overflow"));
        }
        self.ints.push(v);
        Ok(idx)
    }

    fn intern_float(&mut self, v: f64) -> Result<u32, Syntax> {
        let idx = self.floats.len() as u32;
        if idx > MAX_CP_C {
            return Err(Syntax::plain(SyntaxKind::CstOverflow, "float literal pool overflow"));
        }
        self.floats.push(v);
        Ok(idx)
    }

    fn intern_string(&mut self, v: &str) -> Result<u32, Syntax> {
        if let Some(i) = self.strings.iter().position(|s| s == v) {
            return Ok(i as u32);
        }
        let idx = self.strings.len() as u32;
        if idx > MAX_CP_C {
            return Err(Syntax::plain(SyntaxKind::CstOverflow, "string literal pool overflow"));
        }
        self.strings.push(v.to_string());
        Ok(idx)
    }

    /// Compiles a whole source into an artifact (the top-level compilation
    /// entry point; also used recursively for `import`ed files).
    pub fn compile_source(&mut self, source: &Rc<Source>) -> Result<Artifact, Syntax> {
        use crate::common::source::SourceKind;
        let units = match source.kind() {
            Some(SourceKind::Plain) => lex::lex(source)?,
            Some(SourceKind::Markdown) => lex::lex_markdown(source)?,
            None => return Err(Syntax::plain(SyntaxKind::InvalidFile, "unrecognized source suffix")),
        };
        let mut i = 0;
        while i < units.len() {
            if let Some((arms, else_body, next)) = group_if_chain(&units, i)? {
                self.compile_if_statement(arms, else_body)?;
                i = next;
            } else {
                self.compile_statement(&units[i].item)?;
                i += 1;
            }
        }
        self.finish()
    }

    fn finish(&mut self) -> Result<Artifact, Syntax> {
        let frame = self.frames.last().unwrap();
        Ok(Artifact {
            header: ArtifactHeader {
                named_max: frame.named.max_seen(),
                temp_max: frame.temp.max_seen(),
                stack_max: frame.stack_max,
                param_count: frame.param_count,
            },
            instructions: self.instructions.clone(),
            ints: self.ints.clone(),
            floats: self.floats.clone(),
            strings: self.strings.clone(),
        })
    }

    fn resolve(&self, name: &str) -> Option<Resolution> {
        if let Some(i) = self.frames.last().unwrap().temp.resolve(name) {
            return Some(Resolution::Temp(i));
        }
        let mut offset = 0u32;
        for frame in self.frames.iter().rev() {
            if let Some(i) = frame.named.resolve(name) {
                return Some(Resolution::Named(offset + i));
            }
            offset += frame.named.len();
        }
        None
    }

    /// Whether `name` currently resolves to a host-registered default rather
    /// than a user `var`, walking frames innermost-first so a local that
    /// shadows a built-in's name is not flagged (spec §4.3's
    /// "assign-default" applies only while the default is still visible).
    fn is_protected(&self, name: &str) -> bool {
        if self.frames.last().unwrap().temp.resolve(name).is_some() {
            return false;
        }
        for frame in self.frames.iter().rev() {
            if let Some(i) = frame.named.resolve(name) {
                return frame.named.is_protected(i);
            }
        }
        false
    }

    fn compile_statement(&mut self, unit: &str) -> Result<(), Syntax> {
        let before = self.frame().stack_depth;
        self.compile_token(unit)?;
        // statements at the top level leave no residual value; a compiled
        // expression statement's single pushed value is dropped.
        let after = self.frame().stack_depth;
        if after > before {
            self.emit(Opcode::PopN, Operands::LR((after - before).min(1), 0))?;
            self.frame().pop(after - before);
        }
        Ok(())
    }

    /// Compiles an already-reassembled `if`/`elif`/`else` cascade as a
    /// statement, dropping any residual value the same way `compile_statement`
    /// does for an ordinary expression statement.
    fn compile_if_statement(
        &mut self,
        arms: Vec<(String, String)>,
        else_body: Option<String>,
    ) -> Result<(), Syntax> {
        let before = self.frame().stack_depth;
        self.compile_if_chain(arms, else_body)?;
        let after = self.frame().stack_depth;
        if after > before {
            self.emit(Opcode::PopN, Operands::LR((after - before).min(1), 0))?;
            self.frame().pop(after - before);
        }
        Ok(())
    }

    fn compile_token(&mut self, unit: &str) -> Result<(), Syntax> {
        let token = classify(unit)?;
        self.compile_one(token)
    }

    fn compile_one(&mut self, token: Token) -> Result<(), Syntax> {
        match token {
            Token::Keyword(Keyword::True) => self.push_bool(true),
            Token::Keyword(Keyword::False) => self.push_bool(false),
            Token::Keyword(Keyword::This) => {
                self.emit(Opcode::This, Operands::None)?;
                self.frame().push(1)
            }
            Token::Keyword(Keyword::Base) => {
                self.emit(Opcode::Base, Operands::None)?;
                self.frame().push(1)
            }
            Token::Keyword(Keyword::Continue) => self.emit(Opcode::Conti, Operands::None).map(|_| ()),
            Token::Keyword(Keyword::Break) => self.emit(Opcode::Break, Operands::None).map(|_| ()),
            Token::Return(expr) => self.compile_return(expr),
            Token::VarDecl { name, ty, init } => {
                if ty.is_none() && init.is_none() {
                    return Err(Syntax::plain(
                        SyntaxKind::VarNoType,
                        "a 'var' with no initializer needs an explicit type",
                    ));
                }
                self.compile_decl(name, init, false)
            }
            Token::LetDecl { name, ty, init } => {
                if ty.is_none() && init.is_none() {
                    return Err(Syntax::plain(
                        SyntaxKind::VarNoType,
                        "a 'let' with no initializer needs an explicit type",
                    ));
                }
                self.compile_decl(name, init, true)
            }
            Token::Import { path, alias } => self.compile_import(path, alias),
            Token::While { cond, body } => self.compile_while(cond, body),
            Token::For { name, iter, body } => self.compile_for(name, iter, body),
            Token::If { cond, body } => self.compile_if_chain(vec![(cond, body)], None),
            Token::Elif { .. } | Token::Else { .. } => {
                Err(Syntax::plain(SyntaxKind::Other, "'elif'/'else' without a preceding 'if'"))
            }
            Token::Assign { name, expr } => self.compile_assign(name, expr),
            Token::IndexAssign { obj, index, expr } => self.compile_index_assign(obj, index, expr),
            Token::StringLit(s) => self.push_string(&s),
            Token::DictLit(body) => self.compile_dict(body),
            Token::Kappa(body) => self.compile_function(String::new(), body, true),
            Token::FunctionLit { params, body } => self.compile_function(params, body, false),
            Token::BinOp { kind, op, lhs, rhs } => self.compile_binop(kind, &op, &lhs, &rhs),
            Token::Call { callee, args } => self.compile_call(callee, args),
            Token::Index { obj, args } => self.compile_index_read(obj, args),
            Token::Atom(a) => self.compile_atom(&a),
        }
    }

    fn push_bool(&mut self, b: bool) -> Result<(), Syntax> {
        self.emit(Opcode::PushB, Operands::U(if b { 1 } else { 0 }))?;
        self.frame().push(1)
    }

    fn push_string(&mut self, s: &str) -> Result<(), Syntax> {
        let idx = self.intern_string(s)?;
        self.emit(Opcode::PushS, Operands::U(idx))?;
        self.frame().push(1)
    }

    fn compile_atom(&mut self, a: &str) -> Result<(), Syntax> {
        if let Ok(i) = a.parse::<i64>() {
            let idx = self.intern_int(i)?;
            self.emit(Opcode::PushI, Operands::U(idx))?;
            return self.frame().push(1);
        }
        if let Ok(f) = a.parse::<f64>() {
            let idx = self.intern_float(f)?;
            self.emit(Opcode::PushD, Operands::U(idx))?;
            return self.frame().push(1);
        }
        match self.resolve(a) {
            Some(Resolution::Temp(i)) => {
                self.emit(Opcode::PushX, Operands::LR(i, 0))?;
            }
            Some(Resolution::Named(i)) => {
                self.emit(Opcode::PushX, Operands::LR(i, 1))?;
            }
            None => {
                return Err(Syntax::plain(SyntaxKind::ObjUnfound, &format!("'{}' is not declared", a)));
            }
        }
        self.frame().push(1)
    }

    fn compile_return(&mut self, expr: Option<String>) -> Result<(), Syntax> {
        if let Some(e) = &expr {
            if let Ok(Token::Atom(name)) = classify(e) {
                if self.frames.last().unwrap().temp.contains(&name) {
                    return Err(Syntax::plain(
                        SyntaxKind::ReturnTmpObj,
                        "cannot return a value bound by 'let' in this function",
                    ));
                }
            }
            self.compile_token(e)?;
        }
        self.emit(Opcode::Ret, Operands::None)?;
        Ok(())
    }

    fn compile_decl(&mut self, name: String, init: Option<String>, temp: bool) -> Result<(), Syntax> {
        if temp {
            let idx = self.frame().temp.declare(&name)?;
            self.emit(Opcode::Vcrt, Operands::CP(idx, 0))?;
            if let Some(e) = init {
                self.compile_token(&e)?;
                self.emit(Opcode::PopCov, Operands::LR(idx, 0))?;
                self.frame().pop(1);
            }
        } else {
            let idx = self.frame().named.declare(&name)?;
            self.emit(Opcode::Vcrt, Operands::CP(idx, 1))?;
            if let Some(e) = init {
                self.compile_token(&e)?;
                self.emit(Opcode::PopCov, Operands::LR(idx, 1))?;
                self.frame().pop(1);
            }
        }
        Ok(())
    }

    fn compile_assign(&mut self, name: String, expr: String) -> Result<(), Syntax> {
        if self.is_protected(&name) {
            return Err(Syntax::plain(
                SyntaxKind::AsgDefault,
                &format!("'{}' is a built-in and cannot be reassigned", name),
            ));
        }
        self.compile_token(&expr)?;
        match self.resolve(&name) {
            Some(Resolution::Temp(i)) => {
                self.emit(Opcode::PopCov, Operands::LR(i, 0))?;
            }
            Some(Resolution::Named(i)) => {
                self.emit(Opcode::PopCov, Operands::LR(i, 1))?;
            }
            None => return Err(Syntax::plain(SyntaxKind::ObjUnfound, &format!("'{}' is not declared", name))),
        }
        self.frame().pop(1);
        Ok(())
    }

    fn compile_index_assign(&mut self, obj: String, index: String, expr: String) -> Result<(), Syntax> {
        self.compile_token(&expr)?;
        self.compile_token(&index)?;
        match self.resolve(&obj) {
            Some(Resolution::Temp(i)) => {
                self.emit(Opcode::IdxL, Operands::LBI(i, 1, 0))?;
            }
            Some(Resolution::Named(i)) => {
                self.emit(Opcode::IdxL, Operands::LBI(i, 1, 1))?;
            }
            None => return Err(Syntax::plain(SyntaxKind::ObjUnfound, &format!("'{}' is not declared", obj))),
        }
        self.frame().pop(2);
        Ok(())
    }

    fn compile_while(&mut self, cond: String, body: String) -> Result<(), Syntax> {
        let top = self.instructions.len();
        self.compile_token(&cond)?;
        self.frame().pop(1);
        let jump_at = self.emit(Opcode::CjpfPop, Operands::U(0))?;
        self.compile_block(&body)?;
        self.emit(Opcode::Jpb, Operands::U((self.instructions.len() - top) as u32))?;
        let after = self.instructions.len();
        self.patch(jump_at, (after - jump_at) as u32);
        Ok(())
    }

    fn compile_for(&mut self, name: String, iter: String, body: String) -> Result<(), Syntax> {
        self.compile_token(&iter)?;
        let temp_idx = self.frame().temp.declare(&name)?;
        let loop_at = self.instructions.len();
        self.emit(Opcode::LoopAs, Operands::LR(temp_idx, 0))?;
        self.frame().push(1)?;
        let jump_at = self.emit(Opcode::CjpfPop, Operands::U(0))?;
        self.frame().pop(1);
        self.compile_block(&body)?;
        self.emit(Opcode::Jpb, Operands::U((self.instructions.len() - loop_at) as u32))?;
        let after = self.instructions.len();
        self.patch(jump_at, (after - jump_at) as u32);
        self.emit(Opcode::PopN, Operands::LR(1, 0))?;
        self.frame().pop(1);
        Ok(())
    }

    fn compile_if_chain(&mut self, mut arms: Vec<(String, String)>, else_body: Option<String>) -> Result<(), Syntax> {
        let mut exit_jumps = Vec::new();
        let (cond, body) = arms.remove(0);
        self.compile_token(&cond)?;
        self.frame().pop(1);
        let skip_at = self.emit(Opcode::CjpfPop, Operands::U(0))?;
        self.compile_block(&body)?;
        if !arms.is_empty() || else_body.is_some() {
            exit_jumps.push(self.emit(Opcode::Jpf, Operands::U(0))?);
        }
        let after = self.instructions.len();
        self.patch(skip_at, (after - skip_at) as u32);

        if !arms.is_empty() {
            self.compile_if_chain(arms, else_body)?;
        } else if let Some(body) = else_body {
            self.compile_block(&body)?;
        }

        let end = self.instructions.len();
        for at in exit_jumps {
            self.patch(at, (end - at) as u32);
        }
        Ok(())
    }

    /// Compiles `body` as a list of statement units within the current
    /// frame (no new scope: `var` at block top level is still rejected,
    /// per spec, by simply never being reached from inside a block).
    fn compile_block(&mut self, body: &str) -> Result<(), Syntax> {
        let source = Source::source(body);
        let units = lex::lex(&source)?;
        let mark = self.frame().temp.mark();
        let mut i = 0;
        while i < units.len() {
            if let Some((arms, else_body, next)) = group_if_chain(&units, i)? {
                if next == units.len() {
                    self.compile_if_chain(arms, else_body)?;
                    let depth = self.frame().stack_depth;
                    if depth > 0 {
                        self.emit(Opcode::PopN, Operands::LR(1, 0))?;
                        self.frame().pop(1);
                    }
                } else {
                    self.compile_if_statement(arms, else_body)?;
                }
                i = next;
                continue;
            }
            if let Token::VarDecl { .. } = classify(&units[i].item)? {
                return Err(Syntax::plain(
                    SyntaxKind::InBlockVarDef,
                    "'var' may only be declared at the top level of a scope",
                ));
            }
            if i + 1 == units.len() {
                self.compile_token(&units[i].item)?;
                let depth = self.frame().stack_depth;
                if depth > 0 {
                    self.emit(Opcode::PopN, Operands::LR(1, 0))?;
                    self.frame().pop(1);
                }
            } else {
                self.compile_statement(&units[i].item)?;
            }
            i += 1;
        }
        self.frame().temp.truncate(mark);
        Ok(())
    }

    fn compile_dict(&mut self, body: String) -> Result<(), Syntax> {
        if body.trim().is_empty() {
            self.emit(Opcode::PushDict, Operands::U(0))?;
            return self.frame().push(1);
        }
        let entries = split_top_level(&body, ',');
        for entry in &entries {
            let (key, value) = entry
                .split_once(':')
                .ok_or_else(|| Syntax::plain(SyntaxKind::InvalidLiter, "malformed dict entry"))?;
            self.push_string(key.trim())?;
            self.compile_token(value.trim())?;
        }
        self.emit(Opcode::PushDict, Operands::U(entries.len() as u32))?;
        self.frame().pop(entries.len() as u32 * 2);
        self.frame().push(1)
    }

    fn compile_function(&mut self, params: String, body: String, kappa: bool) -> Result<(), Syntax> {
        let param_names = split_top_level(&params, ',');
        let mut inner = Frame::new();
        inner.param_count = param_names.len() as u32;
        self.frames.push(inner);
        for p in &param_names {
            let p = p.trim();
            if !p.is_empty() {
                self.frame().named.declare(p)?;
            }
        }

        // the body compiles inline into the shared instruction stream; skip
        // over it so the enclosing code doesn't fall into it on definition.
        let skip_at = self.emit(Opcode::Jpf, Operands::U(0))?;
        let body_start = self.instructions.len();
        if kappa {
            // a kappa's tail statement leaves its value on the stack instead
            // of being dropped, then falls through to an implicit `RET`.
            let source = Source::source(&body);
            let units = lex::lex(&source)?;
            for (i, unit) in units.iter().enumerate() {
                if i + 1 == units.len() {
                    self.compile_token(&unit.item)?;
                } else {
                    self.compile_statement(&unit.item)?;
                }
            }
            self.emit(Opcode::Ret, Operands::None)?;
        } else {
            self.compile_block_as_function_body(&body)?;
            self.emit(Opcode::Ret, Operands::None)?;
        }
        let ncmds = (self.instructions.len() - body_start) as u32;

        let inner = self.frames.pop().unwrap();
        self.emit(Opcode::PushInfo, Operands::U(inner.named.max_seen()))?;
        self.emit(Opcode::PushInfo, Operands::U(inner.temp.max_seen()))?;
        self.emit(Opcode::PushInfo, Operands::U(inner.stack_max as u32))?;
        self.emit(Opcode::PushInfo, Operands::U(inner.param_count))?;
        self.emit(Opcode::PushF, Operands::U(ncmds))?;
        let after = self.instructions.len();
        self.patch(skip_at, (after - skip_at) as u32);
        self.frame().push(1)
    }

    fn compile_block_as_function_body(&mut self, body: &str) -> Result<(), Syntax> {
        let source = Source::source(body);
        let units = lex::lex(&source)?;
        let mut i = 0;
        while i < units.len() {
            if let Some((arms, else_body, next)) = group_if_chain(&units, i)? {
                self.compile_if_statement(arms, else_body)?;
                i = next;
                continue;
            }
            if let Token::VarDecl { .. } = classify(&units[i].item)? {
                return Err(Syntax::plain(
                    SyntaxKind::InBlockVarDef,
                    "'var' may only be declared at the top level of a function body",
                ));
            }
            self.compile_statement(&units[i].item)?;
            i += 1;
        }
        Ok(())
    }

    fn compile_import(&mut self, path: String, alias: Option<String>) -> Result<(), Syntax> {
        let idx = self.intern_string(&path)?;
        self.emit(Opcode::Import, Operands::U(idx))?;
        self.frame().push(1)?;
        if let Some(alias) = alias {
            let name_idx = self.frame().named.declare(&alias)?;
            self.emit(Opcode::Vcrt, Operands::CP(name_idx, 1))?;
            self.emit(Opcode::PopCov, Operands::LR(name_idx, 1))?;
            self.frame().pop(1);
        } else {
            self.emit(Opcode::PopN, Operands::LR(1, 0))?;
            self.frame().pop(1);
        }
        Ok(())
    }

    fn origin_kind(lhs: &Resolution, rhs: &Resolution) -> u32 {
        use Resolution::*;
        match (lhs, rhs) {
            (Named(_), Named(_)) => 3,
            (Temp(_), Named(_)) => 4,
            (Named(_), Temp(_)) => 8,
            (Temp(_), Temp(_)) => 6,
        }
    }

    fn loc_of(r: &Resolution) -> (u32, u32) {
        match r {
            Resolution::Temp(i) => (*i, 0),
            Resolution::Named(i) => (*i, 1),
        }
    }

    fn compile_binop(&mut self, kind: BinOpKind, op: &str, lhs: &str, rhs: &str) -> Result<(), Syntax> {
        let opcode = match (kind, op) {
            (BinOpKind::AddSub, "+") => Opcode::Add,
            (BinOpKind::AddSub, "-") => Opcode::Sub,
            (BinOpKind::MulDivModMatMul, "*") => Opcode::Mul,
            (BinOpKind::MulDivModMatMul, "/") => Opcode::Div,
            (BinOpKind::MulDivModMatMul, "%") => Opcode::Mod,
            (BinOpKind::MulDivModMatMul, "@") => Opcode::MMul,
            (BinOpKind::Pow, _) => Opcode::Pow,
            (BinOpKind::Cmp, "==") => Opcode::Eq,
            (BinOpKind::Cmp, "!=") => Opcode::Ne,
            (BinOpKind::Cmp, ">=") => Opcode::Ge,
            (BinOpKind::Cmp, "<=") => Opcode::Le,
            (BinOpKind::Cmp, ">") => Opcode::Sg,
            (BinOpKind::Cmp, "<") => Opcode::Sl,
            (BinOpKind::And, _) => Opcode::And,
            (BinOpKind::Or, _) => Opcode::Or,
            (BinOpKind::In, _) => Opcode::In,
            (BinOpKind::To, _) => Opcode::To,
            (BinOpKind::Colon, _) => Opcode::Pair,
            _ => return Err(Syntax::plain(SyntaxKind::Other, &format!("unknown operator '{}'", op))),
        };

        // `in`/`:`/`to` are no-operand opcodes in the ISA (spec §6): they
        // never carry a fused L,R location and always take both operands
        // off the evaluation stack, with no PUSHINFO preamble.
        if matches!(opcode, Opcode::In | Opcode::To | Opcode::Pair) {
            self.compile_token(lhs)?;
            self.compile_token(rhs)?;
            self.emit(opcode, Operands::None)?;
            self.frame().pop(2);
            return self.frame().push(1);
        }

        let simple = |c: &Compiler, s: &str| -> Option<Resolution> {
            match classify(s).ok()? {
                Token::Atom(a) => c.resolve(&a),
                _ => None,
            }
        };

        if let (Some(l), Some(r)) = (simple(self, lhs), simple(self, rhs)) {
            let info = Compiler::origin_kind(&l, &r);
            self.emit(Opcode::PushInfo, Operands::U(info))?;
            let (ll, _) = Compiler::loc_of(&l);
            let (rl, _) = Compiler::loc_of(&r);
            self.emit(opcode, Operands::LR(ll, rl))?;
            return self.frame().push(1);
        }

        self.compile_token(lhs)?;
        self.compile_token(rhs)?;
        self.emit(Opcode::PushInfo, Operands::U(0))?;
        self.emit(opcode, Operands::LR(0, 0))?;
        self.frame().pop(2);
        self.frame().push(1)
    }

    fn compile_call(&mut self, callee: String, args: String) -> Result<(), Syntax> {
        let arg_units = split_top_level(&args, ',');
        let n = arg_units.iter().filter(|a| !a.trim().is_empty()).count();
        for a in &arg_units {
            let a = a.trim();
            if !a.is_empty() {
                self.compile_token(a)?;
            }
        }
        self.compile_token(&callee)?;
        self.emit(Opcode::Eval, Operands::U(n as u32))?;
        self.frame().pop(n as u32 + 1);
        self.frame().push(1)
    }

    fn compile_index_read(&mut self, obj: String, args: String) -> Result<(), Syntax> {
        let arg_units = split_top_level(&args, ',');
        let n = arg_units.iter().filter(|a| !a.trim().is_empty()).count();
        for a in &arg_units {
            let a = a.trim();
            if !a.is_empty() {
                self.compile_token(a)?;
            }
        }
        self.compile_token(&obj)?;
        self.emit(Opcode::IdxR, Operands::U(n as u32))?;
        self.frame().pop(n as u32 + 1);
        self.frame().push(1)
    }
}

/// `compiler::lex` splits `if {...}`, `elif {...}`, `else {...}` written as
/// separate statements into separate top-level units (a newline or `;` at
/// bracket-depth zero is a unit terminator), so a cascade has to be
/// reassembled by looking ahead before it can be compiled as one
/// `compile_if_chain` call.
///
/// If `units[i]` classifies as `Token::If`, consumes any immediately
/// following `Elif` units and at most one trailing `Else` unit, returning
/// the full arm list, the optional else body, and the index just past what
/// was consumed. Returns `None` (consuming nothing) if `units[i]` is not an
/// `If`, so the caller can classify and compile it as usual.
fn group_if_chain(
    units: &[lex::Unit],
    i: usize,
) -> Result<Option<(Vec<(String, String)>, Option<String>, usize)>, Syntax> {
    let Token::If { cond, body } = classify(&units[i].item)? else {
        return Ok(None);
    };
    let mut arms = vec![(cond, body)];
    let mut else_body = None;
    let mut j = i + 1;
    while j < units.len() {
        match classify(&units[j].item)? {
            Token::Elif { cond, body } => {
                arms.push((cond, body));
                j += 1;
            }
            Token::Else { body } => {
                else_body = Some(body);
                j += 1;
                break;
            }
            _ => break,
        }
    }
    Ok(Some((arms, else_body, j)))
}

/// Splits a comma-separated argument/entry list respecting nested
/// brackets and quotes (used for call args, dict entries, and params).
fn split_top_level(s: &str, sep: char) -> Vec<String> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_s = false;
    let mut in_d = false;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '\'' if !in_d => in_s = !in_s,
            '"' if !in_s => in_d = !in_d,
            '(' | '[' | '{' if !in_s && !in_d => depth += 1,
            ')' | ']' | '}' if !in_s && !in_d => depth -= 1,
            _ if c == sep && depth == 0 && !in_s && !in_d => {
                parts.push(s[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].to_string());
    parts
}

#[cfg(test)]
mod test {
    use super::*;

    fn compile(src: &str) -> Artifact {
        let mut compiler = Compiler::new();
        let source = Source::source(src);
        compiler.compile_source(&source).expect("compile")
    }

    #[test]
    fn integer_arithmetic_emits_instructions() {
        let artifact = compile("print(1 + 2 * 3)");
        assert!(!artifact.instructions.is_empty());
    }

    #[test]
    fn double_declare_is_rejected() {
        let mut compiler = Compiler::new();
        let source = Source::source("var x = 1; var x = 2");
        let err = compiler.compile_source(&source).unwrap_err();
        assert_eq!(err.kind, SyntaxKind::DblDeclare);
    }

    #[test]
    fn in_block_var_is_rejected() {
        let mut compiler = Compiler::new();
        let source = Source::source("if (true) { var x = 1 }");
        let err = compiler.compile_source(&source).unwrap_err();
        assert_eq!(err.kind, SyntaxKind::InBlockVarDef);
    }

    #[test]
    fn function_literal_appends_body_inline() {
        let artifact = compile("var f = (n) { return n }");
        let has_pushf = artifact.instructions.iter().any(|i| i.opcode == Opcode::PushF);
        assert!(has_pushf);
    }
}
