//! Classifies a lexical unit into one of a closed set of token shapes
//! (spec §4.2). Classification tests shapes in a fixed order; the first
//! match wins. Sub-expressions are returned as raw unit text, to be
//! classified in turn by the compiler when it descends into them.

use crate::compiler::syntax::{Syntax, SyntaxKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BinOpKind {
    In,
    Colon,
    To,
    Or,
    And,
    Cmp,
    AddSub,
    MulDivModMatMul,
    Pow,
}

/// Precedence classes in the fixed scan order from spec §4.2 item 6: the
/// rightmost operator in the *first* (lowest-precedence) matching class wins.
const PRECEDENCE_ORDER: [BinOpKind; 9] = [
    BinOpKind::In,
    BinOpKind::Colon,
    BinOpKind::To,
    BinOpKind::Or,
    BinOpKind::And,
    BinOpKind::Cmp,
    BinOpKind::AddSub,
    BinOpKind::MulDivModMatMul,
    BinOpKind::Pow,
];

fn operators_for(kind: BinOpKind) -> &'static [&'static str] {
    match kind {
        BinOpKind::In => &["in"],
        BinOpKind::Colon => &[":"],
        BinOpKind::To => &["to"],
        BinOpKind::Or => &["or"],
        BinOpKind::And => &["and"],
        BinOpKind::Cmp => &["==", "!=", ">=", "<=", ">", "<"],
        BinOpKind::AddSub => &["+", "-"],
        BinOpKind::MulDivModMatMul => &["*", "/", "%", "@"],
        BinOpKind::Pow => &["^"],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    True,
    False,
    This,
    Base,
    Continue,
    Break,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Keyword(Keyword),
    Return(Option<String>),
    VarDecl { name: String, ty: Option<String>, init: Option<String> },
    LetDecl { name: String, ty: Option<String>, init: Option<String> },
    Import { path: String, alias: Option<String> },
    While { cond: String, body: String },
    For { name: String, iter: String, body: String },
    If { cond: String, body: String },
    Elif { cond: String, body: String },
    Else { body: String },
    Assign { name: String, expr: String },
    IndexAssign { obj: String, index: String, expr: String },
    StringLit(String),
    DictLit(String),
    Kappa(String),
    FunctionLit { params: String, body: String },
    BinOp { kind: BinOpKind, op: String, lhs: String, rhs: String },
    Call { callee: String, args: String },
    Index { obj: String, args: String },
    Atom(String),
}

pub fn classify(unit: &str) -> Result<Token, Syntax> {
    let s = unit.trim();
    if s.is_empty() {
        return Err(Syntax::plain(SyntaxKind::Other, "empty unit reached the tokenizer"));
    }

    if let Some(k) = classify_keyword(s) {
        return Ok(Token::Keyword(k));
    }
    if let Some(tok) = classify_prefix(s)? {
        return Ok(tok);
    }
    if let Some(tok) = classify_control(s)? {
        return Ok(tok);
    }
    if let Some(tok) = classify_assign(s)? {
        return Ok(tok);
    }
    if let Some(tok) = classify_literal_composite(s)? {
        return Ok(tok);
    }
    if let Some(tok) = classify_binop(s) {
        return Ok(tok);
    }
    if let Some(tok) = classify_call_or_index(s)? {
        return Ok(tok);
    }
    if let Some(tok) = classify_field_access(s) {
        return Ok(tok);
    }
    Ok(Token::Atom(s.to_string()))
}

fn classify_keyword(s: &str) -> Option<Keyword> {
    match s {
        "true" => Some(Keyword::True),
        "false" => Some(Keyword::False),
        "this" => Some(Keyword::This),
        "base" => Some(Keyword::Base),
        "continue" => Some(Keyword::Continue),
        "break" => Some(Keyword::Break),
        _ => None,
    }
}

fn classify_prefix(s: &str) -> Result<Option<Token>, Syntax> {
    if let Some(rest) = s.strip_prefix("return") {
        let rest = rest.trim();
        if rest.is_empty() || starts_as_word_boundary(s, "return") {
            return Ok(Some(Token::Return(if rest.is_empty() { None } else { Some(rest.to_string()) })));
        }
    }
    if let Some(rest) = strip_keyword(s, "var") {
        let (name, ty, init) = split_decl(rest)?;
        return Ok(Some(Token::VarDecl { name, ty, init }));
    }
    if let Some(rest) = strip_keyword(s, "let") {
        let (name, ty, init) = split_decl(rest)?;
        return Ok(Some(Token::LetDecl { name, ty, init }));
    }
    if let Some(rest) = strip_keyword(s, "import") {
        let rest = rest.trim();
        if let Some(idx) = find_top_level_word(rest, "as") {
            let path = unquote(rest[..idx].trim());
            let alias = rest[idx + 2..].trim().to_string();
            return Ok(Some(Token::Import { path, alias: Some(alias) }));
        }
        return Ok(Some(Token::Import { path: unquote(rest), alias: None }));
    }
    Ok(None)
}

/// Strips a single layer of matching quotes from an import path literal,
/// the same quoting `classify_literal_composite` accepts for string literals.
fn unquote(s: &str) -> String {
    if s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn starts_as_word_boundary(s: &str, kw: &str) -> bool {
    s.len() == kw.len() || s.as_bytes().get(kw.len()) == Some(&b' ')
}

fn strip_keyword<'a>(s: &'a str, kw: &str) -> Option<&'a str> {
    if s.starts_with(kw) && starts_as_word_boundary(s, kw) {
        Some(s[kw.len()..].trim())
    } else {
        None
    }
}

/// Splits `name[:type][= expr]` into its parts.
fn split_decl(rest: &str) -> Result<(String, Option<String>, Option<String>), Syntax> {
    let (head, init) = match find_top_level_char(rest, '=') {
        Some(idx) => (rest[..idx].trim(), Some(rest[idx + 1..].trim().to_string())),
        None => (rest.trim(), None),
    };
    let (name, ty) = match head.find(':') {
        Some(idx) => (head[..idx].trim().to_string(), Some(head[idx + 1..].trim().to_string())),
        None => (head.to_string(), None),
    };
    if name.is_empty() {
        return Err(Syntax::plain(SyntaxKind::InvalidVname, "missing variable name in declaration"));
    }
    Ok((name, ty, init))
}

fn classify_control(s: &str) -> Result<Option<Token>, Syntax> {
    if let Some((cond, body)) = match_head_paren_block(s, "while") {
        return Ok(Some(Token::While { cond, body }));
    }
    if let Some((header, body)) = match_head_paren_block(s, "for") {
        if let Some(idx) = find_top_level_word(&header, "in") {
            let name = header[..idx].trim().to_string();
            let iter = header[idx + 2..].trim().to_string();
            return Ok(Some(Token::For { name, iter, body }));
        }
    }
    if let Some((cond, body)) = match_head_paren_block(s, "if") {
        return Ok(Some(Token::If { cond, body }));
    }
    if let Some((cond, body)) = match_head_paren_block(s, "elif") {
        return Ok(Some(Token::Elif { cond, body }));
    }
    if let Some(rest) = strip_keyword(s, "else") {
        if rest.starts_with('{') && rest.ends_with('}') {
            return Ok(Some(Token::Else { body: rest[1..rest.len() - 1].trim().to_string() }));
        }
    }
    Ok(None)
}

/// Matches `kw (head) { body }` and returns `(head, body)`.
fn match_head_paren_block(s: &str, kw: &str) -> Option<(String, String)> {
    let rest = strip_keyword(s, kw)?;
    let rest = rest.trim_start();
    if !rest.starts_with('(') {
        return None;
    }
    let close = matching_bracket(rest, 0, '(', ')')?;
    let head = rest[1..close].to_string();
    let tail = rest[close + 1..].trim_start();
    if !tail.starts_with('{') || !tail.ends_with('}') {
        return None;
    }
    let body = tail[1..tail.len() - 1].trim().to_string();
    Some((head, body))
}

fn matching_bracket(s: &str, open_at: usize, open: char, close: char) -> Option<usize> {
    let bytes: Vec<char> = s.chars().collect();
    let mut depth = 0i32;
    for (i, &c) in bytes.iter().enumerate().skip(open_at) {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(char_index_to_byte(s, i));
            }
        }
    }
    None
}

fn char_index_to_byte(s: &str, char_idx: usize) -> usize {
    s.char_indices().nth(char_idx).map(|(b, _)| b).unwrap_or(s.len())
}

fn classify_assign(s: &str) -> Result<Option<Token>, Syntax> {
    let Some(idx) = find_top_level_assign(s) else { return Ok(None) };
    let lhs = s[..idx].trim();
    let rhs = s[idx + 1..].trim().to_string();
    if let Some(b) = lhs.rfind('[') {
        if lhs.ends_with(']') {
            let obj = lhs[..b].trim().to_string();
            let index = lhs[b + 1..lhs.len() - 1].trim().to_string();
            return Ok(Some(Token::IndexAssign { obj, index, expr: rhs }));
        }
    }
    Ok(Some(Token::Assign { name: lhs.to_string(), expr: rhs }))
}

/// A bare `=` not adjacent to `= > < !` on either side, at top-level depth.
fn find_top_level_assign(s: &str) -> Option<usize> {
    let chars: Vec<char> = s.chars().collect();
    let mut depth = 0i32;
    let mut in_s = false;
    let mut in_d = false;
    for i in 0..chars.len() {
        let c = chars[i];
        match c {
            '\'' if !in_d => in_s = !in_s,
            '"' if !in_s => in_d = !in_d,
            '(' | '[' | '{' if !in_s && !in_d => depth += 1,
            ')' | ']' | '}' if !in_s && !in_d => depth -= 1,
            '=' if depth == 0 && !in_s && !in_d => {
                let prev = if i > 0 { Some(chars[i - 1]) } else { None };
                let next = chars.get(i + 1).copied();
                let neighbours_ok = !matches!(prev, Some('=') | Some('>') | Some('<') | Some('!'))
                    && next != Some('=');
                if neighbours_ok {
                    return Some(char_index_to_byte(s, i));
                }
            }
            _ => {}
        }
    }
    None
}

fn classify_literal_composite(s: &str) -> Result<Option<Token>, Syntax> {
    if (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
        || (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
    {
        return Ok(Some(Token::StringLit(s[1..s.len() - 1].to_string())));
    }
    if s.starts_with('{') && s.ends_with('}') {
        return Ok(Some(Token::DictLit(s[1..s.len() - 1].trim().to_string())));
    }
    if let Some(rest) = s.strip_prefix('#') {
        let rest = rest.trim_start();
        if rest.starts_with('{') && rest.ends_with('}') {
            return Ok(Some(Token::Kappa(rest[1..rest.len() - 1].trim().to_string())));
        }
    }
    if s.starts_with('(') {
        if let Some(close) = matching_bracket(s, 0, '(', ')') {
            let tail = s[close + 1..].trim_start();
            if tail.starts_with('{') && tail.ends_with('}') {
                let params = s[1..close].trim().to_string();
                let body = tail[1..tail.len() - 1].trim().to_string();
                return Ok(Some(Token::FunctionLit { params, body }));
            }
        }
    }
    Ok(None)
}

fn classify_binop(s: &str) -> Option<Token> {
    // A numeric literal with scientific notation (e.g. `1e-3`) must not be
    // split on its embedded `-`; reject the whole unit as a binop candidate.
    if looks_numeric(s) {
        return None;
    }
    for &kind in &PRECEDENCE_ORDER {
        if let Some((op, idx)) = rightmost_top_level_op(s, operators_for(kind)) {
            let lhs = s[..idx].trim();
            let rhs = s[idx + op.len()..].trim();
            if lhs.is_empty() || rhs.is_empty() {
                continue;
            }
            if !is_balanced(lhs) || !is_balanced(rhs) {
                continue;
            }
            return Some(Token::BinOp {
                kind,
                op: op.to_string(),
                lhs: lhs.to_string(),
                rhs: rhs.to_string(),
            });
        }
    }
    None
}

fn looks_numeric(s: &str) -> bool {
    s.parse::<i64>().is_ok() || s.parse::<f64>().is_ok()
}

fn is_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut in_s = false;
    let mut in_d = false;
    for c in s.chars() {
        match c {
            '\'' if !in_d => in_s = !in_s,
            '"' if !in_s => in_d = !in_d,
            '(' | '[' | '{' if !in_s && !in_d => depth += 1,
            ')' | ']' | '}' if !in_s && !in_d => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0 && !in_s && !in_d
}

/// Finds the rightmost top-level occurrence of any operator in `ops`,
/// scanning right-to-left. Word-like operators (`in`, `to`, `and`, `or`)
/// require word boundaries on both sides.
fn rightmost_top_level_op<'a>(s: &str, ops: &[&'a str]) -> Option<(&'a str, usize)> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut in_s = false;
    let mut in_d = false;
    let mut depths = vec![0i32; bytes.len() + 1];
    let mut quote = vec![false; bytes.len() + 1];
    for (i, &b) in bytes.iter().enumerate() {
        let c = b as char;
        match c {
            '\'' if !in_d => in_s = !in_s,
            '"' if !in_s => in_d = !in_d,
            '(' | '[' | '{' if !in_s && !in_d => depth += 1,
            ')' | ']' | '}' if !in_s && !in_d => depth -= 1,
            _ => {}
        }
        depths[i + 1] = depth;
        quote[i + 1] = in_s || in_d;
    }

    for start in (0..s.len()).rev() {
        if depths[start] != 0 || quote[start] {
            continue;
        }
        for op in ops {
            if s[start..].starts_with(op) && depths[start] == 0 {
                let is_word = op.chars().next().map(|c| c.is_alphabetic()).unwrap_or(false);
                if is_word {
                    let before_ok = start == 0 || !s.as_bytes()[start - 1].is_ascii_alphanumeric();
                    let after = start + op.len();
                    let after_ok =
                        after >= s.len() || !s.as_bytes()[after].is_ascii_alphanumeric();
                    if !before_ok || !after_ok {
                        continue;
                    }
                }
                return Some((op, start));
            }
        }
    }
    None
}

fn classify_call_or_index(s: &str) -> Result<Option<Token>, Syntax> {
    if s.ends_with(')') {
        if let Some(open) = find_matching_open(s, s.len() - 1, '(', ')') {
            if open > 0 {
                let callee = &s[..open];
                let args = s[open + 1..s.len() - 1].trim().to_string();
                if is_balanced(callee) && !callee.is_empty() {
                    return Ok(Some(pipeline_rewrite(callee, args)));
                }
            }
        }
    }
    if s.ends_with(']') {
        if let Some(open) = find_matching_open(s, s.len() - 1, '[', ']') {
            if open > 0 {
                let obj = &s[..open];
                let args = s[open + 1..s.len() - 1].trim().to_string();
                if is_balanced(obj) && !obj.is_empty() {
                    return Ok(Some(Token::Index { obj: obj.to_string(), args }));
                }
            }
        }
    }
    Ok(None)
}

fn find_matching_open(s: &str, close_byte: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices().rev() {
        if i > close_byte {
            continue;
        }
        if c == close {
            depth += 1;
        } else if c == open {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// `a.f(x,y)` rewrites to `f(a,x,y)` when the callee contains a top-level `.`.
fn pipeline_rewrite(callee: &str, args: String) -> Token {
    if let Some(dot) = find_matching_top_level_dot(callee) {
        let obj = callee[..dot].trim().to_string();
        let method = callee[dot + 1..].trim().to_string();
        let new_args = if args.is_empty() { obj } else { format!("{},{}", obj, args) };
        return Token::Call { callee: method, args: new_args };
    }
    Token::Call { callee: callee.to_string(), args }
}

fn find_matching_top_level_dot(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut last = None;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '.' if depth == 0 => last = Some(i),
            _ => {}
        }
    }
    last
}

fn classify_field_access(s: &str) -> Option<Token> {
    let idx = find_matching_top_level_dot2(s)?;
    let obj = s[..idx].trim();
    let key = s[idx + 2..].trim();
    if obj.is_empty() || key.is_empty() {
        return None;
    }
    Some(Token::Index { obj: obj.to_string(), args: format!("'{}'", key) })
}

fn find_matching_top_level_dot2(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    for i in (0..bytes.len().saturating_sub(1)).rev() {
        match bytes[i] as char {
            ')' | ']' | '}' => depth += 1,
            '(' | '[' | '{' => depth -= 1,
            ':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => return Some(i),
            _ => {}
        }
    }
    None
}

fn find_top_level_word(s: &str, word: &str) -> Option<usize> {
    rightmost_top_level_op(s, &[word]).map(|(_, idx)| idx)
}

fn find_top_level_char(s: &str, ch: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_s = false;
    let mut in_d = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' if !in_d => in_s = !in_s,
            '"' if !in_s => in_d = !in_d,
            '(' | '[' | '{' if !in_s && !in_d => depth += 1,
            ')' | ']' | '}' if !in_s && !in_d => depth -= 1,
            _ if c == ch && depth == 0 && !in_s && !in_d => return Some(i),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classifies_keywords() {
        assert_eq!(classify("true").unwrap(), Token::Keyword(Keyword::True));
        assert_eq!(classify("break").unwrap(), Token::Keyword(Keyword::Break));
    }

    #[test]
    fn classifies_var_decl_with_type_and_init() {
        match classify("var n: int = 0").unwrap() {
            Token::VarDecl { name, ty, init } => {
                assert_eq!(name, "n");
                assert_eq!(ty.as_deref(), Some("int"));
                assert_eq!(init.as_deref(), Some("0"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classifies_assignment() {
        match classify("x = 1 + 2").unwrap() {
            Token::Assign { name, expr } => {
                assert_eq!(name, "x");
                assert_eq!(expr, "1 + 2");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classifies_indexed_assignment() {
        match classify("xs[i] = i * i").unwrap() {
            Token::IndexAssign { obj, index, expr } => {
                assert_eq!(obj, "xs");
                assert_eq!(index, "i");
                assert_eq!(expr, "i * i");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classifies_for_loop() {
        match classify("for (i in 0 to 2) { xs[i] = i }").unwrap() {
            Token::For { name, iter, body } => {
                assert_eq!(name, "i");
                assert_eq!(iter, "0 to 2");
                assert_eq!(body, "xs[i] = i");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classifies_function_literal() {
        match classify("(n) { return n }").unwrap() {
            Token::FunctionLit { params, body } => {
                assert_eq!(params, "n");
                assert_eq!(body, "return n");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classifies_arithmetic_precedence() {
        match classify("1 + 2 * 3").unwrap() {
            Token::BinOp { op, lhs, rhs, .. } => {
                assert_eq!(op, "+");
                assert_eq!(lhs, "1");
                assert_eq!(rhs, "2 * 3");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn scientific_notation_is_not_split_as_subtraction() {
        match classify("1e-3").unwrap() {
            Token::Atom(a) => assert_eq!(a, "1e-3"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classifies_call() {
        match classify("fact(n - 1)").unwrap() {
            Token::Call { callee, args } => {
                assert_eq!(callee, "fact");
                assert_eq!(args, "n - 1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pipeline_call_rewrites() {
        match classify("a.f(x,y)").unwrap() {
            Token::Call { callee, args } => {
                assert_eq!(callee, "f");
                assert_eq!(args, "a,x,y");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn field_access_rewrites_to_index() {
        match classify("m::greet").unwrap() {
            Token::Index { obj, args } => {
                assert_eq!(obj, "m");
                assert_eq!(args, "'greet'");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
