//! Splits source text into bracket/quote-balanced statement units (spec §4.1).

use std::rc::Rc;

use crate::common::source::Source;
use crate::common::span::{Span, Spanned};
use crate::compiler::syntax::{Syntax, SyntaxKind};

/// A lexical unit: the largest substring balanced in `()[]{}` and quotes,
/// terminated by a newline, EOF, or an unquoted `;`.
pub type Unit = Spanned<String>;

#[derive(Default)]
struct Depth {
    paren: i32,
    bracket: i32,
    brace: i32,
}

impl Depth {
    fn is_zero(&self) -> bool {
        self.paren == 0 && self.bracket == 0 && self.brace == 0
    }
}

/// Lexes plain `.tap` source into units.
pub fn lex(source: &Rc<Source>) -> Result<Vec<Unit>, Syntax> {
    let contents = &source.contents;
    let mut units = Vec::new();

    let mut depth = Depth::default();
    let mut in_single = false;
    let mut in_double = false;
    let mut in_comment = false;
    let mut buf = String::new();
    let mut raw_start: Option<usize> = None;
    let mut last_byte = 0usize;

    let mut chars = contents.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        last_byte = i + c.len_utf8();

        if in_comment {
            if c == '\n' {
                in_comment = false;
            } else {
                continue;
            }
        } else if !in_single && !in_double && c == '/' && matches!(chars.peek(), Some((_, '/'))) {
            chars.next();
            in_comment = true;
            continue;
        }

        if !in_comment {
            if c == '\'' && !in_double {
                in_single = !in_single;
            } else if c == '"' && !in_single {
                in_double = !in_double;
            } else if !in_single && !in_double {
                match c {
                    '(' => depth.paren += 1,
                    ')' => depth.paren -= 1,
                    '[' => depth.bracket += 1,
                    ']' => depth.bracket -= 1,
                    '{' => depth.brace += 1,
                    '}' => depth.brace -= 1,
                    _ => {}
                }
            }
        }

        let at_top = depth.is_zero() && !in_single && !in_double && !in_comment;
        let terminates = at_top && (c == '\n' || c == ';');

        if terminates {
            if let Some(start) = raw_start.take() {
                push_unit(source, &mut units, &buf, start, i)?;
            }
            buf.clear();
            continue;
        }

        if c == '\n' {
            // newline inside a multi-line bracketed expression: keep as
            // whitespace so the tokenizer never sees a raw newline.
            buf.push(' ');
            continue;
        }

        if raw_start.is_none() && !c.is_whitespace() {
            raw_start = Some(i);
        }
        buf.push(c);
    }

    if !depth.is_zero() {
        return Err(Syntax::plain(SyntaxKind::BracketsOpen, "unbalanced brackets at end of file"));
    }
    if in_single || in_double {
        return Err(Syntax::plain(SyntaxKind::BracketsOpen, "unterminated string literal"));
    }

    if let Some(start) = raw_start {
        push_unit(source, &mut units, &buf, start, last_byte)?;
    }

    Ok(units)
}

fn push_unit(
    source: &Rc<Source>,
    units: &mut Vec<Unit>,
    buf: &str,
    start: usize,
    end: usize,
) -> Result<(), Syntax> {
    let trimmed = buf.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    let rewritten = rewrite_unary_minus(strip_wrapping_parens(trimmed));
    let span = Span::new(source, start, end.saturating_sub(start).max(1));
    units.push(Spanned::new(rewritten, span));
    Ok(())
}

/// Strips one layer of parentheses that wrap the entire unit, if balanced.
fn strip_wrapping_parens(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'(') || bytes.last() != Some(&b')') {
        return s;
    }
    let mut depth = 0i32;
    for (idx, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && idx != bytes.len() - 1 {
            return s;
        }
    }
    &s[1..s.len() - 1]
}

/// Rewrites a lone unary-minus prefixed unit `-expr` into `(0-expr)` so the
/// tokenizer never has to special-case leading negation.
fn rewrite_unary_minus(s: &str) -> String {
    if let Some(rest) = s.strip_prefix('-') {
        if !rest.is_empty() {
            return format!("(0-{})", rest);
        }
    }
    s.to_string()
}

const FENCE_TAGS: [&str; 5] = ["```tapas", "```Tapas", "```{tapas}", "```{Tapas}", "```"];

/// Lexes a Markdown file, extracting only fenced `tapas`/`Tapas` code blocks
/// and running the plain unit lexer over their concatenated contents.
///
/// The closing fence is recognized only as a bare triple-backtick line,
/// regardless of what tag the opening fence carried — an intentional
/// inconsistency preserved from the reference lexer.
pub fn lex_markdown(source: &Rc<Source>) -> Result<Vec<Unit>, Syntax> {
    let mut code = String::new();
    let mut in_block = false;

    for line in source.contents.lines() {
        let trimmed = line.trim_start();
        if !in_block {
            if FENCE_TAGS.iter().any(|tag| trimmed.starts_with(tag)) {
                in_block = true;
            }
            continue;
        }
        if trimmed == "```" {
            in_block = false;
            code.push('\n');
            continue;
        }
        code.push_str(line);
        code.push('\n');
    }

    let extracted = Source::new(&code, &source.path);
    lex(&extracted)
}

#[cfg(test)]
mod test {
    use super::*;

    fn unit_strs(source: &str) -> Vec<String> {
        let source = Source::source(source);
        lex(&source).unwrap().into_iter().map(|u| u.item).collect()
    }

    #[test]
    fn splits_on_semicolon_and_newline() {
        assert_eq!(unit_strs("var x = 1; var y = 2\nvar z = 3"),
            vec!["var x = 1", "var y = 2", "var z = 3"]);
    }

    #[test]
    fn keeps_brackets_balanced_across_newlines() {
        let units = unit_strs("var xs = [\n1,\n2,\n3\n]");
        assert_eq!(units.len(), 1);
        assert!(units[0].contains("1,"));
    }

    #[test]
    fn strips_line_comments() {
        assert_eq!(unit_strs("var x = 1 // a comment\nvar y = 2"),
            vec!["var x = 1", "var y = 2"]);
    }

    #[test]
    fn strips_outer_parens() {
        assert_eq!(unit_strs("(1 + 2)"), vec!["1 + 2"]);
    }

    #[test]
    fn rewrites_leading_unary_minus() {
        assert_eq!(unit_strs("-x"), vec!["(0-x)"]);
    }

    #[test]
    fn unbalanced_brackets_error() {
        let source = Source::source("var xs = [1, 2");
        assert!(lex(&source).is_err());
    }

    #[test]
    fn markdown_extracts_tagged_fence_only() {
        let md = "# title\n```tapas\nvar x = 1\n```\n```python\nx = 1\n```\n";
        let source = Source::source(md);
        let units: Vec<String> = lex_markdown(&source).unwrap().into_iter().map(|u| u.item).collect();
        assert_eq!(units, vec!["var x = 1"]);
    }
}
