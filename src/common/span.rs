//! Source locations used throughout the compiler for diagnostics.

use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use crate::common::source::Source;

/// A `Span` refers to a section of a [`Source`], the way a `&str` refers to a
/// section of a `String`, but keeping a handle back to the source it came
/// from so it can be rendered in an error without the caller threading the
/// source through separately.
#[derive(Debug, Clone)]
pub struct Span {
    source: Option<Rc<Source>>,
    offset: usize,
    length: usize,
}

impl PartialEq for Span {
    fn eq(&self, other: &Span) -> bool {
        self.offset == other.offset
            && self.length == other.length
            && match (&self.source, &other.source) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}
impl Eq for Span {}

impl Span {
    pub fn new(source: &Rc<Source>, offset: usize, length: usize) -> Span {
        Span { source: Some(Rc::clone(source)), offset, length }
    }

    pub fn point(source: &Rc<Source>, offset: usize) -> Span {
        Span { source: Some(Rc::clone(source)), offset, length: 1 }
    }

    /// An empty span has no source; combining it with anything yields the
    /// other span untouched.
    pub fn empty() -> Span {
        Span { source: None, offset: 0, length: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
    }

    /// Spans the union of two spans from the same source.
    pub fn combine(a: &Span, b: &Span) -> Span {
        if a.is_empty() {
            return b.clone();
        }
        if b.is_empty() {
            return a.clone();
        }

        let a_source = a.source.as_ref().unwrap();
        let b_source = b.source.as_ref().unwrap();
        if !Rc::ptr_eq(a_source, b_source) {
            panic!("can't combine two spans from different sources");
        }

        let offset = a.offset.min(b.offset);
        let end = (a.offset + a.length).max(b.offset + b.length);
        Span::new(a_source, offset, end - offset)
    }

    pub fn contents(&self) -> &str {
        let source = self.source.as_ref().expect("empty span has no contents");
        &source.contents[self.offset..self.offset + self.length]
    }

    fn line_col(&self, at: usize) -> (usize, usize) {
        let source = self.source.as_ref().unwrap();
        let mut line = 0;
        let mut col = 0;
        for (i, c) in source.contents.char_indices() {
            if i >= at {
                break;
            }
            if c == '\n' {
                line += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        (line, col)
    }
}

impl Display for Span {
    /// Renders a single-line caret underline under the offending text,
    /// e.g.:
    /// ```plain
    /// 3 | print(10 / 0)
    ///   |       ^^^^^^
    /// ```
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }

        let source = self.source.as_ref().unwrap();
        let (start_line, start_col) = self.line_col(self.offset);
        let lines: Vec<&str> = source.contents.lines().collect();
        let line_text = lines.get(start_line).copied().unwrap_or("");
        let line_no = (start_line + 1).to_string();
        let pad = " ".repeat(line_no.len());

        writeln!(f, "{}:{}:{}", source.path.display(), start_line + 1, start_col + 1)?;
        writeln!(f, "{} |", pad)?;
        writeln!(f, "{} | {}", line_no, line_text)?;
        writeln!(
            f,
            "{} | {}{}",
            pad,
            " ".repeat(start_col),
            "^".repeat(self.length.max(1)),
        )
    }
}

/// Wraps a syntax-tree or token node with the span it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    pub item: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(item: T, span: Span) -> Spanned<T> {
        Spanned { item, span }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn combination() {
        let source = Source::source("heck, that's awesome");
        let a = Span::new(&source, 0, 5);
        let b = Span::new(&source, 11, 2);
        assert_eq!(Span::combine(&a, &b), Span::new(&source, 0, 13));
    }

    #[test]
    fn empty_combine_is_identity() {
        let source = Source::source("abc");
        let a = Span::new(&source, 0, 3);
        assert_eq!(Span::combine(&a, &Span::empty()), a);
        assert_eq!(Span::combine(&Span::empty(), &a), a);
    }
}
