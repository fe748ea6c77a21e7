//! Named (`var`) and temporary (`let`) variable tables (spec §4.3).

use crate::common::opcode::MAX_LR_L;
use crate::compiler::syntax::{Syntax, SyntaxKind};

/// The persistent, `var`-declared table for one lexical scope. Shadowing
/// within the same scope is forbidden; declaration inside a control-flow
/// block body is forbidden (enforced by the compiler, which only opens a
/// new `Scope` at function/file granularity, never per-block).
#[derive(Debug, Default)]
pub struct NamedTable {
    names: Vec<String>,
    max_seen: u32,
    /// How many of the leading `names` entries are host-registered
    /// defaults, rather than user `var`s — those are read-only (spec §4.3's
    /// "assign-default").
    protected: u32,
}

impl NamedTable {
    pub fn declare(&mut self, name: &str) -> Result<u32, Syntax> {
        if self.names.iter().any(|n| n == name) {
            return Err(Syntax::plain(
                SyntaxKind::DblDeclare,
                &format!("'{}' is already declared in this scope", name),
            ));
        }
        let index = self.names.len() as u32;
        if index > MAX_LR_L {
            return Err(Syntax::plain(SyntaxKind::ObjOverflow, "too many named variables"));
        }
        self.names.push(name.to_string());
        self.max_seen = self.max_seen.max(self.names.len() as u32);
        Ok(index)
    }

    /// Declares a host-registered default name. Must be called before any
    /// user `var` declarations in this table, and in the same order the
    /// host bound the corresponding values (spec §3's library "default
    /// names").
    pub fn declare_default(&mut self, name: &str) -> Result<u32, Syntax> {
        let index = self.declare(name)?;
        self.protected = self.protected.max(index + 1);
        Ok(index)
    }

    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.names.iter().position(|n| n == name).map(|i| i as u32)
    }

    pub fn is_protected(&self, index: u32) -> bool {
        index < self.protected
    }

    pub fn len(&self) -> u32 {
        self.names.len() as u32
    }

    pub fn max_seen(&self) -> u32 {
        self.max_seen
    }
}

/// The `let`-declared table for the current block. Temporaries are dropped
/// automatically when their enclosing block ends, tracked via `mark`/`truncate`.
#[derive(Debug, Default)]
pub struct TempTable {
    names: Vec<String>,
    max_seen: u32,
}

impl TempTable {
    pub fn declare(&mut self, name: &str) -> Result<u32, Syntax> {
        let index = self.names.len() as u32;
        if index > MAX_LR_L {
            return Err(Syntax::plain(SyntaxKind::RegOverflow, "too many temporary variables"));
        }
        self.names.push(name.to_string());
        self.max_seen = self.max_seen.max(self.names.len() as u32);
        Ok(index)
    }

    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.names.iter().rposition(|n| n == name).map(|i| i as u32)
    }

    pub fn mark(&self) -> usize {
        self.names.len()
    }

    pub fn truncate(&mut self, mark: usize) {
        self.names.truncate(mark);
    }

    pub fn max_seen(&self) -> u32 {
        self.max_seen
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_double_declare() {
        let mut table = NamedTable::default();
        table.declare("x").unwrap();
        assert!(table.declare("x").is_err());
    }

    #[test]
    fn temp_table_scoping() {
        let mut table = TempTable::default();
        table.declare("a").unwrap();
        let mark = table.mark();
        table.declare("b").unwrap();
        assert!(table.contains("b"));
        table.truncate(mark);
        assert!(!table.contains("b"));
        assert!(table.contains("a"));
    }
}
