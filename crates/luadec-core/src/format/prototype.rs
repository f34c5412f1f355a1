use std::fmt;

use serde::Serialize;

use super::header::Header;
use crate::instruction::Instruction;

/// Constant pool entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constant {
    Empty,
    Number(f64),
    String(String),
}

impl Constant {
    pub const TAG_NIL: u8 = 0;
    pub const TAG_NUMBER: u8 = 3;
    pub const TAG_STRING: u8 = 4;

    pub fn tag(&self) -> u8 {
        match self {
            Constant::Empty => Self::TAG_NIL,
            Constant::Number(_) => Self::TAG_NUMBER,
            Constant::String(_) => Self::TAG_STRING,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Empty => write!(f, "nil"),
            Constant::Number(n) => write!(f, "{}", crate::value::format_number(*n)),
            Constant::String(s) => write!(f, "{}", crate::value::quote(s)),
        }
    }
}

/// Debug entry for a named local: live from `start_pc` (inclusive) to `end_pc` (exclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalVar {
    pub name: String,
    pub start_pc: u32,
    pub end_pc: u32,
}

impl LocalVar {
    #[inline]
    pub fn is_live_at(&self, pc: usize) -> bool {
        (self.start_pc as usize) <= pc && pc < (self.end_pc as usize)
    }
}

/// One compiled function.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Prototype {
    pub source: String,
    pub line_defined: i64,
    pub upvalue_count: u8,
    pub param_count: u8,
    pub is_vararg: u8,
    pub max_stack: u8,
    /// Source line per instruction.
    pub lines: Vec<i64>,
    pub locals: Vec<LocalVar>,
    pub upvalues: Vec<String>,
    pub constants: Vec<Constant>,
    /// Nested functions, addressed by `CLOSURE`'s Bx.
    pub prototypes: Vec<Prototype>,
    pub code: Vec<Instruction>,
}

impl Prototype {
    #[inline]
    pub fn constant(&self, idx: u32) -> Option<&Constant> {
        self.constants.get(idx as usize)
    }

    #[inline]
    pub fn instruction(&self, pc: usize) -> Option<Instruction> {
        self.code.get(pc).copied()
    }

    #[inline]
    pub fn line(&self, pc: usize) -> Option<i64> {
        self.lines.get(pc).copied()
    }

    /// Debug name of the local held in `reg` at `pc`.
    ///
    /// Live locals occupy registers in declaration order, so the n-th live entry is register n.
    pub fn local_name(&self, reg: u32, pc: usize) -> Option<&str> {
        self.locals
            .iter()
            .filter(|l| l.is_live_at(pc))
            .nth(reg as usize)
            .map(|l| l.name.as_str())
    }

    /// Total number of prototypes in this subtree, including `self`.
    pub fn tree_size(&self) -> usize {
        1 + self.prototypes.iter().map(Prototype::tree_size).sum::<usize>()
    }

    #[inline]
    pub fn has_varargs(&self) -> bool {
        self.is_vararg != 0
    }
}

/// A fully loaded chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BytecodeImage {
    pub header: Header,
    pub main: Prototype,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, start_pc: u32, end_pc: u32) -> LocalVar {
        LocalVar { name: name.to_string(), start_pc, end_pc }
    }

    #[test]
    fn local_names_follow_live_order() {
        let proto = Prototype {
            locals: vec![local("a", 0, 10), local("b", 2, 5), local("c", 6, 10)],
            ..Default::default()
        };
        assert_eq!(proto.local_name(0, 1), Some("a"));
        assert_eq!(proto.local_name(1, 1), None);
        assert_eq!(proto.local_name(1, 3), Some("b"));
        assert_eq!(proto.local_name(1, 7), Some("c"));
        assert_eq!(proto.local_name(1, 5), None);
    }

    #[test]
    fn tree_size_counts_nested() {
        let leaf = Prototype::default();
        let mid = Prototype { prototypes: vec![leaf.clone(), leaf.clone()], ..Default::default() };
        let root = Prototype { prototypes: vec![mid, leaf], ..Default::default() };
        assert_eq!(root.tree_size(), 5);
    }
}
