use serde::Serialize;

use crate::codec::{field, Layout};

/// RK operands at or above this value address the constant pool.
pub const RK_OFFSET: u32 = 250;

/// One 32-bit instruction word, carrying the layout of the chunk it came from.
///
/// All operand accessors are views over `raw`; nothing is decoded eagerly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub raw: u32,
    #[serde(skip)]
    layout: Layout,
}

impl Instruction {
    #[inline]
    pub fn new(raw: u32, layout: Layout) -> Self {
        Self { raw, layout }
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    pub fn opcode(&self) -> u32 {
        field(self.raw, self.layout.op)
    }

    #[inline]
    pub fn a(&self) -> u32 {
        field(self.raw, self.layout.a)
    }

    #[inline]
    pub fn b(&self) -> u32 {
        field(self.raw, self.layout.b)
    }

    #[inline]
    pub fn c(&self) -> u32 {
        field(self.raw, self.layout.c)
    }

    #[inline]
    pub fn bx(&self) -> u32 {
        self.layout.bx(self.raw)
    }

    #[inline]
    pub fn sbx(&self) -> i32 {
        self.layout.sbx(self.raw)
    }

    /// Target of a relative jump stored in sBx, where `pc` is this instruction's index.
    ///
    /// The VM has already stepped past the instruction when it adds sBx, hence the `+ 1`.
    /// Returns `None` for targets before the start of the stream.
    #[inline]
    pub fn jump_target(&self, pc: usize) -> Option<usize> {
        let t = pc as i64 + 1 + self.sbx() as i64;
        usize::try_from(t).ok()
    }
}

/// Decoded RK operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register(u32),
    Constant(u32),
}

#[inline]
pub fn rk(v: u32) -> Operand {
    if v >= RK_OFFSET {
        Operand::Constant(v - RK_OFFSET)
    } else {
        Operand::Register(v)
    }
}
