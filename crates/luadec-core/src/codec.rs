//! Instruction word codec.
//!
//! The field widths are not constants: every chunk header declares how many
//! bits the opcode and the A/B/C operands take. Fields are packed from the low
//! bits upwards in the order opcode, C, B, A, so `Bx` is simply the B and C
//! fields read as one wider value.

use serde::Serialize;

use crate::error::{DecodeError, Result};

/// A `(mask, shift)` pair locating one field inside an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Field {
    pub mask: u32,
    pub shift: u32,
}

impl Field {
    fn new(bits: u32, shift: u32) -> Self {
        let mask = ((1u64 << bits) - 1) as u32;
        Self { mask, shift }
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.mask.count_ones()
    }
}

/// Read the value of `f` out of `word`.
#[inline]
pub fn field(word: u32, f: Field) -> u32 {
    word.checked_shr(f.shift).unwrap_or(0) & f.mask
}

/// Return `word` with the bits of `f` replaced by `value` (truncated to the field width).
#[inline]
pub fn with_field(word: u32, f: Field, value: u32) -> u32 {
    let slot = f.mask.checked_shl(f.shift).unwrap_or(0);
    (word & !slot) | (value & f.mask).checked_shl(f.shift).unwrap_or(0)
}

/// Field layout of one chunk, derived from the header bit widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub op: Field,
    pub a: Field,
    pub b: Field,
    pub c: Field,
}

impl Layout {
    pub fn new(op_bits: u8, a_bits: u8, b_bits: u8, c_bits: u8) -> Result<Self> {
        let (op, a, b, c) = (op_bits as u32, a_bits as u32, b_bits as u32, c_bits as u32);
        let total = op + a + b + c;
        if total > 32 {
            return Err(DecodeError::MalformedHeader(format!(
                "field widths op={op} a={a} b={b} c={c} sum to {total} bits (max 32)"
            )));
        }

        Ok(Self {
            op: Field::new(op, 0),
            c: Field::new(c, op),
            b: Field::new(b, op + c),
            a: Field::new(a, op + c + b),
        })
    }

    /// The stock Lua 5.0 layout: 6/8/9/9.
    pub fn lua50() -> Self {
        Self {
            op: Field::new(6, 0),
            c: Field::new(9, 6),
            b: Field::new(9, 15),
            a: Field::new(8, 24),
        }
    }

    /// Width of the combined `Bx` field.
    #[inline]
    pub fn bx_bits(&self) -> u32 {
        self.b.bits() + self.c.bits()
    }

    /// Bias subtracted from `Bx` to obtain `sBx`.
    #[inline]
    pub fn sbx_bias(&self) -> i64 {
        ((1i64 << self.bx_bits()) - 1) / 2
    }

    #[inline]
    pub fn bx(&self, word: u32) -> u32 {
        field(word, self.b).checked_shl(self.c.bits()).unwrap_or(0) | field(word, self.c)
    }

    #[inline]
    pub fn sbx(&self, word: u32) -> i32 {
        (self.bx(word) as i64 - self.sbx_bias()) as i32
    }

    pub fn encode_abc(&self, op: u32, a: u32, b: u32, c: u32) -> u32 {
        let w = with_field(0, self.op, op);
        let w = with_field(w, self.a, a);
        let w = with_field(w, self.b, b);
        with_field(w, self.c, c)
    }

    pub fn encode_abx(&self, op: u32, a: u32, bx: u32) -> u32 {
        let c_bits = self.c.bits();
        let c = bx & self.c.mask;
        let b = bx.checked_shr(c_bits).unwrap_or(0);
        self.encode_abc(op, a, b, c)
    }

    pub fn encode_asbx(&self, op: u32, a: u32, sbx: i32) -> u32 {
        let bx = (sbx as i64 + self.sbx_bias()) as u32;
        self.encode_abx(op, a, bx)
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::lua50()
    }
}
