use serde::Serialize;

use crate::codec::Layout;
use crate::error::{DecodeError, Result};

pub const SIGNATURE: &[u8; 4] = b"\x1bLua";
pub const VERSION: u8 = 0x50;
/// Number stored after the header so loaders can check the float format.
pub const TEST_NUMBER: f64 = 3.141_592_653_589_793_238_46e7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endian {
    Little,
    Big,
}

/// Chunk header.
///
/// Layout:
/// - 4 bytes signature `"\x1bLua"`
/// - u8 version (0x50)
/// - u8 endianness (1 = little, 0 = big)
/// - u8 sizeof(int), u8 sizeof(size_t), u8 sizeof(Instruction)
/// - u8 opcode bits, u8 A bits, u8 B bits, u8 C bits
/// - u8 sizeof(number)
/// - test number, `number_size` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Header {
    pub version: u8,
    pub endian: Endian,
    pub int_size: u8,
    pub size_t_size: u8,
    pub instruction_size: u8,
    pub op_bits: u8,
    pub a_bits: u8,
    pub b_bits: u8,
    pub c_bits: u8,
    pub number_size: u8,
}

impl Header {
    /// Header produced by a stock 32-bit little-endian `luac` 5.0.
    pub fn lua50() -> Self {
        Self {
            version: VERSION,
            endian: Endian::Little,
            int_size: 4,
            size_t_size: 4,
            instruction_size: 4,
            op_bits: 6,
            a_bits: 8,
            b_bits: 9,
            c_bits: 9,
            number_size: 8,
        }
    }

    pub fn layout(&self) -> Result<Layout> {
        Layout::new(self.op_bits, self.a_bits, self.b_bits, self.c_bits)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != VERSION {
            return Err(malformed(format!(
                "unsupported version 0x{:02X} (expected 0x{:02X})",
                self.version, VERSION
            )));
        }
        for (what, size) in [("int", self.int_size), ("size_t", self.size_t_size)] {
            if size != 4 && size != 8 {
                return Err(malformed(format!("sizeof({what}) is {size}, expected 4 or 8")));
            }
        }
        if self.instruction_size != 4 {
            return Err(malformed(format!(
                "sizeof(Instruction) is {}, expected 4",
                self.instruction_size
            )));
        }
        if self.number_size != 4 && self.number_size != 8 {
            return Err(malformed(format!(
                "sizeof(number) is {}, expected 4 or 8",
                self.number_size
            )));
        }
        self.layout().map(|_| ())
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::lua50()
    }
}

pub(crate) fn malformed(msg: impl Into<String>) -> DecodeError {
    DecodeError::MalformedHeader(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_header_is_valid() {
        assert_eq!(Header::lua50().validate(), Ok(()));
        assert_eq!(Header::lua50().layout().unwrap(), Layout::lua50());
    }

    #[test]
    fn rejects_odd_widths() {
        let h = Header { number_size: 10, ..Header::lua50() };
        assert!(matches!(h.validate(), Err(DecodeError::MalformedHeader(_))));

        let h = Header { instruction_size: 8, ..Header::lua50() };
        assert!(matches!(h.validate(), Err(DecodeError::MalformedHeader(_))));

        let h = Header { op_bits: 7, a_bits: 9, ..Header::lua50() };
        assert!(matches!(h.validate(), Err(DecodeError::MalformedHeader(_))));

        let h = Header { version: 0x51, ..Header::lua50() };
        assert!(matches!(h.validate(), Err(DecodeError::MalformedHeader(_))));
    }
}
