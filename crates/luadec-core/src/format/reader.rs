use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::header::{Endian, Header};
use crate::error::{DecodeError, Result};
use crate::nls::Nls;

/// Bounds-checked cursor over a chunk, parameterised by the header widths.
pub(crate) struct Reader<'b> {
    bytes: &'b [u8],
    off: usize,
    endian: Endian,
    int_size: usize,
    size_t_size: usize,
    number_size: usize,
    nls: Nls,
}

impl<'b> Reader<'b> {
    /// A cursor for the raw header bytes, before any width is known.
    pub(crate) fn raw(bytes: &'b [u8]) -> Self {
        Self {
            bytes,
            off: 0,
            endian: Endian::Little,
            int_size: 4,
            size_t_size: 4,
            number_size: 8,
            nls: Nls::Utf8,
        }
    }

    pub(crate) fn configure(&mut self, header: &Header, nls: Nls) {
        self.endian = header.endian;
        self.int_size = header.int_size as usize;
        self.size_t_size = header.size_t_size as usize;
        self.number_size = header.number_size as usize;
        self.nls = nls;
    }

    #[inline]
    pub(crate) fn offset(&self) -> usize {
        self.off
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.off
    }

    #[inline]
    pub(crate) fn int_size(&self) -> usize {
        self.int_size
    }

    #[inline]
    pub(crate) fn size_t_size(&self) -> usize {
        self.size_t_size
    }

    #[inline]
    pub(crate) fn number_size(&self) -> usize {
        self.number_size
    }

    fn truncated(&self, needed: usize) -> DecodeError {
        DecodeError::TruncatedStream {
            offset: self.off,
            needed,
            available: self.remaining(),
        }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'b [u8]> {
        if n > self.remaining() {
            return Err(self.truncated(n));
        }
        let s = &self.bytes[self.off..self.off + n];
        self.off += n;
        Ok(s)
    }

    pub(crate) fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn int(&mut self) -> Result<i64> {
        let raw = self.take(self.int_size)?;
        Ok(match (self.endian, raw.len()) {
            (Endian::Little, 4) => LittleEndian::read_i32(raw) as i64,
            (Endian::Big, 4) => BigEndian::read_i32(raw) as i64,
            (Endian::Little, _) => LittleEndian::read_i64(raw),
            (Endian::Big, _) => BigEndian::read_i64(raw),
        })
    }

    pub(crate) fn size_t(&mut self) -> Result<u64> {
        let raw = self.take(self.size_t_size)?;
        Ok(match (self.endian, raw.len()) {
            (Endian::Little, 4) => LittleEndian::read_u32(raw) as u64,
            (Endian::Big, 4) => BigEndian::read_u32(raw) as u64,
            (Endian::Little, _) => LittleEndian::read_u64(raw),
            (Endian::Big, _) => BigEndian::read_u64(raw),
        })
    }

    pub(crate) fn number(&mut self) -> Result<f64> {
        let raw = self.take(self.number_size)?;
        Ok(match (self.endian, raw.len()) {
            (Endian::Little, 4) => LittleEndian::read_f32(raw) as f64,
            (Endian::Big, 4) => BigEndian::read_f32(raw) as f64,
            (Endian::Little, _) => LittleEndian::read_f64(raw),
            (Endian::Big, _) => BigEndian::read_f64(raw),
        })
    }

    pub(crate) fn word(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u32(raw),
            Endian::Big => BigEndian::read_u32(raw),
        })
    }

    /// Length-prefixed string. A zero length is the empty string; a trailing NUL is dropped.
    pub(crate) fn string(&mut self) -> Result<String> {
        let len = self.size_t()?;
        let len = usize::try_from(len).map_err(|_| self.truncated(usize::MAX))?;
        let raw = self.take(len)?;
        let raw = raw.strip_suffix(b"\0").unwrap_or(raw);
        Ok(self.nls.decode(raw).into_owned())
    }

    /// Read an `int` list count and make sure `count` entries of at least
    /// `min_entry` bytes each can still be present.
    pub(crate) fn count(&mut self, min_entry: usize) -> Result<usize> {
        let at = self.off;
        let raw = self.int()?;
        let count = usize::try_from(raw).map_err(|_| DecodeError::TruncatedStream {
            offset: at,
            needed: usize::MAX,
            available: self.remaining(),
        })?;
        let needed = count.saturating_mul(min_entry);
        if needed > self.remaining() {
            return Err(self.truncated(needed));
        }
        Ok(count)
    }
}
