use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use super::header::{Endian, Header, SIGNATURE, TEST_NUMBER};
use super::prototype::{BytecodeImage, Constant, Prototype};
use crate::nls::Nls;

/// Serialize an image in the layout [`super::load`] reads, strings as UTF-8.
pub fn dump(image: &BytecodeImage) -> Vec<u8> {
    dump_with(image, Nls::Utf8)
}

pub fn dump_with(image: &BytecodeImage, nls: Nls) -> Vec<u8> {
    let mut w = Writer { out: Vec::new(), header: image.header, nls };
    w.header();
    w.function(&image.main);
    w.out
}

struct Writer {
    out: Vec<u8>,
    header: Header,
    nls: Nls,
}

// Writes into a Vec<u8> cannot fail, so the io::Result values are dropped.
impl Writer {
    fn header(&mut self) {
        let h = self.header;
        self.out.extend_from_slice(SIGNATURE);
        self.out.extend_from_slice(&[
            h.version,
            match h.endian {
                Endian::Little => 1,
                Endian::Big => 0,
            },
            h.int_size,
            h.size_t_size,
            h.instruction_size,
            h.op_bits,
            h.a_bits,
            h.b_bits,
            h.c_bits,
            h.number_size,
        ]);
        self.number(TEST_NUMBER);
    }

    fn int(&mut self, v: i64) {
        let _ = match (self.header.endian, self.header.int_size) {
            (Endian::Little, 4) => self.out.write_i32::<LittleEndian>(v as i32),
            (Endian::Big, 4) => self.out.write_i32::<BigEndian>(v as i32),
            (Endian::Little, _) => self.out.write_i64::<LittleEndian>(v),
            (Endian::Big, _) => self.out.write_i64::<BigEndian>(v),
        };
    }

    fn size_t(&mut self, v: u64) {
        let _ = match (self.header.endian, self.header.size_t_size) {
            (Endian::Little, 4) => self.out.write_u32::<LittleEndian>(v as u32),
            (Endian::Big, 4) => self.out.write_u32::<BigEndian>(v as u32),
            (Endian::Little, _) => self.out.write_u64::<LittleEndian>(v),
            (Endian::Big, _) => self.out.write_u64::<BigEndian>(v),
        };
    }

    fn number(&mut self, v: f64) {
        let _ = match (self.header.endian, self.header.number_size) {
            (Endian::Little, 4) => self.out.write_f32::<LittleEndian>(v as f32),
            (Endian::Big, 4) => self.out.write_f32::<BigEndian>(v as f32),
            (Endian::Little, _) => self.out.write_f64::<LittleEndian>(v),
            (Endian::Big, _) => self.out.write_f64::<BigEndian>(v),
        };
    }

    fn word(&mut self, v: u32) {
        let _ = match self.header.endian {
            Endian::Little => self.out.write_u32::<LittleEndian>(v),
            Endian::Big => self.out.write_u32::<BigEndian>(v),
        };
    }

    /// Non-empty strings are written NUL-terminated, with the NUL counted in the length.
    fn string(&mut self, s: &str) {
        if s.is_empty() {
            self.size_t(0);
            return;
        }
        let raw = self.nls.encode(s).into_owned();
        self.size_t(raw.len() as u64 + 1);
        self.out.extend_from_slice(&raw);
        self.out.push(0);
    }

    fn function(&mut self, f: &Prototype) {
        self.string(&f.source);
        self.int(f.line_defined);
        self.out
            .extend_from_slice(&[f.upvalue_count, f.param_count, f.is_vararg, f.max_stack]);

        self.int(f.lines.len() as i64);
        for &line in &f.lines {
            self.int(line);
        }

        self.int(f.locals.len() as i64);
        for l in &f.locals {
            self.string(&l.name);
            self.int(l.start_pc as i64);
            self.int(l.end_pc as i64);
        }

        self.int(f.upvalues.len() as i64);
        for name in &f.upvalues {
            self.string(name);
        }

        self.int(f.constants.len() as i64);
        for k in &f.constants {
            self.out.push(k.tag());
            match k {
                Constant::Empty => {}
                Constant::Number(n) => self.number(*n),
                Constant::String(s) => self.string(s),
            }
        }

        self.int(f.prototypes.len() as i64);
        for p in &f.prototypes {
            self.function(p);
        }

        self.int(f.code.len() as i64);
        for inst in &f.code {
            self.word(inst.raw);
        }
    }
}
