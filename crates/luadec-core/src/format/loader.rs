use super::header::{malformed, Endian, Header, SIGNATURE, TEST_NUMBER};
use super::prototype::{BytecodeImage, Constant, LocalVar, Prototype};
use super::reader::Reader;
use crate::codec::Layout;
use crate::error::{DecodeError, Result};
use crate::instruction::Instruction;
use crate::nls::Nls;

/// Deepest function nesting accepted before the chunk is considered corrupt.
pub const MAX_NESTING: usize = 200;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Code page of string constants.
    pub nls: Nls,
}

/// Load a chunk with default options (UTF-8 strings).
pub fn load(bytes: &[u8]) -> Result<BytecodeImage> {
    load_with(bytes, &LoadOptions::default())
}

pub fn load_with(bytes: &[u8], opts: &LoadOptions) -> Result<BytecodeImage> {
    let mut rdr = Reader::raw(bytes);
    let header = read_header(&mut rdr)?;
    rdr.configure(&header, opts.nls);

    let test = rdr.number()?;
    let expected = if header.number_size == 4 {
        TEST_NUMBER as f32 as f64
    } else {
        TEST_NUMBER
    };
    if test != expected {
        log::warn!("unexpected test number {} (expected {}), continuing", test, expected);
    }

    let layout = header.layout()?;
    let main = read_function(&mut rdr, layout, 0)?;
    if rdr.remaining() > 0 {
        log::debug!("{} trailing bytes after main function", rdr.remaining());
    }

    Ok(BytecodeImage { header, main })
}

fn read_header(rdr: &mut Reader<'_>) -> Result<Header> {
    let sig = rdr.take(SIGNATURE.len())?;
    if sig != SIGNATURE {
        return Err(malformed(format!("bad signature {:02X?}", sig)));
    }

    let version = rdr.byte()?;
    let endian = match rdr.byte()? {
        0 => Endian::Big,
        1 => Endian::Little,
        other => return Err(malformed(format!("bad endianness flag {other}"))),
    };

    let header = Header {
        version,
        endian,
        int_size: rdr.byte()?,
        size_t_size: rdr.byte()?,
        instruction_size: rdr.byte()?,
        op_bits: rdr.byte()?,
        a_bits: rdr.byte()?,
        b_bits: rdr.byte()?,
        c_bits: rdr.byte()?,
        number_size: rdr.byte()?,
    };
    header.validate()?;
    Ok(header)
}

fn read_function(rdr: &mut Reader<'_>, layout: Layout, depth: usize) -> Result<Prototype> {
    if depth > MAX_NESTING {
        return Err(malformed(format!("function nesting deeper than {MAX_NESTING}")));
    }

    let source = rdr.string()?;
    let line_defined = rdr.int()?;
    let upvalue_count = rdr.byte()?;
    let param_count = rdr.byte()?;
    let is_vararg = rdr.byte()?;
    let max_stack = rdr.byte()?;

    let int = rdr.int_size();
    let size_t = rdr.size_t_size();

    let n = rdr.count(int)?;
    let mut lines = Vec::with_capacity(n);
    for _ in 0..n {
        lines.push(rdr.int()?);
    }

    let n = rdr.count(size_t + 2 * int)?;
    let mut locals = Vec::with_capacity(n);
    for _ in 0..n {
        let name = rdr.string()?;
        let start_pc = pc_bound(rdr.int()?);
        let end_pc = pc_bound(rdr.int()?);
        locals.push(LocalVar { name, start_pc, end_pc });
    }

    let n = rdr.count(size_t)?;
    let mut upvalues = Vec::with_capacity(n);
    for _ in 0..n {
        upvalues.push(rdr.string()?);
    }

    let constants = read_constants(rdr)?;

    // Nested functions come before the code that refers to them.
    let n = rdr.count(minimal_function_size(rdr))?;
    let mut prototypes = Vec::with_capacity(n);
    for _ in 0..n {
        prototypes.push(read_function(rdr, layout, depth + 1)?);
    }

    let n = rdr.count(4)?;
    let mut code = Vec::with_capacity(n);
    for _ in 0..n {
        code.push(Instruction::new(rdr.word()?, layout));
    }

    Ok(Prototype {
        source,
        line_defined,
        upvalue_count,
        param_count,
        is_vararg,
        max_stack,
        lines,
        locals,
        upvalues,
        constants,
        prototypes,
        code,
    })
}

fn read_constants(rdr: &mut Reader<'_>) -> Result<Vec<Constant>> {
    let n = rdr.count(1)?;
    let mut constants = Vec::with_capacity(n);
    for _ in 0..n {
        let at = rdr.offset();
        let k = match rdr.byte()? {
            Constant::TAG_NIL => Constant::Empty,
            Constant::TAG_NUMBER => Constant::Number(rdr.number()?),
            Constant::TAG_STRING => Constant::String(rdr.string()?),
            tag => return Err(DecodeError::InvalidConstantTag { tag, offset: at }),
        };
        constants.push(k);
    }
    Ok(constants)
}

/// Smallest encoding of an empty function: source, line, four bytes, six empty lists.
fn minimal_function_size(rdr: &Reader<'_>) -> usize {
    rdr.size_t_size() + rdr.int_size() + 4 + 6 * rdr.int_size()
}

fn pc_bound(v: i64) -> u32 {
    v.clamp(0, u32::MAX as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::writer::dump;

    fn tiny_image() -> BytecodeImage {
        let layout = Layout::lua50();
        BytecodeImage {
            header: Header::lua50(),
            main: Prototype {
                source: "@tiny.lua".into(),
                max_stack: 2,
                lines: vec![1, 1],
                constants: vec![Constant::Number(1.0), Constant::String("x".into())],
                code: vec![
                    Instruction::new(layout.encode_abx(1, 0, 0), layout),
                    Instruction::new(layout.encode_abc(27, 0, 1, 0), layout),
                ],
                ..Default::default()
            },
        }
    }

    #[test]
    fn loads_written_chunk() {
        let image = tiny_image();
        let bytes = dump(&image);
        assert_eq!(load(&bytes).unwrap(), image);
    }

    #[test]
    fn bad_signature_is_malformed() {
        let mut bytes = dump(&tiny_image());
        bytes[1] = b'X';
        assert!(matches!(load(&bytes), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn every_truncation_point_fails_cleanly() {
        let bytes = dump(&tiny_image());
        for len in 0..bytes.len() {
            let err = load(&bytes[..len]).unwrap_err();
            assert!(
                matches!(err, DecodeError::TruncatedStream { .. }),
                "len={len}: {err:?}"
            );
        }
    }

    #[test]
    fn unknown_constant_tag() {
        let mut image = tiny_image();
        image.main.constants = vec![Constant::Empty];
        let mut bytes = dump(&image);
        // The single nil constant's tag byte sits right after its count; patch it.
        let tag_at = bytes
            .windows(5)
            .rposition(|w| w == [1, 0, 0, 0, 0])
            .unwrap()
            + 4;
        bytes[tag_at] = 9;
        assert_eq!(
            load(&bytes).unwrap_err(),
            DecodeError::InvalidConstantTag { tag: 9, offset: tag_at }
        );
    }
}
