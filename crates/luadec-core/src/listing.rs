//! `luac -l` style disassembly.

use std::fmt::Write as _;

use crate::format::{BytecodeImage, Endian, Prototype};
use crate::instruction::{rk, Instruction, Operand};
use crate::opcode::{OperandFormat, OperatorKind};

/// Disassemble the whole prototype tree, parents before children.
pub fn listing(image: &BytecodeImage) -> String {
    let h = &image.header;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "; version 0x{:02X}, {}-endian, int={} size_t={} number={}, bits op={} a={} b={} c={}",
        h.version,
        match h.endian {
            Endian::Little => "little",
            Endian::Big => "big",
        },
        h.int_size,
        h.size_t_size,
        h.number_size,
        h.op_bits,
        h.a_bits,
        h.b_bits,
        h.c_bits
    );
    write_function(&mut out, &image.main, "main");
    out
}

fn write_function(out: &mut String, proto: &Prototype, path: &str) {
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "function {} <{}:{}> ({} instructions)",
        path,
        if proto.source.is_empty() { "?" } else { proto.source.as_str() },
        proto.line_defined,
        proto.code.len()
    );
    let _ = writeln!(
        out,
        "{}{} params, {} stack, {} upvalues, {} locals, {} constants, {} functions",
        proto.param_count,
        if proto.has_varargs() { "+" } else { "" },
        proto.max_stack,
        proto.upvalue_count,
        proto.locals.len(),
        proto.constants.len(),
        proto.prototypes.len()
    );
    for (pc, inst) in proto.code.iter().enumerate() {
        let _ = writeln!(out, "{}", format_instruction(proto, path, pc, inst));
    }
    for (i, child) in proto.prototypes.iter().enumerate() {
        write_function(out, child, &format!("{}/{}", path, i));
    }
}

/// One listing row: pc, source line, mnemonic, operands and a resolving comment.
pub fn format_instruction(proto: &Prototype, path: &str, pc: usize, inst: &Instruction) -> String {
    let kind = OperatorKind::from_opcode(inst.opcode());
    let line = proto
        .line(pc)
        .map(|l| format!("[{}]", l))
        .unwrap_or_else(|| "[-]".to_string());
    let mnemonic = match kind {
        OperatorKind::Generic => format!("OP_{}", inst.opcode()),
        k => k.mnemonic().to_string(),
    };
    let operands = match kind.format() {
        OperandFormat::ABC => format!("{} {} {}", inst.a(), inst.b(), inst.c()),
        OperandFormat::ABx => format!("{} {}", inst.a(), inst.bx()),
        OperandFormat::AsBx => format!("{} {}", inst.a(), inst.sbx()),
    };

    let comment = match kind {
        OperatorKind::LoadK | OperatorKind::GetGlobal | OperatorKind::SetGlobal => {
            constant(proto, inst.bx())
        }
        OperatorKind::Jmp | OperatorKind::ForLoop | OperatorKind::TForPrep => inst
            .jump_target(pc)
            .map(|t| format!("to {}", t))
            .unwrap_or_else(|| "to ?".to_string()),
        OperatorKind::Closure => format!("{}/{}", path, inst.bx()),
        OperatorKind::GetTable | OperatorKind::SelfOp => rk_comment(proto, &[inst.c()]),
        OperatorKind::SetTable
        | OperatorKind::Add
        | OperatorKind::Sub
        | OperatorKind::Mul
        | OperatorKind::Div
        | OperatorKind::Pow
        | OperatorKind::Eq
        | OperatorKind::Lt
        | OperatorKind::Le => rk_comment(proto, &[inst.b(), inst.c()]),
        _ => String::new(),
    };

    let row = format!("{:>6}  {:<7} {:<9} {:<14}", pc, line, mnemonic, operands);
    if comment.is_empty() {
        row.trim_end().to_string()
    } else {
        format!("{}; {}", row, comment)
    }
}

fn constant(proto: &Prototype, idx: u32) -> String {
    match proto.constant(idx) {
        Some(k) => k.to_string(),
        None => format!("K{}?", idx),
    }
}

fn rk_comment(proto: &Prototype, operands: &[u32]) -> String {
    operands
        .iter()
        .filter_map(|&v| match rk(v) {
            Operand::Constant(k) => Some(constant(proto, k)),
            Operand::Register(_) => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Layout;
    use crate::format::{Constant, Header};

    #[test]
    fn rows_resolve_constants_and_targets() {
        let l = Layout::lua50();
        let proto = Prototype {
            lines: vec![1, 2, 2],
            constants: vec![Constant::String("print".into())],
            code: vec![
                Instruction::new(l.encode_abx(5, 0, 0), l),
                Instruction::new(l.encode_asbx(20, 0, -2), l),
                Instruction::new(l.encode_abc(50, 1, 2, 3), l),
            ],
            ..Default::default()
        };
        let image = BytecodeImage { header: Header::lua50(), main: proto };
        let text = listing(&image);
        assert!(text.contains("function main <?:0> (3 instructions)"));
        let rows: Vec<&str> = text.lines().skip(4).collect();
        assert!(rows[0].contains("GETGLOBAL") && rows[0].ends_with("; \"print\""));
        assert!(rows[1].contains("JMP") && rows[1].ends_with("; to 0"));
        assert!(rows[2].contains("OP_50") && rows[2].ends_with("1 2 3"));
    }
}
