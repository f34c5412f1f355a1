use anyhow::Result;
use pretty_assertions::assert_eq;

use luadec_core::codec::Layout;
use luadec_core::format::{dump, LocalVar};
use luadec_core::{
    decompile, decompile_with, BytecodeImage, Constant, Header, Instruction, LoadOptions, Prototype,
    RenderOptions, Warning,
};

const LOADK: u32 = 1;
const LOADBOOL: u32 = 2;
const GETUPVAL: u32 = 4;
const GETGLOBAL: u32 = 5;
const SETGLOBAL: u32 = 7;
const SUB: u32 = 13;
const MOVE: u32 = 0;
const JMP: u32 = 20;
const EQ: u32 = 21;
const LT: u32 = 22;
const TEST: u32 = 24;
const CALL: u32 = 25;
const RETURN: u32 = 27;
const FORLOOP: u32 = 28;
const TFORLOOP: u32 = 29;
const TFORPREP: u32 = 30;
const CLOSURE: u32 = 34;

fn abc(op: u32, a: u32, b: u32, c: u32) -> Instruction {
    let l = Layout::lua50();
    Instruction::new(l.encode_abc(op, a, b, c), l)
}

fn abx(op: u32, a: u32, bx: u32) -> Instruction {
    let l = Layout::lua50();
    Instruction::new(l.encode_abx(op, a, bx), l)
}

fn asbx(op: u32, a: u32, sbx: i32) -> Instruction {
    let l = Layout::lua50();
    Instruction::new(l.encode_asbx(op, a, sbx), l)
}

fn num(n: f64) -> Constant {
    Constant::Number(n)
}

fn string(s: &str) -> Constant {
    Constant::String(s.to_string())
}

fn chunk(main: Prototype) -> Vec<u8> {
    dump(&BytecodeImage {
        header: Header::lua50(),
        main,
    })
}

fn source(main: Prototype) -> Result<String> {
    Ok(decompile(&chunk(main))?.source)
}

#[test]
fn loadk_then_return_is_two_lines() -> Result<()> {
    let main = Prototype {
        constants: vec![num(1.0)],
        code: vec![abx(LOADK, 0, 0), abc(RETURN, 0, 2, 0), abc(RETURN, 0, 1, 0)],
        ..Default::default()
    };
    let out = source(main)?;
    assert_eq!(out, "local R_0 = 1\nreturn R_0\n");
    assert_eq!(out.lines().filter(|l| !l.trim().is_empty()).count(), 2);
    Ok(())
}

#[test]
fn numeric_for_loop() -> Result<()> {
    let main = Prototype {
        constants: vec![num(1.0), num(10.0), string("print")],
        code: vec![
            abx(LOADK, 0, 0),
            abx(LOADK, 1, 1),
            abx(LOADK, 2, 0),
            abc(SUB, 0, 0, 2),
            asbx(JMP, 0, 3),
            abx(GETGLOBAL, 3, 2),
            abc(MOVE, 4, 0, 0),
            abc(CALL, 3, 2, 1),
            asbx(FORLOOP, 0, -4),
            abc(RETURN, 0, 1, 0),
        ],
        ..Default::default()
    };
    let out = source(main)?;
    assert_eq!(
        out,
        "local R_0 = 1\n\
         local R_1 = 10\n\
         local R_2 = 1\n\
         for R_0 = 1, 10 do\n  \
           local R_3 = print\n  \
           local R_4 = R_0\n  \
           R_3(R_4)\n\
         end\n\
         return\n"
    );
    assert_eq!(out.matches(" do\n").count(), 1);
    assert_eq!(out.lines().filter(|l| *l == "end").count(), 1);
    Ok(())
}

#[test]
fn numeric_for_uses_debug_name_and_step() -> Result<()> {
    let main = Prototype {
        constants: vec![num(10.0), num(1.0), num(-1.0)],
        locals: vec![
            LocalVar { name: "i".into(), start_pc: 5, end_pc: 6 },
            LocalVar { name: "(for limit)".into(), start_pc: 5, end_pc: 6 },
            LocalVar { name: "(for step)".into(), start_pc: 5, end_pc: 6 },
        ],
        code: vec![
            abx(LOADK, 0, 0),
            abx(LOADK, 1, 1),
            abx(LOADK, 2, 2),
            abc(SUB, 0, 0, 2),
            asbx(JMP, 0, 0),
            asbx(FORLOOP, 0, -1),
            abc(RETURN, 0, 1, 0),
        ],
        ..Default::default()
    };
    let out = source(main)?;
    assert!(out.contains("for i = 10, 1, -1 do\nend\n"), "{out}");
    Ok(())
}

#[test]
fn if_else_blocks() -> Result<()> {
    let main = Prototype {
        param_count: 1,
        constants: vec![string("a"), string("yes"), string("no")],
        code: vec![
            abc(EQ, 0, 0, 250),
            asbx(JMP, 0, 2),
            abx(LOADK, 1, 1),
            asbx(JMP, 0, 1),
            abx(LOADK, 1, 2),
            abc(RETURN, 1, 2, 0),
            abc(RETURN, 0, 1, 0),
        ],
        ..Default::default()
    };
    assert_eq!(
        source(main)?,
        "if param0 == \"a\" then\n  \
           local R_1 = \"yes\"\n\
         else\n  \
           R_1 = \"no\"\n\
         end\n\
         return R_1\n"
    );
    Ok(())
}

#[test]
fn boolean_materialisation() -> Result<()> {
    let main = Prototype {
        param_count: 2,
        code: vec![
            abc(LT, 1, 0, 1),
            asbx(JMP, 0, 1),
            abc(LOADBOOL, 2, 0, 1),
            abc(LOADBOOL, 2, 1, 0),
            abc(RETURN, 2, 2, 0),
            abc(RETURN, 0, 1, 0),
        ],
        ..Default::default()
    };
    assert_eq!(source(main)?, "local R_2 = param0 < param1\nreturn R_2\n");
    Ok(())
}

#[test]
fn test_with_move_stays_literal() -> Result<()> {
    // local x = param0 or "default"
    let main = Prototype {
        param_count: 1,
        constants: vec![string("default")],
        code: vec![
            abc(TEST, 1, 0, 1),
            asbx(JMP, 0, 1),
            abx(LOADK, 1, 0),
            abc(RETURN, 1, 2, 0),
            abc(RETURN, 0, 1, 0),
        ],
        ..Default::default()
    };
    assert_eq!(
        source(main)?,
        "if (param0) then\n  \
           local R_1 = param0\n  \
           goto label_1\n\
         end\n\
         R_1 = \"default\"\n\
         ::label_1::\n\
         return R_1\n"
    );
    Ok(())
}

#[test]
fn generic_for_loop() -> Result<()> {
    let main = Prototype {
        constants: vec![string("pairs"), string("t"), string("print")],
        locals: vec![
            LocalVar { name: "(for generator)".into(), start_pc: 4, end_pc: 10 },
            LocalVar { name: "(for state)".into(), start_pc: 4, end_pc: 10 },
            LocalVar { name: "k".into(), start_pc: 4, end_pc: 9 },
            LocalVar { name: "v".into(), start_pc: 4, end_pc: 9 },
        ],
        code: vec![
            abx(GETGLOBAL, 0, 0),
            abx(GETGLOBAL, 1, 1),
            abc(CALL, 0, 2, 4),
            asbx(TFORPREP, 0, 4),
            abx(GETGLOBAL, 5, 2),
            abc(MOVE, 6, 2, 0),
            abc(MOVE, 7, 3, 0),
            abc(CALL, 5, 3, 1),
            abc(TFORLOOP, 0, 0, 1),
            asbx(JMP, 0, -6),
            abc(RETURN, 0, 1, 0),
        ],
        ..Default::default()
    };
    assert_eq!(
        source(main)?,
        "local R_0 = pairs\n\
         local R_1 = t\n\
         local R_0, R_1, R_2 = R_0(R_1)\n\
         for k, v in R_0, R_1, R_2 do\n  \
           local R_5 = print\n  \
           local R_6 = k\n  \
           local R_7 = v\n  \
           R_5(R_6, R_7)\n\
         end\n\
         return\n"
    );
    Ok(())
}

#[test]
fn global_function_definition() -> Result<()> {
    let greet = Prototype {
        param_count: 1,
        constants: vec![string("print")],
        code: vec![
            abx(GETGLOBAL, 1, 0),
            abc(MOVE, 2, 0, 0),
            abc(CALL, 1, 2, 1),
            abc(RETURN, 0, 1, 0),
        ],
        ..Default::default()
    };
    let main = Prototype {
        constants: vec![string("greet")],
        prototypes: vec![greet],
        code: vec![abx(CLOSURE, 0, 0), abx(SETGLOBAL, 0, 0), abc(RETURN, 0, 1, 0)],
        ..Default::default()
    };
    assert_eq!(
        source(main)?,
        "function greet(param0)\n  \
           local R_1 = print\n  \
           local R_2 = param0\n  \
           R_1(R_2)\n  \
           return\n\
         end\n\
         return\n"
    );
    Ok(())
}

#[test]
fn closure_captures_upvalues() -> Result<()> {
    let inner = Prototype {
        upvalue_count: 1,
        is_vararg: 1,
        code: vec![abc(GETUPVAL, 0, 0, 0), abc(RETURN, 0, 2, 0)],
        ..Default::default()
    };
    let main = Prototype {
        constants: vec![num(5.0)],
        prototypes: vec![inner],
        code: vec![
            abx(LOADK, 0, 0),
            abx(CLOSURE, 1, 0),
            abc(MOVE, 0, 0, 0),
            abc(RETURN, 1, 2, 0),
        ],
        ..Default::default()
    };
    assert_eq!(
        source(main)?,
        "local R_0 = 5\n\
         local R_1 = function(...)\n  \
           local R_0 = R_0\n  \
           return R_0\n\
         end\n\
         return R_1\n"
    );
    Ok(())
}

#[test]
fn unknown_opcode_degrades_with_one_warning() -> Result<()> {
    let l = Layout::lua50();
    let main = Prototype {
        constants: vec![num(1.0)],
        code: vec![
            abx(LOADK, 0, 0),
            Instruction::new(l.encode_abc(45, 3, 2, 1), l),
            abc(RETURN, 0, 2, 0),
        ],
        ..Default::default()
    };
    let out = decompile(&chunk(main))?;
    assert_eq!(out.source, "local R_0 = 1\nreturn R_0\n");
    assert_eq!(out.degraded(), 1);
    assert_eq!(
        out.warnings,
        vec![Warning::UnknownOpcode { proto: "main".into(), pc: 1, opcode: 45 }]
    );
    Ok(())
}

#[test]
fn nested_warning_names_prototype_path() -> Result<()> {
    let l = Layout::lua50();
    let inner = Prototype {
        code: vec![Instruction::new(l.encode_abc(63, 0, 0, 0), l), abc(RETURN, 0, 1, 0)],
        ..Default::default()
    };
    let main = Prototype {
        prototypes: vec![Prototype::default(), inner],
        code: vec![abx(CLOSURE, 0, 1), abc(RETURN, 0, 1, 0)],
        ..Default::default()
    };
    let out = decompile(&chunk(main))?;
    assert_eq!(
        out.warnings,
        vec![Warning::UnknownOpcode { proto: "main/1".into(), pc: 0, opcode: 63 }]
    );
    Ok(())
}

#[test]
fn labels_are_deterministic() -> Result<()> {
    let main = Prototype {
        code: vec![
            asbx(JMP, 0, 1),
            asbx(JMP, 0, -2),
            asbx(JMP, 0, -3),
            abc(RETURN, 0, 1, 0),
        ],
        ..Default::default()
    };
    let bytes = chunk(main);
    let first = decompile(&bytes)?.source;
    let second = decompile(&bytes)?.source;
    assert_eq!(first, second);
    assert_eq!(
        first,
        "::label_2::\n\
         ::label_3::\n\
         goto label_1\n\
         goto label_2\n\
         ::label_1::\n\
         goto label_3\n\
         return\n"
    );
    Ok(())
}

#[test]
fn line_comments_follow_source_lines() -> Result<()> {
    let main = Prototype {
        constants: vec![num(1.0)],
        lines: vec![3, 3, 4],
        code: vec![abx(LOADK, 0, 0), abc(RETURN, 0, 2, 0), abc(RETURN, 0, 1, 0)],
        ..Default::default()
    };
    let render = RenderOptions {
        indent: "\t".into(),
        line_comments: true,
    };
    let out = decompile_with(&chunk(main), &LoadOptions::default(), &render)?;
    assert_eq!(out.source, "local R_0 = 1 -- line 3\nreturn R_0\n");
    Ok(())
}
