//! What each operator does to the symbolic context and how it reads as source.
//!
//! [`render`] is always called before [`apply`] for the same instruction, so
//! rendering observes the registers as they were before the instruction ran.

use crate::context::{placeholder, Context};
use crate::format::Prototype;
use crate::instruction::{rk, Instruction, Operand};
use crate::opcode::OperatorKind;
use crate::value::{format_number, Value};

/// Table entries stored by one `SETLIST` flush.
pub const FIELDS_PER_FLUSH: u32 = 50;

#[inline]
pub fn kind(inst: &Instruction) -> OperatorKind {
    OperatorKind::from_opcode(inst.opcode())
}

/// Update the context for `inst` at the context's current pc.
pub fn apply(inst: &Instruction, ctx: &mut Context<'_>) {
    use OperatorKind::*;
    let (a, b, c) = (inst.a(), inst.b(), inst.c());
    match kind(inst) {
        Move => {
            if a != b {
                let v = ctx.reg_value(b).cloned();
                ctx.assign(a, v);
            }
        }
        LoadK => {
            let v = ctx.constant(inst.bx()).map(Value::from);
            ctx.assign(a, v);
        }
        LoadBool => ctx.assign(a, Some(Value::Bool(b != 0))),
        LoadNil => {
            for r in a..=b.max(a) {
                ctx.assign(r, Some(Value::Nil));
            }
        }
        GetUpval | GetGlobal | GetTable | NewTable | Concat => ctx.assign(a, None),
        SetGlobal => {
            let name = ctx.global_name(inst.bx());
            let text = ctx.reg_text(a);
            ctx.set_global(name, text);
            ctx.take_closure(a);
        }
        SelfOp => {
            ctx.assign(a + 1, None);
            ctx.assign(a, None);
        }
        Add | Sub | Mul | Div | Pow => {
            let v = arith(kind(inst), ctx.rk_value(b), ctx.rk_value(c));
            ctx.assign(a, v);
        }
        Unm => {
            let v = ctx.reg_value(b).and_then(Value::as_number).map(|n| Value::Number(-n));
            ctx.assign(a, v);
        }
        Not => {
            let v = ctx.reg_value(b).map(|v| Value::Bool(!v.truthy()));
            ctx.assign(a, v);
        }
        Test => {
            if a != b {
                ctx.assign(a, None);
            }
        }
        Call => {
            let call = call_text(inst, ctx);
            if b == 0 {
                ctx.take_open_call();
            }
            if c == 0 {
                ctx.set_open_call(a, call);
            } else {
                for r in a..a + c - 1 {
                    ctx.assign(r, None);
                }
            }
        }
        TailCall => {
            let call = call_text(inst, ctx);
            if b == 0 {
                ctx.take_open_call();
            }
            ctx.set_open_call(a, call);
        }
        Return => {
            if b == 0 {
                ctx.take_open_call();
            }
        }
        ForLoop => {
            let pc = ctx.pc();
            if ctx.loop_is_open(pc) {
                ctx.toggle_loop(pc);
            }
        }
        TForLoop => {
            for r in a + 2..=a + 2 + c {
                ctx.assign(r, None);
            }
        }
        SetListO => {
            ctx.take_open_call();
        }
        Closure => {
            ctx.assign(a, None);
            ctx.mark_closure(a, inst.bx() as usize);
        }
        SetUpval | SetTable | Jmp | Eq | Lt | Le | TForPrep | SetList | Close | Generic => {}
    }
}

/// Pseudo-source for `inst`, or `None` when it produces no statement.
///
/// Multi-statement renderings are separated by `\n`.
pub fn render(inst: &Instruction, ctx: &mut Context<'_>) -> Option<String> {
    use OperatorKind::*;
    let (a, b, c) = (inst.a(), inst.b(), inst.c());
    let line = match kind(inst) {
        Move if a == b => format!("-- {0} = {0}", ctx.reg_text(a)),
        Move => assignment(ctx, &[a], &ctx.reg_text(b)),
        LoadK => assignment(ctx, &[a], &ctx.constant_text(inst.bx())),
        LoadBool => {
            let mut s = assignment(ctx, &[a], if b != 0 { "true" } else { "false" });
            if c != 0 {
                let label = ctx.alloc_label(ctx.pc() + 2);
                s.push_str(&format!("\ngoto {}", label));
            }
            s
        }
        LoadNil => {
            let regs: Vec<u32> = (a..=b.max(a)).collect();
            assignment(ctx, &regs, "nil")
        }
        GetUpval => assignment(ctx, &[a], &ctx.upvalue_name(b)),
        GetGlobal => assignment(ctx, &[a], &ctx.global_name(inst.bx())),
        GetTable => {
            let rhs = ctx.index_text(&ctx.reg_text(b), c);
            assignment(ctx, &[a], &rhs)
        }
        SetGlobal => {
            let name = ctx.global_name(inst.bx());
            match ctx.pending_closure(a).and_then(|i| ctx.proto().prototypes.get(i)) {
                Some(f) => format!("function {}({})", name, params_text(f)),
                None => format!("{} = {}", name, ctx.reg_text(a)),
            }
        }
        SetUpval => format!("{} = {}", ctx.upvalue_name(b), ctx.reg_text(a)),
        SetTable => format!("{} = {}", ctx.index_text(&ctx.reg_text(a), b), ctx.rk_text(c)),
        NewTable => assignment(ctx, &[a], "{}"),
        SelfOp => {
            let obj = ctx.reg_text(b);
            let method = ctx.index_text(&obj, c);
            format!("{}\n{}", assignment(ctx, &[a + 1], &obj), assignment(ctx, &[a], &method))
        }
        Add | Sub | Mul | Div | Pow => {
            let rhs = format!("{} {} {}", ctx.rk_text(b), arith_symbol(kind(inst)), ctx.rk_text(c));
            assignment(ctx, &[a], &rhs)
        }
        Unm => assignment(ctx, &[a], &format!("-{}", ctx.reg_text(b))),
        Not => assignment(ctx, &[a], &format!("not {}", ctx.reg_text(b))),
        Concat => {
            let parts: Vec<String> = (b..=c.max(b)).map(|r| ctx.reg_text(r)).collect();
            assignment(ctx, &[a], &parts.join(" .. "))
        }
        Jmp => {
            let target = inst.jump_target(ctx.pc())?;
            format!("goto {}", ctx.alloc_label(target))
        }
        Eq | Lt | Le | Test => format!("if ({}) then", jump_condition(inst, ctx)),
        Call => {
            if c == 0 {
                return None;
            }
            let call = call_text(inst, ctx);
            if c == 1 {
                call
            } else {
                let regs: Vec<u32> = (a..a + c - 1).collect();
                assignment(ctx, &regs, &call)
            }
        }
        TailCall | Close | Generic => return None,
        Return => {
            let values = match b {
                0 => ctx.register_list(a, None),
                n => ctx.register_list(a, Some(n - 1)),
            };
            if values.is_empty() {
                "return".to_string()
            } else {
                format!("return {}", values.join(", "))
            }
        }
        ForLoop => {
            if ctx.loop_is_open(ctx.pc()) {
                "end".to_string()
            } else {
                let target = inst.jump_target(ctx.pc())?;
                let (idx, limit, step) = (ctx.reg_text(a), ctx.reg_text(a + 1), ctx.reg_text(a + 2));
                let label = ctx.alloc_label(target);
                format!(
                    "{idx} = {idx} + {step}\nif {idx} <= {limit} then goto {label} end"
                )
            }
        }
        TForLoop => {
            let vars: Vec<u32> = (a + 2..=a + 2 + c).collect();
            let call = format!("{}({}, {})", ctx.reg_text(a), ctx.reg_text(a + 1), ctx.reg_text(a + 2));
            let first = ctx.reg_text(a + 2);
            let label = ctx.alloc_label(ctx.pc() + 2);
            format!(
                "{}\nif {} == nil then goto {} end",
                assignment(ctx, &vars, &call),
                first,
                label
            )
        }
        TForPrep => {
            let target = inst.jump_target(ctx.pc())?;
            format!("goto {}", ctx.alloc_label(target))
        }
        SetList | SetListO => {
            let bx = inst.bx();
            let base = bx - bx % FIELDS_PER_FLUSH;
            let count = match (kind(inst), ctx.open_call()) {
                (SetListO, Some(top)) if top > a => top - a,
                _ => bx % FIELDS_PER_FLUSH + 1,
            };
            let table = ctx.reg_text(a);
            let lines: Vec<String> = (1..=count)
                .map(|i| format!("{}[{}] = {}", table, base + i, ctx.reg_text(a + i)))
                .collect();
            lines.join("\n")
        }
        Closure => {
            let f = ctx.proto().prototypes.get(inst.bx() as usize);
            let params = f.map(params_text).unwrap_or_default();
            assignment(ctx, &[a], &format!("function({})", params))
        }
    };
    Some(line)
}

/// `lhs = rhs` for the given registers, with `local` when any of them is declared here.
pub fn assignment(ctx: &Context<'_>, regs: &[u32], rhs: &str) -> String {
    let targets: Vec<_> = regs.iter().map(|&r| ctx.target(r)).collect();
    let declare = targets.iter().any(|t| t.declare);
    let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
    format!(
        "{}{} = {}",
        if declare { "local " } else { "" },
        names.join(", "),
        rhs
    )
}

/// `f(args)` for `CALL`/`TAILCALL`, pulling in the open call when B is 0.
pub fn call_text(inst: &Instruction, ctx: &Context<'_>) -> String {
    let a = inst.a();
    let args = match inst.b() {
        0 => ctx.register_list(a + 1, None),
        n => ctx.register_list(a + 1, Some(n - 1)),
    };
    format!("{}({})", ctx.reg_text(a), args.join(", "))
}

/// Parameter list of a nested function: `param0, param1, ...`.
pub fn params_text(f: &Prototype) -> String {
    let mut params: Vec<String> = (0..f.param_count as u32)
        .map(crate::context::param_name)
        .collect();
    if f.has_varargs() {
        params.push("...".to_string());
    }
    params.join(", ")
}

fn comparison_symbols(kind: OperatorKind) -> (&'static str, &'static str) {
    match kind {
        OperatorKind::Eq => ("==", "~="),
        OperatorKind::Lt => ("<", ">="),
        _ => ("<=", ">"),
    }
}

fn condition(inst: &Instruction, ctx: &Context<'_>, jump: bool) -> String {
    match kind(inst) {
        OperatorKind::Test => {
            // Jumps when truthy(R(B)) == C.
            let v = ctx.reg_text(inst.b());
            if (inst.c() != 0) == jump {
                v
            } else {
                format!("not {}", v)
            }
        }
        k => {
            // Jumps when (RK(B) op RK(C)) == A.
            let (pos, neg) = comparison_symbols(k);
            let op = if (inst.a() != 0) == jump { pos } else { neg };
            format!("{} {} {}", ctx.rk_text(inst.b()), op, ctx.rk_text(inst.c()))
        }
    }
}

/// Condition under which the `JMP` after a conditional is taken.
pub fn jump_condition(inst: &Instruction, ctx: &Context<'_>) -> String {
    condition(inst, ctx, true)
}

/// Condition under which execution falls through into the instructions after the `JMP`.
pub fn enter_condition(inst: &Instruction, ctx: &Context<'_>) -> String {
    condition(inst, ctx, false)
}

/// The `R(A) := R(B)` a `TEST` performs on the taken path, when A and B differ.
pub fn guarded_move(inst: &Instruction, ctx: &Context<'_>) -> Option<String> {
    if kind(inst) != OperatorKind::Test || inst.a() == inst.b() {
        return None;
    }
    Some(assignment(ctx, &[inst.a()], &ctx.reg_text(inst.b())))
}

/// Header of a numeric `for` closed by the `FORLOOP` at `forloop_pc`.
///
/// Must be rendered before the preparatory `SUB` is applied, so the registers
/// still hold start, limit and step.
pub fn open_numeric_for(inst: &Instruction, ctx: &mut Context<'_>, forloop_pc: usize, var: &str) -> String {
    let a = inst.a();
    let start = ctx.operand_text(a);
    let limit = ctx.operand_text(a + 1);
    let header = match ctx.reg_value(a + 2) {
        Some(Value::Number(step)) if *step == 1.0 => format!("for {} = {}, {} do", var, start, limit),
        Some(Value::Number(step)) => {
            format!("for {} = {}, {}, {} do", var, start, limit, format_number(*step))
        }
        _ => format!("for {} = {}, {}, {} do", var, start, limit, ctx.reg_text(a + 2)),
    };
    ctx.toggle_loop(forloop_pc);
    header
}

fn arith_symbol(kind: OperatorKind) -> &'static str {
    match kind {
        OperatorKind::Add => "+",
        OperatorKind::Sub => "-",
        OperatorKind::Mul => "*",
        OperatorKind::Div => "/",
        _ => "^",
    }
}

fn arith(kind: OperatorKind, b: Option<Value>, c: Option<Value>) -> Option<Value> {
    let (x, y) = (b?.as_number()?, c?.as_number()?);
    let n = match kind {
        OperatorKind::Add => x + y,
        OperatorKind::Sub => x - y,
        OperatorKind::Mul => x * y,
        OperatorKind::Div => x / y,
        _ => x.powf(y),
    };
    Some(Value::Number(n))
}

#[inline]
fn rk_is(v: u32, reg: u32) -> bool {
    rk(v) == Operand::Register(reg)
}

/// Whether executing `inst` reads register `reg`.
///
/// Reads that run to the stack top (B = 0 calls and returns, `SETLISTO`)
/// count every register from their base up.
pub fn loads_register(inst: &Instruction, reg: u32) -> bool {
    use OperatorKind::*;
    let (a, b, c) = (inst.a(), inst.b(), inst.c());
    match kind(inst) {
        Move | Unm | Not | Test => b == reg,
        GetTable | SelfOp => b == reg || rk_is(c, reg),
        SetGlobal | SetUpval => a == reg,
        SetTable => a == reg || rk_is(b, reg) || rk_is(c, reg),
        Add | Sub | Mul | Div | Pow | Eq | Lt | Le => rk_is(b, reg) || rk_is(c, reg),
        Concat => (b..=c).contains(&reg),
        Call | TailCall => match b {
            0 => reg >= a,
            n => (a..a + n).contains(&reg),
        },
        Return => match b {
            0 => reg >= a,
            n => (a..a + n - 1).contains(&reg),
        },
        ForLoop | TForLoop => (a..=a + 2).contains(&reg),
        TForPrep => (a..=a + 1).contains(&reg),
        SetList => (a..=a + inst.bx() % FIELDS_PER_FLUSH + 1).contains(&reg),
        SetListO => reg >= a,
        LoadK | LoadBool | LoadNil | GetUpval | GetGlobal | NewTable | Jmp | Close | Closure
        | Generic => false,
    }
}

/// Register name for the i-th loop variable when no debug name exists.
pub(crate) fn loop_var(ctx: &Context<'_>, reg: u32, body_pc: usize) -> String {
    ctx.debug_local(reg, body_pc)
        .map(str::to_string)
        .unwrap_or_else(|| placeholder(reg))
}
