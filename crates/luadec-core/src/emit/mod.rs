//! Control-flow reconstruction.
//!
//! Walks a prototype's instructions once, recognising `if`/`else`, numeric
//! and generic `for`, boolean materialisation and nested functions. Open
//! blocks sit on a stack of closers whose positions never increase towards
//! the top; any pattern that would break that nesting is rendered in its
//! literal `goto` form instead.

mod fragment;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use fragment::{Fragment, Line};

use crate::context::Context;
use crate::error::{DecodeError, Result};
use crate::format::Prototype;
use crate::instruction::Instruction;
use crate::opcode::OperatorKind;
use crate::operator::{self, kind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// One indentation level.
    pub indent: String,
    /// Append `-- line N` whenever the source line changes.
    pub line_comments: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            line_comments: false,
        }
    }
}

/// A degraded, non-fatal condition met while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Warning {
    UnknownOpcode { proto: String, pc: usize, opcode: u32 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnknownOpcode { proto, pc, opcode } => {
                write!(f, "{}: unknown opcode {} at pc={}", proto, opcode, pc)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decompiled {
    pub source: String,
    pub warnings: Vec<Warning>,
}

impl Decompiled {
    /// Instructions that were dropped because their opcode is unknown.
    pub fn degraded(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, Warning::UnknownOpcode { .. }))
            .count()
    }
}

/// Render the root prototype and everything nested in it.
pub fn render_prototype(proto: &Prototype, options: &RenderOptions) -> Result<Decompiled> {
    let mut warnings = Vec::new();
    let fragment = render_function(proto, "main".to_string(), Vec::new(), options, &mut warnings)?;
    Ok(Decompiled {
        source: fragment.to_source(&options.indent),
        warnings,
    })
}

fn render_function(
    proto: &Prototype,
    path: String,
    upvalues: Vec<String>,
    options: &RenderOptions,
    warnings: &mut Vec<Warning>,
) -> Result<Fragment> {
    log::debug!("rendering {} ({} instructions)", path, proto.code.len());

    let mut emitter = Emitter {
        proto,
        ctx: Context::new(proto, upvalues),
        path,
        closers: Vec::new(),
        out: Fragment::new(),
        options,
        warnings,
        last_line: None,
    };
    emitter.run()?;

    let Emitter { ctx, mut out, .. } = emitter;
    out.place_labels(ctx.labels());
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closer {
    /// `end` before the instruction at `at`.
    End { at: usize },
    /// `else` replaces the unconditional jump at `at`; the block then ends at `end`.
    Else { at: usize, end: usize },
    /// Numeric loop closed by the `FORLOOP` at `at`.
    NumericLoop { at: usize },
    /// Generic loop closed by the `TFORLOOP` at `at` and its back-jump.
    GenericLoop { at: usize },
}

impl Closer {
    fn at(self) -> usize {
        match self {
            Closer::End { at }
            | Closer::Else { at, .. }
            | Closer::NumericLoop { at }
            | Closer::GenericLoop { at } => at,
        }
    }
}

struct Emitter<'p, 'w> {
    proto: &'p Prototype,
    ctx: Context<'p>,
    path: String,
    closers: Vec<Closer>,
    out: Fragment,
    options: &'w RenderOptions,
    warnings: &'w mut Vec<Warning>,
    last_line: Option<i64>,
}

impl<'p, 'w> Emitter<'p, 'w> {
    fn run(&mut self) -> Result<()> {
        loop {
            self.close_blocks();
            if self.ctx.is_at_end() {
                break;
            }

            let pc = self.ctx.pc();
            let inst = self.proto.code[pc];
            match kind(&inst) {
                OperatorKind::Return if self.is_trailing_return(pc, &inst) => self.ctx.jump_to_end(),
                OperatorKind::Closure => self.closure(pc, inst)?,
                k if k.is_conditional() => self.conditional(pc, inst),
                k => {
                    let structured = match k {
                        OperatorKind::Sub => self.numeric_for(pc, inst),
                        OperatorKind::TForPrep => self.generic_for(pc, inst),
                        _ => false,
                    };
                    if !structured {
                        let depth = self.depth();
                        self.step(pc, inst, depth);
                    }
                }
            }
        }

        if !self.closers.is_empty() {
            return Err(DecodeError::UnbalancedBlocks {
                proto: self.path.clone(),
                pc: self.ctx.pc(),
                open: self.closers.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn depth(&self) -> usize {
        self.closers.len()
    }

    /// Position of the innermost pending closer; nothing nested may reach past it.
    fn limit(&self) -> usize {
        self.closers
            .last()
            .map(|c| c.at())
            .unwrap_or(self.proto.code.len())
    }

    fn instruction(&self, pc: usize) -> Option<Instruction> {
        self.proto.instruction(pc)
    }

    fn emit(&mut self, pc: Option<usize>, depth: usize, text: &str) {
        let mut text = text.to_string();
        if self.options.line_comments {
            if let Some(line) = pc.and_then(|pc| self.proto.line(pc)) {
                if self.last_line != Some(line) {
                    text.push_str(&format!(" -- line {}", line));
                    self.last_line = Some(line);
                }
            }
        }
        self.out.push(pc, depth, &text);
    }

    /// Flush every closer due at the current pc.
    fn close_blocks(&mut self) {
        while let Some(&closer) = self.closers.last() {
            let pc = self.ctx.pc();
            if closer.at() > pc {
                break;
            }
            self.closers.pop();
            let depth = self.depth();

            match closer {
                Closer::End { .. } => self.emit(None, depth, "end"),
                Closer::Else { at, end } => {
                    self.emit(None, depth, "else");
                    self.closers.push(Closer::End { at: end });
                    if at == pc {
                        self.ctx.jump_to_line(at + 1);
                    }
                }
                Closer::NumericLoop { at } => {
                    if at == pc {
                        let inst = self.proto.code[at];
                        if let Some(text) = operator::render(&inst, &mut self.ctx) {
                            self.emit(None, depth, &text);
                        }
                        operator::apply(&inst, &mut self.ctx);
                        self.ctx.advance();
                    } else {
                        self.ctx.toggle_loop(at);
                        self.emit(None, depth, "end");
                    }
                }
                Closer::GenericLoop { at } => {
                    self.emit(None, depth, "end");
                    if at == pc {
                        self.ctx.jump_to_line(at + 2);
                    }
                }
            }
        }
    }

    /// Render and apply one instruction as a plain statement.
    fn step(&mut self, pc: usize, inst: Instruction, depth: usize) {
        if kind(&inst) == OperatorKind::Generic {
            let w = Warning::UnknownOpcode {
                proto: self.path.clone(),
                pc,
                opcode: inst.opcode(),
            };
            log::warn!("{}", w);
            self.warnings.push(w);
        }
        if let Some(text) = operator::render(&inst, &mut self.ctx) {
            self.emit(Some(pc), depth, &text);
        }
        operator::apply(&inst, &mut self.ctx);
        self.ctx.advance();
    }

    /// The `RETURN` the compiler appends after an explicit one.
    fn is_trailing_return(&self, pc: usize, inst: &Instruction) -> bool {
        pc > 0
            && pc + 1 == self.proto.code.len()
            && inst.b() == 1
            && self
                .instruction(pc - 1)
                .is_some_and(|prev| kind(&prev) == OperatorKind::Return)
    }

    fn conditional(&mut self, pc: usize, inst: Instruction) {
        let limit = self.limit();
        if self.boolean(pc, inst, limit) {
            return;
        }

        let guarded = kind(&inst) == OperatorKind::Test && inst.a() != inst.b();
        let jump = self
            .instruction(pc + 1)
            .filter(|j| kind(j) == OperatorKind::Jmp)
            .and_then(|j| j.jump_target(pc + 1));

        if let Some(t) = jump {
            if !guarded && t >= pc + 2 && t <= limit {
                let depth = self.depth();
                let cond = operator::enter_condition(&inst, &self.ctx);
                self.emit(Some(pc), depth, &format!("if {} then", cond));
                operator::apply(&inst, &mut self.ctx);

                let else_end = (t >= pc + 3)
                    .then(|| self.instruction(t - 1))
                    .flatten()
                    .filter(|j| kind(j) == OperatorKind::Jmp)
                    .and_then(|j| j.jump_target(t - 1))
                    .filter(|&e| e > t && e <= limit);
                self.closers.push(match else_end {
                    Some(end) => Closer::Else { at: t - 1, end },
                    None => Closer::End { at: t },
                });
                self.ctx.jump_to_line(pc + 2);
                return;
            }
        }

        // Literal form: the jump itself becomes the guarded statement.
        let depth = self.depth();
        if let Some(text) = operator::render(&inst, &mut self.ctx) {
            self.emit(Some(pc), depth, &text);
        }
        if let Some(mv) = operator::guarded_move(&inst, &self.ctx) {
            self.emit(Some(pc), depth + 1, &mv);
        }
        operator::apply(&inst, &mut self.ctx);
        self.ctx.advance();

        let next = pc + 1;
        if next < limit {
            if let Some(body) = self.instruction(next) {
                self.step(next, body, depth + 1);
            }
        }
        self.emit(None, depth, "end");
    }

    /// `cond; JMP +1; LOADBOOL A 0 1; LOADBOOL A 1 0` is `R_A = cond`.
    fn boolean(&mut self, pc: usize, inst: Instruction, limit: usize) -> bool {
        if kind(&inst) == OperatorKind::Test && inst.a() != inst.b() {
            return false;
        }
        let (Some(jmp), Some(f), Some(t)) = (
            self.instruction(pc + 1),
            self.instruction(pc + 2),
            self.instruction(pc + 3),
        ) else {
            return false;
        };
        let matches = kind(&jmp) == OperatorKind::Jmp
            && jmp.jump_target(pc + 1) == Some(pc + 3)
            && kind(&f) == OperatorKind::LoadBool
            && (f.b(), f.c()) == (0, 1)
            && kind(&t) == OperatorKind::LoadBool
            && (t.b(), t.c()) == (1, 0)
            && f.a() == t.a()
            && limit >= pc + 4;
        if !matches {
            return false;
        }

        let depth = self.depth();
        let cond = operator::jump_condition(&inst, &self.ctx);
        operator::apply(&inst, &mut self.ctx);
        self.ctx.jump_to_line(pc + 3);
        let text = operator::assignment(&self.ctx, &[t.a()], &cond);
        self.emit(Some(pc), depth, &text);
        self.ctx.assign(t.a(), None);
        self.ctx.jump_to_line(pc + 4);
        true
    }

    /// `SUB A A A+2; JMP -> FORLOOP A` whose back-jump lands right after the `JMP`.
    fn numeric_for(&mut self, pc: usize, inst: Instruction) -> bool {
        let a = inst.a();
        if inst.b() != a || inst.c() != a + 2 {
            return false;
        }
        let Some(t) = self
            .instruction(pc + 1)
            .filter(|j| kind(j) == OperatorKind::Jmp)
            .and_then(|j| j.jump_target(pc + 1))
        else {
            return false;
        };
        let body = pc + 2;
        let closes = self.instruction(t).is_some_and(|f| {
            kind(&f) == OperatorKind::ForLoop && f.a() == a && f.jump_target(t) == Some(body)
        });
        if !closes || t < body || t + 1 > self.limit() {
            return false;
        }

        let depth = self.depth();
        let var = operator::loop_var(&self.ctx, a, body);
        let header = operator::open_numeric_for(&inst, &mut self.ctx, t, &var);
        self.emit(Some(pc), depth, &header);
        self.ctx.bind_local(a, var);
        self.closers.push(Closer::NumericLoop { at: t });
        self.ctx.jump_to_line(body);
        true
    }

    /// `TFORPREP A -> TFORLOOP A; JMP back` with the body in between.
    fn generic_for(&mut self, pc: usize, inst: Instruction) -> bool {
        let a = inst.a();
        let Some(t) = inst.jump_target(pc) else {
            return false;
        };
        let body = pc + 1;
        let Some(tfor) = self
            .instruction(t)
            .filter(|f| kind(f) == OperatorKind::TForLoop && f.a() == a)
        else {
            return false;
        };
        let back = self
            .instruction(t + 1)
            .is_some_and(|j| kind(&j) == OperatorKind::Jmp && j.jump_target(t + 1) == Some(body));
        if !back || t < body || t + 2 > self.limit() {
            return false;
        }

        let depth = self.depth();
        let regs: Vec<u32> = (a + 2..=a + 2 + tfor.c()).collect();
        let vars: Vec<String> = regs
            .iter()
            .map(|&r| operator::loop_var(&self.ctx, r, body))
            .collect();
        let header = format!(
            "for {} in {}, {}, {} do",
            vars.join(", "),
            self.ctx.reg_text(a),
            self.ctx.reg_text(a + 1),
            self.ctx.reg_text(a + 2)
        );
        self.emit(Some(pc), depth, &header);
        for (r, name) in regs.into_iter().zip(vars) {
            self.ctx.bind_local(r, name);
        }
        self.closers.push(Closer::GenericLoop { at: t });
        self.ctx.jump_to_line(body);
        true
    }

    /// `CLOSURE` plus its upvalue bindings, optionally stored straight into a global.
    fn closure(&mut self, pc: usize, inst: Instruction) -> Result<()> {
        let a = inst.a();
        let index = inst.bx() as usize;
        let depth = self.depth();
        let limit = self.limit();
        let proto = self.proto;

        let Some(child) = proto.prototypes.get(index) else {
            log::warn!("{}: CLOSURE at pc={} names missing function #{}", self.path, pc, index);
            self.step(pc, inst, depth);
            self.emit(None, depth, "end");
            return Ok(());
        };

        // Each captured variable is described by a MOVE (parent register)
        // or GETUPVAL (parent upvalue) right after the CLOSURE.
        let nups = (child.upvalue_count as usize).min(limit.saturating_sub(pc + 1));
        let upvalues: Vec<String> = (1..=nups)
            .map(|i| match self.instruction(pc + i) {
                Some(b) if kind(&b) == OperatorKind::Move => self.ctx.reg_text(b.b()),
                Some(b) if kind(&b) == OperatorKind::GetUpval => self.ctx.upvalue_name(b.b()),
                _ => format!("U_{}", i - 1),
            })
            .collect();
        let after = pc + 1 + nups;
        let store = self
            .instruction(after)
            .filter(|s| kind(s) == OperatorKind::SetGlobal && s.a() == a && after < limit);

        self.ctx.jump_to_line(pc + nups);
        let header = match store {
            Some(set) => {
                self.ctx.mark_closure(a, index);
                self.ctx.jump_to_line(after);
                operator::render(&set, &mut self.ctx)
            }
            None => operator::render(&inst, &mut self.ctx),
        };
        if let Some(header) = header {
            self.emit(Some(pc), depth, &header);
        }

        let path = format!("{}/{}", self.path, index);
        let body = render_function(child, path, upvalues, self.options, &mut *self.warnings)?;
        self.out.splice(body, depth + 1);
        self.emit(None, depth, "end");

        match store {
            Some(set) => {
                operator::apply(&set, &mut self.ctx);
                self.ctx.jump_to_line(after + 1);
            }
            None => {
                operator::apply(&inst, &mut self.ctx);
                self.ctx.take_closure(a);
                self.ctx.jump_to_line(after);
            }
        }
        Ok(())
    }
}
