use std::collections::{BTreeMap, BTreeSet};

use crate::format::{Constant, Prototype};
use crate::instruction::{rk, Operand};
use crate::operator;
use crate::value::{is_identifier, quote, Value};

/// Size of the symbolic register file.
pub const REGISTER_COUNT: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    /// How the register reads in the rendered text.
    pub text: String,
    /// Known value, when every input was a literal.
    pub value: Option<Value>,
    /// Index of a nested prototype created into this register whose body has
    /// not been emitted yet.
    pub closure: Option<usize>,
}

impl Register {
    fn placeholder(n: u32) -> Self {
        Self {
            text: placeholder(n),
            value: None,
            closure: None,
        }
    }
}

#[inline]
pub fn placeholder(n: u32) -> String {
    format!("R_{}", n)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub target: usize,
}

/// Where a register write goes and whether it introduces a new local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub declare: bool,
}

/// Symbolic machine state for rendering one prototype.
pub struct Context<'p> {
    proto: &'p Prototype,
    regs: Vec<Register>,
    /// Register -> bound local name.
    locals: BTreeMap<u32, String>,
    /// Global name -> text last stored into it.
    globals: BTreeMap<String, String>,
    upvalues: Vec<String>,
    labels: Vec<Label>,
    /// `FORLOOP` pcs whose header has been emitted and whose `end` is pending.
    open_loops: BTreeSet<usize>,
    open_call: Option<u32>,
    pc: usize,
}

impl<'p> Context<'p> {
    /// Fresh state with parameters bound to `param0..`.
    ///
    /// `upvalues` names the captured variables; the prototype's own debug
    /// names win when it has them.
    pub fn new(proto: &'p Prototype, upvalues: Vec<String>) -> Self {
        let mut regs: Vec<Register> = (0..REGISTER_COUNT as u32).map(Register::placeholder).collect();
        let mut locals = BTreeMap::new();
        for p in 0..proto.param_count as u32 {
            let name = param_name(p);
            if let Some(r) = regs.get_mut(p as usize) {
                r.text = name.clone();
            }
            locals.insert(p, name);
        }

        let upvalues = if proto.upvalues.is_empty() {
            upvalues
        } else {
            proto.upvalues.clone()
        };

        Self {
            proto,
            regs,
            locals,
            globals: BTreeMap::new(),
            upvalues,
            labels: Vec::new(),
            open_loops: BTreeSet::new(),
            open_call: None,
            pc: 0,
        }
    }

    #[inline]
    pub fn proto(&self) -> &'p Prototype {
        self.proto
    }

    // program counter

    #[inline]
    pub fn pc(&self) -> usize {
        self.pc
    }

    #[inline]
    pub fn advance(&mut self) {
        self.pc += 1;
    }

    #[inline]
    pub fn jump_to_line(&mut self, pc: usize) {
        self.pc = pc;
    }

    #[inline]
    pub fn jump_to_end(&mut self) {
        self.pc = self.proto.code.len();
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pc >= self.proto.code.len()
    }

    // registers

    pub fn register(&self, r: u32) -> Option<&Register> {
        self.regs.get(r as usize)
    }

    pub fn reg_text(&self, r: u32) -> String {
        match self.regs.get(r as usize) {
            Some(reg) => reg.text.clone(),
            None => placeholder(r),
        }
    }

    pub fn reg_value(&self, r: u32) -> Option<&Value> {
        self.regs.get(r as usize).and_then(|reg| reg.value.as_ref())
    }

    /// Overwrite a register's text and value without touching name bindings.
    pub fn set_register(&mut self, r: u32, text: String, value: Option<Value>) {
        match self.regs.get_mut(r as usize) {
            Some(reg) => {
                reg.text = text;
                reg.value = value;
                reg.closure = None;
            }
            None => log::debug!("write to register {} outside the register file ignored", r),
        }
    }

    /// Commit a write to `r` at the current pc, binding it per [`Context::target`].
    pub fn assign(&mut self, r: u32, value: Option<Value>) {
        let target = self.target(r);
        if target.declare {
            self.locals.insert(r, target.name.clone());
        }
        self.set_register(r, target.name, value);
    }

    /// Name a write to `r` at the current pc would use.
    ///
    /// Parameters keep their `paramN` name. A debug local that becomes live
    /// right after this instruction is declared when it is not already the
    /// binding. An existing binding is reused. A register that is read again
    /// later becomes a `local R_n`; anything else is a plain assignment.
    pub fn target(&self, r: u32) -> Target {
        if r < self.proto.param_count as u32 {
            return Target { name: param_name(r), declare: false };
        }

        if let Some(name) = self.debug_local(r, self.pc + 1) {
            let declare = self.locals.get(&r).map(String::as_str) != Some(name);
            return Target { name: name.to_string(), declare };
        }

        if let Some(bound) = self.locals.get(&r) {
            return Target { name: bound.clone(), declare: false };
        }

        Target {
            name: placeholder(r),
            declare: self.reused_after(r),
        }
    }

    /// Debug name of `r` at `pc`, skipping compiler internals like `(for limit)`.
    pub fn debug_local(&self, r: u32, pc: usize) -> Option<&'p str> {
        self.proto
            .local_name(r, pc)
            .filter(|name| !name.starts_with('('))
    }

    pub fn bind_local(&mut self, r: u32, name: String) {
        self.set_register(r, name.clone(), None);
        self.locals.insert(r, name);
    }

    pub fn local(&self, r: u32) -> Option<&str> {
        self.locals.get(&r).map(String::as_str)
    }

    /// Whether any later instruction reads `r`.
    ///
    /// The scan is linear and ignores jumps, so a write in one branch of an
    /// `if` still sees the reads after the other branch.
    pub fn reused_after(&self, r: u32) -> bool {
        self.proto
            .code
            .iter()
            .skip(self.pc + 1)
            .any(|inst| operator::loads_register(inst, r))
    }

    // closures

    pub fn mark_closure(&mut self, r: u32, index: usize) {
        if let Some(reg) = self.regs.get_mut(r as usize) {
            reg.closure = Some(index);
        }
    }

    pub fn pending_closure(&self, r: u32) -> Option<usize> {
        self.regs.get(r as usize).and_then(|reg| reg.closure)
    }

    pub fn take_closure(&mut self, r: u32) -> Option<usize> {
        self.regs.get_mut(r as usize).and_then(|reg| reg.closure.take())
    }

    // constants, globals and upvalues

    pub fn constant(&self, idx: u32) -> Option<&'p Constant> {
        self.proto.constant(idx)
    }

    pub fn constant_text(&self, idx: u32) -> String {
        match self.proto.constant(idx) {
            Some(k) => k.to_string(),
            None => format!("K_{}", idx),
        }
    }

    /// Text of an RK operand.
    pub fn rk_text(&self, v: u32) -> String {
        match rk(v) {
            Operand::Register(r) => self.reg_text(r),
            Operand::Constant(k) => self.constant_text(k),
        }
    }

    pub fn rk_value(&self, v: u32) -> Option<Value> {
        match rk(v) {
            Operand::Register(r) => self.reg_value(r).cloned(),
            Operand::Constant(k) => self.proto.constant(k).map(Value::from),
        }
    }

    /// Text of a register, as a literal when its value is known.
    pub fn operand_text(&self, r: u32) -> String {
        match self.reg_value(r) {
            Some(v) => v.to_string(),
            None => self.reg_text(r),
        }
    }

    /// `t.key` for identifier-like string constants, `t[key]` otherwise.
    pub fn index_text(&self, table: &str, key: u32) -> String {
        if let Operand::Constant(k) = rk(key) {
            if let Some(name) = self.constant(k).and_then(Constant::as_str) {
                if is_identifier(name) {
                    return format!("{}.{}", table, name);
                }
            }
        }
        format!("{}[{}]", table, self.rk_text(key))
    }

    /// Name of the global addressed by constant `idx`.
    pub fn global_name(&self, idx: u32) -> String {
        match self.constant(idx).and_then(Constant::as_str) {
            Some(name) if is_identifier(name) => name.to_string(),
            Some(name) => format!("_G[{}]", quote(name)),
            None => format!("_G[{}]", self.constant_text(idx)),
        }
    }

    pub fn set_global(&mut self, name: String, text: String) {
        self.globals.insert(name, text);
    }

    pub fn global(&self, name: &str) -> Option<&str> {
        self.globals.get(name).map(String::as_str)
    }

    pub fn upvalue_name(&self, idx: u32) -> String {
        match self.upvalues.get(idx as usize) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("U_{}", idx),
        }
    }

    // open calls

    #[inline]
    pub fn open_call(&self) -> Option<u32> {
        self.open_call
    }

    pub fn set_open_call(&mut self, base: u32, text: String) {
        self.set_register(base, text, None);
        self.open_call = Some(base);
    }

    /// Consume the pending multi-result call; its register reverts to its name.
    pub fn take_open_call(&mut self) -> Option<u32> {
        let base = self.open_call.take()?;
        let name = self
            .locals
            .get(&base)
            .cloned()
            .unwrap_or_else(|| placeholder(base));
        self.set_register(base, name, None);
        Some(base)
    }

    /// Texts of `from..` up to the open call (inclusive), or `from..from+count` when
    /// `count` is known.
    pub fn register_list(&self, from: u32, count: Option<u32>) -> Vec<String> {
        let end = match (count, self.open_call) {
            (Some(n), _) => from + n,
            (None, Some(base)) if base >= from => base + 1,
            (None, _) => from,
        };
        (from..end).map(|r| self.reg_text(r)).collect()
    }

    // labels and loops

    /// Allocate a new label for `target`. Labels are never shared between jump sites.
    pub fn alloc_label(&mut self, target: usize) -> String {
        let name = format!("label_{}", self.labels.len() + 1);
        self.labels.push(Label { name: name.clone(), target });
        name
    }

    #[inline]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn into_labels(self) -> Vec<Label> {
        self.labels
    }

    /// Flip the header/`end` toggle of the loop closed by the `FORLOOP` at `pc`.
    /// Returns `true` when the loop was opened by this call.
    pub fn toggle_loop(&mut self, pc: usize) -> bool {
        if self.open_loops.remove(&pc) {
            false
        } else {
            self.open_loops.insert(pc);
            true
        }
    }

    #[inline]
    pub fn loop_is_open(&self, pc: usize) -> bool {
        self.open_loops.contains(&pc)
    }
}

#[inline]
pub fn param_name(n: u32) -> String {
    format!("param{}", n)
}
