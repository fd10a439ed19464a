use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ir::{reserved_names, Instruction, InstructionKind, IrVar};

/// Where a virtual register lives in the emitted function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VarRef {
    /// A stack slot, as a negative offset from `%rbp`.
    Stack(i32),
    /// A machine register named literally in the IR, such as `%rdi`.
    Register(&'static str),
    /// A function entry point; its address is taken with `leaq`.
    Symbol(Rc<str>),
    /// The unit value occupies no storage; reads and writes of it vanish.
    Unit,
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarRef::Stack(offset) => write!(f, "{offset}(%rbp)"),
            VarRef::Register(name) => f.write_str(name),
            VarRef::Symbol(name) => f.write_str(name),
            VarRef::Unit => f.write_str("<unit>"),
        }
    }
}

const SLOT_SIZE: i32 = 8;

/// The stack slot assignment of one function. Slots are handed out in
/// order of first appearance, which keeps the frame layout deterministic.
pub struct Locals {
    slots: HashMap<IrVar, i32>,
    /// Module function names, which resolve to symbols rather than slots.
    funs: Vec<Rc<str>>,
}

impl Locals {
    pub fn new(instructions: &[Instruction], funs: &[Rc<str>]) -> Locals {
        let mut locals = Locals {
            slots: HashMap::new(),
            funs: funs.to_vec(),
        };
        for insn in instructions {
            use InstructionKind::*;
            match &insn.kind {
                LoadIntConst { dest, .. } | LoadBoolConst { dest, .. } => locals.reserve(dest),
                Copy { source, dest } => {
                    locals.reserve(source);
                    locals.reserve(dest);
                }
                Call { fun, args, dest } => {
                    locals.reserve(fun);
                    for arg in args {
                        locals.reserve(arg);
                    }
                    locals.reserve(dest);
                }
                CondJump { cond, .. } => locals.reserve(cond),
                Jump { .. } | Label { .. } => {}
            }
        }
        locals
    }

    /// Built-ins, operators and module functions live at link-time symbols,
    /// not in the frame.
    fn is_symbol(&self, name: &str) -> bool {
        self.funs.iter().any(|fun| &**fun == name) || reserved_names().any(|r| r == name)
    }

    fn reserve(&mut self, var: &IrVar) {
        if var.name() == "unit" || var.name().starts_with('%') || self.is_symbol(var.name()) {
            return;
        }
        if !self.slots.contains_key(var) {
            let offset = -SLOT_SIZE * (self.slots.len() as i32 + 1);
            self.slots.insert(var.clone(), offset);
        }
    }

    pub fn get(&self, var: &IrVar) -> VarRef {
        if var.name() == "unit" {
            return VarRef::Unit;
        }
        if let Some(reg) = machine_register(var.name()) {
            return VarRef::Register(reg);
        }
        if self.is_symbol(var.name()) {
            return VarRef::Symbol(var.0.clone());
        }
        match self.slots.get(var) {
            Some(offset) => VarRef::Stack(*offset),
            None => unreachable!("no slot reserved for `{var}`"),
        }
    }

    /// Bytes of stack the frame needs, rounded up so `%rsp` stays
    /// 16-aligned at every call site.
    pub fn frame_size(&self) -> i32 {
        let bytes = SLOT_SIZE * self.slots.len() as i32;
        (bytes + 15) & !15
    }
}

fn machine_register(name: &str) -> Option<&'static str> {
    let known = [
        "%rax", "%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9", "%r10",
    ];
    known.into_iter().find(|reg| *reg == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Label;
    use crate::token::Location;

    fn insn(kind: InstructionKind) -> Instruction {
        Instruction::new(kind, Location::UNKNOWN)
    }

    #[test]
    fn slots_follow_first_appearance() {
        let x0 = IrVar::new("X_0");
        let x1 = IrVar::new("X_1");
        let locals = Locals::new(
            &[
                insn(InstructionKind::LoadIntConst {
                    value: 1,
                    dest: x0.clone(),
                }),
                insn(InstructionKind::Copy {
                    source: x0.clone(),
                    dest: x1.clone(),
                }),
            ],
            &[],
        );
        assert_eq!(locals.get(&x0), VarRef::Stack(-8));
        assert_eq!(locals.get(&x1), VarRef::Stack(-16));
        assert_eq!(locals.frame_size(), 16);
    }

    #[test]
    fn unit_and_machine_registers_take_no_slot() {
        let locals = Locals::new(
            &[
                insn(InstructionKind::Copy {
                    source: IrVar::new("%rdi"),
                    dest: IrVar::new("X_0"),
                }),
                insn(InstructionKind::Copy {
                    source: IrVar::new("unit"),
                    dest: IrVar::new("%rax"),
                }),
                insn(InstructionKind::Jump {
                    label: Label::new("L_0"),
                }),
            ],
            &[],
        );
        assert_eq!(locals.get(&IrVar::new("%rdi")), VarRef::Register("%rdi"));
        assert_eq!(locals.get(&IrVar::new("unit")), VarRef::Unit);
        assert_eq!(locals.get(&IrVar::new("X_0")), VarRef::Stack(-8));
        assert_eq!(locals.frame_size(), 16);
    }

    #[test]
    fn frame_size_rounds_to_sixteen() {
        let vars: Vec<IrVar> = (0..3).map(|i| IrVar::new(format!("X_{i}"))).collect();
        let ins: Vec<Instruction> = vars
            .iter()
            .map(|v| {
                insn(InstructionKind::LoadIntConst {
                    value: 0,
                    dest: v.clone(),
                })
            })
            .collect();
        assert_eq!(Locals::new(&ins, &[]).frame_size(), 32);
    }

    #[test]
    fn function_names_resolve_to_symbols_not_slots() {
        let locals = Locals::new(
            &[
                insn(InstructionKind::Copy {
                    source: IrVar::new("print_int"),
                    dest: IrVar::new("X_0"),
                }),
                insn(InstructionKind::Call {
                    fun: IrVar::new("helper"),
                    args: vec![IrVar::new("X_0")],
                    dest: IrVar::new("X_1"),
                }),
            ],
            &[Rc::from("helper")],
        );
        assert_eq!(
            locals.get(&IrVar::new("print_int")),
            VarRef::Symbol("print_int".into())
        );
        assert_eq!(
            locals.get(&IrVar::new("helper")),
            VarRef::Symbol("helper".into())
        );
        assert_eq!(locals.get(&IrVar::new("X_0")), VarRef::Stack(-8));
        assert_eq!(locals.get(&IrVar::new("X_1")), VarRef::Stack(-16));
        assert_eq!(locals.frame_size(), 16);
    }
}
