use std::{fmt, rc::Rc};

use crate::token::Location;

/// System V argument registers, in call order. A call with more arguments
/// than this is rejected during IR generation.
pub const ARG_REGISTERS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// Where every function's result lands.
pub const RETURN_REGISTER: &str = "%rax";

/// A virtual register. Registers compare by name; two `X_0`s produced by
/// different generator runs are the same register.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IrVar(pub Rc<str>);

impl IrVar {
    pub fn new(name: impl Into<Rc<str>>) -> IrVar {
        IrVar(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IrVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A jump target. Labels are unique within a module.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub Rc<str>);

impl Label {
    pub fn new(name: impl Into<Rc<str>>) -> Label {
        Label(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One IR instruction together with the source location it came from.
/// Equality ignores nothing, but [`Location::UNKNOWN`] compares equal to
/// any location, so tests may pin instruction lists without spelling out
/// positions.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub loc: Location,
}

impl Instruction {
    pub fn new(kind: InstructionKind, loc: Location) -> Instruction {
        Instruction { kind, loc }
    }
}

/// The full instruction set of the flat intermediate representation.
/// Control flow is explicit; everything else is a call through a register.
#[derive(Clone, Debug, PartialEq)]
pub enum InstructionKind {
    LoadIntConst { value: i64, dest: IrVar },
    LoadBoolConst { value: bool, dest: IrVar },
    Copy { source: IrVar, dest: IrVar },
    Call { fun: IrVar, args: Vec<IrVar>, dest: IrVar },
    Jump { label: Label },
    CondJump { cond: IrVar, then_label: Label, else_label: Label },
    Label { label: Label },
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use InstructionKind::*;
        match self {
            LoadIntConst { value, dest } => write!(f, "LoadIntConst({value}, {dest})"),
            LoadBoolConst { value, dest } => write!(f, "LoadBoolConst({value}, {dest})"),
            Copy { source, dest } => write!(f, "Copy({source}, {dest})"),
            Call { fun, args, dest } => {
                write!(f, "Call({fun}, [")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, "], {dest})")
            }
            Jump { label } => write!(f, "Jump({label})"),
            CondJump {
                cond,
                then_label,
                else_label,
            } => write!(f, "CondJump({cond}, {then_label}, {else_label})"),
            Label { label } => write!(f, "Label({label})"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

/// The IR of a single function. `main` holds the module's top-level
/// statements and is always last.
#[derive(Debug, PartialEq)]
pub struct FunctionIr {
    pub name: Rc<str>,
    pub instructions: Vec<Instruction>,
}

impl fmt::Display for FunctionIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for insn in &self.instructions {
            writeln!(f, "{insn}")?;
        }
        Ok(())
    }
}

/// Names that are pre-bound to fixed registers and may never collide with
/// generated temporaries or user variables in the backend's slot map.
/// Operators resolve to registers named after themselves; the machine
/// registers appear because parameter copies reference them directly.
pub fn reserved_names() -> impl Iterator<Item = &'static str> {
    const OPERATORS: [&str; 13] = [
        "+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">=", "and", "or",
    ];
    const SPECIAL: [&str; 7] = [
        "unary_-",
        "unary_not",
        "print_int",
        "print_bool",
        "read_int",
        "unit",
        RETURN_REGISTER,
    ];
    OPERATORS
        .into_iter()
        .chain(SPECIAL)
        .chain(ARG_REGISTERS)
}
