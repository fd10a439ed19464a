//! x86-64 assembly emission, AT&T syntax. Every virtual register lives in
//! a stack slot; no register allocation is attempted beyond `%rax` as a
//! scratch accumulator.

mod intrinsics;
mod locals;

pub use locals::{Locals, VarRef};

use std::rc::Rc;

use log::debug;

use crate::{
    error::{CompileError, Result},
    ir::{FunctionIr, Instruction, InstructionKind, ARG_REGISTERS},
};

use intrinsics::INTRINSICS;

pub fn generate_assembly(functions: &[FunctionIr]) -> Result<String> {
    let mut out = AsmBuilder::new();
    out.ins(".extern print_int");
    out.ins(".extern print_bool");
    out.ins(".extern read_int");
    out.ins(".global main");
    out.ins(".type main, @function");
    out.blank();
    out.ins(".section .text");
    let fun_names: Vec<Rc<str>> = functions.iter().map(|fun| fun.name.clone()).collect();
    for fun in functions {
        out.blank();
        emit_function(&mut out, fun, &fun_names)?;
    }
    Ok(out.finish())
}

fn emit_function(out: &mut AsmBuilder, fun: &FunctionIr, fun_names: &[Rc<str>]) -> Result<()> {
    debug!("emitting `{}`", fun.name);
    let locals = Locals::new(&fun.instructions, fun_names);

    out.raw(format!("{}:", fun.name));
    out.ins("pushq %rbp");
    out.ins("movq %rsp, %rbp");
    let frame = locals.frame_size();
    if frame > 0 {
        out.ins(format!("subq ${frame}, %rsp"));
    }

    for insn in &fun.instructions {
        out.comment(insn);
        emit_instruction(out, &locals, insn)?;
    }

    // The process exit status is main's return value.
    if &*fun.name == "main" {
        out.ins("movq $0, %rax");
    }
    out.ins("movq %rbp, %rsp");
    out.ins("popq %rbp");
    out.ins("ret");
    Ok(())
}

fn emit_instruction(out: &mut AsmBuilder, locals: &Locals, insn: &Instruction) -> Result<()> {
    use InstructionKind::*;
    match &insn.kind {
        LoadIntConst { value, dest } => {
            let dest = locals.get(dest);
            if dest == VarRef::Unit {
                return Ok(());
            }
            if i32::try_from(*value).is_ok() {
                out.ins(format!("movq ${value}, {dest}"));
            } else {
                // movq takes at most a sign-extended 32-bit immediate.
                out.ins(format!("movabsq ${value}, %rax"));
                out.ins(format!("movq %rax, {dest}"));
            }
        }

        LoadBoolConst { value, dest } => {
            let dest = locals.get(dest);
            if dest != VarRef::Unit {
                out.ins(format!("movq ${}, {dest}", i64::from(*value)));
            }
        }

        Copy { source, dest } => {
            let source = locals.get(source);
            let dest = locals.get(dest);
            match (&source, &dest) {
                // Unit carries no data.
                (VarRef::Unit, _) | (_, VarRef::Unit) => {}
                // A function value is its address.
                (VarRef::Symbol(name), _) => {
                    out.ins(format!("leaq {name}(%rip), %rax"));
                    out.ins(format!("movq %rax, {dest}"));
                }
                (VarRef::Register(_), _) | (_, VarRef::Register(_)) => {
                    out.ins(format!("movq {source}, {dest}"));
                }
                _ => {
                    out.ins(format!("movq {source}, %rax"));
                    out.ins(format!("movq %rax, {dest}"));
                }
            }
        }

        Jump { label } => out.ins(format!("jmp .{label}")),

        Label { label } => out.raw(format!(".{label}:")),

        CondJump {
            cond,
            then_label,
            else_label,
        } => {
            out.ins(format!("cmpq $0, {}", locals.get(cond)));
            out.ins(format!("jne .{then_label}"));
            out.ins(format!("jmp .{else_label}"));
        }

        Call { fun, args, dest } => {
            if let Some(intrinsic) = INTRINSICS.get(fun.name()) {
                let refs: Vec<String> =
                    args.iter().map(|a| locals.get(a).to_string()).collect();
                let mut lines = Vec::new();
                intrinsic(&refs, &mut lines);
                for line in lines {
                    out.ins(line);
                }
            } else {
                if args.len() > ARG_REGISTERS.len() {
                    return Err(CompileError::TooManyArguments {
                        loc: insn.loc,
                        name: fun.0.clone(),
                    });
                }
                for (arg, reg) in args.iter().zip(ARG_REGISTERS) {
                    match locals.get(arg) {
                        VarRef::Unit => {}
                        VarRef::Symbol(name) => out.ins(format!("leaq {name}(%rip), {reg}")),
                        arg => out.ins(format!("movq {arg}, {reg}")),
                    }
                }
                // The callee address travels through %r10, loaded by value
                // when the callee is a register-resident function value.
                match locals.get(fun) {
                    VarRef::Symbol(name) => out.ins(format!("leaq {name}(%rip), %r10")),
                    callee => out.ins(format!("movq {callee}, %r10")),
                }
                out.ins("callq *%r10");
            }
            match locals.get(dest) {
                VarRef::Unit | VarRef::Register("%rax") => {}
                dest => out.ins(format!("movq %rax, {dest}")),
            }
        }
    }
    Ok(())
}

struct AsmBuilder {
    lines: Vec<String>,
}

impl AsmBuilder {
    fn new() -> AsmBuilder {
        AsmBuilder { lines: Vec::new() }
    }

    fn ins(&mut self, line: impl Into<String>) {
        self.lines.push(format!("    {}", line.into()));
    }

    fn raw(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn comment(&mut self, insn: &Instruction) {
        self.lines.push(format!("    # {insn}"));
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    fn finish(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}
