use log::debug;

use crate::{
    ast::{Expr, ExprKind, FunDef, LoopControl, Module, Typed},
    error::{CompileError, Result},
    ir::{FunctionIr, Instruction, InstructionKind, IrVar, Label, ARG_REGISTERS, RETURN_REGISTER},
    scope::{ScopeArena, ScopeId},
    token::Location,
    types::Ty,
};

/// Flattens a checked module into IR, one function at a time. Top-level
/// statements become the body of `main`, which additionally prints the
/// value of the last statement when it is an `Int` or a `Bool`.
pub fn generate(module: &Module<Typed>) -> Result<Vec<FunctionIr>> {
    IrGenerator::new().generate(module)
}

struct IrGenerator {
    scopes: ScopeArena<IrVar>,
    /// Counters are module-wide, so register and label names stay unique
    /// across all functions of one run.
    next_var: u32,
    next_label: u32,
    unit: IrVar,

    // Per-function state, reset by `generate_fun`.
    ins: Vec<Instruction>,
    loops: Vec<(Label, Label)>,
    exit: Option<Label>,
}

impl IrGenerator {
    fn new() -> IrGenerator {
        IrGenerator {
            scopes: ScopeArena::new(),
            next_var: 0,
            next_label: 0,
            unit: IrVar::new("unit"),
            ins: Vec::new(),
            loops: Vec::new(),
            exit: None,
        }
    }

    fn generate(mut self, module: &Module<Typed>) -> Result<Vec<FunctionIr>> {
        let root = self.scopes.push(None);
        for name in crate::ir::reserved_names() {
            self.scopes.insert(root, name.into(), IrVar::new(name));
        }
        let module_scope = self.scopes.push(Some(root));
        for fun in &module.funs {
            self.scopes
                .insert(module_scope, fun.name.clone(), IrVar(fun.name.clone()));
        }

        let mut functions = Vec::with_capacity(module.funs.len() + 1);
        for fun in &module.funs {
            functions.push(self.generate_fun(fun, module_scope)?);
        }
        functions.push(self.generate_main(module, module_scope)?);
        Ok(functions)
    }

    fn generate_fun(&mut self, fun: &FunDef<Typed>, module_scope: ScopeId) -> Result<FunctionIr> {
        debug!("lowering function `{}`", fun.name);
        if fun.params.len() > ARG_REGISTERS.len() {
            return Err(CompileError::TooManyArguments {
                loc: fun.loc,
                name: fun.name.clone(),
            });
        }

        self.ins.clear();
        self.loops.clear();
        let exit = self.new_label();
        self.exit = Some(exit.clone());

        let scope = self.scopes.push(Some(module_scope));
        for (param, reg) in fun.params.iter().zip(ARG_REGISTERS) {
            let var = self.new_var();
            self.emit(
                InstructionKind::Copy {
                    source: IrVar::new(reg),
                    dest: var.clone(),
                },
                param.loc,
            );
            self.scopes.insert(scope, param.name.clone(), var);
        }

        self.visit(&fun.body, scope)?;
        self.emit(InstructionKind::Label { label: exit }, fun.loc);

        Ok(FunctionIr {
            name: fun.name.clone(),
            instructions: std::mem::take(&mut self.ins),
        })
    }

    fn generate_main(&mut self, module: &Module<Typed>, module_scope: ScopeId) -> Result<FunctionIr> {
        self.ins.clear();
        self.loops.clear();
        self.exit = None;

        let scope = self.scopes.push(Some(module_scope));
        let mut result = self.unit.clone();
        for expr in &module.exprs {
            result = self.visit(expr, scope)?;
        }

        // The program's observable output: an `Int` or `Bool` final value
        // is printed, a `Unit` one is not.
        let printer = match module.exprs.last().map(|e| &e.ty) {
            Some(Ty::Int) => Some("print_int"),
            Some(Ty::Bool) => Some("print_bool"),
            _ => None,
        };
        if let Some(printer) = printer {
            let dest = self.new_var();
            self.emit(
                InstructionKind::Call {
                    fun: IrVar::new(printer),
                    args: vec![result],
                    dest,
                },
                Location::UNKNOWN,
            );
        }

        Ok(FunctionIr {
            name: "main".into(),
            instructions: std::mem::take(&mut self.ins),
        })
    }

    fn visit(&mut self, expr: &Expr<Typed>, scope: ScopeId) -> Result<IrVar> {
        let loc = expr.loc;
        let result = match &expr.kind {
            ExprKind::Unit => self.unit.clone(),

            ExprKind::Int(value) => {
                let dest = self.new_var();
                self.emit(
                    InstructionKind::LoadIntConst {
                        value: *value,
                        dest: dest.clone(),
                    },
                    loc,
                );
                dest
            }

            ExprKind::Bool(value) => {
                let dest = self.new_var();
                self.emit(
                    InstructionKind::LoadBoolConst {
                        value: *value,
                        dest: dest.clone(),
                    },
                    loc,
                );
                dest
            }

            ExprKind::Id(name) => self.lookup(scope, name),

            ExprKind::Unary { op, operand } => {
                let operand = self.visit(operand, scope)?;
                let dest = self.new_var();
                self.emit(
                    InstructionKind::Call {
                        fun: IrVar::new(op.name()),
                        args: vec![operand],
                        dest: dest.clone(),
                    },
                    loc,
                );
                dest
            }

            ExprKind::Binary { op, lhs, rhs } if op.is_short_circuit() => {
                self.visit_short_circuit(*op, lhs, rhs, scope, loc)?
            }

            ExprKind::Binary { op, lhs, rhs } => {
                // Unit operands carry no data, so their equality is decided
                // here; both sides still run for their effects.
                let unit_operands = op.is_equality() && lhs.ty == Ty::Unit;
                let lhs = self.visit(lhs, scope)?;
                let rhs = self.visit(rhs, scope)?;
                let dest = self.new_var();
                if unit_operands {
                    self.emit(
                        InstructionKind::LoadBoolConst {
                            value: *op == crate::ast::BinaryOp::Eq,
                            dest: dest.clone(),
                        },
                        loc,
                    );
                } else {
                    self.emit(
                        InstructionKind::Call {
                            fun: IrVar::new(op.name()),
                            args: vec![lhs, rhs],
                            dest: dest.clone(),
                        },
                        loc,
                    );
                }
                dest
            }

            ExprKind::If {
                cond,
                then_arm,
                else_arm: Some(else_arm),
            } => {
                let l_then = self.new_label();
                let l_else = self.new_label();
                let l_end = self.new_label();

                let cond = self.visit(cond, scope)?;
                self.emit(
                    InstructionKind::CondJump {
                        cond,
                        then_label: l_then.clone(),
                        else_label: l_else.clone(),
                    },
                    loc,
                );

                self.emit(InstructionKind::Label { label: l_then }, loc);
                let then_value = self.visit(then_arm, scope)?;
                // Both arms funnel into one result register.
                let dest = self.new_var();
                self.emit(
                    InstructionKind::Copy {
                        source: then_value,
                        dest: dest.clone(),
                    },
                    loc,
                );
                self.emit(InstructionKind::Jump { label: l_end.clone() }, loc);

                self.emit(InstructionKind::Label { label: l_else }, loc);
                let else_value = self.visit(else_arm, scope)?;
                self.emit(
                    InstructionKind::Copy {
                        source: else_value,
                        dest: dest.clone(),
                    },
                    loc,
                );
                self.emit(InstructionKind::Label { label: l_end }, loc);
                dest
            }

            ExprKind::If {
                cond,
                then_arm,
                else_arm: None,
            } => {
                let l_then = self.new_label();
                let l_end = self.new_label();

                let cond = self.visit(cond, scope)?;
                self.emit(
                    InstructionKind::CondJump {
                        cond,
                        then_label: l_then.clone(),
                        else_label: l_end.clone(),
                    },
                    loc,
                );
                self.emit(InstructionKind::Label { label: l_then }, loc);
                self.visit(then_arm, scope)?;
                self.emit(InstructionKind::Label { label: l_end }, loc);
                self.unit.clone()
            }

            ExprKind::While { cond, body } => {
                let l_start = self.new_label();
                let l_body = self.new_label();
                let l_end = self.new_label();

                self.emit(InstructionKind::Label { label: l_start.clone() }, loc);
                let cond = self.visit(cond, scope)?;
                self.emit(
                    InstructionKind::CondJump {
                        cond,
                        then_label: l_body.clone(),
                        else_label: l_end.clone(),
                    },
                    loc,
                );
                self.emit(InstructionKind::Label { label: l_body }, loc);

                self.loops.push((l_start.clone(), l_end.clone()));
                let body = self.visit(body, scope);
                self.loops.pop();
                body?;

                self.emit(InstructionKind::Jump { label: l_start }, loc);
                self.emit(InstructionKind::Label { label: l_end }, loc);
                self.unit.clone()
            }

            ExprKind::Loop(control) => {
                let Some((start, end)) = self.loops.last().cloned() else {
                    return Err(CompileError::IllegalLoopControl {
                        loc,
                        keyword: control.keyword(),
                    });
                };
                let target = match control {
                    LoopControl::Break => end,
                    LoopControl::Continue => start,
                };
                self.emit(InstructionKind::Jump { label: target }, loc);
                self.unit.clone()
            }

            ExprKind::Call { callee, args } => {
                let fun = self.lookup(scope, callee);
                let args = args
                    .iter()
                    .map(|arg| self.visit(arg, scope))
                    .collect::<Result<Vec<_>>>()?;
                let dest = self.new_var();
                self.emit(
                    InstructionKind::Call {
                        fun,
                        args,
                        dest: dest.clone(),
                    },
                    loc,
                );
                dest
            }

            ExprKind::Assign { target, value } => {
                let value = self.visit(value, scope)?;
                let dest = self.lookup(scope, target);
                self.emit(
                    InstructionKind::Copy {
                        source: value,
                        dest: dest.clone(),
                    },
                    loc,
                );
                dest
            }

            ExprKind::VarDec { name, value, .. } => {
                let value = self.visit(value, scope)?;
                // Every declaration gets a fresh register, so shadowing in
                // an inner scope never clobbers the outer variable.
                let var = self.new_var();
                self.emit(
                    InstructionKind::Copy {
                        source: value,
                        dest: var.clone(),
                    },
                    loc,
                );
                self.scopes.insert(scope, name.clone(), var);
                self.unit.clone()
            }

            ExprKind::Block { body } => {
                let inner = self.scopes.push(Some(scope));
                let mut result = self.unit.clone();
                for item in body {
                    result = self.visit(item, inner)?;
                }
                result
            }

            ExprKind::Return { value } => {
                let Some(exit) = self.exit.clone() else {
                    // The checker rejects top-level returns before we get
                    // here.
                    return Err(CompileError::ReturnOutsideFunction { loc });
                };
                let value = self.visit(value, scope)?;
                self.emit(
                    InstructionKind::Copy {
                        source: value,
                        dest: IrVar::new(RETURN_REGISTER),
                    },
                    loc,
                );
                self.emit(InstructionKind::Jump { label: exit }, loc);
                self.unit.clone()
            }
        };
        Ok(result)
    }

    /// `and` and `or` skip their right operand when the left one already
    /// decides the result. On the short path the left value is the result;
    /// on the long path the real operator is applied to both operands.
    fn visit_short_circuit(
        &mut self,
        op: crate::ast::BinaryOp,
        lhs: &Expr<Typed>,
        rhs: &Expr<Typed>,
        scope: ScopeId,
        loc: Location,
    ) -> Result<IrVar> {
        use crate::ast::BinaryOp;

        let l_long = self.new_label();
        let l_short = self.new_label();
        let l_end = self.new_label();

        let lhs = self.visit(lhs, scope)?;
        let (then_label, else_label) = match op {
            BinaryOp::And => (l_long.clone(), l_short.clone()),
            BinaryOp::Or => (l_short.clone(), l_long.clone()),
            _ => unreachable!("not a short-circuiting operator"),
        };
        self.emit(
            InstructionKind::CondJump {
                cond: lhs.clone(),
                then_label,
                else_label,
            },
            loc,
        );

        self.emit(InstructionKind::Label { label: l_long }, loc);
        let rhs = self.visit(rhs, scope)?;
        let dest = self.new_var();
        self.emit(
            InstructionKind::Call {
                fun: IrVar::new(op.name()),
                args: vec![lhs.clone(), rhs],
                dest: dest.clone(),
            },
            loc,
        );
        self.emit(InstructionKind::Jump { label: l_end.clone() }, loc);

        self.emit(InstructionKind::Label { label: l_short }, loc);
        self.emit(
            InstructionKind::Copy {
                source: lhs,
                dest: dest.clone(),
            },
            loc,
        );
        self.emit(InstructionKind::Label { label: l_end }, loc);
        Ok(dest)
    }

    fn lookup(&self, scope: ScopeId, name: &str) -> IrVar {
        self.scopes
            .lookup(scope, name)
            .cloned()
            .unwrap_or_else(|| unreachable!("checker guarantees `{name}` is bound"))
    }

    fn emit(&mut self, kind: InstructionKind, loc: Location) {
        self.ins.push(Instruction::new(kind, loc));
    }

    fn new_var(&mut self) -> IrVar {
        let var = IrVar::new(format!("X_{}", self.next_var));
        self.next_var += 1;
        var
    }

    fn new_label(&mut self) -> Label {
        let label = Label::new(format!("L_{}", self.next_label));
        self.next_label += 1;
        label
    }
}
