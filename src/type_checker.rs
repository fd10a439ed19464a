use std::rc::Rc;

use log::debug;

use crate::{
    ast::{Expr, ExprKind, FunDef, Module, Param, Typed, Untyped},
    error::{CompileError, Result},
    scope::{ScopeArena, ScopeId},
    types::{global_bindings, FunTy, Ty, TyList},
};

/// Checks the module, mapping the untyped tree into a typed one in which
/// every expression carries its type. The first violation aborts the check.
pub fn check_module(module: Module<Untyped>) -> Result<Module<Typed>> {
    Checker::new().check_module(module)
}

struct Checker {
    scopes: ScopeArena<Ty>,
}

impl Checker {
    fn new() -> Checker {
        Checker {
            scopes: ScopeArena::new(),
        }
    }

    fn check_module(mut self, module: Module<Untyped>) -> Result<Module<Typed>> {
        let root = self.scopes.push(None);
        for (name, ty) in global_bindings() {
            self.scopes.insert(root, name.into(), ty);
        }

        // Every signature is registered before any body is checked, so
        // functions may refer to each other (and themselves) freely.
        let module_scope = self.scopes.push(Some(root));
        for fun in &module.funs {
            if self.scopes.contains_locally(module_scope, &fun.name) {
                return Err(CompileError::DuplicateDeclaration {
                    loc: fun.loc,
                    name: fun.name.clone(),
                });
            }
            self.scopes
                .insert(module_scope, fun.name.clone(), fun.signature());
        }

        let funs = module
            .funs
            .into_iter()
            .map(|fun| self.check_fun(fun, module_scope))
            .collect::<Result<Vec<_>>>()?;

        let exprs = module
            .exprs
            .into_iter()
            .map(|expr| self.check_expr(expr, module_scope, None))
            .collect::<Result<Vec<_>>>()?;

        Ok(Module { funs, exprs })
    }

    fn check_fun(&mut self, fun: FunDef<Untyped>, module_scope: ScopeId) -> Result<FunDef<Typed>> {
        debug!("checking function `{}`", fun.name);
        let Ty::Fun(signature) = fun.signature() else {
            unreachable!("FunDef::signature always builds a function type");
        };

        let scope = self.scopes.push(Some(module_scope));
        for Param { name, ty, loc } in &fun.params {
            if self.scopes.contains_locally(scope, name) {
                return Err(CompileError::DuplicateDeclaration {
                    loc: *loc,
                    name: name.clone(),
                });
            }
            self.scopes.insert(scope, name.clone(), ty.clone());
        }

        let body = self.check_expr(fun.body, scope, Some(&*signature))?;

        // Fall-through policy: a non-Unit function must provably end in an
        // explicit `return`; the signature alone is not reconciled against
        // the body's value.
        if fun.ret != Ty::Unit && !always_returns(&body) {
            return Err(CompileError::MissingReturn {
                loc: fun.loc,
                name: fun.name.clone(),
                ret: fun.ret.clone(),
            });
        }

        Ok(FunDef {
            name: fun.name,
            params: fun.params,
            ret: fun.ret,
            body,
            loc: fun.loc,
        })
    }

    fn check_expr(
        &mut self,
        expr: Expr<Untyped>,
        scope: ScopeId,
        fun: Option<&FunTy>,
    ) -> Result<Expr<Typed>> {
        let loc = expr.loc;
        let (kind, ty) = match expr.kind {
            ExprKind::Unit => (ExprKind::Unit, Ty::Unit),
            ExprKind::Int(value) => (ExprKind::Int(value), Ty::Int),
            ExprKind::Bool(value) => (ExprKind::Bool(value), Ty::Bool),

            ExprKind::Id(name) => {
                let ty = self
                    .scopes
                    .lookup(scope, &name)
                    .ok_or_else(|| CompileError::UndefinedName {
                        loc,
                        name: name.clone(),
                    })?
                    .clone();
                (ExprKind::Id(name), ty)
            }

            ExprKind::VarDec {
                name,
                annotation,
                value,
            } => {
                if self.scopes.contains_locally(scope, &name) {
                    return Err(CompileError::DuplicateDeclaration { loc, name });
                }
                let value = self.check_expr(*value, scope, fun)?;
                if let Some(declared) = &annotation {
                    if *declared != value.ty {
                        return Err(CompileError::DeclaredTypeMismatch {
                            loc,
                            declared: declared.clone(),
                            inferred: value.ty.clone(),
                        });
                    }
                }
                self.scopes.insert(scope, name.clone(), value.ty.clone());
                (
                    ExprKind::VarDec {
                        name,
                        annotation,
                        value: Box::new(value),
                    },
                    Ty::Unit,
                )
            }

            ExprKind::Assign { target, value } => {
                let expected = self
                    .scopes
                    .lookup(scope, &target)
                    .ok_or_else(|| CompileError::UndefinedName {
                        loc,
                        name: target.clone(),
                    })?
                    .clone();
                let value = self.check_expr(*value, scope, fun)?;
                if value.ty != expected {
                    return Err(CompileError::AssignmentTypeMismatch {
                        loc,
                        name: target,
                        expected,
                        found: value.ty,
                    });
                }
                let ty = value.ty.clone();
                (
                    ExprKind::Assign {
                        target,
                        value: Box::new(value),
                    },
                    ty,
                )
            }

            ExprKind::Unary { op, operand } => {
                let operand = self.check_expr(*operand, scope, fun)?;
                let op_ty = self.operator_type(scope, op.name());
                if op_ty.params[0] != operand.ty {
                    return Err(CompileError::OperatorTypeMismatch {
                        loc,
                        op: op.symbol(),
                        expected: TyList(&op_ty.params).to_string(),
                        found: TyList(&[operand.ty.clone()]).to_string(),
                    });
                }
                let ty = op_ty.ret.clone();
                (
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    ty,
                )
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.check_expr(*lhs, scope, fun)?;
                let rhs = self.check_expr(*rhs, scope, fun)?;
                let ty = if op.is_equality() {
                    // `==` and `!=` apply to any identical pair of data
                    // types and skip the operator table. Function values
                    // carry no comparable identity.
                    if lhs.ty != rhs.ty || matches!(lhs.ty, Ty::Fun(_)) {
                        return Err(CompileError::ComparisonTypeMismatch {
                            loc,
                            op: op.name(),
                            left: lhs.ty,
                            right: rhs.ty,
                        });
                    }
                    Ty::Bool
                } else {
                    let op_ty = self.operator_type(scope, op.name());
                    if op_ty.params[0] != lhs.ty || op_ty.params[1] != rhs.ty {
                        return Err(CompileError::OperatorTypeMismatch {
                            loc,
                            op: op.name(),
                            expected: TyList(&op_ty.params).to_string(),
                            found: TyList(&[lhs.ty.clone(), rhs.ty.clone()]).to_string(),
                        });
                    }
                    op_ty.ret.clone()
                };
                (
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    ty,
                )
            }

            ExprKind::If {
                cond,
                then_arm,
                else_arm,
            } => {
                let cond = self.check_expr(*cond, scope, fun)?;
                if cond.ty != Ty::Bool {
                    return Err(CompileError::ConditionNotBool {
                        loc,
                        construct: "if",
                        found: cond.ty,
                    });
                }
                let then_arm = self.check_expr(*then_arm, scope, fun)?;
                let (else_arm, ty) = match else_arm {
                    // An else-less if with a block arm is a statement; its
                    // value is unit no matter what the block evaluates to.
                    None if matches!(then_arm.kind, ExprKind::Block { .. }) => (None, Ty::Unit),
                    None => {
                        if then_arm.ty != Ty::Unit {
                            return Err(CompileError::BranchTypeMismatch {
                                loc,
                                then_ty: then_arm.ty,
                                else_ty: Ty::Unit,
                            });
                        }
                        (None, Ty::Unit)
                    }
                    Some(else_arm) => {
                        let else_arm = self.check_expr(*else_arm, scope, fun)?;
                        if then_arm.ty != else_arm.ty {
                            return Err(CompileError::BranchTypeMismatch {
                                loc,
                                then_ty: then_arm.ty,
                                else_ty: else_arm.ty,
                            });
                        }
                        let ty = then_arm.ty.clone();
                        (Some(Box::new(else_arm)), ty)
                    }
                };
                (
                    ExprKind::If {
                        cond: Box::new(cond),
                        then_arm: Box::new(then_arm),
                        else_arm,
                    },
                    ty,
                )
            }

            ExprKind::While { cond, body } => {
                let cond = self.check_expr(*cond, scope, fun)?;
                if cond.ty != Ty::Bool {
                    return Err(CompileError::ConditionNotBool {
                        loc,
                        construct: "while",
                        found: cond.ty,
                    });
                }
                let body = self.check_expr(*body, scope, fun)?;
                if body.ty != Ty::Unit {
                    return Err(CompileError::IllegalLoopBody { loc, found: body.ty });
                }
                (
                    ExprKind::While {
                        cond: Box::new(cond),
                        body: Box::new(body),
                    },
                    Ty::Unit,
                )
            }

            ExprKind::Call { callee, args } => {
                let callee_ty = self
                    .scopes
                    .lookup(scope, &callee)
                    .ok_or_else(|| CompileError::UndefinedName {
                        loc,
                        name: callee.clone(),
                    })?
                    .clone();
                let Ty::Fun(signature) = callee_ty else {
                    return Err(CompileError::NotCallable { loc, name: callee });
                };
                let args = args
                    .into_iter()
                    .map(|arg| self.check_expr(arg, scope, fun))
                    .collect::<Result<Vec<_>>>()?;
                let arg_tys: Vec<Ty> = args.iter().map(|a| a.ty.clone()).collect();
                if signature.params != arg_tys {
                    return Err(CompileError::CallTypeMismatch {
                        loc,
                        name: callee,
                        signature: Ty::Fun(signature),
                        found: TyList(&arg_tys).to_string(),
                    });
                }
                let ty = signature.ret.clone();
                (ExprKind::Call { callee, args }, ty)
            }

            ExprKind::Block { body } => {
                let inner = self.scopes.push(Some(scope));
                debug!("entering block scope {inner:?}");
                let body = body
                    .into_iter()
                    .map(|item| self.check_expr(item, inner, fun))
                    .collect::<Result<Vec<_>>>()?;
                let ty = body.last().map_or(Ty::Unit, |last| last.ty.clone());
                (ExprKind::Block { body }, ty)
            }

            // Being inside a loop is not checked here; the IR generator
            // enforces it when it needs the loop's labels.
            ExprKind::Loop(control) => (ExprKind::Loop(control), Ty::Unit),

            ExprKind::Return { value } => {
                let Some(signature) = fun else {
                    return Err(CompileError::ReturnOutsideFunction { loc });
                };
                let value = self.check_expr(*value, scope, Some(signature))?;
                if value.ty != signature.ret {
                    return Err(CompileError::ReturnTypeMismatch {
                        loc,
                        expected: signature.ret.clone(),
                        found: value.ty,
                    });
                }
                let ty = value.ty.clone();
                (
                    ExprKind::Return {
                        value: Box::new(value),
                    },
                    ty,
                )
            }
        };
        Ok(Expr { kind, loc, ty })
    }

    /// Resolves a primitive operator's type. Operators are pre-bound in the
    /// root scope and cannot be shadowed, so the lookup is infallible.
    fn operator_type(&self, scope: ScopeId, name: &str) -> Rc<FunTy> {
        match self.scopes.lookup(scope, name) {
            Some(Ty::Fun(fun)) => Rc::clone(fun),
            _ => unreachable!("operator `{name}` must be bound in the root scope"),
        }
    }
}

/// Conservative check that evaluation of the expression always hits an
/// explicit `return`: the last meaningful statement of a block is a
/// `return`, or an if/else both of whose arms qualify.
fn always_returns(expr: &Expr<Typed>) -> bool {
    match &expr.kind {
        ExprKind::Return { .. } => true,
        ExprKind::Block { body } => {
            let mut items = body.as_slice();
            // Ignore the implicit trailing unit literal after `return x;`.
            if let [rest @ .., last] = items {
                if last.kind == ExprKind::Unit {
                    items = rest;
                }
            }
            items.last().is_some_and(always_returns)
        }
        ExprKind::If {
            then_arm,
            else_arm: Some(else_arm),
            ..
        } => always_returns(then_arm) && always_returns(else_arm),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{lexer, parser};

    #[track_caller]
    fn check(src: &str) -> Result<Module<Typed>> {
        let tokens = lexer::lex(src).expect("failed to lex");
        let module = parser::parse(&tokens).expect("failed to parse");
        check_module(module)
    }

    #[track_caller]
    fn module_type(src: &str) -> Ty {
        let module = check(src).expect("failed to check");
        module.exprs.last().map_or(Ty::Unit, |e| e.ty.clone())
    }

    #[track_caller]
    fn check_error(src: &str) -> String {
        check(src).expect_err("expected a type error").to_string()
    }

    #[test]
    fn literals() {
        assert_eq!(module_type("1"), Ty::Int);
        assert_eq!(module_type("true"), Ty::Bool);
        assert_eq!(module_type("1;"), Ty::Unit);
        assert_eq!(module_type("{}"), Ty::Unit);
    }

    #[test]
    fn operators() {
        assert_eq!(module_type("1 + 2 * 3"), Ty::Int);
        assert_eq!(module_type("1 < 2"), Ty::Bool);
        assert_eq!(module_type("1 == 2"), Ty::Bool);
        assert_eq!(module_type("true == false"), Ty::Bool);
        assert_eq!(module_type("true and 1 < 2"), Ty::Bool);
        assert_eq!(module_type("not true"), Ty::Bool);
        assert_eq!(module_type("-3"), Ty::Int);
    }

    #[test]
    fn operator_mismatch_names_the_types() {
        assert_eq!(
            check_error("2 < true"),
            "(1, 1): operator `<` expected (Int, Int) but found (Int, Bool)"
        );
        assert_eq!(
            check_error("1 == true"),
            "(1, 1): cannot compare values of types Int and Bool with `==`"
        );
        assert_eq!(
            check_error("not 3"),
            "(1, 1): operator `not` expected (Bool) but found (Int)"
        );
    }

    #[test]
    fn var_declarations() {
        assert_eq!(module_type("{ var x = 5; x + 1 }"), Ty::Int);
        assert_eq!(module_type("{ var x: Int = 5; x }"), Ty::Int);
        assert_eq!(
            check_error("{ var x: Bool = 5; x }"),
            "(1, 3): declared type Bool conflicts with assigned type Int"
        );
        assert_eq!(
            check_error("{ var x = 1; var x = 2; }"),
            "(1, 14): cannot declare `x` multiple times in the same scope"
        );
        // Shadowing an outer scope is fine.
        assert_eq!(module_type("{ var x = 1; { var x = true; }; x }"), Ty::Int);
    }

    #[test]
    fn assignment() {
        assert_eq!(module_type("{ var x = 1; x = 2 }"), Ty::Int);
        assert_eq!(
            check_error("{ var x = 1; x = true }"),
            "(1, 14): cannot assign value of type Bool to variable `x` of type Int"
        );
        assert_eq!(check_error("x = 1"), "(1, 1): `x` is not defined");
    }

    #[test]
    fn if_branches() {
        assert_eq!(module_type("if 10 < 12 then 1 else 0"), Ty::Int);
        // An else-less if with a block arm is forced to unit.
        assert_eq!(module_type("{ var x = true; if x then { 1 } }"), Ty::Unit);
        assert_eq!(
            check_error("if 1 then 2 else 3"),
            "(1, 1): if condition must be of type Bool, not Int"
        );
        assert_eq!(
            check_error("if true then 1 else false"),
            "(1, 1): if branches must have the same type, not Int and Bool"
        );
    }

    #[test]
    fn while_body_must_be_unit() {
        assert_eq!(module_type("while false do { print_int(1); }"), Ty::Unit);
        assert_eq!(
            check_error("while false do { 1 }"),
            "(1, 1): while body must have type Unit, not Int; add `;` after the last statement"
        );
        assert_eq!(
            check_error("while 1 do {}"),
            "(1, 1): while condition must be of type Bool, not Int"
        );
    }

    #[test]
    fn calls_match_exactly() {
        assert_eq!(module_type("print_int(3)"), Ty::Unit);
        assert_eq!(module_type("read_int()"), Ty::Int);
        assert_eq!(
            check_error("print_int(true)"),
            "(1, 1): function `print_int` has type (Int) => Unit but was called with (Bool)"
        );
        assert_eq!(
            check_error("print_int(1, 2)"),
            "(1, 1): function `print_int` has type (Int) => Unit but was called with (Int, Int)"
        );
        assert_eq!(
            check_error("{ var x = 1; x(2) }"),
            "(1, 14): `x` is not a function"
        );
        assert_eq!(check_error("nope()"), "(1, 1): `nope` is not defined");
    }

    #[test]
    fn function_values_flow_through_variables() {
        assert_eq!(module_type("{ var f = print_int; f(3) }"), Ty::Unit);
        assert_eq!(
            module_type("fun inc(x: Int): Int { return x + 1 } { var f = inc; f(1) }"),
            Ty::Int
        );
        assert_eq!(
            check_error("{ var f = print_int; f(true) }"),
            "(1, 22): function `f` has type (Int) => Unit but was called with (Bool)"
        );
        // Functions are values, but not comparable ones.
        assert_eq!(
            check_error("print_int == print_int"),
            "(1, 1): cannot compare values of types (Int) => Unit and (Int) => Unit with `==`"
        );
    }

    #[test]
    fn functions_and_returns() {
        assert_eq!(
            module_type("fun square(x: Int): Int { return x * x } square(3)"),
            Ty::Int
        );
        // Forward and mutual references work; signatures are registered
        // before any body is checked.
        assert_eq!(
            module_type(
                "
                fun is_even(n: Int): Bool {
                    if n == 0 then { return true };
                    return is_odd(n - 1)
                }
                fun is_odd(n: Int): Bool {
                    if n == 0 then { return false };
                    return is_even(n - 1)
                }
                is_even(10)
                "
            ),
            Ty::Bool
        );
        assert_eq!(
            check_error("fun f(): Int { return true }"),
            "(1, 16): return type Bool doesn't match declared return type Int"
        );
        assert_eq!(
            check_error("return 1"),
            "(1, 1): cannot use `return` outside of a function"
        );
        assert_eq!(
            check_error("fun f(): Int { 1 }"),
            "(1, 1): function `f` returns Int but its body does not end in a `return`"
        );
        assert_eq!(
            check_error("fun f() {} fun f() {}"),
            "(1, 12): cannot declare `f` multiple times in the same scope"
        );
    }

    #[test]
    fn missing_return_accepts_if_else_arms() {
        assert!(check("fun f(c: Bool): Int { if c then { return 1 } else { return 2 } }").is_ok());
        assert_eq!(
            check_error("fun f(c: Bool): Int { if c then { return 1 } }"),
            "(1, 1): function `f` returns Int but its body does not end in a `return`"
        );
    }

    #[test]
    fn every_node_is_annotated() {
        let module = check("{ var x = 1; if x < 2 then x else 0 }").unwrap();
        let ExprKind::Block { body } = &module.exprs[0].kind else {
            panic!("expected block");
        };
        assert_eq!(body[0].ty, Ty::Unit); // var dec
        assert_eq!(body[1].ty, Ty::Int); // if/else
        let ExprKind::If { cond, .. } = &body[1].kind else {
            panic!("expected if");
        };
        assert_eq!(cond.ty, Ty::Bool);
    }
}
