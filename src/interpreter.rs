use std::{
    collections::HashMap,
    fmt,
    io::{BufRead, Write},
    rc::Rc,
};

use thiserror::Error;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, FunDef, LoopControl, Module, Typed, UnaryOp},
    scope::{ScopeArena, ScopeId},
    token::Location,
};

/// A runtime value. The checker guarantees operands always have the
/// variant their operator expects. Functions are values too, carried by
/// name; built-ins and user functions share the namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Unit,
    Fun(Rc<str>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Unit => f.write_str("unit"),
            Value::Fun(name) => write!(f, "fun {name}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{loc}: division by zero")]
    DivisionByZero { loc: Location },

    #[error("{loc}: arithmetic overflow")]
    Overflow { loc: Location },

    #[error("{loc}: `{keyword}` outside of a loop")]
    LoopControlOutsideLoop {
        loc: Location,
        keyword: &'static str,
    },

    #[error("read_int: expected an integer, got {0:?}")]
    BadInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why evaluation of a subtree stopped early. `break`, `continue` and
/// `return` unwind through `?` until the construct that handles them;
/// errors unwind all the way out.
enum Interrupt {
    Break(Location),
    Continue(Location),
    Return(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for Interrupt {
    fn from(err: RuntimeError) -> Interrupt {
        Interrupt::Error(err)
    }
}

impl From<std::io::Error> for Interrupt {
    fn from(err: std::io::Error) -> Interrupt {
        Interrupt::Error(RuntimeError::Io(err))
    }
}

/// Runs a checked module against the given input and output streams. The
/// observable behavior matches the compiled program: `print_int` and
/// `print_bool` write a line each, and the final top-level value is
/// printed when it is an `Int` or a `Bool`.
pub fn run(
    module: &Module<Typed>,
    input: impl BufRead,
    output: impl Write,
) -> Result<(), RuntimeError> {
    Interpreter::new(module, input, output).run(module)
}

struct Interpreter<'m, R, W> {
    scopes: ScopeArena<Value>,
    funs: HashMap<&'m str, &'m FunDef<Typed>>,
    input: R,
    output: W,
}

impl<'m, R: BufRead, W: Write> Interpreter<'m, R, W> {
    fn new(module: &'m Module<Typed>, input: R, output: W) -> Interpreter<'m, R, W> {
        let funs = module
            .funs
            .iter()
            .map(|fun| (&*fun.name, fun))
            .collect();
        Interpreter {
            scopes: ScopeArena::new(),
            funs,
            input,
            output,
        }
    }

    fn run(mut self, module: &'m Module<Typed>) -> Result<(), RuntimeError> {
        let root = self.scopes.push(None);
        let mut last = Value::Unit;
        for expr in &module.exprs {
            last = match self.eval(expr, root) {
                Ok(value) => value,
                Err(Interrupt::Error(err)) => return Err(err),
                Err(Interrupt::Break(loc)) => {
                    return Err(RuntimeError::LoopControlOutsideLoop {
                        loc,
                        keyword: "break",
                    })
                }
                Err(Interrupt::Continue(loc)) => {
                    return Err(RuntimeError::LoopControlOutsideLoop {
                        loc,
                        keyword: "continue",
                    })
                }
                // The checker rejects top-level returns.
                Err(Interrupt::Return(_)) => unreachable!("return escaped all functions"),
            };
        }
        if let Value::Int(_) | Value::Bool(_) = last {
            writeln!(self.output, "{last}")?;
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr<Typed>, scope: ScopeId) -> Result<Value, Interrupt> {
        let loc = expr.loc;
        match &expr.kind {
            ExprKind::Unit => Ok(Value::Unit),
            ExprKind::Int(value) => Ok(Value::Int(*value)),
            ExprKind::Bool(value) => Ok(Value::Bool(*value)),

            // A name missing from the value environment is a function or
            // built-in; the checker rejects everything else.
            ExprKind::Id(name) => Ok(self
                .scopes
                .lookup(scope, name)
                .cloned()
                .unwrap_or_else(|| Value::Fun(name.clone()))),

            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand, scope)?;
                match (op, operand) {
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or(Interrupt::Error(RuntimeError::Overflow { loc })),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    _ => unreachable!("ill-typed unary operand"),
                }
            }

            ExprKind::Binary { op, lhs, rhs } if op.is_short_circuit() => {
                let lhs = self.eval(lhs, scope)?;
                match (op, lhs) {
                    // The deciding operand skips the right-hand side.
                    (BinaryOp::And, Value::Bool(false)) => Ok(Value::Bool(false)),
                    (BinaryOp::Or, Value::Bool(true)) => Ok(Value::Bool(true)),
                    _ => self.eval(rhs, scope),
                }
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, scope)?;
                let rhs = self.eval(rhs, scope)?;
                self.apply_binary(*op, lhs, rhs, loc)
            }

            ExprKind::If {
                cond,
                then_arm,
                else_arm,
            } => {
                let Value::Bool(cond) = self.eval(cond, scope)? else {
                    unreachable!("ill-typed condition");
                };
                if cond {
                    let value = self.eval(then_arm, scope)?;
                    // An else-less if is a statement.
                    Ok(if else_arm.is_some() { value } else { Value::Unit })
                } else if let Some(else_arm) = else_arm {
                    self.eval(else_arm, scope)
                } else {
                    Ok(Value::Unit)
                }
            }

            ExprKind::While { cond, body } => {
                loop {
                    let Value::Bool(keep_going) = self.eval(cond, scope)? else {
                        unreachable!("ill-typed condition");
                    };
                    if !keep_going {
                        break;
                    }
                    match self.eval(body, scope) {
                        Ok(_) | Err(Interrupt::Continue(_)) => {}
                        Err(Interrupt::Break(_)) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(Value::Unit)
            }

            ExprKind::Loop(LoopControl::Break) => Err(Interrupt::Break(loc)),
            ExprKind::Loop(LoopControl::Continue) => Err(Interrupt::Continue(loc)),

            ExprKind::Call { callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, scope)?);
                }
                // The callee name may be bound to a function value; it is
                // resolved after the arguments, as the compiled code reads
                // its register after marshaling.
                let target = match self.scopes.lookup(scope, callee) {
                    Some(Value::Fun(name)) => name.clone(),
                    Some(_) => unreachable!("checker guarantees `{callee}` is callable"),
                    None => callee.clone(),
                };
                self.call(&target, &values)
            }

            ExprKind::Assign { target, value } => {
                let value = self.eval(value, scope)?;
                let slot = self
                    .scopes
                    .lookup_mut(scope, target)
                    .unwrap_or_else(|| unreachable!("checker guarantees `{target}` is bound"));
                *slot = value.clone();
                Ok(value)
            }

            ExprKind::VarDec { name, value, .. } => {
                let value = self.eval(value, scope)?;
                self.scopes.insert(scope, name.clone(), value);
                Ok(Value::Unit)
            }

            ExprKind::Block { body } => {
                // The block's scope is torn down even when an interrupt
                // unwinds through it, so loops do not accumulate scopes.
                let mark = self.scopes.checkpoint();
                let inner = self.scopes.push(Some(scope));
                let mut last = Ok(Value::Unit);
                for item in body {
                    last = self.eval(item, inner);
                    if last.is_err() {
                        break;
                    }
                }
                self.scopes.pop_to(mark);
                last
            }

            ExprKind::Return { value } => {
                let value = self.eval(value, scope)?;
                Err(Interrupt::Return(value))
            }
        }
    }

    fn apply_binary(
        &mut self,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        loc: Location,
    ) -> Result<Value, Interrupt> {
        use BinaryOp::*;
        if op.is_equality() {
            let equal = lhs == rhs;
            return Ok(Value::Bool(if op == Eq { equal } else { !equal }));
        }
        let (Value::Int(a), Value::Int(b)) = (lhs, rhs) else {
            unreachable!("ill-typed binary operands");
        };
        let value = match op {
            Add => Value::Int(a.checked_add(b).ok_or(RuntimeError::Overflow { loc })?),
            Sub => Value::Int(a.checked_sub(b).ok_or(RuntimeError::Overflow { loc })?),
            Mul => Value::Int(a.checked_mul(b).ok_or(RuntimeError::Overflow { loc })?),
            // Division truncates toward zero, as idivq does.
            Div if b == 0 => return Err(RuntimeError::DivisionByZero { loc }.into()),
            Div => Value::Int(a.checked_div(b).ok_or(RuntimeError::Overflow { loc })?),
            Rem if b == 0 => return Err(RuntimeError::DivisionByZero { loc }.into()),
            Rem => Value::Int(a.checked_rem(b).ok_or(RuntimeError::Overflow { loc })?),
            Less => Value::Bool(a < b),
            LessEq => Value::Bool(a <= b),
            Greater => Value::Bool(a > b),
            GreaterEq => Value::Bool(a >= b),
            Eq | NotEq | And | Or => unreachable!("handled above"),
        };
        Ok(value)
    }

    fn call(&mut self, callee: &str, args: &[Value]) -> Result<Value, Interrupt> {
        if let Some(fun) = self.funs.get(callee).copied() {
            let mark = self.scopes.checkpoint();
            let scope = self.scopes.push(None);
            for (param, value) in fun.params.iter().zip(args) {
                self.scopes.insert(scope, param.name.clone(), value.clone());
            }
            let result = self.eval(&fun.body, scope);
            self.scopes.pop_to(mark);
            return match result {
                Ok(value) | Err(Interrupt::Return(value)) => Ok(value),
                Err(other) => Err(other),
            };
        }
        match callee {
            "print_int" | "print_bool" => {
                writeln!(self.output, "{}", args[0])?;
                Ok(Value::Unit)
            }
            "read_int" => {
                let mut line = String::new();
                self.input.read_line(&mut line)?;
                let value = line
                    .trim()
                    .parse()
                    .map_err(|_| RuntimeError::BadInput(line.trim().to_owned()))?;
                Ok(Value::Int(value))
            }
            _ => unreachable!("checker guarantees `{callee}` is a function"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{lexer, parser, type_checker};

    #[track_caller]
    fn run_with_input(src: &str, input: &str) -> Result<String, RuntimeError> {
        let tokens = lexer::lex(src).expect("failed to lex");
        let module = parser::parse(&tokens).expect("failed to parse");
        let module = type_checker::check_module(module).expect("failed to check");
        let mut output = Vec::new();
        run(&module, input.as_bytes(), &mut output)?;
        Ok(String::from_utf8(output).expect("output is utf-8"))
    }

    #[track_caller]
    fn run_src(src: &str) -> String {
        run_with_input(src, "").expect("program failed")
    }

    #[test]
    fn final_value_is_printed() {
        assert_eq!(run_src("1 + 2 * 3"), "7\n");
        assert_eq!(run_src("10 < 12"), "true\n");
        assert_eq!(run_src("print_int(1);"), "1\n");
        assert_eq!(run_src("{}"), "");
    }

    #[test]
    fn division_truncates_toward_zero() {
        assert_eq!(run_src("-7 / 2"), "-3\n");
        assert_eq!(run_src("-7 % 2"), "-1\n");
        assert_eq!(run_src("7 / 2"), "3\n");
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let err = run_with_input("1 / 0", "").unwrap_err();
        assert_eq!(err.to_string(), "(1, 1): division by zero");
    }

    #[test]
    fn short_circuiting_skips_side_effects() {
        assert_eq!(run_src("true or { print_int(1); true }"), "true\n");
        assert_eq!(run_src("false or { print_int(1); true }"), "1\ntrue\n");
        assert_eq!(run_src("false and { print_int(2); true }"), "false\n");
        assert_eq!(run_src("true and { print_int(2); true }"), "2\ntrue\n");
    }

    #[test]
    fn while_loops_and_assignment() {
        let src = "
            {
                var i = 1;
                var sum = 0;
                while i <= 5 do {
                    sum = sum + i;
                    i = i + 1;
                };
                sum
            }
        ";
        assert_eq!(run_src(src), "15\n");
    }

    #[test]
    fn break_and_continue() {
        let src = "
            {
                var i = 0;
                var sum = 0;
                while true do {
                    i = i + 1;
                    if i > 10 then { break };
                    if i % 2 == 0 then { continue };
                    sum = sum + i;
                };
                sum
            }
        ";
        // 1 + 3 + 5 + 7 + 9
        assert_eq!(run_src(src), "25\n");
    }

    #[test]
    fn recursion() {
        let src = "
            fun fib(n: Int): Int {
                if n < 2 then { return n };
                return fib(n - 1) + fib(n - 2)
            }
            print_int(fib(10));
        ";
        assert_eq!(run_src(src), "55\n");
    }

    #[test]
    fn read_int_consumes_one_line_per_call() {
        let out = run_with_input("print_int(read_int() + read_int());", "40\n2\n").unwrap();
        assert_eq!(out, "42\n");
        let err = run_with_input("read_int()", "carrot\n").unwrap_err();
        assert_eq!(err.to_string(), "read_int: expected an integer, got \"carrot\"");
    }

    #[test]
    fn function_values_are_first_class() {
        let src = "
            fun double(x: Int): Int { return x * 2 }
            {
                var f = double;
                var g = print_int;
                g(f(21));
            }
        ";
        assert_eq!(run_src(src), "42\n");
        assert_eq!(run_src("{ var f = print_bool; f(1 < 2); }"), "true\n");
    }

    #[test]
    fn unit_values_compare_equal() {
        assert_eq!(run_src("{} == {}"), "true\n");
        assert_eq!(run_src("{} != {}"), "false\n");
        // Operands run for their effects before the comparison.
        assert_eq!(run_src("{ print_int(1); } == { print_int(2); }"), "1\n2\ntrue\n");
    }

    #[test]
    fn block_scopes_are_torn_down_as_evaluation_unwinds() {
        let src = "
            {
                var i = 0;
                while i < 500 do {
                    var x = i + 1;
                    i = x;
                };
                print_int(i);
            }
        ";
        let tokens = lexer::lex(src).expect("failed to lex");
        let module = parser::parse(&tokens).expect("failed to parse");
        let module = type_checker::check_module(module).expect("failed to check");
        let mut output = Vec::new();
        let mut interp = Interpreter::new(&module, "".as_bytes(), &mut output);
        let root = interp.scopes.push(None);
        for expr in &module.exprs {
            assert!(interp.eval(expr, root).is_ok());
        }
        // Only the root scope survives; each loop iteration released its
        // block scope.
        assert_eq!(interp.scopes.checkpoint(), 1);
        drop(interp);
        assert_eq!(String::from_utf8(output).unwrap(), "500\n");
    }

    #[test]
    fn shadowing_restores_the_outer_binding() {
        let src = "
            {
                var x = 1;
                {
                    var x = 99;
                    print_int(x);
                };
                x
            }
        ";
        assert_eq!(run_src(src), "99\n1\n");
    }

    #[test]
    fn scopes_do_not_leak_between_calls() {
        let src = "
            fun bump(x: Int): Int { return x + 1 }
            print_int(bump(1));
            print_int(bump(41));
        ";
        assert_eq!(run_src(src), "2\n42\n");
    }
}
