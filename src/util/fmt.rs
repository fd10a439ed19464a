use std::io::Write;

use crate::ast::*;

const INDENT_WIDTH: usize = 2;

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}

pub fn print_module_string<P: Phase>(module: &Module<P>) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_module(&mut buf, module).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_module<P: Phase>(w: &mut impl Write, module: &Module<P>) -> std::io::Result<()> {
    for fun in &module.funs {
        print_fun(w, 0, fun)?;
    }
    for expr in &module.exprs {
        print_expr(w, 0, expr)?;
    }
    Ok(())
}

fn print_fun<P: Phase>(w: &mut impl Write, i: usize, fun: &FunDef<P>) -> std::io::Result<()> {
    sp(w, i)?;
    write!(w, "fun {}(", fun.name)?;
    for (idx, param) in fun.params.iter().enumerate() {
        if idx > 0 {
            write!(w, ", ")?;
        }
        write!(w, "{}: {}", param.name, param.ty)?;
    }
    writeln!(w, "): {}", fun.ret)?;
    print_expr(w, i + 1, &fun.body)
}

pub fn print_expr<P: Phase>(w: &mut impl Write, i: usize, expr: &Expr<P>) -> std::io::Result<()> {
    sp(w, i)?;
    match &expr.kind {
        ExprKind::Unit => writeln!(w, "unit")?,
        ExprKind::Int(value) => writeln!(w, "int {value}")?,
        ExprKind::Bool(value) => writeln!(w, "bool {value}")?,
        ExprKind::Id(name) => writeln!(w, "ident {name}")?,
        ExprKind::Unary { op, operand } => {
            writeln!(w, "unary {}", op.symbol())?;
            print_expr(w, i + 1, operand)?;
        }
        ExprKind::Binary { op, lhs, rhs } => {
            writeln!(w, "binary {}", op.name())?;
            print_expr(w, i + 1, lhs)?;
            print_expr(w, i + 1, rhs)?;
        }
        ExprKind::If {
            cond,
            then_arm,
            else_arm,
        } => {
            writeln!(w, "if")?;
            print_expr(w, i + 1, cond)?;
            print_expr(w, i + 1, then_arm)?;
            if let Some(else_arm) = else_arm {
                print_expr(w, i + 1, else_arm)?;
            }
        }
        ExprKind::Call { callee, args } => {
            writeln!(w, "call {callee}")?;
            for arg in args {
                print_expr(w, i + 1, arg)?;
            }
        }
        ExprKind::Assign { target, value } => {
            writeln!(w, "assign {target}")?;
            print_expr(w, i + 1, value)?;
        }
        ExprKind::VarDec {
            name,
            annotation,
            value,
        } => {
            match annotation {
                Some(ty) => writeln!(w, "var {name}: {ty}")?,
                None => writeln!(w, "var {name}")?,
            }
            print_expr(w, i + 1, value)?;
        }
        ExprKind::Block { body } => {
            writeln!(w, "block")?;
            for item in body {
                print_expr(w, i + 1, item)?;
            }
        }
        ExprKind::While { cond, body } => {
            writeln!(w, "while")?;
            print_expr(w, i + 1, cond)?;
            print_expr(w, i + 1, body)?;
        }
        ExprKind::Loop(control) => writeln!(w, "{}", control.keyword())?,
        ExprKind::Return { value } => {
            writeln!(w, "return")?;
            print_expr(w, i + 1, value)?;
        }
    }
    Ok(())
}
