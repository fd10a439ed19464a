// module ::= (fundef | statement)*
// fundef ::= 'fun' ID '(' [param (',' param)*] ')' [':' TYPE] block
// param ::= ID ':' TYPE
// statement ::= vardec | expr
// vardec ::= 'var' ID [':' TYPE] '=' expr
// expr ::= 'if' expr 'then' expr ['else' expr]
//        | 'while' expr 'do' block
//        | '{' (statement ';'?)* '}'
//        | ID '=' expr
//        | ID '(' [expr (',' expr)*] ')'
//        | expr OP expr
//        | 'not' expr | '-' expr
//        | 'break' | 'continue' | 'return' [expr]
//        | '(' expr ')' | ID | integer | 'true' | 'false'
//
// Precedence (loosest first): or / and / == != / < <= > >= / + - / * / %

use std::{fmt, rc::Rc};

use crate::{token::Location, types::Ty};

/// The AST is parameterized over a phase marker: the parser produces
/// [`Untyped`] trees (no type information) and the type checker maps them
/// into [`Typed`] trees where every expression carries its [`Ty`]. Passing
/// an unchecked tree to the IR generator is therefore a compile-time error.
pub trait Phase {
    type Ty: Clone + fmt::Debug + PartialEq;
}

#[derive(Debug, PartialEq)]
pub struct Untyped;

#[derive(Debug, PartialEq)]
pub struct Typed;

impl Phase for Untyped {
    type Ty = ();
}

impl Phase for Typed {
    type Ty = Ty;
}

#[derive(Debug, PartialEq)]
pub struct Module<P: Phase> {
    pub funs: Vec<FunDef<P>>,
    /// Top-level statements, in source order. The last one's type decides
    /// whether the program prints its final value.
    pub exprs: Vec<Expr<P>>,
}

#[derive(Debug, PartialEq)]
pub struct FunDef<P: Phase> {
    pub name: Rc<str>,
    pub params: Vec<Param>,
    pub ret: Ty,
    /// Always a block.
    pub body: Expr<P>,
    pub loc: Location,
}

impl<P: Phase> FunDef<P> {
    /// The function's declared signature as a structural function type.
    pub fn signature(&self) -> Ty {
        let params = self.params.iter().map(|p| p.ty.clone()).collect();
        Ty::fun(params, self.ret.clone())
    }
}

#[derive(Debug, PartialEq)]
pub struct Param {
    pub name: Rc<str>,
    pub ty: Ty,
    pub loc: Location,
}

#[derive(Debug, PartialEq)]
pub struct Expr<P: Phase> {
    pub kind: ExprKind<P>,
    pub loc: Location,
    pub ty: P::Ty,
}

impl Expr<Untyped> {
    pub fn new(kind: ExprKind<Untyped>, loc: Location) -> Expr<Untyped> {
        Expr { kind, loc, ty: () }
    }

    /// The implicit unit value a block evaluates to after a trailing `;`.
    pub fn unit(loc: Location) -> Expr<Untyped> {
        Expr::new(ExprKind::Unit, loc)
    }
}

#[derive(Debug, PartialEq)]
pub enum ExprKind<P: Phase> {
    Unit,
    Int(i64),
    Bool(bool),
    Id(Rc<str>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr<P>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr<P>>,
        rhs: Box<Expr<P>>,
    },
    If {
        cond: Box<Expr<P>>,
        then_arm: Box<Expr<P>>,
        else_arm: Option<Box<Expr<P>>>,
    },
    Call {
        callee: Rc<str>,
        args: Vec<Expr<P>>,
    },
    Assign {
        target: Rc<str>,
        value: Box<Expr<P>>,
    },
    VarDec {
        name: Rc<str>,
        annotation: Option<Ty>,
        value: Box<Expr<P>>,
    },
    Block {
        body: Vec<Expr<P>>,
    },
    While {
        cond: Box<Expr<P>>,
        body: Box<Expr<P>>,
    },
    Loop(LoopControl),
    Return {
        value: Box<Expr<P>>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopControl {
    Break,
    Continue,
}

impl LoopControl {
    pub fn keyword(self) -> &'static str {
        match self {
            LoopControl::Break => "break",
            LoopControl::Continue => "continue",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    /// The reserved operator name the unary form resolves to in the type
    /// scope and in IR.
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "unary_-",
            UnaryOp::Not => "unary_not",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

impl BinaryOp {
    /// The operator's reserved name, shared by the type scope, the IR
    /// operator registers and the intrinsics table.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// `==` and `!=` apply to any pair of identical value types and never
    /// go through the operator type table.
    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::NotEq)
    }

    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}
