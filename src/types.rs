use std::{fmt, rc::Rc};

/// A kielo type. The three value types are nominal singletons; function
/// types are compared structurally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ty {
    Int,
    Bool,
    Unit,
    Fun(Rc<FunTy>),
}

#[derive(Debug, PartialEq, Eq)]
pub struct FunTy {
    pub params: Vec<Ty>,
    pub ret: Ty,
}

impl Ty {
    pub fn fun(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Fun(Rc::new(FunTy { params, ret }))
    }

    /// Resolves a type name as written in source annotations.
    pub fn from_name(name: &str) -> Option<Ty> {
        match name {
            "Int" => Some(Ty::Int),
            "Bool" => Some(Ty::Bool),
            "Unit" => Some(Ty::Unit),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int => f.write_str("Int"),
            Ty::Bool => f.write_str("Bool"),
            Ty::Unit => f.write_str("Unit"),
            Ty::Fun(fun) => write!(f, "{} => {}", TyList(&fun.params), fun.ret),
        }
    }
}

/// Renders a parenthesized, comma-separated type tuple like `(Int, Bool)`.
pub struct TyList<'a>(pub &'a [Ty]);

impl fmt::Display for TyList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, ty) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str(")")
    }
}

/// The types of every name bound before any user code runs: the primitive
/// operators, their unary forms, and the runtime built-ins.
pub fn global_bindings() -> Vec<(&'static str, Ty)> {
    use Ty::{Bool, Int, Unit};
    vec![
        ("+", Ty::fun(vec![Int, Int], Int)),
        ("-", Ty::fun(vec![Int, Int], Int)),
        ("*", Ty::fun(vec![Int, Int], Int)),
        ("/", Ty::fun(vec![Int, Int], Int)),
        ("%", Ty::fun(vec![Int, Int], Int)),
        ("<", Ty::fun(vec![Int, Int], Bool)),
        ("<=", Ty::fun(vec![Int, Int], Bool)),
        (">", Ty::fun(vec![Int, Int], Bool)),
        (">=", Ty::fun(vec![Int, Int], Bool)),
        ("or", Ty::fun(vec![Bool, Bool], Bool)),
        ("and", Ty::fun(vec![Bool, Bool], Bool)),
        ("unary_-", Ty::fun(vec![Int], Int)),
        ("unary_not", Ty::fun(vec![Bool], Bool)),
        ("print_int", Ty::fun(vec![Int], Unit)),
        ("print_bool", Ty::fun(vec![Bool], Unit)),
        ("read_int", Ty::fun(vec![], Int)),
    ]
}
