use std::rc::Rc;

use thiserror::Error;

use crate::{token::Location, types::Ty};

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

/// Everything that can abort a compilation. Every variant carries the
/// originating source location; the first error raised ends the run, so
/// there is no batching and no partial output.
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    /// Lexical or syntactic failure from the front end.
    #[error("{loc}: {message}")]
    Syntax { loc: Location, message: String },

    #[error("{loc}: `{name}` is not defined")]
    UndefinedName { loc: Location, name: Rc<str> },

    #[error("{loc}: cannot declare `{name}` multiple times in the same scope")]
    DuplicateDeclaration { loc: Location, name: Rc<str> },

    #[error("{loc}: declared type {declared} conflicts with assigned type {inferred}")]
    DeclaredTypeMismatch {
        loc: Location,
        declared: Ty,
        inferred: Ty,
    },

    #[error("{loc}: cannot assign value of type {found} to variable `{name}` of type {expected}")]
    AssignmentTypeMismatch {
        loc: Location,
        name: Rc<str>,
        expected: Ty,
        found: Ty,
    },

    #[error("{loc}: operator `{op}` expected {expected} but found {found}")]
    OperatorTypeMismatch {
        loc: Location,
        op: &'static str,
        expected: String,
        found: String,
    },

    #[error("{loc}: cannot compare values of types {left} and {right} with `{op}`")]
    ComparisonTypeMismatch {
        loc: Location,
        op: &'static str,
        left: Ty,
        right: Ty,
    },

    #[error("{loc}: {construct} condition must be of type Bool, not {found}")]
    ConditionNotBool {
        loc: Location,
        construct: &'static str,
        found: Ty,
    },

    #[error("{loc}: if branches must have the same type, not {then_ty} and {else_ty}")]
    BranchTypeMismatch {
        loc: Location,
        then_ty: Ty,
        else_ty: Ty,
    },

    #[error("{loc}: while body must have type Unit, not {found}; add `;` after the last statement")]
    IllegalLoopBody { loc: Location, found: Ty },

    #[error("{loc}: `{name}` is not a function")]
    NotCallable { loc: Location, name: Rc<str> },

    #[error("{loc}: function `{name}` has type {signature} but was called with {found}")]
    CallTypeMismatch {
        loc: Location,
        name: Rc<str>,
        signature: Ty,
        found: String,
    },

    #[error("{loc}: cannot use `return` outside of a function")]
    ReturnOutsideFunction { loc: Location },

    #[error("{loc}: return type {found} doesn't match declared return type {expected}")]
    ReturnTypeMismatch {
        loc: Location,
        expected: Ty,
        found: Ty,
    },

    #[error("{loc}: function `{name}` returns {ret} but its body does not end in a `return`")]
    MissingReturn {
        loc: Location,
        name: Rc<str>,
        ret: Ty,
    },

    #[error("{loc}: cannot use `{keyword}` outside of a while loop")]
    IllegalLoopControl {
        loc: Location,
        keyword: &'static str,
    },

    #[error("{loc}: `{name}` takes more than 6 arguments, which the backend does not support")]
    TooManyArguments { loc: Location, name: Rc<str> },
}

impl CompileError {
    pub fn loc(&self) -> Location {
        use CompileError::*;
        match self {
            Syntax { loc, .. }
            | UndefinedName { loc, .. }
            | DuplicateDeclaration { loc, .. }
            | DeclaredTypeMismatch { loc, .. }
            | AssignmentTypeMismatch { loc, .. }
            | OperatorTypeMismatch { loc, .. }
            | ComparisonTypeMismatch { loc, .. }
            | ConditionNotBool { loc, .. }
            | BranchTypeMismatch { loc, .. }
            | IllegalLoopBody { loc, .. }
            | NotCallable { loc, .. }
            | CallTypeMismatch { loc, .. }
            | ReturnOutsideFunction { loc }
            | ReturnTypeMismatch { loc, .. }
            | MissingReturn { loc, .. }
            | IllegalLoopControl { loc, .. }
            | TooManyArguments { loc, .. } => *loc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_location() {
        let err = CompileError::UndefinedName {
            loc: Location::new(2, 7),
            name: "x".into(),
        };
        assert_eq!(err.to_string(), "(2, 7): `x` is not defined");
        assert_eq!(err.loc(), Location::new(2, 7));
    }
}
