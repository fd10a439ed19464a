//! A compiler for a small expression language targeting x86-64.
//!
//! The pipeline is organized as the classic sequence of phases:
//!
//! - [`lexer`], producing a [`token`] stream;
//! - [`parser`], producing an untyped [`ast`];
//! - [`type_checker`], mapping it into a typed tree;
//! - [`ir_generator`], flattening it into [`ir`] instructions;
//! - [`codegen`], emitting AT&T assembly.
//!
//! [`interpreter`] evaluates the typed tree directly and produces the same
//! observable output as the compiled program, which makes it a convenient
//! oracle for differential testing.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod interpreter;
pub mod ir;
pub mod ir_generator;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod token;
pub mod type_checker;
pub mod types;

pub mod util {
    pub mod fmt;
}

use error::Result;

/// Compiles a source string down to an assembly listing.
pub fn compile(src: &str) -> Result<String> {
    let tokens = lexer::lex(src)?;
    let module = parser::parse(&tokens)?;
    let module = type_checker::check_module(module)?;
    let functions = ir_generator::generate(&module)?;
    codegen::generate_assembly(&functions)
}
