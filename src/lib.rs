//! The Sous compiler.
//!
//! A program moves through four stages, each available on its own:
//!
//! 1. [`parse`] builds the syntax tree ([`frontend::ast`])
//! 2. [`analyze`] resolves names, checks types and lowers to the typed IR
//!    ([`middle::ir`])
//! 3. [`optimize`] simplifies the IR
//! 4. [`compile`] renders it for a [`Target`]
//!
//! Only the first two stages can fail. Every error carries the line and
//! column it was found at.

pub mod backend;
pub mod frontend;
pub mod index;
pub mod middle;

use thiserror::Error;

pub use backend::{CodeGenerator, CodegenOptions, Target};

use crate::{
    frontend::{Position, SourceFile, SyntaxError, ast, parser::Parser},
    middle::{analyzer::SemanticError, ir, optimization},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

impl CompileError {
    pub fn position(&self) -> Position {
        match self {
            CompileError::Syntax(error) => error.position,
            CompileError::Semantic(error) => error.position,
        }
    }
}

pub fn parse(source: &SourceFile) -> Result<ast::Program, CompileError> {
    Ok(Parser::parse_program(source)?)
}

pub fn analyze(source: &SourceFile) -> Result<ir::Program, CompileError> {
    let program = parse(source)?;

    Ok(middle::analyzer::analyze(source, &program)?)
}

pub fn optimize(source: &SourceFile) -> Result<ir::Program, CompileError> {
    let mut program = analyze(source)?;
    optimization::optimize(&mut program);

    Ok(program)
}

/// Runs every stage and returns the generated code
pub fn compile(
    source: &SourceFile,
    target: Target,
    options: &CodegenOptions,
) -> Result<String, CompileError> {
    let program = optimize(source)?;

    Ok(target.get_code_generator().generate(&program, options))
}
