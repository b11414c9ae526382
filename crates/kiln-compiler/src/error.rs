//! Compilation errors
//!
//! Every variant is a compiler-internal failure that aborts the module. Errors in the
//! program being compiled are not reported here: they are lowered into IR that throws at
//! run time, or reported as [`Diagnostic`](crate::diagnostics::Diagnostic)s.

use crate::ir::verify::VerifyError;
use crate::ir::BasicBlockId;
use kiln_syntax::{ScopeId, SyntaxError};
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("internal error in {function} at {block}: {message}")]
    InternalError {
        function: String,
        block: BasicBlockId,
        message: String,
    },

    #[error("internal error in {function}: block {block} referenced before it was sealed")]
    UnsealedBlock { function: String, block: BasicBlockId },

    #[error("internal error in {function}: edge {from} -> {to} added to a sealed block")]
    SealedBlockEdge {
        function: String,
        from: BasicBlockId,
        to: BasicBlockId,
    },

    #[error("internal error in {function}: block {block} has no terminator")]
    MissingTerminator { function: String, block: BasicBlockId },

    #[error("internal error in {function}: type key for '{decl}' did not converge after {fuel} steps")]
    TypeKeyDivergence {
        function: String,
        decl: String,
        fuel: usize,
    },

    #[error("internal error in {function}: binding '{name}' resolves to {scope}, which does not enclose the reference")]
    UnreachableScope {
        function: String,
        name: String,
        scope: ScopeId,
    },

    #[error("specialization cache already holds {name} from an earlier compilation of unit '{unit}'")]
    StaleSpecialization { unit: String, name: String },

    #[error("unsupported feature in {function}: {feature}")]
    UnsupportedFeature { function: String, feature: String },

    #[error("malformed input tree: {0}")]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl CompileError {
    /// Name of the function being compiled when the error was raised
    pub fn function(&self) -> Option<&str> {
        match self {
            CompileError::InternalError { function, .. }
            | CompileError::UnsealedBlock { function, .. }
            | CompileError::SealedBlockEdge { function, .. }
            | CompileError::MissingTerminator { function, .. }
            | CompileError::TypeKeyDivergence { function, .. }
            | CompileError::UnreachableScope { function, .. }
            | CompileError::UnsupportedFeature { function, .. } => Some(function),
            CompileError::Verify(err) => Some(err.function()),
            CompileError::StaleSpecialization { .. } | CompileError::Syntax(_) => None,
        }
    }
}
