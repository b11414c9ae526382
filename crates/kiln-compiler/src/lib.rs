//! Kiln Compiler - AST to CFG/SSA IR Lowering
//!
//! This crate lowers a resolved, type-annotated syntax tree into a control-flow graph
//! in SSA form: environment planning for captured bindings, TDZ checks, destructuring,
//! generator and async state machines, and monomorphization of generic code. A small
//! reference interpreter executes the resulting IR.

pub mod config;
pub mod diagnostics;
pub mod emitter;
pub mod env;
pub mod error;
pub mod generator;
pub mod interp;
pub mod ir;
pub mod lower;
pub mod monomorphize;

pub use config::{LowerOptions, PerIterationPolicy};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use emitter::{EmitOutput, IrEmitter};
pub use error::{CompileError, CompileResult};
pub use interp::{Completion, InterpError, Interpreter, Value};

// Re-export IR types for convenience
pub use ir::{
    BasicBlock, BasicBlockId, FunctionId, IrFunction, IrFunctionKind, IrInstr, IrModule, PrettyPrint, Register,
    Terminator,
};
pub use monomorphize::{LocalSpecializationCache, SharedSpecializationCache, SpecializationCache};

/// Parse, resolve and lower `source` in one step
pub fn compile_source(
    source: &str,
    options: LowerOptions,
    cache: &mut dyn SpecializationCache,
) -> CompileResult<EmitOutput> {
    let (module, tree, mut types) = kiln_syntax::parse_and_resolve(source)?;
    let mut emitter = IrEmitter::new(source, &tree, &mut types, options, cache);
    emitter.emit_module(&module)
}
