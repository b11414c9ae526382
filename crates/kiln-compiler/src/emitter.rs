//! IR Emitter
//!
//! Entry point of the pipeline. [`IrEmitter::emit_module`] plans storage for the
//! module, reports declaration conflicts, then drains the lowering queue: the module
//! body first, then every closure body and specialization in the order they were
//! reached. Each lowered function is verified before it is added to the module.

use crate::config::LowerOptions;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::env::EnvironmentPlan;
use crate::error::{CompileError, CompileResult};
use crate::ir::{verify_function, BasicBlockId, IrFunction, IrModule};
use crate::lower::{lower_job, AstIndex, Job, JobTarget, Session};
use crate::monomorphize::{source_fingerprint, SpecializationCache, TypeSubstitution};
use kiln_syntax::ast::Module;
use kiln_syntax::{BindingKind, NodeId, ScopeTree, TypeContext};
use rustc_hash::FxHashMap;

/// Result of lowering one module
#[derive(Debug)]
pub struct EmitOutput {
    pub module: IrModule,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lowers modules against one scope table and specialization cache
pub struct IrEmitter<'c> {
    tree: &'c ScopeTree,
    types: &'c mut TypeContext,
    options: LowerOptions,
    cache: &'c mut dyn SpecializationCache,
    /// Fingerprint of the source the tree was resolved from
    source: u64,
}

impl<'c> IrEmitter<'c> {
    /// `source` is the text `tree` was resolved from; it identifies the module's
    /// generic declarations in `cache`
    pub fn new(
        source: &str,
        tree: &'c ScopeTree,
        types: &'c mut TypeContext,
        options: LowerOptions,
        cache: &'c mut dyn SpecializationCache,
    ) -> Self {
        Self {
            tree,
            types,
            options,
            cache,
            source: source_fingerprint(source),
        }
    }

    pub fn options(&self) -> &LowerOptions {
        &self.options
    }

    /// Lower `module` into an [`IrModule`] named after the configured module name
    pub fn emit_module(&mut self, module: &Module) -> CompileResult<EmitOutput> {
        let plan = EnvironmentPlan::build(self.tree, module, &self.options)?;
        let index = AstIndex::build(module);
        let mut diagnostics = declaration_conflicts(self.tree, &index, &self.options.module_name);

        let mut session = Session::new(
            self.tree,
            &mut *self.types,
            &self.options,
            &plan,
            &index,
            &mut *self.cache,
            self.source,
        );
        let entry = session.reserve_function();
        session.push_job(Job {
            id: entry,
            name: self.options.module_name.clone(),
            target: JobTarget::Module(module),
            subst: TypeSubstitution::identity(),
            owner: None,
        });

        let mut functions: Vec<IrFunction> = Vec::new();
        while let Some(job) = session.next_job() {
            for func in lower_job(&mut session, job)? {
                if self.options.verify {
                    verify_function(&func)?;
                }
                functions.push(func);
            }
        }
        diagnostics.extend(session.take_diagnostics());
        let owned = session.take_owned();
        let reserved = session.function_count();
        drop(session);

        functions.sort_by_key(|f| f.id);
        if let Some((position, func)) = functions
            .iter()
            .enumerate()
            .find(|(i, f)| f.id.as_u32() != *i as u32)
        {
            return Err(CompileError::InternalError {
                function: func.name.clone(),
                block: BasicBlockId(0),
                message: format!("function id {} lowered at position {}", func.id, position),
            });
        }
        if functions.len() as u32 != reserved {
            return Err(CompileError::InternalError {
                function: self.options.module_name.clone(),
                block: BasicBlockId(0),
                message: format!("{} ids reserved, {} functions lowered", reserved, functions.len()),
            });
        }

        for (spec, ids) in owned {
            let body: Vec<IrFunction> = functions.iter().filter(|f| ids.contains(&f.id)).cloned().collect();
            self.cache.publish(&spec, body);
        }

        let mut ir = IrModule::new(self.options.module_name.clone());
        ir.entry = entry;
        for func in functions {
            ir.add_function(func);
        }
        log::debug!(
            "[emit] {}: {} functions, {} diagnostics",
            ir.name,
            ir.function_count(),
            diagnostics.len()
        );
        Ok(EmitOutput {
            module: ir,
            diagnostics,
        })
    }
}

/// Report same-scope conflicts involving a lexical declaration
fn declaration_conflicts(tree: &ScopeTree, index: &AstIndex<'_>, module_name: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for scope in tree.scopes() {
        let mut seen: FxHashMap<&str, BindingKind> = FxHashMap::default();
        for id in &scope.bindings {
            let binding = match tree.binding(*id) {
                Some(binding) if binding.kind != BindingKind::This => binding,
                _ => continue,
            };
            match seen.get(binding.name.as_str()) {
                Some(previous) if previous.is_lexical() || binding.kind.is_lexical() => {
                    let function = if scope.function == NodeId::MODULE {
                        module_name.to_string()
                    } else {
                        index
                            .function(scope.function)
                            .map(|f| f.display_name().to_string())
                            .unwrap_or_else(|| module_name.to_string())
                    };
                    diagnostics.push(Diagnostic::error(
                        DiagnosticCode::DuplicateDeclaration,
                        format!("Identifier '{}' has already been declared", binding.name),
                        binding.span,
                        function,
                    ));
                }
                Some(_) => {}
                None => {
                    seen.insert(binding.name.as_str(), binding.kind);
                }
            }
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monomorphize::LocalSpecializationCache;
    use kiln_syntax::parse_and_resolve;

    fn emit(source: &str) -> EmitOutput {
        let (module, tree, mut types) = parse_and_resolve(source).unwrap();
        let mut cache = LocalSpecializationCache::new();
        let mut emitter = IrEmitter::new(source, &tree, &mut types, LowerOptions::default(), &mut cache);
        emitter.emit_module(&module).unwrap()
    }

    #[test]
    fn test_module_function_is_entry() {
        let output = emit("let x = 1;");
        assert_eq!(output.module.entry.as_u32(), 0);
        assert_eq!(output.module.functions[0].name, "main");
    }

    #[test]
    fn test_function_ids_are_dense() {
        let output = emit("function f() { return () => 1; } function g() {}");
        for (i, func) in output.module.functions.iter().enumerate() {
            assert_eq!(func.id.as_u32(), i as u32);
        }
        assert_eq!(output.module.function_count(), 4);
    }

    #[test]
    fn test_duplicate_let_is_reported() {
        let output = emit("let a = 1; let a = 2;");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code, DiagnosticCode::DuplicateDeclaration);
    }

    #[test]
    fn test_var_redeclaration_is_allowed() {
        let output = emit("var a = 1; var a = 2;");
        assert!(output.diagnostics.is_empty());
    }
}
