//! Temporal dead zone
//!
//! `let`, `const` and `class` bindings hold the empty sentinel from scope entry until
//! their declaration runs. Reads and assignments through such a binding check for the
//! sentinel at run time; the declaration itself initializes without a check.

use super::specialize::GenericDecl;
use super::Lowerer;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::error::CompileResult;
use crate::ir::{ErrorKind, IrInstr, Register};
use kiln_syntax::ast::{Identifier, Resolution};
use kiln_syntax::{BindingId, Span, TypeId};

impl<'s, 'a> Lowerer<'s, 'a> {
    /// Read an identifier reference
    pub(super) fn lower_identifier(&mut self, ident: &'a Identifier) -> CompileResult<Register> {
        match ident.resolution {
            Resolution::Binding(id) => {
                if let Some(generic) = self.generic_declaration(id) {
                    return self.generic_binding_reference(id, ident.span, generic, &[]);
                }
                self.read_binding(id, ident.span)
            }
            Resolution::Global | Resolution::Unresolved => {
                let dest = self.alloc_register(TypeId::ANY);
                self.emit(IrInstr::LoadGlobal {
                    dest,
                    name: ident.name.clone(),
                });
                Ok(dest)
            }
        }
    }

    /// Specialize the generic named by binding `id`. A `const` holding a generic
    /// function expression still has a dead zone before its declaration.
    pub(super) fn generic_binding_reference(
        &mut self,
        id: BindingId,
        span: Span,
        decl: GenericDecl<'a>,
        type_args: &[TypeId],
    ) -> CompileResult<Register> {
        if let GenericDecl::Bound { .. } = decl {
            self.read_binding(id, span)?;
        }
        self.specialized_reference(decl, type_args)
    }

    /// Read a binding, checking the sentinel if it has a dead zone
    pub(super) fn read_binding(&mut self, id: BindingId, span: Span) -> CompileResult<Register> {
        let value = self.load_binding(id)?;
        if !self.needs_tdz_check(id) {
            return Ok(value);
        }
        self.warn_if_always_in_tdz(id, span);
        if !self.session.options.tdz_checks {
            return Ok(value);
        }
        let dest = self.alloc_register(value.ty);
        let name = self.binding_name(id);
        log::trace!("[tdz] {}: check on read of '{}'", self.function_name(), name);
        self.emit(IrInstr::ThrowIfEmpty { dest, value, name });
        Ok(dest)
    }

    /// Assign through an identifier reference (not a declaration)
    pub(super) fn assign_identifier(&mut self, ident: &Identifier, value: Register) -> CompileResult<()> {
        match ident.resolution {
            Resolution::Binding(id) => self.assign_binding(id, ident.span, value),
            Resolution::Global | Resolution::Unresolved => {
                self.emit(IrInstr::StoreGlobal {
                    name: ident.name.clone(),
                    value,
                });
                Ok(())
            }
        }
    }

    fn assign_binding(&mut self, id: BindingId, span: Span, value: Register) -> CompileResult<()> {
        let (kind, name) = match self.session.tree.binding(id) {
            Some(b) => (b.kind, b.name.clone()),
            None => return self.store_binding(id, value),
        };

        if kind.has_tdz() {
            self.warn_if_always_in_tdz(id, span);
            if self.session.options.tdz_checks {
                let current = self.load_binding(id)?;
                let checked = self.alloc_register(current.ty);
                self.emit(IrInstr::ThrowIfEmpty {
                    dest: checked,
                    value: current,
                    name: name.clone(),
                });
            }
        }

        if kind.is_immutable() {
            let message = format!("Assignment to constant variable '{}'", name);
            let function = self.function_name();
            self.report(Diagnostic::error(
                DiagnosticCode::ConstAssignment,
                message.clone(),
                span,
                function,
            ));
            return self.throw_error(ErrorKind::TypeError, message);
        }

        self.store_binding(id, value)
    }

    fn needs_tdz_check(&self, id: BindingId) -> bool {
        self.session
            .tree
            .binding(id)
            .map(|b| b.kind.has_tdz())
            .unwrap_or(false)
    }

    /// Warn about a reference that textually precedes its declaration in the same
    /// function, outside any loop
    fn warn_if_always_in_tdz(&mut self, id: BindingId, span: Span) {
        if !self.session.options.warnings || self.loop_depth > 0 {
            return;
        }
        let binding = match self.session.tree.binding(id) {
            Some(b) => b,
            None => return,
        };
        let owner = self.session.tree.scope(binding.scope).map(|s| s.function);
        if owner != Some(self.function_node()) || span.start >= binding.span.start {
            return;
        }
        let message = format!("'{}' is used before its declaration and always throws", binding.name);
        let function = self.function_name();
        self.report(Diagnostic::warning(
            DiagnosticCode::TdzAlwaysThrows,
            message,
            span,
            function,
        ));
    }
}
