//! Declaration index
//!
//! Maps function and class declaration nodes to their AST, together with the type
//! variables of the generic declarations that enclose them. Generic specialization
//! looks declarations up here when a call site names them through a binding.

use kiln_syntax::ast::visitor::{walk_class, walk_function, Visitor};
use kiln_syntax::ast::{Class, Function, Module};
use kiln_syntax::{NodeId, TypeId};
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct AstIndex<'a> {
    functions: FxHashMap<NodeId, &'a Function>,
    classes: FxHashMap<NodeId, &'a Class>,
    enclosing: FxHashMap<NodeId, Vec<TypeId>>,
}

impl<'a> AstIndex<'a> {
    pub fn build(module: &'a Module) -> Self {
        let mut builder = IndexBuilder {
            index: AstIndex::default(),
            type_vars: Vec::new(),
        };
        for stmt in &module.body {
            builder.visit_statement(stmt);
        }
        builder.index
    }

    pub fn function(&self, id: NodeId) -> Option<&'a Function> {
        self.functions.get(&id).copied()
    }

    pub fn class(&self, id: NodeId) -> Option<&'a Class> {
        self.classes.get(&id).copied()
    }

    /// Type variables of the generic declarations enclosing `id`, outermost first
    pub fn enclosing_type_vars(&self, id: NodeId) -> &[TypeId] {
        self.enclosing.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

struct IndexBuilder<'a> {
    index: AstIndex<'a>,
    type_vars: Vec<TypeId>,
}

impl<'a> Visitor<'a> for IndexBuilder<'a> {
    fn visit_function(&mut self, func: &'a Function) {
        self.index.functions.insert(func.id, func);
        self.index.enclosing.insert(func.id, self.type_vars.clone());
        let depth = self.type_vars.len();
        self.type_vars.extend(func.type_params.iter().map(|p| p.ty));
        walk_function(self, func);
        self.type_vars.truncate(depth);
    }

    fn visit_class(&mut self, class: &'a Class) {
        self.index.classes.insert(class.id, class);
        self.index.enclosing.insert(class.id, self.type_vars.clone());
        let depth = self.type_vars.len();
        self.type_vars.extend(class.type_params.iter().map(|p| p.ty));
        walk_class(self, class);
        self.type_vars.truncate(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_syntax::parse_and_resolve;

    #[test]
    fn test_indexes_nested_declarations() {
        let (module, _tree, _types) = parse_and_resolve(
            "function outer<T>(x: T) { function inner<U>(y: U) { return y; } return inner(x); }\n\
             class Box<V> { constructor(v: V) { this.v = v; } get() { return this.v; } }",
        )
        .unwrap();
        let index = AstIndex::build(&module);

        let outer = module.body.iter().find_map(|s| match s {
            kiln_syntax::ast::Statement::FunctionDecl(f) => Some(f.as_ref()),
            _ => None,
        });
        let outer = outer.unwrap();
        assert!(index.function(outer.id).is_some());
        assert!(index.enclosing_type_vars(outer.id).is_empty());

        let inner = match &outer.body {
            kiln_syntax::ast::FunctionBody::Block(body) => body.iter().find_map(|s| match s {
                kiln_syntax::ast::Statement::FunctionDecl(f) => Some(f.as_ref()),
                _ => None,
            }),
            _ => None,
        }
        .unwrap();
        assert_eq!(index.enclosing_type_vars(inner.id), &[outer.type_params[0].ty]);

        let class = module.body.iter().find_map(|s| match s {
            kiln_syntax::ast::Statement::ClassDecl(c) => Some(c.as_ref()),
            _ => None,
        });
        let class = class.unwrap();
        assert!(index.class(class.id).is_some());
        let ctor = class.constructor.as_ref().unwrap();
        assert_eq!(index.enclosing_type_vars(ctor.id), &[class.type_params[0].ty]);
    }
}
