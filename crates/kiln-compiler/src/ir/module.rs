//! The output of lowering one compilation unit
//!
//! Functions live in a flat table. A [`FunctionId`] is the index into that
//! table, so ids are dense and assigned in emission order.

use super::function::IrFunction;
use super::instr::FunctionId;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct IrModule {
    pub name: String,
    pub functions: Vec<IrFunction>,
    /// Runs the top-level statements of the unit
    pub entry: FunctionId,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            entry: FunctionId(0),
        }
    }

    /// Append `func` and return the id it now answers to
    pub fn add_function(&mut self, func: IrFunction) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(func);
        id
    }

    pub fn get_function(&self, id: FunctionId) -> Option<&IrFunction> {
        self.functions.get(id.0 as usize)
    }

    /// Lookup by name. Specializations carry their type arguments in the name
    /// (`id<number>`), so a generic and its instances never collide.
    pub fn get_function_by_name(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|func| func.name == name)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn functions(&self) -> impl Iterator<Item = &IrFunction> {
        self.functions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::IrFunctionKind;

    #[test]
    fn test_ids_follow_insertion_order() {
        let mut module = IrModule::new("main");
        let init = module.add_function(IrFunction::new(FunctionId(0), "main", IrFunctionKind::ModuleInit));
        let spec = module.add_function(IrFunction::new(FunctionId(1), "id<number>", IrFunctionKind::Normal));
        assert_eq!((init, spec), (FunctionId(0), FunctionId(1)));
        assert_eq!(module.get_function(spec).map(|f| f.name.as_str()), Some("id<number>"));
        assert!(module.get_function_by_name("id").is_none());
        assert_eq!(module.function_count(), 2);
    }
}
