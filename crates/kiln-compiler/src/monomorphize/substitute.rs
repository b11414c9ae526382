//! Type substitution applied while lowering a specialized body

use kiln_syntax::types::TypeSubstitutionMap;
use kiln_syntax::{TypeContext, TypeId};

/// Type-parameter bindings active while lowering one function body
#[derive(Debug, Clone, Default)]
pub struct TypeSubstitution {
    map: TypeSubstitutionMap,
}

impl TypeSubstitution {
    /// The identity substitution
    pub fn identity() -> Self {
        Self::default()
    }

    /// Bind `vars[i]` to `args[i]`; missing arguments default to `any`
    pub fn new(vars: &[TypeId], args: &[TypeId]) -> Self {
        let map = vars
            .iter()
            .enumerate()
            .map(|(i, v)| (*v, args.get(i).copied().unwrap_or(TypeId::ANY)))
            .collect();
        Self { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, var: TypeId) -> Option<TypeId> {
        self.map.get(&var).copied()
    }

    /// Substitute through `ty`
    pub fn apply(&self, types: &mut TypeContext, ty: TypeId) -> TypeId {
        if self.map.is_empty() {
            return ty;
        }
        types.substitute(ty, &self.map)
    }

    pub fn apply_all(&self, types: &mut TypeContext, tys: &[TypeId]) -> Vec<TypeId> {
        tys.iter().map(|t| self.apply(types, *t)).collect()
    }
}

/// `name<arg,...>` using the display form of each argument
pub fn mangle_name(types: &TypeContext, name: &str, args: &[TypeId]) -> String {
    let args: Vec<String> = args.iter().map(|a| types.display(*a)).collect();
    format!("{}<{}>", name, args.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_substitutes_type_vars() {
        let mut types = TypeContext::new();
        let t = types.type_variable("T", 3, 0);
        let array_t = types.array_type(t);
        let subst = TypeSubstitution::new(&[t], &[TypeId::NUMBER]);

        let applied = subst.apply(&mut types, array_t);
        assert_eq!(applied, types.array_type(TypeId::NUMBER));
        assert_eq!(subst.apply(&mut types, TypeId::STRING), TypeId::STRING);
    }


    #[test]
    fn test_missing_arguments_are_any() {
        let mut types = TypeContext::new();
        let t = types.type_variable("T", 1, 0);
        let u = types.type_variable("U", 9, 1);
        let subst = TypeSubstitution::new(&[t, u], &[TypeId::NUMBER]);
        assert_eq!(subst.get(t), Some(TypeId::NUMBER));
        assert_eq!(subst.apply(&mut types, u), TypeId::ANY);
    }

    #[test]
    fn test_mangle_name() {
        let types = TypeContext::new();
        assert_eq!(
            mangle_name(&types, "pair", &[TypeId::NUMBER, TypeId::STRING]),
            "pair<number,string>"
        );
    }
}
