//! Canonical type-argument keys
//!
//! A [`TypeKey`] is a self-contained structural snapshot of a type-argument tuple:
//! a graph of nodes (shape tag, label, children) with cycles kept as back-edges.
//! Keys built from different but isomorphic (or merely bisimilar) recursive types
//! hash equally and compare [`equivalent`](TypeKey::equivalent), so the
//! specialization cache can unify them. Union members carry no order of their own:
//! they hash as a multiset and are paired by structural hash.

use kiln_syntax::{Type, TypeContext, TypeId};
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};

/// Depth of the structural unfolding used for hashing
pub const TYPE_HASH_DEPTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyNode {
    tag: u8,
    label: String,
    children: Vec<usize>,
    /// Children form a set (union members)
    unordered: bool,
}

/// Equality check ran out of fuel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDivergence {
    pub fuel: usize,
}

/// Canonical structural key of a type-argument tuple
#[derive(Debug, Clone)]
pub struct TypeKey {
    nodes: Vec<KeyNode>,
    roots: Vec<usize>,
    hash: u64,
}

impl TypeKey {
    /// Snapshot `args` out of `types`
    pub fn new(types: &TypeContext, args: &[TypeId]) -> Self {
        let mut builder = KeyBuilder {
            types,
            nodes: Vec::new(),
            index: FxHashMap::default(),
        };
        let roots = args.iter().map(|arg| builder.node(*arg)).collect();
        let mut key = TypeKey {
            nodes: builder.nodes,
            roots,
            hash: 0,
        };
        key.canonicalize_unions();
        key.hash = key.structural_hash(TYPE_HASH_DEPTH);
        key
    }

    /// Reorder the members of every union by structural hash, so that isomorphic
    /// unions line up child by child whatever order their members were interned in
    fn canonicalize_unions(&mut self) {
        let mut memo = FxHashMap::default();
        for node in 0..self.nodes.len() {
            if !self.nodes[node].unordered {
                continue;
            }
            let mut members: Vec<(u64, usize)> = self.nodes[node]
                .children
                .iter()
                .map(|&child| (self.node_hash(child, TYPE_HASH_DEPTH, &mut memo), child))
                .collect();
            members.sort_unstable();
            self.nodes[node].children = members.into_iter().map(|(_, child)| child).collect();
        }
    }

    /// Number of type arguments
    pub fn arity(&self) -> usize {
        self.roots.len()
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// Hash of the tuple unfolded `depth` levels; cycles are unrolled, so bisimilar
    /// graphs hash equally
    fn structural_hash(&self, depth: usize) -> u64 {
        let mut memo: FxHashMap<(usize, usize), u64> = FxHashMap::default();
        let mut hasher = FxHasher::default();
        self.roots.len().hash(&mut hasher);
        for &root in &self.roots {
            self.node_hash(root, depth, &mut memo).hash(&mut hasher);
        }
        hasher.finish()
    }

    fn node_hash(&self, node: usize, depth: usize, memo: &mut FxHashMap<(usize, usize), u64>) -> u64 {
        if let Some(&h) = memo.get(&(node, depth)) {
            return h;
        }
        let n = &self.nodes[node];
        let mut hasher = FxHasher::default();
        n.tag.hash(&mut hasher);
        n.label.hash(&mut hasher);
        n.children.len().hash(&mut hasher);
        if depth > 0 {
            let mut children: Vec<u64> = n
                .children
                .iter()
                .map(|&child| self.node_hash(child, depth - 1, memo))
                .collect();
            if n.unordered {
                children.sort_unstable();
            }
            children.hash(&mut hasher);
        }
        let h = hasher.finish();
        memo.insert((node, depth), h);
        h
    }

    /// Coinductive structural equality.
    ///
    /// Pairs of nodes under comparison are assumed equal; a pair that recurs is
    /// accepted. Each newly assumed pair costs one unit of `fuel`.
    pub fn equivalent(&self, other: &TypeKey, fuel: usize) -> Result<bool, KeyDivergence> {
        if self.roots.len() != other.roots.len() {
            return Ok(false);
        }
        let mut assumed: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut worklist: Vec<(usize, usize)> = self
            .roots
            .iter()
            .copied()
            .zip(other.roots.iter().copied())
            .collect();
        let mut remaining = fuel;

        while let Some((a, b)) = worklist.pop() {
            if !assumed.insert((a, b)) {
                continue;
            }
            if remaining == 0 {
                return Err(KeyDivergence { fuel });
            }
            remaining -= 1;

            let (x, y) = (&self.nodes[a], &other.nodes[b]);
            if x.tag != y.tag || x.label != y.label || x.children.len() != y.children.len() {
                return Ok(false);
            }
            worklist.extend(x.children.iter().copied().zip(y.children.iter().copied()));
        }
        Ok(true)
    }
}

struct KeyBuilder<'a> {
    types: &'a TypeContext,
    nodes: Vec<KeyNode>,
    index: FxHashMap<TypeId, usize>,
}

impl KeyBuilder<'_> {
    /// Node for `id`, allocated in DFS preorder; revisits become back-edges
    fn node(&mut self, id: TypeId) -> usize {
        if let Some(&existing) = self.index.get(&id) {
            return existing;
        }
        let ty = self.types.ty(id);
        let slot = self.nodes.len();
        self.index.insert(id, slot);
        self.nodes.push(KeyNode {
            tag: ty.shape_tag(),
            label: label(ty),
            children: Vec::new(),
            unordered: matches!(ty, Type::Union(_)),
        });
        let children = ty.children().into_iter().map(|c| self.node(c)).collect();
        self.nodes[slot].children = children;
        slot
    }
}

fn label(ty: &Type) -> String {
    match ty {
        Type::TypeVar(var) => format!("{}@{}#{}", var.name, var.owner, var.index),
        Type::Object(props) => props
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(","),
        Type::Class { name, decl, .. } => format!("{}:{}", decl, name),
        Type::Placeholder(n) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_syntax::types::FunctionType;

    const FUEL: usize = 10_000;

    /// `type F = (x: number) => G; type G = () => F;`
    fn mutual(types: &mut TypeContext) -> TypeId {
        let f = types.placeholder();
        let g = types.placeholder();
        types.replace_type(
            f,
            Type::Function(FunctionType {
                params: vec![TypeId::NUMBER],
                ret: g,
            }),
        );
        types.replace_type(g, Type::Function(FunctionType { params: vec![], ret: f }));
        f
    }

    #[test]
    fn test_primitives() {
        let types = TypeContext::new();
        let a = TypeKey::new(&types, &[TypeId::NUMBER]);
        let b = TypeKey::new(&types, &[TypeId::NUMBER]);
        let c = TypeKey::new(&types, &[TypeId::STRING]);
        assert_eq!(a.hash_value(), b.hash_value());
        assert_eq!(a.equivalent(&b, FUEL), Ok(true));
        assert_eq!(a.equivalent(&c, FUEL), Ok(false));
        assert_eq!(a.arity(), 1);
    }

    #[test]
    fn test_isomorphic_recursive_definitions_unify() {
        let mut types = TypeContext::new();
        let first = mutual(&mut types);
        let second = mutual(&mut types);
        assert_ne!(first, second);

        let a = TypeKey::new(&types, &[first]);
        let b = TypeKey::new(&types, &[second]);
        assert_eq!(a.hash_value(), b.hash_value());
        assert_eq!(a.equivalent(&b, FUEL), Ok(true));
    }

    #[test]
    fn test_bisimilar_unrolling_unifies() {
        // A = () => A  and  B = () => () => B
        let mut types = TypeContext::new();
        let a = types.placeholder();
        types.replace_type(a, Type::Function(FunctionType { params: vec![], ret: a }));
        let b = types.placeholder();
        let inner = types.placeholder();
        types.replace_type(inner, Type::Function(FunctionType { params: vec![], ret: b }));
        types.replace_type(b, Type::Function(FunctionType { params: vec![], ret: inner }));

        let ka = TypeKey::new(&types, &[a]);
        let kb = TypeKey::new(&types, &[b]);
        assert_eq!(ka.hash_value(), kb.hash_value());
        assert_eq!(ka.equivalent(&kb, FUEL), Ok(true));
    }

    #[test]
    fn test_recursive_types_with_different_leaves_differ() {
        let mut types = TypeContext::new();
        let first = mutual(&mut types);
        let other = types.placeholder();
        types.replace_type(
            other,
            Type::Function(FunctionType {
                params: vec![TypeId::STRING],
                ret: other,
            }),
        );
        let a = TypeKey::new(&types, &[first]);
        let b = TypeKey::new(&types, &[other]);
        assert_eq!(a.equivalent(&b, FUEL), Ok(false));
    }

    #[test]
    fn test_fuel_exhaustion() {
        let mut types = TypeContext::new();
        let first = mutual(&mut types);
        let second = mutual(&mut types);
        let a = TypeKey::new(&types, &[first]);
        let b = TypeKey::new(&types, &[second]);
        assert_eq!(a.equivalent(&b, 1), Err(KeyDivergence { fuel: 1 }));
    }

    /// `type R = (x: string) => R`
    fn self_returning(types: &mut TypeContext) -> TypeId {
        let r = types.placeholder();
        types.replace_type(
            r,
            Type::Function(FunctionType {
                params: vec![TypeId::STRING],
                ret: r,
            }),
        );
        r
    }

    #[test]
    fn test_union_members_pair_by_structure() {
        let mut types = TypeContext::new();
        let a1 = mutual(&mut types);
        let b1 = self_returning(&mut types);
        let b2 = self_returning(&mut types);
        let a2 = mutual(&mut types);
        // Interned member order is [a1, b1] for the first union, [b2, a2] for the second
        let first = types.union_type(vec![a1, b1]);
        let second = types.union_type(vec![a2, b2]);
        assert_ne!(first, second);

        let ka = TypeKey::new(&types, &[first]);
        let kb = TypeKey::new(&types, &[second]);
        assert_eq!(ka.hash_value(), kb.hash_value());
        assert_eq!(ka.equivalent(&kb, FUEL), Ok(true));
    }

    #[test]
    fn test_unions_with_different_members_differ() {
        let mut types = TypeContext::new();
        let a = mutual(&mut types);
        let b = self_returning(&mut types);
        let first = types.union_type(vec![a, TypeId::NUMBER]);
        let second = types.union_type(vec![b, TypeId::NUMBER]);
        let ka = TypeKey::new(&types, &[first]);
        let kb = TypeKey::new(&types, &[second]);
        assert_eq!(ka.equivalent(&kb, FUEL), Ok(false));
    }

    #[test]
    fn test_tuple_order_matters() {
        let types = TypeContext::new();
        let a = TypeKey::new(&types, &[TypeId::NUMBER, TypeId::STRING]);
        let b = TypeKey::new(&types, &[TypeId::STRING, TypeId::NUMBER]);
        assert_eq!(a.equivalent(&b, FUEL), Ok(false));
    }
}
