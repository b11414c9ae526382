//! Specialization caches
//!
//! A cache maps (generic declaration, canonical type key) to the one specialization
//! built for it. Keys are bucketed by their structural hash and compared with
//! [`TypeKey::equivalent`] inside a bucket.

use super::type_key::{KeyDivergence, TypeKey};
use super::{GenericId, Specialization};
use crate::ir::IrFunction;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::sync::Arc;

type Bucket = Vec<(TypeKey, Arc<Specialization>)>;

fn find_in(bucket: &Bucket, key: &TypeKey, fuel: usize) -> Result<Option<Arc<Specialization>>, KeyDivergence> {
    for (existing, spec) in bucket {
        if existing.equivalent(key, fuel)? {
            return Ok(Some(spec.clone()));
        }
    }
    Ok(None)
}

/// Lookup and insert-if-absent over specializations
pub trait SpecializationCache {
    /// The specialization recorded for `key`, if any
    fn lookup(
        &mut self,
        generic: &GenericId,
        key: &TypeKey,
        fuel: usize,
    ) -> Result<Option<Arc<Specialization>>, KeyDivergence>;

    /// Record `spec` unless an equivalent key is already present.
    ///
    /// Returns the recorded specialization and whether it is the one just passed in.
    fn insert(
        &mut self,
        generic: GenericId,
        key: TypeKey,
        spec: Specialization,
        fuel: usize,
    ) -> Result<(Arc<Specialization>, bool), KeyDivergence>;

    /// Make the lowered body of `spec` available to other users of the cache
    fn publish(&mut self, _spec: &Arc<Specialization>, _body: Vec<IrFunction>) {}

    /// Number of specializations recorded
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache owned by a single compilation session
#[derive(Debug, Default)]
pub struct LocalSpecializationCache {
    buckets: FxHashMap<(GenericId, u64), Bucket>,
}

impl LocalSpecializationCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpecializationCache for LocalSpecializationCache {
    fn lookup(
        &mut self,
        generic: &GenericId,
        key: &TypeKey,
        fuel: usize,
    ) -> Result<Option<Arc<Specialization>>, KeyDivergence> {
        match self.buckets.get(&(generic.clone(), key.hash_value())) {
            Some(bucket) => find_in(bucket, key, fuel),
            None => Ok(None),
        }
    }

    fn insert(
        &mut self,
        generic: GenericId,
        key: TypeKey,
        spec: Specialization,
        fuel: usize,
    ) -> Result<(Arc<Specialization>, bool), KeyDivergence> {
        let bucket = self.buckets.entry((generic, key.hash_value())).or_default();
        if let Some(existing) = find_in(bucket, &key, fuel)? {
            return Ok((existing, false));
        }
        let spec = Arc::new(spec);
        bucket.push((key, spec.clone()));
        Ok((spec, true))
    }

    fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// Cache shared by concurrently compiling units.
///
/// Cloning shares the underlying map. Insertion is atomic per bucket, so two units
/// racing on one key agree on a single winner; published bodies are frozen behind an
/// `Arc` and never change afterwards.
#[derive(Debug, Clone, Default)]
pub struct SharedSpecializationCache {
    buckets: Arc<DashMap<(GenericId, u64), Bucket>>,
}

impl SharedSpecializationCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpecializationCache for SharedSpecializationCache {
    fn lookup(
        &mut self,
        generic: &GenericId,
        key: &TypeKey,
        fuel: usize,
    ) -> Result<Option<Arc<Specialization>>, KeyDivergence> {
        match self.buckets.get(&(generic.clone(), key.hash_value())) {
            Some(bucket) => find_in(&bucket, key, fuel),
            None => Ok(None),
        }
    }

    fn insert(
        &mut self,
        generic: GenericId,
        key: TypeKey,
        spec: Specialization,
        fuel: usize,
    ) -> Result<(Arc<Specialization>, bool), KeyDivergence> {
        let mut bucket = self.buckets.entry((generic, key.hash_value())).or_default();
        if let Some(existing) = find_in(&bucket, &key, fuel)? {
            return Ok((existing, false));
        }
        let spec = Arc::new(spec);
        bucket.push((key, spec.clone()));
        Ok((spec, true))
    }

    fn publish(&mut self, spec: &Arc<Specialization>, body: Vec<IrFunction>) {
        if !spec.freeze(body) {
            log::debug!("[mono] body of {} already published", spec.name);
        }
    }

    fn len(&self) -> usize {
        self.buckets.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::IrFunctionKind;
    use crate::ir::FunctionId;
    use crate::monomorphize::{GenericKind, SessionId};
    use kiln_syntax::{NodeId, TypeContext, TypeId};
    use std::thread;

    const FUEL: usize = 10_000;

    fn generic() -> GenericId {
        GenericId::new("main", 7, NodeId(4), GenericKind::Function)
    }

    fn spec(unit: &str, id: u32) -> Specialization {
        Specialization::function(unit, SessionId::fresh(), "id<number>", FunctionId(id))
    }

    #[test]
    fn test_local_insert_if_absent() {
        let types = TypeContext::new();
        let mut cache = LocalSpecializationCache::new();
        let key = TypeKey::new(&types, &[TypeId::NUMBER]);
        assert!(cache.lookup(&generic(), &key, FUEL).unwrap().is_none());

        let (first, inserted) = cache.insert(generic(), key.clone(), spec("main", 1), FUEL).unwrap();
        assert!(inserted);
        let (second, inserted) = cache.insert(generic(), key.clone(), spec("main", 2), FUEL).unwrap();
        assert!(!inserted);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.function, Some(FunctionId(1)));

        let found = cache.lookup(&generic(), &key, FUEL).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &found));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_declarations_do_not_collide() {
        let types = TypeContext::new();
        let mut cache = LocalSpecializationCache::new();
        let key = TypeKey::new(&types, &[TypeId::NUMBER]);
        let other = GenericId::new("main", 7, NodeId(9), GenericKind::Function);
        cache.insert(generic(), key.clone(), spec("main", 1), FUEL).unwrap();
        assert!(cache.lookup(&other, &key, FUEL).unwrap().is_none());
    }

    #[test]
    fn test_same_node_from_another_source_misses() {
        let types = TypeContext::new();
        let mut cache = SharedSpecializationCache::new();
        let key = TypeKey::new(&types, &[TypeId::NUMBER]);
        cache.insert(generic(), key.clone(), spec("unit-a", 1), FUEL).unwrap();
        let other_source = GenericId::new("main", 8, NodeId(4), GenericKind::Function);
        assert!(cache.lookup(&other_source, &key, FUEL).unwrap().is_none());
    }

    #[test]
    fn test_shared_cache_single_winner_across_threads() {
        let cache = SharedSpecializationCache::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let mut cache = cache.clone();
                thread::spawn(move || {
                    let types = TypeContext::new();
                    let key = TypeKey::new(&types, &[TypeId::STRING]);
                    let (winner, _) = cache
                        .insert(generic(), key, spec(&format!("unit{}", i), i), FUEL)
                        .unwrap();
                    winner.unit.clone()
                })
            })
            .collect();
        let units: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(units.iter().all(|u| u == &units[0]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shared_publish_freezes_body() {
        let types = TypeContext::new();
        let mut cache = SharedSpecializationCache::new();
        let key = TypeKey::new(&types, &[TypeId::NUMBER]);
        let (spec, _) = cache.insert(generic(), key, spec("main", 0), FUEL).unwrap();
        assert!(spec.body().is_none());

        let body = vec![IrFunction::new(FunctionId(0), "id<number>", IrFunctionKind::Normal)];
        cache.publish(&spec, body);
        assert_eq!(spec.body().map(|b| b.len()), Some(1));

        // A second publish leaves the frozen body alone
        cache.publish(&spec, Vec::new());
        assert_eq!(spec.body().map(|b| b.len()), Some(1));
    }
}
