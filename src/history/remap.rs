//! Identity remapping across delete/recreate cycles.
//!
//! The store assigns a fresh id every time an entity is recreated. Every id
//! the table learns about is interned to a stable [`EntityKey`], and the
//! table keeps one current server id per key. Resolving any id that ever
//! belonged to the logical entity, original or intermediate, is one lookup.

use hashbrown::HashMap;

use crate::model::{EntityId, LinkSpec};

/// Stable internal handle for one logical entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(usize);

#[derive(Debug, Clone, Default)]
pub struct IdRemap {
    keys: HashMap<EntityId, EntityKey>,
    /// key → current server id
    current: Vec<EntityId>,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent server id for `id`, or `id` itself if never rebound.
    pub fn resolve(&self, id: &EntityId) -> EntityId {
        match self.keys.get(id) {
            Some(key) => self.current[key.0].clone(),
            None => id.clone(),
        }
    }

    /// Record that the entity known as `original` now lives at `current`.
    /// Last write wins.
    pub fn bind(&mut self, original: &EntityId, current: EntityId) {
        let key = match self.keys.get(original) {
            Some(key) => *key,
            None => {
                let key = EntityKey(self.current.len());
                self.current.push(original.clone());
                self.keys.insert(original.clone(), key);
                key
            }
        };
        self.current[key.0] = current.clone();
        self.keys.insert(current, key);
    }

    pub fn key_of(&self, id: &EntityId) -> Option<EntityKey> {
        self.keys.get(id).copied()
    }

    /// Both endpoints resolved.
    pub fn resolve_spec(&self, spec: &LinkSpec) -> LinkSpec {
        LinkSpec {
            rel_type: spec.rel_type,
            source: self.resolve(&spec.source),
            target: self.resolve(&spec.target),
        }
    }

    /// Number of logical entities that were ever rebound.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}
