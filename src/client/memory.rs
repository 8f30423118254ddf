//! In-memory graph client.
//!
//! This is the reference implementation of `GraphClient`. It behaves like
//! the remote store as far as the history engine can observe: server-assigned
//! `ent_N` / `lnk_N` ids that are never reused, anchor validation on create
//! and patch, no triple-uniqueness enforcement on links.
//!
//! ## Limitations
//!
//! - **No persistence**: state lives as long as the last clone of the client.
//! - **Plain delete leaves links dangling**: use `detach_delete` to take the
//!   incident links with the entity, as the store's cascading delete does.
//!
//! Use this client for:
//! - Testing the history engine and session against a realistic store
//! - Fault injection (`fail_next`, `set_offline`) to exercise failure paths

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::model::*;
use crate::{Error, Result};
use super::{GraphClient, GraphListing};

// ============================================================================
// MemoryClient
// ============================================================================

/// In-memory annotation graph store. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryClient {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    /// id → (creation sequence, entity)
    entities: RwLock<HashMap<EntityId, (u64, Entity)>>,
    links: RwLock<HashMap<LinkId, (u64, Link)>>,
    next_entity: AtomicU64,
    next_link: AtomicU64,
    /// Number of upcoming requests that fail with `Error::Network`.
    fail_next: AtomicUsize,
    /// Absolute request number that fails once; 0 when unset.
    fail_at: AtomicU64,
    offline: AtomicBool,
    requests: AtomicU64,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` requests fail with a network error.
    pub fn fail_next(&self, n: usize) {
        self.inner.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make only the `k`-th request from now (1-based) fail.
    pub fn fail_nth(&self, k: u64) {
        let target = self.inner.requests.load(Ordering::SeqCst) + k;
        self.inner.fail_at.store(target, Ordering::SeqCst);
    }

    /// While offline every request fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Total requests received, including failed ones.
    pub fn request_count(&self) -> u64 {
        self.inner.requests.load(Ordering::SeqCst)
    }

    pub fn entity_count(&self) -> usize {
        self.inner.entities.read().len()
    }

    pub fn link_count(&self) -> usize {
        self.inner.links.read().len()
    }

    /// Direct read, bypassing fault injection.
    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        self.inner.entities.read().get(id).map(|(_, e)| e.clone())
    }

    fn admit(&self, op: &str) -> Result<()> {
        let seq = self.inner.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .inner
            .fail_at
            .compare_exchange(seq, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return Err(Error::Network(format!("{op}: request failed")));
        }
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{op}: store unreachable")));
        }
        let failed = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::Network(format!("{op}: request failed")));
        }
        Ok(())
    }
}

// ============================================================================
// GraphClient impl
// ============================================================================

#[async_trait]
impl GraphClient for MemoryClient {
    async fn create(&self, draft: EntityDraft) -> Result<Entity> {
        self.admit("create")?;
        draft.validate()?;

        let seq = self.inner.next_entity.fetch_add(1, Ordering::SeqCst) + 1;
        let entity = Entity {
            id: EntityId(format!("ent_{seq}")),
            sheet: draft.sheet,
            bbox: draft.bbox,
            created_at: Utc::now(),
            flags: draft.flags,
            kind: draft.kind,
        };
        self.inner
            .entities
            .write()
            .insert(entity.id.clone(), (seq, entity.clone()));
        Ok(entity)
    }

    async fn patch(&self, id: &EntityId, patch: &EntityPatch) -> Result<Entity> {
        self.admit("patch")?;
        let mut entities = self.inner.entities.write();
        let (_, entity) = entities
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Entity {id}")))?;
        entity.apply(patch)?;
        Ok(entity.clone())
    }

    async fn delete(&self, id: &EntityId) -> Result<bool> {
        self.admit("delete")?;
        Ok(self.inner.entities.write().remove(id).is_some())
    }

    /// Single-request cascade, like the store's own delete endpoint.
    async fn detach_delete(&self, id: &EntityId) -> Result<bool> {
        self.admit("delete")?;
        self.inner.links.write().retain(|_, (_, l)| !l.spec.touches(id));
        Ok(self.inner.entities.write().remove(id).is_some())
    }

    async fn create_link(&self, spec: &LinkSpec) -> Result<Link> {
        self.admit("create_link")?;
        if spec.source == spec.target {
            return Err(Error::Validation(format!("self-referencing link {spec}")));
        }
        {
            let entities = self.inner.entities.read();
            if !entities.contains_key(&spec.source) {
                return Err(Error::Validation(format!("source_id not found: {}", spec.source)));
            }
            if !entities.contains_key(&spec.target) {
                return Err(Error::Validation(format!("target_id not found: {}", spec.target)));
            }
        }

        let seq = self.inner.next_link.fetch_add(1, Ordering::SeqCst) + 1;
        let link = Link {
            id: LinkId(format!("lnk_{seq}")),
            spec: spec.clone(),
            created_at: Utc::now(),
        };
        self.inner.links.write().insert(link.id.clone(), (seq, link.clone()));
        Ok(link)
    }

    async fn delete_link(&self, id: &LinkId) -> Result<bool> {
        self.admit("delete_link")?;
        Ok(self.inner.links.write().remove(id).is_some())
    }

    async fn list(&self) -> Result<GraphListing> {
        self.admit("list")?;

        let mut entities: Vec<(u64, Entity)> =
            self.inner.entities.read().values().cloned().collect();
        entities.sort_by_key(|(seq, _)| *seq);

        let mut links: Vec<(u64, Link)> = self.inner.links.read().values().cloned().collect();
        links.sort_by_key(|(seq, _)| *seq);

        Ok(GraphListing {
            entities: entities.into_iter().map(|(_, e)| e).collect(),
            links: links.into_iter().map(|(_, l)| l).collect(),
        })
    }
}
