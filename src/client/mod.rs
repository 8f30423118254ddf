//! # Remote Graph Client
//!
//! This is THE contract between annograph and the remote graph store that
//! owns entities and links. Every request the history engine and the session
//! issue goes through it.
//!
//! ## Implementations
//!
//! | Client | Module | Description |
//! |--------|--------|-------------|
//! | `MemoryClient` | `memory` | In-memory store for testing/embedding |
//!
//! A network transport implements the same trait; timeouts and transport
//! failures surface as `Error::Network`.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::Result;

pub use memory::MemoryClient;

// ============================================================================
// Listing
// ============================================================================

/// Everything the store holds, as returned by a full refetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphListing {
    pub entities: Vec<Entity>,
    pub links: Vec<Link>,
}

// ============================================================================
// GraphClient Trait
// ============================================================================

/// The remote store contract.
///
/// Deletes report whether the target existed instead of failing on a
/// missing id: history entries may reference state that drifted
/// independently, so the caller decides whether absence matters.
#[async_trait]
pub trait GraphClient: Send + Sync + 'static {
    // ========================================================================
    // Entity CRUD
    // ========================================================================

    /// Create an entity. The store assigns the id and timestamp.
    async fn create(&self, draft: EntityDraft) -> Result<Entity>;

    /// Patch fields of an entity. `Error::NotFound` if it does not exist.
    async fn patch(&self, id: &EntityId, patch: &EntityPatch) -> Result<Entity>;

    /// Delete an entity. Returns true if it existed.
    async fn delete(&self, id: &EntityId) -> Result<bool>;

    /// Delete an entity and every link touching it.
    ///
    /// Default: list matching links, delete each, then delete the entity.
    async fn detach_delete(&self, id: &EntityId) -> Result<bool> {
        let listing = self.list().await?;
        for link in listing.links.iter().filter(|l| l.spec.touches(id)) {
            self.delete_link(&link.id).await?;
        }
        self.delete(id).await
    }

    // ========================================================================
    // Link CRUD
    // ========================================================================

    /// Create a link. The store does not enforce triple uniqueness.
    async fn create_link(&self, spec: &LinkSpec) -> Result<Link>;

    /// Delete a link. Returns true if it existed.
    async fn delete_link(&self, id: &LinkId) -> Result<bool>;

    // ========================================================================
    // Fetch
    // ========================================================================

    /// Full refetch of entities and links.
    async fn list(&self) -> Result<GraphListing>;
}
