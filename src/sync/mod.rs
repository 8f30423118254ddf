//! # Snapshot synchronization
//!
//! `SyncedGraph` wraps a `GraphClient` and owns the session's view of the
//! remote graph. The view is replaced wholesale by `refresh()` after every
//! mutating operation; between a mutation and the next refresh it is patched
//! locally so that multi-step operations (several links in one command) see
//! their own writes.
//!
//! Deletes here are idempotent and link creation never duplicates an
//! existing `(type, source, target)` triple.

use tracing::debug;

use crate::client::{GraphClient, GraphListing};
use crate::model::*;
use crate::Result;

// ============================================================================
// LinkFilter
// ============================================================================

/// Optional filters for link queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFilter {
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
    pub rel_type: Option<RelType>,
}

impl LinkFilter {
    pub fn matches(&self, link: &Link) -> bool {
        self.source.as_ref().is_none_or(|s| &link.spec.source == s)
            && self.target.as_ref().is_none_or(|t| &link.spec.target == t)
            && self.rel_type.is_none_or(|r| link.spec.rel_type == r)
    }
}

impl From<&LinkSpec> for LinkFilter {
    /// A filter matching exactly this triple.
    fn from(spec: &LinkSpec) -> Self {
        Self {
            source: Some(spec.source.clone()),
            target: Some(spec.target.clone()),
            rel_type: Some(spec.rel_type),
        }
    }
}

// ============================================================================
// GraphSnapshot
// ============================================================================

/// The last refetched entity and link sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    entities: Vec<Entity>,
    links: Vec<Link>,
}

impl GraphSnapshot {
    pub fn from_listing(listing: GraphListing) -> Self {
        Self { entities: listing.entities, links: listing.links }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| &e.id == id)
    }

    pub fn link(&self, id: &LinkId) -> Option<&Link> {
        self.links.iter().find(|l| &l.id == id)
    }

    pub fn links_matching<'a>(&'a self, filter: &'a LinkFilter) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| filter.matches(l))
    }

    /// First link carrying this exact triple.
    pub fn find_link(&self, spec: &LinkSpec) -> Option<&Link> {
        let filter = LinkFilter::from(spec);
        self.links.iter().find(|l| filter.matches(l))
    }

    pub fn links_touching<'a>(&'a self, id: &'a EntityId) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.spec.touches(id))
    }

    /// Entities drawn on `sheet`, with their document-space boxes.
    pub fn anchored_on(&self, sheet: u32) -> impl Iterator<Item = (&EntityId, Rect)> + '_ {
        self.entities
            .iter()
            .filter(move |e| e.is_on_sheet(sheet))
            .filter_map(|e| e.bbox.map(|r| (&e.id, r)))
    }

    fn upsert_entity(&mut self, entity: Entity) {
        match self.entities.iter_mut().find(|e| e.id == entity.id) {
            Some(slot) => *slot = entity,
            None => self.entities.push(entity),
        }
    }

    fn remove_entity(&mut self, id: &EntityId) {
        self.entities.retain(|e| &e.id != id);
        self.links.retain(|l| !l.spec.touches(id));
    }
}

// ============================================================================
// SyncedGraph
// ============================================================================

/// A graph client paired with the snapshot it keeps current.
pub struct SyncedGraph<C: GraphClient> {
    client: C,
    snapshot: GraphSnapshot,
    revision: u64,
}

impl<C: GraphClient> SyncedGraph<C> {
    /// Wrap a client. The snapshot starts empty until the first `refresh()`.
    pub fn new(client: C) -> Self {
        Self { client, snapshot: GraphSnapshot::default(), revision: 0 }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn snapshot(&self) -> &GraphSnapshot {
        &self.snapshot
    }

    /// Number of completed refetches.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the snapshot with a full refetch.
    pub async fn refresh(&mut self) -> Result<()> {
        let listing = self.client.list().await?;
        self.snapshot = GraphSnapshot::from_listing(listing);
        self.revision += 1;
        debug!(
            revision = self.revision,
            entities = self.snapshot.entities.len(),
            links = self.snapshot.links.len(),
            "snapshot refreshed"
        );
        Ok(())
    }

    pub async fn create_entity(&mut self, draft: EntityDraft) -> Result<Entity> {
        let entity = self.client.create(draft).await?;
        debug!(id = %entity.id, kind = %entity.entity_type(), "entity created");
        self.snapshot.upsert_entity(entity.clone());
        Ok(entity)
    }

    pub async fn patch_entity(&mut self, id: &EntityId, patch: &EntityPatch) -> Result<Entity> {
        let entity = self.client.patch(id, patch).await?;
        debug!(%id, fields = patch.fields.len(), "entity patched");
        self.snapshot.upsert_entity(entity.clone());
        Ok(entity)
    }

    /// Delete an entity together with its incident links. Returns false if
    /// it was already gone.
    pub async fn delete_entity(&mut self, id: &EntityId) -> Result<bool> {
        let existed = self.client.detach_delete(id).await?;
        if existed {
            debug!(%id, "entity deleted");
        } else {
            debug!(%id, "entity already absent, delete is a no-op");
        }
        self.snapshot.remove_entity(id);
        Ok(existed)
    }

    /// Return the link carrying `spec`, creating it only if the snapshot has
    /// no such triple.
    pub async fn ensure_link(&mut self, spec: &LinkSpec) -> Result<Link> {
        if let Some(existing) = self.snapshot.find_link(spec) {
            debug!(link = %existing.id, %spec, "link already present, not duplicating");
            return Ok(existing.clone());
        }
        let link = self.client.create_link(spec).await?;
        debug!(link = %link.id, %spec, "link created");
        self.snapshot.links.push(link.clone());
        Ok(link)
    }

    /// Remove the link carrying `spec`: by `known_id` if the snapshot still
    /// has it, otherwise by triple lookup. Returns false if nothing matched.
    pub async fn remove_link(&mut self, spec: &LinkSpec, known_id: Option<&LinkId>) -> Result<bool> {
        let target = known_id
            .and_then(|id| self.snapshot.link(id))
            .or_else(|| self.snapshot.find_link(spec))
            .map(|l| l.id.clone());

        let Some(id) = target else {
            debug!(%spec, "link already absent, delete is a no-op");
            return Ok(false);
        };

        let existed = self.client.delete_link(&id).await?;
        debug!(link = %id, %spec, existed, "link deleted");
        self.snapshot.links.retain(|l| l.id != id);
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryClient;

    /// A scope and a note in the store, plus the link spec joining them.
    async fn scoped_note(client: &MemoryClient) -> LinkSpec {
        let scope = client.create(EntityDraft::new(EntityKind::scope("HVAC", "ducts"))).await.unwrap();
        let note = client
            .create(
                EntityDraft::new(EntityKind::note("n"))
                    .on_sheet(1, Rect::new(0.0, 0.0, 1.0, 1.0).unwrap()),
            )
            .await
            .unwrap();
        LinkSpec::new(RelType::JustifiedBy, scope.id, note.id)
    }

    #[tokio::test]
    async fn test_ensure_link_does_not_duplicate() {
        let client = MemoryClient::new();
        let spec = scoped_note(&client).await;
        let mut graph = SyncedGraph::new(client.clone());

        let a = graph.ensure_link(&spec).await.unwrap();
        let b = graph.ensure_link(&spec).await.unwrap();
        graph.refresh().await.unwrap();
        let c = graph.ensure_link(&spec).await.unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(a.id, c.id);
        assert_eq!(client.link_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_link_falls_back_to_triple() {
        let client = MemoryClient::new();
        let spec = scoped_note(&client).await;
        let mut graph = SyncedGraph::new(client.clone());
        graph.ensure_link(&spec).await.unwrap();

        let stale = LinkId::new("lnk_999");
        assert!(graph.remove_link(&spec, Some(&stale)).await.unwrap());
        assert_eq!(client.link_count(), 0);
        assert!(!graph.remove_link(&spec, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_links_matching_filters_each_field() {
        let client = MemoryClient::new();
        let spec = scoped_note(&client).await;
        let mut graph = SyncedGraph::new(client.clone());
        graph.ensure_link(&spec).await.unwrap();

        let by_target = LinkFilter { target: Some(spec.target.clone()), ..LinkFilter::default() };
        assert_eq!(graph.snapshot().links_matching(&by_target).count(), 1);

        let wrong_type = LinkFilter { rel_type: Some(RelType::Depicts), ..LinkFilter::from(&spec) };
        assert_eq!(graph.snapshot().links_matching(&wrong_type).count(), 0);

        let reversed = LinkFilter { source: Some(spec.target.clone()), ..LinkFilter::default() };
        assert_eq!(graph.snapshot().links_matching(&reversed).count(), 0);
        assert!(graph.snapshot().find_link(&spec).is_some());
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let client = MemoryClient::new();
        let mut graph = SyncedGraph::new(client.clone());
        client
            .create(
                EntityDraft::new(EntityKind::note("n"))
                    .on_sheet(2, Rect::new(0.0, 0.0, 1.0, 1.0).unwrap()),
            )
            .await
            .unwrap();

        assert!(graph.snapshot().entities().is_empty());
        graph.refresh().await.unwrap();
        assert_eq!(graph.snapshot().entities().len(), 1);
        assert_eq!(graph.snapshot().anchored_on(2).count(), 1);
        assert_eq!(graph.snapshot().anchored_on(1).count(), 0);
        assert_eq!(graph.revision(), 1);
    }
}
