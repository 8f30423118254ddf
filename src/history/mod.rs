//! # Command History
//!
//! Undo/redo of reversible commands against the remote store.
//!
//! ```text
//! push(cmd)  ──► past: [.., cmd]          future: []
//! undo()     ──► inverse(top of past)   ──► front of future
//! redo()     ──► forward(front of future) ──► top of past
//! ```
//!
//! An entry only changes stacks once its remote effect succeeded. A failed
//! replay leaves it in place marked [`CommandState::Failed`]; calling the
//! same operation again retries it. Every replay step is idempotent
//! (recreates check the snapshot, link creation checks the triple, deletes
//! of absent targets are no-ops), so a retry after a partial failure
//! converges instead of duplicating.

pub mod command;
pub mod remap;

use tracing::{debug, info, warn};

use crate::client::GraphClient;
use crate::model::*;
use crate::sync::SyncedGraph;
use crate::Result;

pub use command::{Command, CommandState, HistoryEntry, LinkRecord};
pub use remap::{EntityKey, IdRemap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    Forward,
    Inverse,
}

// ============================================================================
// HistoryEngine
// ============================================================================

/// Undo/redo stacks bound to one synced graph.
pub struct HistoryEngine<C: GraphClient> {
    graph: SyncedGraph<C>,
    remap: IdRemap,
    past: Vec<HistoryEntry>,
    /// Redo queue; the front is the last element.
    future: Vec<HistoryEntry>,
    limit: Option<usize>,
}

impl<C: GraphClient> HistoryEngine<C> {
    pub fn new(client: C) -> Self {
        Self {
            graph: SyncedGraph::new(client),
            remap: IdRemap::new(),
            past: Vec::new(),
            future: Vec::new(),
            limit: None,
        }
    }

    /// Keep at most `limit` undoable entries; the oldest are dropped first.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn graph(&self) -> &SyncedGraph<C> {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SyncedGraph<C> {
        &mut self.graph
    }

    pub fn remap(&self) -> &IdRemap {
        &self.remap
    }

    /// Current server id for an id recorded in history.
    pub fn resolve(&self, id: &EntityId) -> EntityId {
        self.remap.resolve(id)
    }

    /// Record a command whose forward effect the caller already applied.
    /// Clears the redo queue.
    pub fn push(&mut self, command: Command) {
        debug!(command = command.kind_name(), "history push");
        self.past.push(HistoryEntry::applied(command));
        self.future.clear();
        if let Some(limit) = self.limit {
            let excess = self.past.len().saturating_sub(limit);
            if excess > 0 {
                self.past.drain(..excess);
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Undoable entries, oldest first.
    pub fn past(&self) -> &[HistoryEntry] {
        &self.past
    }

    /// Redoable entries, next-to-redo first.
    pub fn future(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.future.iter().rev()
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    /// Apply the inverse of the most recent entry. Returns false if there
    /// was nothing to undo.
    pub async fn undo(&mut self) -> Result<bool> {
        let Some(entry) = self.past.last_mut() else {
            return Ok(false);
        };
        entry.state = CommandState::Pending;
        let outcome = replay(&mut self.graph, &mut self.remap, &mut entry.command, Replay::Inverse).await;

        match outcome {
            Ok(()) => {
                if let Some(mut entry) = self.past.pop() {
                    entry.state = CommandState::Applied;
                    info!(command = entry.command.kind_name(), "undo applied");
                    self.future.push(entry);
                }
                self.settle().await;
                Ok(true)
            }
            Err(err) => {
                if let Some(entry) = self.past.last_mut() {
                    entry.state = CommandState::Failed;
                    warn!(command = entry.command.kind_name(), error = %err, "undo failed, entry kept");
                }
                self.settle().await;
                Err(err)
            }
        }
    }

    /// Re-apply the next entry of the redo queue. Returns false if there was
    /// nothing to redo.
    pub async fn redo(&mut self) -> Result<bool> {
        let Some(entry) = self.future.last_mut() else {
            return Ok(false);
        };
        entry.state = CommandState::Pending;
        let outcome = replay(&mut self.graph, &mut self.remap, &mut entry.command, Replay::Forward).await;

        match outcome {
            Ok(()) => {
                if let Some(mut entry) = self.future.pop() {
                    entry.state = CommandState::Applied;
                    info!(command = entry.command.kind_name(), "redo applied");
                    self.past.push(entry);
                }
                self.settle().await;
                Ok(true)
            }
            Err(err) => {
                if let Some(entry) = self.future.last_mut() {
                    entry.state = CommandState::Failed;
                    warn!(command = entry.command.kind_name(), error = %err, "redo failed, entry kept");
                }
                self.settle().await;
                Err(err)
            }
        }
    }

    /// Full refetch after a replay. A failure here does not undo the replay
    /// outcome; the snapshot just stays stale until the next refresh.
    async fn settle(&mut self) {
        if let Err(err) = self.graph.refresh().await {
            warn!(error = %err, "refetch after replay failed, snapshot may be stale");
        }
    }
}

// ============================================================================
// Replay
// ============================================================================

async fn replay<C: GraphClient>(
    graph: &mut SyncedGraph<C>,
    remap: &mut IdRemap,
    command: &mut Command,
    direction: Replay,
) -> Result<()> {
    debug!(command = command.kind_name(), ?direction, "replaying");
    match (command, direction) {
        (Command::CreateEntity { entity }, Replay::Forward) => {
            recreate(graph, remap, entity).await?;
        }
        (Command::CreateEntity { entity }, Replay::Inverse)
        | (Command::DeleteEntity { entity, .. }, Replay::Forward) => {
            let current = remap.resolve(&entity.id);
            graph.delete_entity(&current).await?;
        }
        (Command::DeleteEntity { entity, links }, Replay::Inverse) => {
            recreate(graph, remap, entity).await?;
            restore_links(graph, remap, links).await?;
        }
        (Command::EditEntity { id, after, .. }, Replay::Forward) => {
            patch(graph, remap, id, after).await?;
        }
        (Command::EditEntity { id, before, .. }, Replay::Inverse) => {
            patch(graph, remap, id, before).await?;
        }
        (Command::CreateLinks { links }, Replay::Forward)
        | (Command::DeleteLinks { links }, Replay::Inverse) => {
            restore_links(graph, remap, links).await?;
        }
        (Command::CreateLinks { links }, Replay::Inverse)
        | (Command::DeleteLinks { links }, Replay::Forward) => {
            drop_links(graph, remap, links).await?;
        }
    }
    Ok(())
}

/// Recreate `entity` from its snapshot and bind its original id to the new
/// server id. Skipped if the entity's current id is still in the snapshot.
async fn recreate<C: GraphClient>(
    graph: &mut SyncedGraph<C>,
    remap: &mut IdRemap,
    entity: &Entity,
) -> Result<()> {
    let current = remap.resolve(&entity.id);
    if graph.snapshot().entity(&current).is_some() {
        debug!(id = %current, "entity still present, not recreating");
        return Ok(());
    }
    let created = graph.create_entity(entity.to_draft()).await?;
    debug!(original = %entity.id, current = %created.id, "entity recreated, id rebound");
    remap.bind(&entity.id, created.id);
    Ok(())
}

async fn patch<C: GraphClient>(
    graph: &mut SyncedGraph<C>,
    remap: &IdRemap,
    id: &EntityId,
    fields: &EntityPatch,
) -> Result<()> {
    let current = remap.resolve(id);
    match graph.patch_entity(&current, fields).await {
        Ok(_) => Ok(()),
        Err(err) if err.is_not_found() => {
            warn!(id = %current, "patch target no longer exists, skipping");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn restore_links<C: GraphClient>(
    graph: &mut SyncedGraph<C>,
    remap: &IdRemap,
    links: &mut [LinkRecord],
) -> Result<()> {
    for record in links.iter_mut() {
        let spec = remap.resolve_spec(&record.spec);
        let snapshot = graph.snapshot();
        if snapshot.entity(&spec.source).is_none() || snapshot.entity(&spec.target).is_none() {
            warn!(%spec, "link endpoint no longer exists, skipping restore");
            record.last_id = None;
            continue;
        }
        let link = graph.ensure_link(&spec).await?;
        record.last_id = Some(link.id);
    }
    Ok(())
}

async fn drop_links<C: GraphClient>(
    graph: &mut SyncedGraph<C>,
    remap: &IdRemap,
    links: &mut [LinkRecord],
) -> Result<()> {
    for record in links.iter_mut() {
        let spec = remap.resolve_spec(&record.spec);
        graph.remove_link(&spec, record.last_id.as_ref()).await?;
        record.last_id = None;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryClient;

    fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Rect {
        Rect::new(x1, y1, x2, y2).unwrap()
    }

    async fn engine_with_note() -> (MemoryClient, HistoryEngine<MemoryClient>, Entity) {
        let client = MemoryClient::new();
        let mut engine = HistoryEngine::new(client.clone());
        let entity = engine
            .graph_mut()
            .create_entity(EntityDraft::new(EntityKind::note("n")).on_sheet(1, rect(0.0, 0.0, 10.0, 10.0)))
            .await
            .unwrap();
        engine.graph_mut().refresh().await.unwrap();
        (client, engine, entity)
    }

    #[tokio::test]
    async fn test_undo_redo_on_empty_stacks_is_noop() {
        let mut engine = HistoryEngine::new(MemoryClient::new());
        assert!(!engine.undo().await.unwrap());
        assert!(!engine.redo().await.unwrap());
    }

    #[tokio::test]
    async fn test_push_clears_future() {
        let (_client, mut engine, entity) = engine_with_note().await;
        engine.push(Command::CreateEntity { entity: entity.clone() });
        engine.undo().await.unwrap();
        assert!(engine.can_redo());

        engine.push(Command::CreateLinks { links: vec![] });
        assert!(!engine.can_redo());
        assert_eq!(engine.past().len(), 1);
    }

    #[tokio::test]
    async fn test_history_limit_drops_oldest() {
        let mut engine = HistoryEngine::new(MemoryClient::new()).with_limit(Some(2));
        for _ in 0..3 {
            engine.push(Command::CreateLinks { links: vec![] });
        }
        engine.push(Command::DeleteLinks { links: vec![] });
        assert_eq!(engine.past().len(), 2);
        assert_eq!(engine.past()[1].command.kind_name(), "delete_links");
    }

    #[tokio::test]
    async fn test_redo_create_rebinds_id() {
        let (client, mut engine, entity) = engine_with_note().await;
        engine.push(Command::CreateEntity { entity: entity.clone() });

        engine.undo().await.unwrap();
        assert_eq!(client.entity_count(), 0);

        engine.redo().await.unwrap();
        let current = engine.resolve(&entity.id);
        assert_ne!(current, entity.id);
        assert!(client.get(&current).is_some());

        // second cycle deletes the recreated entity, not the stale id
        engine.undo().await.unwrap();
        assert_eq!(client.entity_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_undo_keeps_entry_and_retry_succeeds() {
        let (client, mut engine, entity) = engine_with_note().await;
        engine.push(Command::CreateEntity { entity: entity.clone() });

        client.set_offline(true);
        assert!(engine.undo().await.is_err());
        assert_eq!(engine.past().len(), 1);
        assert_eq!(engine.past()[0].state, CommandState::Failed);
        assert!(!engine.can_redo());

        client.set_offline(false);
        assert!(engine.undo().await.unwrap());
        assert!(engine.past().is_empty());
        assert_eq!(engine.future().next().map(|e| e.state), Some(CommandState::Applied));
        assert_eq!(client.entity_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_restore_retry_does_not_duplicate() {
        let (client, mut engine, entity) = engine_with_note().await;
        let other = engine
            .graph_mut()
            .create_entity(EntityDraft::new(EntityKind::scope("s", "d")))
            .await
            .unwrap();
        let link = engine
            .graph_mut()
            .ensure_link(&LinkSpec::new(RelType::JustifiedBy, other.id.clone(), entity.id.clone()))
            .await
            .unwrap();
        engine.graph_mut().delete_entity(&entity.id).await.unwrap();
        engine.push(Command::DeleteEntity {
            entity: entity.clone(),
            links: vec![LinkRecord::from(&link)],
        });

        // the recreate goes through, the link restore fails
        client.fail_nth(2);
        assert!(engine.undo().await.is_err());
        assert_eq!(client.entity_count(), 2);
        assert_eq!(client.link_count(), 0);
        assert_eq!(engine.past()[0].state, CommandState::Failed);

        // the retry finds the recreated entity and only restores the link
        engine.undo().await.unwrap();
        assert_eq!(client.entity_count(), 2);
        assert_eq!(client.link_count(), 1);
        let current = engine.resolve(&entity.id);
        assert_eq!(engine.graph().snapshot().links_touching(&current).count(), 1);
    }

    #[tokio::test]
    async fn test_restore_skips_link_whose_other_end_is_gone() {
        let (client, mut engine, entity) = engine_with_note().await;
        let scope = engine
            .graph_mut()
            .create_entity(EntityDraft::new(EntityKind::scope("s", "d")))
            .await
            .unwrap();
        let link = engine
            .graph_mut()
            .ensure_link(&LinkSpec::new(RelType::JustifiedBy, scope.id.clone(), entity.id.clone()))
            .await
            .unwrap();
        engine.graph_mut().delete_entity(&entity.id).await.unwrap();
        engine.push(Command::DeleteEntity {
            entity: entity.clone(),
            links: vec![LinkRecord::from(&link)],
        });

        // the scope disappears behind the session's back
        client.delete(&scope.id).await.unwrap();
        engine.graph_mut().refresh().await.unwrap();

        assert!(engine.undo().await.unwrap());
        assert_eq!(client.entity_count(), 1);
        assert_eq!(client.link_count(), 0);
        match &engine.future().next().map(|e| &e.command) {
            Some(Command::DeleteEntity { links, .. }) => assert_eq!(links[0].last_id, None),
            other => panic!("unexpected redo entry {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_edit_of_vanished_entity_is_benign() {
        let (client, mut engine, entity) = engine_with_note().await;
        let before = EntityPatch::new().bounding_box(rect(0.0, 0.0, 10.0, 10.0));
        let after = EntityPatch::new().bounding_box(rect(5.0, 5.0, 15.0, 15.0));
        engine.push(Command::EditEntity { id: entity.id.clone(), before, after });

        client.delete(&entity.id).await.unwrap();
        assert!(engine.undo().await.unwrap());
        assert!(engine.redo().await.unwrap());
    }
}
