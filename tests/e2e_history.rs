//! End-to-end tests for undo/redo against the in-memory store.
//!
//! Every test drives a `Session` over a `MemoryClient` and checks the
//! store's own state, not the session's snapshot.

use annograph::{
    CommandState, Entity, EntityDraft, EntityId, EntityKind, EntityPatch, EntityStatus,
    GraphClient, LinkSpec, MemoryClient, Rect, RelType, Session, SessionConfig, TextField,
};
use pretty_assertions::assert_eq;

// ============================================================================
// Helpers
// ============================================================================

fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Rect {
    Rect::new(x1, y1, x2, y2).unwrap()
}

fn note_at(r: Rect) -> EntityDraft {
    EntityDraft::new(EntityKind::note("check")).on_sheet(1, r)
}

async fn open(client: &MemoryClient) -> Session<MemoryClient> {
    Session::open(client.clone(), SessionConfig::default()).await.unwrap()
}

async fn scope_and_evidence(client: &MemoryClient) -> (Entity, Entity) {
    let scope = client.create(EntityDraft::new(EntityKind::scope("HVAC", "ducts"))).await.unwrap();
    let evidence = client.create(note_at(rect(0.0, 0.0, 5.0, 5.0))).await.unwrap();
    (scope, evidence)
}

/// Store contents compared by value: server ids and timestamps are left
/// out, link endpoints are replaced by the fingerprint of the entity they
/// point at.
async fn fingerprint(client: &MemoryClient) -> (Vec<String>, Vec<String>) {
    let listing = client.list().await.unwrap();
    let describe = |id: &EntityId| -> String {
        listing
            .entities
            .iter()
            .find(|e| &e.id == id)
            .map(|e| {
                format!(
                    "{:?}|{:?}|{}",
                    e.sheet,
                    e.bbox.map(|r| r.to_array()),
                    serde_json::to_string(&e.kind).unwrap()
                )
            })
            .unwrap_or_else(|| format!("dangling:{id}"))
    };

    let mut entities: Vec<String> = listing.entities.iter().map(|e| describe(&e.id)).collect();
    let mut links: Vec<String> = listing
        .links
        .iter()
        .map(|l| {
            format!(
                "{} -[{}]-> {}",
                describe(&l.spec.source),
                l.spec.rel_type,
                describe(&l.spec.target)
            )
        })
        .collect();
    entities.sort();
    links.sort();
    (entities, links)
}

// ============================================================================
// 1. Create → edit → undo → undo
// ============================================================================

#[tokio::test]
async fn test_edit_then_create_undone_in_order() {
    let client = MemoryClient::new();
    let mut session = open(&client).await;

    let e1 = session.create_entity(note_at(rect(0.0, 0.0, 10.0, 10.0))).await.unwrap();
    session
        .edit_entity(&e1.id, EntityPatch::new().bounding_box(rect(10.0, 10.0, 20.0, 20.0)))
        .await
        .unwrap();
    assert_eq!(client.get(&e1.id).unwrap().bbox, Some(rect(10.0, 10.0, 20.0, 20.0)));

    assert!(session.undo().await.unwrap());
    assert_eq!(client.get(&e1.id).unwrap().bbox, Some(rect(0.0, 0.0, 10.0, 10.0)));

    assert!(session.undo().await.unwrap());
    assert!(client.get(&e1.id).is_none());
    assert_eq!(client.entity_count(), 0);
}

// ============================================================================
// 2. Delete → undo (new id) → redo deletes the recreated entity
// ============================================================================

#[tokio::test]
async fn test_redo_delete_targets_recreated_entity() {
    let client = MemoryClient::new();
    let e2 = client.create(note_at(rect(0.0, 0.0, 5.0, 5.0))).await.unwrap();
    let mut session = open(&client).await;

    session.delete_entity(&e2.id).await.unwrap();
    assert_eq!(client.entity_count(), 0);

    session.undo().await.unwrap();
    let recreated = session.resolve(&e2.id);
    assert_ne!(recreated, e2.id);
    assert!(client.get(&recreated).is_some());
    assert!(client.get(&e2.id).is_none());

    session.redo().await.unwrap();
    assert!(client.get(&recreated).is_none());
    assert_eq!(client.entity_count(), 0);
}

#[tokio::test]
async fn test_repeated_recreate_cycles_resolve_to_latest() {
    let client = MemoryClient::new();
    let e = client.create(note_at(rect(0.0, 0.0, 5.0, 5.0))).await.unwrap();
    let mut session = open(&client).await;
    session.delete_entity(&e.id).await.unwrap();

    let mut seen = vec![e.id.clone()];
    for _ in 0..4 {
        session.undo().await.unwrap();
        let current = session.resolve(&e.id);
        assert!(!seen.contains(&current));
        seen.push(current);
        session.redo().await.unwrap();
        assert_eq!(client.entity_count(), 0);
    }

    // every intermediate id resolves to the same, latest entity
    session.undo().await.unwrap();
    let latest = session.resolve(&e.id);
    for id in &seen {
        assert_eq!(session.resolve(id), latest);
    }
    assert_eq!(client.entity_count(), 1);
}

// ============================================================================
// 3. Link → undo → redo creates exactly one edge
// ============================================================================

#[tokio::test]
async fn test_link_redo_creates_exactly_once() {
    let client = MemoryClient::new();
    let (scope, evidence) = scope_and_evidence(&client).await;
    let mut session = open(&client).await;
    let spec = LinkSpec::new(RelType::JustifiedBy, scope.id, evidence.id);

    session.link(&[spec.clone()]).await.unwrap();
    assert_eq!(client.link_count(), 1);

    session.undo().await.unwrap();
    assert_eq!(client.link_count(), 0);

    session.redo().await.unwrap();
    let links = client.list().await.unwrap().links;
    assert_eq!(links.len(), 1);
    assert!(links[0].matches(&spec));

    // a second redo cycle still leaves one edge
    session.undo().await.unwrap();
    session.redo().await.unwrap();
    assert_eq!(client.link_count(), 1);
}

#[tokio::test]
async fn test_link_redo_skips_triple_recreated_elsewhere() {
    let client = MemoryClient::new();
    let drawing = client
        .create(EntityDraft::new(EntityKind::drawing("Level 1")).on_sheet(1, rect(0.0, 0.0, 500.0, 400.0)))
        .await
        .unwrap();
    let note = client.create(note_at(rect(10.0, 10.0, 20.0, 20.0))).await.unwrap();
    let mut session = open(&client).await;
    let spec = LinkSpec::new(RelType::Depicts, drawing.id, note.id);

    session.link(&[spec.clone()]).await.unwrap();
    session.undo().await.unwrap();

    // someone else recreates the same triple
    client.create_link(&spec).await.unwrap();
    session.refresh().await.unwrap();

    session.redo().await.unwrap();
    assert_eq!(client.link_count(), 1);
}

// ============================================================================
// 4. Deleting a linked entity restores its links on undo
// ============================================================================

#[tokio::test]
async fn test_undo_delete_restores_links_with_new_ids() {
    let client = MemoryClient::new();
    let scope = client.create(EntityDraft::new(EntityKind::scope("HVAC", "ducts"))).await.unwrap();
    let evidence = client.create(note_at(rect(0.0, 0.0, 5.0, 5.0))).await.unwrap();
    client
        .create_link(&LinkSpec::new(RelType::JustifiedBy, scope.id.clone(), evidence.id.clone()))
        .await
        .unwrap();
    let mut session = open(&client).await;
    let before = fingerprint(&client).await;

    session.delete_entity(&evidence.id).await.unwrap();
    assert_eq!(client.link_count(), 0);

    session.undo().await.unwrap();
    assert_eq!(fingerprint(&client).await, before);

    let current = session.resolve(&evidence.id);
    let links = client.list().await.unwrap().links;
    assert_eq!(links[0].spec.target, current);
    assert_eq!(links[0].spec.source, scope.id);
}

#[tokio::test]
async fn test_undo_unlink_after_endpoint_deleted_elsewhere() {
    let client = MemoryClient::new();
    let (scope, evidence) = scope_and_evidence(&client).await;
    let mut session = open(&client).await;
    let created = session
        .link(&[LinkSpec::new(RelType::JustifiedBy, scope.id.clone(), evidence.id.clone())])
        .await
        .unwrap();
    session.unlink(&[created[0].id.clone()]).await.unwrap();
    assert_eq!(client.link_count(), 0);

    client.delete(&evidence.id).await.unwrap();
    session.refresh().await.unwrap();

    // restoring the link would point at nothing, so undo leaves it out
    assert!(session.undo().await.unwrap());
    assert_eq!(client.link_count(), 0);
    assert!(session.can_redo());

    // redo of the unlink finds nothing to remove
    assert!(session.redo().await.unwrap());
    assert_eq!(client.link_count(), 0);
}

#[tokio::test]
async fn test_undo_delete_with_vanished_partner_recreates_entity_only() {
    let client = MemoryClient::new();
    let (scope, evidence) = scope_and_evidence(&client).await;
    client
        .create_link(&LinkSpec::new(RelType::JustifiedBy, scope.id.clone(), evidence.id.clone()))
        .await
        .unwrap();
    let mut session = open(&client).await;
    session.delete_entity(&evidence.id).await.unwrap();

    client.delete(&scope.id).await.unwrap();
    session.refresh().await.unwrap();

    assert!(session.undo().await.unwrap());
    assert_eq!(client.entity_count(), 1);
    assert_eq!(client.link_count(), 0);
    assert!(client.get(&session.resolve(&evidence.id)).is_some());
}

// ============================================================================
// 5. Properties over a mixed sequence
// ============================================================================

#[tokio::test]
async fn test_n_operations_then_n_undos_restore_state() {
    let client = MemoryClient::new();
    let scope = client.create(EntityDraft::new(EntityKind::scope("Electrical", "panels"))).await.unwrap();
    let plan = client
        .create(EntityDraft::new(EntityKind::drawing("Level 1")).on_sheet(1, rect(0.0, 0.0, 500.0, 400.0)))
        .await
        .unwrap();
    client
        .create_link(&LinkSpec::new(RelType::JustifiedBy, scope.id.clone(), plan.id.clone()))
        .await
        .unwrap();
    let mut session = open(&client).await;
    let initial = fingerprint(&client).await;

    let note = session.create_entity(note_at(rect(20.0, 20.0, 40.0, 30.0))).await.unwrap();
    session
        .edit_entity(&note.id, EntityPatch::new().text(annograph::TextField::Text, "moved"))
        .await
        .unwrap();
    let created = session
        .link(&[LinkSpec::new(RelType::Depicts, plan.id.clone(), note.id.clone())])
        .await
        .unwrap();
    session.delete_entity(&plan.id).await.unwrap();
    session
        .edit_entity(&note.id, EntityPatch::new().bounding_box(rect(50.0, 50.0, 60.0, 60.0)))
        .await
        .unwrap();
    session.delete_entity(&scope.id).await.unwrap();
    let n = session.history().past().len();
    assert_eq!(n, 6);
    assert_eq!(created.len(), 1);
    let after = fingerprint(&client).await;

    for _ in 0..n {
        assert!(session.undo().await.unwrap());
    }
    assert!(!session.can_undo());
    assert_eq!(fingerprint(&client).await, initial);

    for _ in 0..n {
        assert!(session.redo().await.unwrap());
    }
    assert_eq!(fingerprint(&client).await, after);
}

#[tokio::test]
async fn test_undo_redo_and_redo_undo_are_identity() {
    let client = MemoryClient::new();
    let base = client.create(note_at(rect(0.0, 0.0, 8.0, 8.0))).await.unwrap();
    let mut session = open(&client).await;

    session
        .edit_entity(&base.id, EntityPatch::new().bounding_box(rect(1.0, 1.0, 9.0, 9.0)))
        .await
        .unwrap();
    let applied = fingerprint(&client).await;

    session.undo().await.unwrap();
    let reverted = fingerprint(&client).await;
    session.redo().await.unwrap();
    assert_eq!(fingerprint(&client).await, applied);

    session.undo().await.unwrap();
    session.redo().await.unwrap();
    session.undo().await.unwrap();
    assert_eq!(fingerprint(&client).await, reverted);
}

// ============================================================================
// 6. Failures
// ============================================================================

#[tokio::test]
async fn test_failed_redo_stays_queued_and_retries() {
    let client = MemoryClient::new();
    let mut session = open(&client).await;
    let e = session.create_entity(note_at(rect(0.0, 0.0, 5.0, 5.0))).await.unwrap();
    session.undo().await.unwrap();

    client.set_offline(true);
    let err = session.redo().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(session.can_redo());
    assert!(!session.can_undo());
    assert_eq!(
        session.history().future().next().map(|entry| entry.state),
        Some(CommandState::Failed)
    );

    client.set_offline(false);
    assert!(session.redo().await.unwrap());
    assert!(client.get(&session.resolve(&e.id)).is_some());
    assert_eq!(client.entity_count(), 1);
}

#[tokio::test]
async fn test_refetch_failure_after_replay_is_not_an_error() {
    let client = MemoryClient::new();
    let mut session = open(&client).await;
    session.create_entity(note_at(rect(0.0, 0.0, 5.0, 5.0))).await.unwrap();

    // the delete lands, the refetch behind it fails
    client.fail_nth(2);
    assert!(session.undo().await.unwrap());
    assert_eq!(client.entity_count(), 0);
    assert!(session.can_redo());
}

#[tokio::test]
async fn test_undo_of_externally_deleted_entity_is_noop() {
    let client = MemoryClient::new();
    let mut session = open(&client).await;
    let e = session.create_entity(note_at(rect(0.0, 0.0, 5.0, 5.0))).await.unwrap();

    client.delete(&e.id).await.unwrap();
    assert!(session.undo().await.unwrap());
    assert_eq!(client.entity_count(), 0);
}

#[tokio::test]
async fn test_completing_a_drawing_is_undone_with_its_status() {
    let client = MemoryClient::new();
    let mut session = open(&client).await;
    let drawing = session
        .create_entity(EntityDraft::new(EntityKind::drawing("")).on_sheet(1, rect(0.0, 0.0, 50.0, 50.0)))
        .await
        .unwrap();
    assert_eq!(client.get(&drawing.id).unwrap().flags.status, EntityStatus::Incomplete);

    session
        .edit_entity(&drawing.id, EntityPatch::new().text(TextField::Title, "Roof plan"))
        .await
        .unwrap();
    assert_eq!(client.get(&drawing.id).unwrap().flags.status, EntityStatus::Complete);

    session.undo().await.unwrap();
    assert_eq!(client.get(&drawing.id).unwrap().flags.status, EntityStatus::Incomplete);
}

#[tokio::test]
async fn test_history_limit_from_config() {
    let client = MemoryClient::new();
    let config = SessionConfig::from_json_str(r#"{"history_limit": 2}"#).unwrap();
    let mut session = Session::open(client.clone(), config).await.unwrap();

    for i in 0..4 {
        let x = f64::from(i) * 10.0;
        session.create_entity(note_at(rect(x, 0.0, x + 5.0, 5.0))).await.unwrap();
    }
    assert_eq!(session.history().past().len(), 2);

    while session.undo().await.unwrap() {}
    assert_eq!(client.entity_count(), 2);
}
