//! # Annotation Session
//!
//! One editing session over a remote graph: the synced snapshot, the
//! command history, the spatial index of the active sheet, page metadata
//! and zoom. Every mutation follows the same path:
//!
//! ```text
//! forward op ──► client ──► refetch ──► rebuild index ──► push command
//! ```
//!
//! All mutating methods take `&mut self`, so two undos cannot be in flight
//! at once.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::GraphClient;
use crate::coords::{self, PageMeta, PageRegistry, ZoomMode, ZoomState};
use crate::history::{Command, HistoryEngine, LinkRecord};
use crate::index::SpatialIndex;
use crate::model::*;
use crate::sync::GraphSnapshot;
use crate::{Error, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Session settings.
///
/// ```json
/// { "cell_size": 64.0, "history_limit": 200, "initial_sheet": 1 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Spatial index grid size, in document points.
    pub cell_size: f64,
    /// Maximum undoable entries; `None` keeps everything.
    pub history_limit: Option<usize>,
    pub initial_sheet: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { cell_size: 64.0, history_limit: None, initial_sheet: 1 }
    }
}

impl SessionConfig {
    /// Parse and validate. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(Error::Config(format!("cell_size must be positive, got {}", self.cell_size)));
        }
        if self.history_limit == Some(0) {
            return Err(Error::Config("history_limit must be at least 1".into()));
        }
        if self.initial_sheet == 0 {
            return Err(Error::Config("initial_sheet is 1-based".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct Session<C: GraphClient> {
    config: SessionConfig,
    history: HistoryEngine<C>,
    pages: PageRegistry,
    zoom: ZoomState,
    active_sheet: u32,
    index: SpatialIndex<EntityId>,
}

impl<C: GraphClient> Session<C> {
    /// Validate the config, fetch the graph and index the initial sheet.
    pub async fn open(client: C, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let history = HistoryEngine::new(client).with_limit(config.history_limit);
        let mut session = Self {
            active_sheet: config.initial_sheet,
            index: SpatialIndex::default(),
            pages: PageRegistry::new(),
            zoom: ZoomState::default(),
            history,
            config,
        };
        session.refresh().await?;
        info!(
            entities = session.snapshot().entities().len(),
            links = session.snapshot().links().len(),
            "session opened"
        );
        Ok(session)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &GraphSnapshot {
        self.history.graph().snapshot()
    }

    pub fn client(&self) -> &C {
        self.history.graph().client()
    }

    pub fn history(&self) -> &HistoryEngine<C> {
        &self.history
    }

    pub fn index(&self) -> &SpatialIndex<EntityId> {
        &self.index
    }

    pub fn pages(&self) -> &PageRegistry {
        &self.pages
    }

    pub fn active_sheet(&self) -> u32 {
        self.active_sheet
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Current server id of an entity that may have been recreated.
    pub fn resolve(&self, id: &EntityId) -> EntityId {
        self.history.resolve(id)
    }

    /// Completeness flags computed from the current snapshot.
    pub fn flags(&self, id: &EntityId) -> Option<EntityFlags> {
        let snapshot = self.snapshot();
        snapshot
            .entity(id)
            .map(|e| derive_flags(&e.kind, Some(&e.id), snapshot.links()))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create an entity with derived flags and record it.
    pub async fn create_entity(&mut self, mut draft: EntityDraft) -> Result<Entity> {
        draft.flags = derive_flags(&draft.kind, None, &[]);
        let entity = self.history.graph_mut().create_entity(draft).await?;
        self.sync().await;
        self.history.push(Command::CreateEntity { entity: entity.clone() });
        Ok(entity)
    }

    /// Patch an entity, recording the previous values of the touched fields.
    ///
    /// Flags are derived again from the patched fields and current links;
    /// when they change, the patch carries them too, so undo restores them.
    pub async fn edit_entity(&mut self, id: &EntityId, patch: EntityPatch) -> Result<Entity> {
        if patch.is_empty() {
            return Err(Error::Validation("empty patch".into()));
        }
        let snapshot = self.snapshot();
        let current = snapshot
            .entity(id)
            .ok_or_else(|| Error::NotFound(format!("Entity {id}")))?;
        let mut next = current.clone();
        next.apply(&patch)?;
        let flags = derive_flags(&next.kind, Some(id), snapshot.links());
        let patch = if flags != next.flags { patch.with(Field::Flags(flags)) } else { patch };
        let before = current.capture(&patch)?;

        let entity = self.history.graph_mut().patch_entity(id, &patch).await?;
        self.sync().await;
        self.history.push(Command::EditEntity { id: id.clone(), before, after: patch });
        Ok(entity)
    }

    /// Delete an entity and its links, recording both. Returns false, and
    /// records nothing, if the entity is not in the snapshot.
    pub async fn delete_entity(&mut self, id: &EntityId) -> Result<bool> {
        let snapshot = self.snapshot();
        let Some(entity) = snapshot.entity(id).cloned() else {
            debug!(%id, "delete of unknown entity ignored");
            return Ok(false);
        };
        let links: Vec<LinkRecord> = snapshot.links_touching(id).map(LinkRecord::from).collect();

        self.history.graph_mut().delete_entity(id).await?;
        self.sync().await;
        self.history.push(Command::DeleteEntity { entity, links });
        Ok(true)
    }

    /// Create links, skipping triples that already exist. The created links
    /// are recorded as one command, also when a later one fails.
    pub async fn link(&mut self, specs: &[LinkSpec]) -> Result<Vec<Link>> {
        let mut created = Vec::new();
        let mut failure = None;
        for spec in specs {
            if self.snapshot().find_link(spec).is_some() {
                debug!(%spec, "link exists, skipped");
                continue;
            }
            match self.history.graph_mut().ensure_link(spec).await {
                Ok(link) => created.push(link),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        self.finish_links(&created, |links| Command::CreateLinks { links }).await;
        match failure {
            Some(err) => Err(err),
            None => Ok(created),
        }
    }

    /// Delete links by id. Unknown ids are ignored; returns the number
    /// removed.
    pub async fn unlink(&mut self, ids: &[LinkId]) -> Result<usize> {
        let targets: Vec<Link> = ids
            .iter()
            .filter_map(|id| self.snapshot().link(id).cloned())
            .collect();

        let mut removed = Vec::new();
        let mut failure = None;
        for link in targets {
            match self.history.graph_mut().remove_link(&link.spec, Some(&link.id)).await {
                Ok(_) => removed.push(link),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        self.finish_links(&removed, |links| Command::DeleteLinks { links }).await;
        match failure {
            Some(err) => Err(err),
            None => Ok(removed.len()),
        }
    }

    async fn finish_links(&mut self, links: &[Link], command: impl FnOnce(Vec<LinkRecord>) -> Command) {
        if links.is_empty() {
            return;
        }
        self.sync().await;
        self.history.push(command(links.iter().map(LinkRecord::from).collect()));
    }

    /// Record an operation the caller already applied, then refetch.
    pub async fn push_command(&mut self, command: Command) {
        self.history.push(command);
        self.sync().await;
    }

    pub async fn undo(&mut self) -> Result<bool> {
        let result = self.history.undo().await;
        self.rebuild_index();
        result
    }

    pub async fn redo(&mut self) -> Result<bool> {
        let result = self.history.redo().await;
        self.rebuild_index();
        result
    }

    /// Full refetch and index rebuild.
    pub async fn refresh(&mut self) -> Result<()> {
        self.history.graph_mut().refresh().await?;
        self.rebuild_index();
        Ok(())
    }

    /// Refetch after a successful forward operation. The operation already
    /// landed, so a failed refetch is logged rather than returned.
    async fn sync(&mut self) {
        if let Err(err) = self.history.graph_mut().refresh().await {
            warn!(error = %err, "refetch after mutation failed, snapshot may be stale");
        }
        self.rebuild_index();
    }

    /// Rebuild the spatial index for the active sheet from the snapshot.
    pub fn rebuild_index(&mut self) {
        let items: Vec<(EntityId, Rect)> = self
            .snapshot()
            .anchored_on(self.active_sheet)
            .filter(|(id, r)| {
                let finite = r.to_array().iter().all(|v| v.is_finite());
                if !finite {
                    warn!(%id, "entity box is not finite, left out of the index");
                }
                finite
            })
            .map(|(id, r)| (id.clone(), r))
            .collect();

        match SpatialIndex::build(items, self.config.cell_size) {
            Ok(index) => self.index = index,
            Err(err) => warn!(error = %err, "spatial index rebuild failed"),
        }
        debug!(sheet = self.active_sheet, entries = self.index.len(), "spatial index rebuilt");
    }

    // ========================================================================
    // Pages and zoom
    // ========================================================================

    pub fn set_active_sheet(&mut self, sheet: u32) -> Result<()> {
        if sheet == 0 {
            return Err(Error::Validation("sheet numbers are 1-based".into()));
        }
        if sheet != self.active_sheet {
            self.active_sheet = sheet;
            self.rebuild_index();
        }
        Ok(())
    }

    pub fn set_page_meta(&mut self, sheet: u32, meta: PageMeta) -> Result<()> {
        self.pages.insert(sheet, meta)
    }

    pub fn update_fit_scale(&mut self, sheet: u32, fit: f64) -> Result<bool> {
        self.pages.update_fit_scale(sheet, fit)
    }

    pub fn zoom(&self) -> &ZoomState {
        &self.zoom
    }

    pub fn set_zoom_mode(&mut self, mode: ZoomMode) {
        self.zoom.set_mode(mode);
    }

    pub fn set_manual_scale(&mut self, scale: f64) -> Result<f64> {
        self.zoom.set_manual_scale(scale)
    }

    /// Display scale for the active sheet. 1.0 in fit mode when the sheet
    /// has no metadata yet.
    pub fn scale(&self) -> f64 {
        let fit = self.pages.fit_scale(self.active_sheet).unwrap_or(1.0);
        self.zoom.effective_scale(fit)
    }

    // ========================================================================
    // Hit testing
    // ========================================================================

    /// Entities on the active sheet under a display-space point.
    pub fn entities_at(&self, x: f64, y: f64) -> Result<Vec<EntityId>> {
        let meta = self.pages.get(self.active_sheet)?;
        let raster = coords::display_to_raster(&Rect::new(x, y, x, y)?, self.scale())?;
        let (dx, dy) = coords::raster_point_to_document(raster.x1, raster.y1, meta);
        Ok(self.index.query_point(dx, dy))
    }

    /// Entities on the active sheet intersecting a display-space rectangle.
    pub fn entities_in(&self, rect: &Rect) -> Result<Vec<EntityId>> {
        let meta = self.pages.get(self.active_sheet)?;
        let raster = coords::display_to_raster(rect, self.scale())?;
        Ok(self.index.query_rect(&coords::raster_to_document(&raster, meta)))
    }

    /// An entity's box in display space at the current scale.
    pub fn display_rect(&self, id: &EntityId) -> Result<Rect> {
        let entity = self
            .snapshot()
            .entity(id)
            .ok_or_else(|| Error::NotFound(format!("Entity {id}")))?;
        let (Some(sheet), Some(bbox)) = (entity.sheet, entity.bbox) else {
            return Err(Error::Geometry(format!("{id} is not anchored on a sheet")));
        };
        let raster = self.pages.document_to_raster(sheet, &bbox)?;
        coords::raster_to_display(&raster, self.scale())
    }
}
