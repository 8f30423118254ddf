//! # annograph: Annotation Graph Editing Core
//!
//! Typed annotations on paginated document images, stored as nodes and
//! links in a remote graph store, with undo/redo that stays consistent with
//! a store that renames entities on recreation.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphClient` is the contract between the session and the store
//! 2. **Clean DTOs**: `Entity`, `Link`, `Rect` cross all boundaries
//! 3. **Entries move only on success**: a failed undo/redo stays on its stack
//! 4. **Pure geometry**: the spatial index and transforms never touch the network
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use annograph::{EntityDraft, EntityKind, MemoryClient, Rect, Session, SessionConfig};
//!
//! # async fn example() -> annograph::Result<()> {
//! let mut session = Session::open(MemoryClient::new(), SessionConfig::default()).await?;
//!
//! let draft = EntityDraft::new(EntityKind::note("verify duct size"))
//!     .on_sheet(1, Rect::new(10.0, 10.0, 40.0, 25.0)?);
//! let note = session.create_entity(draft).await?;
//!
//! session.undo().await?;
//! assert!(session.snapshot().entity(&note.id).is_none());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | `model` | entities, links, rectangles, completeness flags |
//! | `client` | remote store trait and the in-memory store |
//! | `sync` | client + snapshot kept current by refetch |
//! | `history` | command stacks, replay, id remapping |
//! | `index` | grid spatial index |
//! | `coords` | document ↔ raster ↔ display transforms, zoom |
//! | `session` | everything above wired together |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod client;
pub mod sync;
pub mod history;
pub mod index;
pub mod coords;
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{
    Entity, EntityId, EntityKind, EntityType, EntityDraft, EntityPatch,
    Field, FieldKey, TextField, RefField, EntityFlags, EntityStatus,
    Link, LinkId, LinkSpec, RelType, Rect,
};

pub use client::{GraphClient, GraphListing, MemoryClient};
pub use sync::{GraphSnapshot, LinkFilter, SyncedGraph};
pub use history::{Command, CommandState, HistoryEngine, HistoryEntry, IdRemap, LinkRecord};
pub use index::SpatialIndex;
pub use coords::{PageMeta, PageRegistry, Rotation, ZoomMode, ZoomState};
pub use session::{Session, SessionConfig};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store rejected the request or could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The store rejected the payload.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing page metadata, unsupported rotation, bad scale or cell size.
    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Network failures may succeed when retried; nothing else will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
