//! # Annotation Graph Model
//!
//! DTOs that cross every boundary: client ↔ sync ↔ history ↔ session.
//!
//! Design rule: this module is pure data: no I/O, no state, no async.

pub mod rect;
pub mod entity;
pub mod link;
pub mod flags;

pub use rect::Rect;
pub use entity::{
    Entity, EntityId, EntityKind, EntityType, EntityDraft, EntityPatch,
    Field, FieldKey, TextField, RefField, DefinitionScope, DefinitionItemType,
};
pub use link::{Link, LinkId, LinkSpec, RelType};
pub use flags::{EntityFlags, EntityStatus, MissingParts, derive_flags};
