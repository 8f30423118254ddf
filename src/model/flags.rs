//! Completeness flags derived from an entity's fields and links.

use serde::{Deserialize, Serialize};

use super::{EntityId, EntityKind, Link, RelType};

/// Whether an annotation has everything its kind needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[default]
    Incomplete,
    Complete,
}

/// Which parts of an annotation are still missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingParts {
    #[serde(default)]
    pub drawing: bool,
    #[serde(default)]
    pub definition: bool,
    #[serde(default)]
    pub scope: bool,
}

impl MissingParts {
    pub fn any(&self) -> bool {
        self.drawing || self.definition || self.scope
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityFlags {
    pub status: EntityStatus,
    #[serde(default)]
    pub missing: MissingParts,
}

fn blank(v: &Option<String>) -> bool {
    v.as_deref().is_none_or(|s| s.trim().is_empty())
}

/// Derive flags for an entity of `kind`.
///
/// `id` is the entity's id if it already exists; instances count as scoped
/// when some `JUSTIFIED_BY` link targets them.
pub fn derive_flags(kind: &EntityKind, id: Option<&EntityId>, links: &[Link]) -> EntityFlags {
    let justified = || {
        id.is_some_and(|id| {
            links
                .iter()
                .any(|l| l.spec.rel_type == RelType::JustifiedBy && &l.spec.target == id)
        })
    };

    let mut missing = MissingParts::default();
    match kind {
        EntityKind::Drawing { title, .. }
        | EntityKind::Legend { title, .. }
        | EntityKind::Schedule { title, .. } => missing.drawing = blank(title),
        EntityKind::Note { text } => missing.drawing = blank(text),
        EntityKind::Scope { name, description } => {
            missing.scope = blank(name) || blank(description);
        }
        EntityKind::SymbolDefinition { name, .. } | EntityKind::ComponentDefinition { name, .. } => {
            missing.definition = blank(name);
        }
        EntityKind::SymbolInstance { symbol_definition_id, .. } => {
            missing.definition = symbol_definition_id.as_str().is_empty();
            missing.scope = !justified();
        }
        EntityKind::ComponentInstance { component_definition_id } => {
            missing.definition = component_definition_id.as_str().is_empty();
            missing.scope = !justified();
        }
        EntityKind::LegendItem { .. }
        | EntityKind::ScheduleItem { .. }
        | EntityKind::AssemblyGroup { .. }
        | EntityKind::Assembly { .. } => {}
    }

    EntityFlags {
        status: if missing.any() { EntityStatus::Incomplete } else { EntityStatus::Complete },
        missing,
    }
}
