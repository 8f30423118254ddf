//! Reversible commands recorded in the history.

use serde::{Deserialize, Serialize};

use crate::model::*;

/// A link captured by value, with the last id it was seen under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    #[serde(flatten)]
    pub spec: LinkSpec,
    #[serde(default)]
    pub last_id: Option<LinkId>,
}

impl LinkRecord {
    pub fn new(spec: LinkSpec) -> Self {
        Self { spec, last_id: None }
    }
}

impl From<&Link> for LinkRecord {
    fn from(link: &Link) -> Self {
        Self { spec: link.spec.clone(), last_id: Some(link.id.clone()) }
    }
}

/// One state-changing operation, carrying what is needed to replay it in
/// either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// The entity as the store returned it on creation.
    CreateEntity { entity: Entity },
    EditEntity {
        id: EntityId,
        before: EntityPatch,
        after: EntityPatch,
    },
    /// Full snapshot plus the links the cascade took with it.
    DeleteEntity {
        entity: Entity,
        #[serde(default)]
        links: Vec<LinkRecord>,
    },
    CreateLinks { links: Vec<LinkRecord> },
    DeleteLinks { links: Vec<LinkRecord> },
}

impl Command {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Command::CreateEntity { .. } => "create_entity",
            Command::EditEntity { .. } => "edit_entity",
            Command::DeleteEntity { .. } => "delete_entity",
            Command::CreateLinks { .. } => "create_links",
            Command::DeleteLinks { .. } => "delete_links",
        }
    }

    /// Short human-readable description for undo/redo menus.
    pub fn label(&self) -> String {
        match self {
            Command::CreateEntity { entity } => format!("create {}", entity.entity_type()),
            Command::EditEntity { after, .. } => match after.fields.len() {
                1 => "edit field".to_string(),
                n => format!("edit {n} fields"),
            },
            Command::DeleteEntity { entity, .. } => format!("delete {}", entity.entity_type()),
            Command::CreateLinks { links } => plural("link", links.len()),
            Command::DeleteLinks { links } => format!("remove {}", plural("link", links.len())),
        }
    }
}

fn plural(noun: &str, n: usize) -> String {
    if n == 1 { format!("1 {noun}") } else { format!("{n} {noun}s") }
}

/// Where an entry stands relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// A replay is in flight (or was abandoned mid-flight).
    Pending,
    /// The last replay for the entry's current stack position succeeded.
    Applied,
    /// The last replay failed; the entry stayed where it was.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: Command,
    pub state: CommandState,
}

impl HistoryEntry {
    pub fn applied(command: Command) -> Self {
        Self { command, state: CommandState::Applied }
    }
}
