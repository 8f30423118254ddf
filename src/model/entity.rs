//! Entities: typed annotation nodes, their create payloads and field patches.
//!
//! Every entity kind is a closed variant of [`EntityKind`]. Reads and writes
//! of individual fields go through [`Field`]/[`FieldKey`], so adding a kind
//! forces every slot table below to be revisited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flags::EntityFlags;
use super::Rect;
use crate::{Error, Result};

/// Opaque server-assigned entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Kind discriminant
// ============================================================================

/// The type discriminant of an entity, without its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Drawing,
    Legend,
    LegendItem,
    Schedule,
    ScheduleItem,
    AssemblyGroup,
    Assembly,
    Note,
    Scope,
    SymbolDefinition,
    ComponentDefinition,
    SymbolInstance,
    ComponentInstance,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Drawing => "drawing",
            EntityType::Legend => "legend",
            EntityType::LegendItem => "legend_item",
            EntityType::Schedule => "schedule",
            EntityType::ScheduleItem => "schedule_item",
            EntityType::AssemblyGroup => "assembly_group",
            EntityType::Assembly => "assembly",
            EntityType::Note => "note",
            EntityType::Scope => "scope",
            EntityType::SymbolDefinition => "symbol_definition",
            EntityType::ComponentDefinition => "component_definition",
            EntityType::SymbolInstance => "symbol_instance",
            EntityType::ComponentInstance => "component_instance",
        }
    }

    /// Whether entities of this type must sit on a sheet with a bounding box.
    /// Items, assemblies and scopes may be purely conceptual.
    pub fn requires_anchor(&self) -> bool {
        !matches!(
            self,
            EntityType::LegendItem
                | EntityType::ScheduleItem
                | EntityType::Assembly
                | EntityType::Scope
        )
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a definition applies project-wide or to a single sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionScope {
    #[default]
    Project,
    Sheet,
}

/// Which kind of catalogue item a symbol instance was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionItemType {
    Assembly,
    ScheduleItem,
    LegendItem,
}

// ============================================================================
// Kind-specific fields
// ============================================================================

/// Kind-specific payload of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum EntityKind {
    Drawing {
        title: Option<String>,
        description: Option<String>,
    },
    Legend {
        title: Option<String>,
        notes: Option<String>,
    },
    LegendItem {
        legend_id: EntityId,
        symbol_text: Option<String>,
        description: Option<String>,
        notes: Option<String>,
    },
    Schedule {
        title: Option<String>,
        schedule_type: Option<String>,
        notes: Option<String>,
    },
    ScheduleItem {
        schedule_id: EntityId,
        mark: Option<String>,
        description: Option<String>,
        notes: Option<String>,
        specifications: Option<serde_json::Value>,
        drawing_id: Option<EntityId>,
    },
    AssemblyGroup {
        title: Option<String>,
        notes: Option<String>,
    },
    Assembly {
        assembly_group_id: EntityId,
        code: Option<String>,
        name: Option<String>,
        description: Option<String>,
        notes: Option<String>,
        specifications: Option<serde_json::Value>,
        drawing_id: Option<EntityId>,
    },
    Note {
        text: Option<String>,
    },
    Scope {
        name: Option<String>,
        description: Option<String>,
    },
    SymbolDefinition {
        name: Option<String>,
        description: Option<String>,
        visual_pattern_description: Option<String>,
        #[serde(default)]
        scope: DefinitionScope,
        defined_in_id: Option<EntityId>,
    },
    ComponentDefinition {
        name: Option<String>,
        description: Option<String>,
        specifications: Option<serde_json::Value>,
        #[serde(default)]
        scope: DefinitionScope,
        defined_in_id: Option<EntityId>,
    },
    SymbolInstance {
        symbol_definition_id: EntityId,
        recognized_text: Option<String>,
        definition_item_id: Option<EntityId>,
        definition_item_type: Option<DefinitionItemType>,
    },
    ComponentInstance {
        component_definition_id: EntityId,
    },
}

/// Free-text fields carried by one or more kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Title,
    Description,
    Notes,
    Text,
    Name,
    RecognizedText,
    SymbolText,
    Mark,
    Code,
    ScheduleType,
    VisualPatternDescription,
}

/// Fields that reference another entity by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefField {
    LegendId,
    ScheduleId,
    AssemblyGroupId,
    DrawingId,
    DefinedInId,
    SymbolDefinitionId,
    ComponentDefinitionId,
    DefinitionItemId,
}

// Both macros expand to a `match` that works for `&EntityKind` and
// `&mut EntityKind` alike through default binding modes.
macro_rules! text_slot {
    ($kind:expr, $field:expr) => {
        match ($kind, $field) {
            (EntityKind::Drawing { title: s, .. }, TextField::Title)
            | (EntityKind::Drawing { description: s, .. }, TextField::Description)
            | (EntityKind::Legend { title: s, .. }, TextField::Title)
            | (EntityKind::Legend { notes: s, .. }, TextField::Notes)
            | (EntityKind::LegendItem { symbol_text: s, .. }, TextField::SymbolText)
            | (EntityKind::LegendItem { description: s, .. }, TextField::Description)
            | (EntityKind::LegendItem { notes: s, .. }, TextField::Notes)
            | (EntityKind::Schedule { title: s, .. }, TextField::Title)
            | (EntityKind::Schedule { schedule_type: s, .. }, TextField::ScheduleType)
            | (EntityKind::Schedule { notes: s, .. }, TextField::Notes)
            | (EntityKind::ScheduleItem { mark: s, .. }, TextField::Mark)
            | (EntityKind::ScheduleItem { description: s, .. }, TextField::Description)
            | (EntityKind::ScheduleItem { notes: s, .. }, TextField::Notes)
            | (EntityKind::AssemblyGroup { title: s, .. }, TextField::Title)
            | (EntityKind::AssemblyGroup { notes: s, .. }, TextField::Notes)
            | (EntityKind::Assembly { code: s, .. }, TextField::Code)
            | (EntityKind::Assembly { name: s, .. }, TextField::Name)
            | (EntityKind::Assembly { description: s, .. }, TextField::Description)
            | (EntityKind::Assembly { notes: s, .. }, TextField::Notes)
            | (EntityKind::Note { text: s }, TextField::Text)
            | (EntityKind::Scope { name: s, .. }, TextField::Name)
            | (EntityKind::Scope { description: s, .. }, TextField::Description)
            | (EntityKind::SymbolDefinition { name: s, .. }, TextField::Name)
            | (EntityKind::SymbolDefinition { description: s, .. }, TextField::Description)
            | (
                EntityKind::SymbolDefinition { visual_pattern_description: s, .. },
                TextField::VisualPatternDescription,
            )
            | (EntityKind::ComponentDefinition { name: s, .. }, TextField::Name)
            | (EntityKind::ComponentDefinition { description: s, .. }, TextField::Description)
            | (EntityKind::SymbolInstance { recognized_text: s, .. }, TextField::RecognizedText) => {
                Some(s)
            }
            _ => None,
        }
    };
}

macro_rules! ref_slot {
    ($kind:expr, $field:expr) => {
        match ($kind, $field) {
            (EntityKind::LegendItem { legend_id: r, .. }, RefField::LegendId)
            | (EntityKind::ScheduleItem { schedule_id: r, .. }, RefField::ScheduleId)
            | (EntityKind::Assembly { assembly_group_id: r, .. }, RefField::AssemblyGroupId)
            | (
                EntityKind::SymbolInstance { symbol_definition_id: r, .. },
                RefField::SymbolDefinitionId,
            )
            | (
                EntityKind::ComponentInstance { component_definition_id: r },
                RefField::ComponentDefinitionId,
            ) => Some(RefSlot::Required(r)),
            (EntityKind::ScheduleItem { drawing_id: r, .. }, RefField::DrawingId)
            | (EntityKind::Assembly { drawing_id: r, .. }, RefField::DrawingId)
            | (EntityKind::SymbolDefinition { defined_in_id: r, .. }, RefField::DefinedInId)
            | (EntityKind::ComponentDefinition { defined_in_id: r, .. }, RefField::DefinedInId)
            | (
                EntityKind::SymbolInstance { definition_item_id: r, .. },
                RefField::DefinitionItemId,
            ) => Some(RefSlot::Optional(r)),
            _ => None,
        }
    };
}

enum RefSlot<R, O> {
    Required(R),
    Optional(O),
}

impl EntityKind {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityKind::Drawing { .. } => EntityType::Drawing,
            EntityKind::Legend { .. } => EntityType::Legend,
            EntityKind::LegendItem { .. } => EntityType::LegendItem,
            EntityKind::Schedule { .. } => EntityType::Schedule,
            EntityKind::ScheduleItem { .. } => EntityType::ScheduleItem,
            EntityKind::AssemblyGroup { .. } => EntityType::AssemblyGroup,
            EntityKind::Assembly { .. } => EntityType::Assembly,
            EntityKind::Note { .. } => EntityType::Note,
            EntityKind::Scope { .. } => EntityType::Scope,
            EntityKind::SymbolDefinition { .. } => EntityType::SymbolDefinition,
            EntityKind::ComponentDefinition { .. } => EntityType::ComponentDefinition,
            EntityKind::SymbolInstance { .. } => EntityType::SymbolInstance,
            EntityKind::ComponentInstance { .. } => EntityType::ComponentInstance,
        }
    }

    /// A drawing with only a title.
    pub fn drawing(title: impl Into<String>) -> Self {
        EntityKind::Drawing { title: Some(title.into()), description: None }
    }

    /// A note with the given text.
    pub fn note(text: impl Into<String>) -> Self {
        EntityKind::Note { text: Some(text.into()) }
    }

    /// A scope with name and description.
    pub fn scope(name: impl Into<String>, description: impl Into<String>) -> Self {
        EntityKind::Scope {
            name: Some(name.into()),
            description: Some(description.into()),
        }
    }

    /// Read a text field; `None` if this kind has no such field.
    pub fn text(&self, field: TextField) -> Option<&Option<String>> {
        text_slot!(self, field)
    }

    /// Read an id reference; `None` if this kind has no such field.
    pub fn reference(&self, field: RefField) -> Option<Option<&EntityId>> {
        match ref_slot!(self, field)? {
            RefSlot::Required(r) => Some(Some(r)),
            RefSlot::Optional(r) => Some(r.as_ref()),
        }
    }

    fn specifications_slot(&mut self) -> Option<&mut Option<serde_json::Value>> {
        match self {
            EntityKind::ScheduleItem { specifications, .. }
            | EntityKind::Assembly { specifications, .. }
            | EntityKind::ComponentDefinition { specifications, .. } => Some(specifications),
            _ => None,
        }
    }

    fn specifications(&self) -> Option<&Option<serde_json::Value>> {
        match self {
            EntityKind::ScheduleItem { specifications, .. }
            | EntityKind::Assembly { specifications, .. }
            | EntityKind::ComponentDefinition { specifications, .. } => Some(specifications),
            _ => None,
        }
    }
}

// ============================================================================
// Field patches
// ============================================================================

/// One field value, as sent in a patch or captured from an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum Field {
    BoundingBox(Option<Rect>),
    Sheet(Option<u32>),
    Text(TextField, Option<String>),
    Ref(RefField, Option<EntityId>),
    Specifications(Option<serde_json::Value>),
    DefinitionScope(DefinitionScope),
    DefinitionItemType(Option<DefinitionItemType>),
    Flags(EntityFlags),
}

/// Names a field without carrying its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    BoundingBox,
    Sheet,
    Text(TextField),
    Ref(RefField),
    Specifications,
    DefinitionScope,
    DefinitionItemType,
    Flags,
}

impl Field {
    pub fn key(&self) -> FieldKey {
        match self {
            Field::BoundingBox(_) => FieldKey::BoundingBox,
            Field::Sheet(_) => FieldKey::Sheet,
            Field::Text(f, _) => FieldKey::Text(*f),
            Field::Ref(f, _) => FieldKey::Ref(*f),
            Field::Specifications(_) => FieldKey::Specifications,
            Field::DefinitionScope(_) => FieldKey::DefinitionScope,
            Field::DefinitionItemType(_) => FieldKey::DefinitionItemType,
            Field::Flags(_) => FieldKey::Flags,
        }
    }
}

/// A partial update: an ordered set of field values. Later values for the
/// same key win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityPatch {
    pub fields: Vec<Field>,
}

impl EntityPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field) -> Self {
        self.fields.retain(|f| f.key() != field.key());
        self.fields.push(field);
        self
    }

    pub fn bounding_box(self, rect: Rect) -> Self {
        self.with(Field::BoundingBox(Some(rect)))
    }

    pub fn text(self, field: TextField, value: impl Into<String>) -> Self {
        self.with(Field::Text(field, Some(value.into())))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.fields.iter().map(Field::key)
    }
}

// ============================================================================
// Entity and draft
// ============================================================================

/// A typed node in the annotation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    #[serde(rename = "source_sheet_number")]
    pub sheet: Option<u32>,
    #[serde(rename = "bounding_box")]
    pub bbox: Option<Rect>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub flags: EntityFlags,
    #[serde(flatten)]
    pub kind: EntityKind,
}

/// Create payload: everything but the server-assigned id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDraft {
    #[serde(rename = "source_sheet_number")]
    pub sheet: Option<u32>,
    #[serde(rename = "bounding_box")]
    pub bbox: Option<Rect>,
    #[serde(default)]
    pub flags: EntityFlags,
    #[serde(flatten)]
    pub kind: EntityKind,
}

impl EntityDraft {
    /// A draft with no anchor (conceptual node).
    pub fn new(kind: EntityKind) -> Self {
        Self { sheet: None, bbox: None, flags: EntityFlags::default(), kind }
    }

    /// Anchor the draft on a sheet at the given document-space rectangle.
    pub fn on_sheet(mut self, sheet: u32, bbox: Rect) -> Self {
        self.sheet = Some(sheet);
        self.bbox = Some(bbox);
        self
    }

    pub fn entity_type(&self) -> EntityType {
        self.kind.entity_type()
    }

    /// Anchor validation as the store performs it.
    pub fn validate(&self) -> Result<()> {
        check_anchor(self.kind.entity_type(), self.sheet, self.bbox)
    }
}

fn check_anchor(ty: EntityType, sheet: Option<u32>, bbox: Option<Rect>) -> Result<()> {
    if !ty.requires_anchor() {
        return Ok(());
    }
    match (sheet, bbox) {
        (Some(0), _) => Err(Error::Validation(format!("{ty}: sheet numbers are 1-based"))),
        (Some(_), Some(_)) => Ok(()),
        _ => Err(Error::Validation(format!(
            "{ty} requires a sheet number and a bounding box"
        ))),
    }
}

impl Entity {
    pub fn entity_type(&self) -> EntityType {
        self.kind.entity_type()
    }

    /// The payload needed to recreate this entity.
    pub fn to_draft(&self) -> EntityDraft {
        EntityDraft {
            sheet: self.sheet,
            bbox: self.bbox,
            flags: self.flags.clone(),
            kind: self.kind.clone(),
        }
    }

    /// Whether the entity is drawn on `sheet` (has a box there).
    pub fn is_on_sheet(&self, sheet: u32) -> bool {
        self.sheet == Some(sheet) && self.bbox.is_some()
    }

    /// Current value of a field, or `None` if this kind does not carry it.
    pub fn get(&self, key: FieldKey) -> Option<Field> {
        match key {
            FieldKey::BoundingBox => Some(Field::BoundingBox(self.bbox)),
            FieldKey::Sheet => Some(Field::Sheet(self.sheet)),
            FieldKey::Flags => Some(Field::Flags(self.flags.clone())),
            FieldKey::Text(f) => self.kind.text(f).map(|v| Field::Text(f, v.clone())),
            FieldKey::Ref(f) => self.kind.reference(f).map(|v| Field::Ref(f, v.cloned())),
            FieldKey::Specifications => {
                self.kind.specifications().map(|v| Field::Specifications(v.clone()))
            }
            FieldKey::DefinitionScope => match &self.kind {
                EntityKind::SymbolDefinition { scope, .. }
                | EntityKind::ComponentDefinition { scope, .. } => {
                    Some(Field::DefinitionScope(*scope))
                }
                _ => None,
            },
            FieldKey::DefinitionItemType => match &self.kind {
                EntityKind::SymbolInstance { definition_item_type, .. } => {
                    Some(Field::DefinitionItemType(*definition_item_type))
                }
                _ => None,
            },
        }
    }

    /// Snapshot the current values of every field `patch` touches. This is
    /// the `before` half of an edit.
    pub fn capture(&self, patch: &EntityPatch) -> Result<EntityPatch> {
        let mut before = EntityPatch::new();
        for key in patch.keys() {
            let field = self
                .get(key)
                .ok_or_else(|| not_applicable(self.entity_type(), key))?;
            before = before.with(field);
        }
        Ok(before)
    }

    /// Apply a patch atomically: either every field lands or none does.
    pub fn apply(&mut self, patch: &EntityPatch) -> Result<()> {
        let mut next = self.clone();
        for field in &patch.fields {
            next.set(field.clone())?;
        }
        check_anchor(next.entity_type(), next.sheet, next.bbox)?;
        *self = next;
        Ok(())
    }

    fn set(&mut self, field: Field) -> Result<()> {
        let ty = self.entity_type();
        let key = field.key();
        match field {
            Field::BoundingBox(v) => self.bbox = v,
            Field::Sheet(v) => self.sheet = v,
            Field::Flags(v) => self.flags = v,
            Field::Text(f, v) => {
                let slot = text_slot!(&mut self.kind, f).ok_or_else(|| not_applicable(ty, key))?;
                *slot = v;
            }
            Field::Ref(f, v) => match ref_slot!(&mut self.kind, f) {
                Some(RefSlot::Required(slot)) => {
                    *slot = v.ok_or_else(|| {
                        Error::Validation(format!("{f:?} is required and cannot be cleared"))
                    })?;
                }
                Some(RefSlot::Optional(slot)) => *slot = v,
                None => return Err(not_applicable(ty, key)),
            },
            Field::Specifications(v) => {
                let slot = self
                    .kind
                    .specifications_slot()
                    .ok_or_else(|| not_applicable(ty, key))?;
                *slot = v;
            }
            Field::DefinitionScope(v) => match &mut self.kind {
                EntityKind::SymbolDefinition { scope, .. }
                | EntityKind::ComponentDefinition { scope, .. } => *scope = v,
                _ => return Err(not_applicable(ty, key)),
            },
            Field::DefinitionItemType(v) => match &mut self.kind {
                EntityKind::SymbolInstance { definition_item_type, .. } => {
                    *definition_item_type = v
                }
                _ => return Err(not_applicable(ty, key)),
            },
        }
        Ok(())
    }
}

fn not_applicable(ty: EntityType, key: FieldKey) -> Error {
    Error::Validation(format!("{ty} has no field {key:?}"))
}
