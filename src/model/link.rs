//! Relationship (link) between two entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// Opaque server-assigned link identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub String);

impl LinkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Relation type of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    /// scope → evidence (instance, note, drawing...)
    JustifiedBy,
    /// instance → space/drawing it sits in
    LocatedIn,
    /// drawing → what it depicts
    Depicts,
}

impl std::fmt::Display for RelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RelType::JustifiedBy => "JUSTIFIED_BY",
            RelType::LocatedIn => "LOCATED_IN",
            RelType::Depicts => "DEPICTS",
        })
    }
}

/// The `(type, source, target)` triple identifying a link by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkSpec {
    pub rel_type: RelType,
    #[serde(rename = "source_id")]
    pub source: EntityId,
    #[serde(rename = "target_id")]
    pub target: EntityId,
}

impl LinkSpec {
    pub fn new(rel_type: RelType, source: impl Into<EntityId>, target: impl Into<EntityId>) -> Self {
        Self { rel_type, source: source.into(), target: target.into() }
    }

    /// Whether `id` is either endpoint.
    pub fn touches(&self, id: &EntityId) -> bool {
        &self.source == id || &self.target == id
    }
}

impl std::fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})-[:{}]->({})", self.source, self.rel_type, self.target)
    }
}

/// A directed, typed edge as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    #[serde(flatten)]
    pub spec: LinkSpec,
    pub created_at: DateTime<Utc>,
}

impl Link {
    pub fn matches(&self, spec: &LinkSpec) -> bool {
        &self.spec == spec
    }
}
