use crate::core::{identifiers::IdGroup, value::Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a header column plays for the entity being built from a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Id,
    StartId,
    EndId,
    Type,
    Property,
    Label,
    Ignore,
}

impl FieldKind {
    /// Resolves the `:KIND` suffix of a header column.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.trim().to_ascii_uppercase().as_str() {
            "ID" => Some(FieldKind::Id),
            "START_ID" => Some(FieldKind::StartId),
            "END_ID" => Some(FieldKind::EndId),
            "TYPE" => Some(FieldKind::Type),
            "LABEL" => Some(FieldKind::Label),
            "IGNORE" => Some(FieldKind::Ignore),
            _ => None,
        }
    }
}

/// Reference to an entity by id, scoped to an id group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub value: Value,
    pub group: Option<IdGroup>,
}

impl EntityRef {
    pub fn new(value: Value, group: Option<IdGroup>) -> Self {
        EntityRef { value, group }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{group}:{}", self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// One extracted column value, tagged by the role it plays.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Id(EntityRef),
    StartId(EntityRef),
    EndId(EntityRef),
    Type(String),
    Property { name: String, value: Value },
    Labels(Vec<String>),
    Ignore,
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Id(_) => FieldKind::Id,
            FieldValue::StartId(_) => FieldKind::StartId,
            FieldValue::EndId(_) => FieldKind::EndId,
            FieldValue::Type(_) => FieldKind::Type,
            FieldValue::Property { .. } => FieldKind::Property,
            FieldValue::Labels(_) => FieldKind::Label,
            FieldValue::Ignore => FieldKind::Ignore,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Relationship,
}

/// A node or relationship assembled from one input row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputEntity {
    pub line: u64,
    pub id: Option<EntityRef>,
    pub start_id: Option<EntityRef>,
    pub end_id: Option<EntityRef>,
    pub rel_type: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Value)>,
}

impl InputEntity {
    pub fn new(line: u64) -> Self {
        InputEntity {
            line,
            ..Default::default()
        }
    }

    pub fn apply(&mut self, field: FieldValue) {
        match field {
            FieldValue::Id(id) => self.id = Some(id),
            FieldValue::StartId(id) => self.start_id = Some(id),
            FieldValue::EndId(id) => self.end_id = Some(id),
            FieldValue::Type(t) => self.rel_type = Some(t),
            FieldValue::Property { name, value } => self.properties.push((name, value)),
            FieldValue::Labels(labels) => self.labels.extend(labels),
            FieldValue::Ignore => {}
        }
    }

    pub fn kind(&self) -> EntityKind {
        if self.start_id.is_some() || self.end_id.is_some() || self.rel_type.is_some() {
            EntityKind::Relationship
        } else {
            EntityKind::Node
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty()
    }
}
