use model::{
    mutation::{Entry, KeyMutation, StoreKey},
    records::{
        entity::{EntityKind, InputEntity},
        skip::SkipReason,
    },
};
use thiserror::Error;

/// Column present on every node key, so a node without properties or labels
/// still exists in the store.
pub const NODE_MARKER: &str = "~node";
pub const PROPERTY_PREFIX: &str = "p:";
pub const LABEL_PREFIX: &str = "l:";
pub const OUT_EDGE_PREFIX: &str = "o:";
pub const IN_EDGE_PREFIX: &str = "i:";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("{0}")]
    Skip(#[from] SkipReason),

    #[error("Failed to serialize value: {0}")]
    Serialize(#[from] bincode::Error),
}

/// Maps entities onto store keys.
///
/// A node becomes one key, `group:id`, carrying a marker column, one column
/// per property and one per label. A relationship becomes an out-edge column
/// on its start key and an in-edge column on its end key; both carry the
/// relationship's properties. Values are bincode encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Encoder
    }

    pub fn encode(&self, entity: &InputEntity) -> Result<Vec<(StoreKey, KeyMutation)>, EncodeError> {
        match entity.kind() {
            EntityKind::Node => self.encode_node(entity).map(|m| vec![m]),
            EntityKind::Relationship => self.encode_relationship(entity),
        }
    }

    fn encode_node(&self, entity: &InputEntity) -> Result<(StoreKey, KeyMutation), EncodeError> {
        let id = entity
            .id
            .as_ref()
            .ok_or_else(|| SkipReason::MissingIdentifier("node".into()))?;

        let mut additions =
            Vec::with_capacity(1 + entity.properties.len() + entity.labels.len());
        additions.push(Entry::new(NODE_MARKER, Vec::new()));
        for (name, value) in &entity.properties {
            additions.push(Entry::new(
                format!("{PROPERTY_PREFIX}{name}"),
                bincode::serialize(value)?,
            ));
        }
        for label in &entity.labels {
            additions.push(Entry::new(format!("{LABEL_PREFIX}{label}"), Vec::new()));
        }

        Ok((
            StoreKey::from(id.to_string()),
            KeyMutation::additions_only(additions),
        ))
    }

    fn encode_relationship(
        &self,
        entity: &InputEntity,
    ) -> Result<Vec<(StoreKey, KeyMutation)>, EncodeError> {
        let start = entity
            .start_id
            .as_ref()
            .ok_or_else(|| SkipReason::MissingEndpoint("start".into()))?;
        let end = entity
            .end_id
            .as_ref()
            .ok_or_else(|| SkipReason::MissingEndpoint("end".into()))?;
        let rel_type = entity.rel_type.as_deref().ok_or(SkipReason::MissingType)?;

        let properties = bincode::serialize(&entity.properties)?;
        // The line number keeps parallel edges of the same type apart.
        let out_edge = Entry::new(
            format!("{OUT_EDGE_PREFIX}{rel_type}:{end}:{}", entity.line),
            properties.clone(),
        );
        let in_edge = Entry::new(
            format!("{IN_EDGE_PREFIX}{rel_type}:{start}:{}", entity.line),
            properties,
        );

        Ok(vec![
            (
                StoreKey::from(start.to_string()),
                KeyMutation::additions_only(vec![out_edge]),
            ),
            (
                StoreKey::from(end.to_string()),
                KeyMutation::additions_only(vec![in_edge]),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::{identifiers::IdGroup, value::Value};
    use model::records::entity::EntityRef;

    fn id(group: &str, value: &str) -> Option<EntityRef> {
        Some(EntityRef::new(
            Value::String(value.into()),
            Some(IdGroup::new(group)),
        ))
    }

    #[test]
    fn encodes_nodes_under_group_and_id() {
        let mut node = InputEntity::new(1);
        node.id = id("people", "7");
        node.properties.push(("age".into(), Value::Int(36)));
        node.labels.push("Person".into());

        let encoded = Encoder::new().encode(&node).unwrap();
        assert_eq!(encoded.len(), 1);
        let (key, mutation) = &encoded[0];
        assert_eq!(key, &StoreKey::from("people:7"));

        let columns: Vec<String> = mutation
            .additions()
            .iter()
            .map(|e| String::from_utf8(e.column.clone()).unwrap())
            .collect();
        assert_eq!(columns, vec!["~node", "p:age", "l:Person"]);

        let age: Value = bincode::deserialize(&mutation.additions()[1].value).unwrap();
        assert_eq!(age, Value::Int(36));
    }

    #[test]
    fn encodes_relationships_on_both_endpoints() {
        let mut rel = InputEntity::new(4);
        rel.start_id = id("people", "1");
        rel.end_id = id("movies", "m1");
        rel.rel_type = Some("ACTED_IN".into());

        let encoded = Encoder::new().encode(&rel).unwrap();
        assert_eq!(encoded[0].0, StoreKey::from("people:1"));
        assert_eq!(
            encoded[0].1.additions()[0].column,
            b"o:ACTED_IN:movies:m1:4".to_vec()
        );
        assert_eq!(encoded[1].0, StoreKey::from("movies:m1"));
        assert_eq!(
            encoded[1].1.additions()[0].column,
            b"i:ACTED_IN:people:1:4".to_vec()
        );
    }

    #[test]
    fn entities_without_identity_are_skipped() {
        let orphan = InputEntity::new(2);
        assert!(matches!(
            Encoder::new().encode(&orphan),
            Err(EncodeError::Skip(SkipReason::MissingIdentifier(_)))
        ));

        let mut untyped = InputEntity::new(3);
        untyped.start_id = id("a", "1");
        untyped.end_id = id("a", "2");
        assert!(matches!(
            Encoder::new().encode(&untyped),
            Err(EncodeError::Skip(SkipReason::MissingType))
        ));
    }
}
