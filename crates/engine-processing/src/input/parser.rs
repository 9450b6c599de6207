use super::{extract::extract, header::Header};
use model::{
    core::value::Value,
    records::{
        entity::{EntityRef, FieldKind, FieldValue, InputEntity},
        row::RawRow,
        skip::SkipReason,
    },
};
use std::sync::Arc;

/// Turns raw rows of one source into entities according to its header.
#[derive(Debug, Clone)]
pub struct EntityParser {
    header: Arc<Header>,
    source: String,
}

impl EntityParser {
    pub fn new(header: Header, source: impl Into<String>) -> Self {
        EntityParser {
            header: Arc::new(header),
            source: source.into(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Description of the data source, used in skip reports.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Builds the entity of `row`. Columns past the header are ignored here;
    /// see `extra_columns`. A short row yields an entity with what it has.
    pub fn parse(&self, row: &RawRow) -> Result<InputEntity, SkipReason> {
        let mut entity = InputEntity::new(row.line);

        for (index, (entry, raw)) in self.header.entries().iter().zip(&row.fields).enumerate() {
            if entry.kind == FieldKind::Ignore {
                continue;
            }

            let value =
                extract(raw, &entry.value_type).map_err(|message| SkipReason::InvalidValue {
                    field: index + 1,
                    entry: entry.to_string(),
                    raw: raw.clone(),
                    message,
                })?;
            let Some(value) = value else {
                continue;
            };

            let field = match entry.kind {
                FieldKind::Id => {
                    // A named id column is also stored as a property.
                    if let Some(name) = &entry.name {
                        entity.apply(FieldValue::Property {
                            name: name.clone(),
                            value: value.clone(),
                        });
                    }
                    FieldValue::Id(EntityRef::new(value, entry.group.clone()))
                }
                FieldKind::StartId => FieldValue::StartId(EntityRef::new(value, entry.group.clone())),
                FieldKind::EndId => FieldValue::EndId(EntityRef::new(value, entry.group.clone())),
                FieldKind::Type => FieldValue::Type(value.as_string().unwrap_or_default()),
                FieldKind::Label => FieldValue::Labels(match value {
                    Value::StringArray(labels) => labels,
                    other => other.as_string().into_iter().collect(),
                }),
                FieldKind::Property if value.is_empty_array() => continue,
                FieldKind::Property => FieldValue::Property {
                    name: entry.name.clone().unwrap_or_default(),
                    value,
                },
                FieldKind::Ignore => continue,
            };
            entity.apply(field);
        }

        Ok(entity)
    }

    /// Reports columns beyond the header. The entity is still imported.
    pub fn extra_columns(&self, row: &RawRow) -> Option<SkipReason> {
        let count = row.len().saturating_sub(self.header.len());
        (count > 0).then_some(SkipReason::ExtraColumns { count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::records::entity::EntityKind;

    fn row(line: u64, fields: &[&str]) -> RawRow {
        RawRow::new(line, fields.iter().map(|f| f.to_string()).collect())
    }

    fn parser(columns: &[&str]) -> EntityParser {
        EntityParser::new(Header::parse(columns).unwrap(), "test.csv")
    }

    #[test]
    fn parses_node_rows() {
        let parser = parser(&["id:ID(people)", "name", "age:int", "nick:string[]", ":LABEL"]);
        let entity = parser
            .parse(&row(2, &["7", "Ada", "36", "", "Person;Engineer"]))
            .unwrap();

        assert_eq!(entity.kind(), EntityKind::Node);
        assert_eq!(entity.id.as_ref().unwrap().to_string(), "people:7");
        assert_eq!(entity.property("id"), Some(&Value::String("7".into())));
        assert_eq!(entity.property("age"), Some(&Value::Int(36)));
        assert_eq!(entity.property("nick"), None);
        assert_eq!(entity.labels, vec!["Person", "Engineer"]);
        assert_eq!(entity.line, 2);
    }

    #[test]
    fn parses_relationship_rows() {
        let parser = parser(&[":START_ID(people)", ":END_ID(movies)", ":TYPE", "roles:string[]"]);
        let entity = parser.parse(&row(5, &["1", "m1", "ACTED_IN", ";"])).unwrap();

        assert_eq!(entity.kind(), EntityKind::Relationship);
        assert_eq!(entity.start_id.as_ref().unwrap().to_string(), "people:1");
        assert_eq!(entity.rel_type.as_deref(), Some("ACTED_IN"));
        assert!(!entity.has_properties());
    }

    #[test]
    fn invalid_value_skips_the_record() {
        let parser = parser(&[":ID", "age:int"]);
        let reason = parser.parse(&row(3, &["1", "old"])).unwrap_err();

        match reason {
            SkipReason::InvalidValue {
                field, entry, raw, ..
            } => {
                assert_eq!(field, 2);
                assert_eq!(entry, "age:int");
                assert_eq!(raw, "old");
            }
            other => panic!("unexpected reason {other:?}"),
        }
    }

    #[test]
    fn short_rows_keep_what_they_have_and_extra_columns_are_reported() {
        let parser = parser(&[":ID", "name", "age:int"]);

        let short = parser.parse(&row(1, &["1"])).unwrap();
        assert!(short.id.is_some());
        assert!(!short.has_properties());

        let long = row(2, &["1", "a", "3", "x", "y"]);
        assert!(parser.parse(&long).is_ok());
        assert_eq!(
            parser.extra_columns(&long),
            Some(SkipReason::ExtraColumns { count: 2 })
        );
        assert_eq!(parser.extra_columns(&row(9, &["1", "a", "3"])), None);
    }
}
