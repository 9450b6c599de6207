use engine_core::error::InputError;
use model::{
    core::{data_type::DataType, identifiers::IdGroup},
    records::entity::FieldKind,
};
use std::fmt;

/// One column of the input header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub name: Option<String>,
    pub kind: FieldKind,
    pub group: Option<IdGroup>,
    pub value_type: DataType,
}

impl HeaderEntry {
    /// Parses a column definition: `name`, `name:type`, `name:KIND` or
    /// `name:KIND(group)`. The name may be empty for non-property columns.
    pub fn parse(column: &str) -> Result<Self, InputError> {
        let column = column.trim();
        let Some((name, suffix)) = column.rsplit_once(':') else {
            return Self::property(column, "string");
        };

        let (marker, group) = match suffix.split_once('(') {
            Some((marker, rest)) => {
                let group = rest.strip_suffix(')').ok_or_else(|| {
                    InputError::Header(format!("unclosed group in column '{column}'"))
                })?;
                (marker, Some(group.trim()))
            }
            None => (suffix, None),
        };

        let Some(kind) = FieldKind::from_marker(marker) else {
            if group.is_some() {
                return Err(InputError::Header(format!(
                    "only id columns take a group: '{column}'"
                )));
            }
            return Self::property(name, suffix);
        };

        let group = match (kind, group) {
            (FieldKind::Id | FieldKind::StartId | FieldKind::EndId, Some(g)) if !g.is_empty() => {
                Some(IdGroup::new(g))
            }
            (FieldKind::Id | FieldKind::StartId | FieldKind::EndId, _) => None,
            (_, None) => None,
            (_, Some(_)) => {
                return Err(InputError::Header(format!(
                    "only id columns take a group: '{column}'"
                )));
            }
        };
        let value_type = match kind {
            FieldKind::Label => DataType::Array(Box::new(DataType::String)),
            _ => DataType::String,
        };

        Ok(HeaderEntry {
            name: (!name.trim().is_empty()).then(|| name.trim().to_string()),
            kind,
            group,
            value_type,
        })
    }

    fn property(name: &str, type_name: &str) -> Result<Self, InputError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InputError::Header(format!(
                "property column of type '{type_name}' has no name"
            )));
        }
        let value_type = DataType::from_name(type_name).map_err(InputError::Header)?;
        Ok(HeaderEntry {
            name: Some(name.to_string()),
            kind: FieldKind::Property,
            group: None,
            value_type,
        })
    }
}

impl fmt::Display for HeaderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("");
        match (self.kind, &self.group) {
            (FieldKind::Property, _) => write!(f, "{name}:{}", self.value_type),
            (kind, Some(group)) => write!(f, "{name}:{kind:?}({group})"),
            (kind, None) => write!(f, "{name}:{kind:?}"),
        }
    }
}

/// Column layout shared by every row of one input source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    entries: Vec<HeaderEntry>,
}

impl Header {
    pub fn parse<S: AsRef<str>>(columns: &[S]) -> Result<Self, InputError> {
        let entries = columns
            .iter()
            .map(|c| HeaderEntry::parse(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let header = Header { entries };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<(), InputError> {
        if self.entries.is_empty() {
            return Err(InputError::Header("header has no columns".into()));
        }

        let count = |kind: FieldKind| self.entries.iter().filter(|e| e.kind == kind).count();
        for kind in [FieldKind::Id, FieldKind::StartId, FieldKind::EndId, FieldKind::Type] {
            if count(kind) > 1 {
                return Err(InputError::Header(format!("more than one {kind:?} column")));
            }
        }

        let relationship = count(FieldKind::StartId) + count(FieldKind::EndId);
        if relationship == 1 {
            return Err(InputError::Header(
                "relationship header needs both START_ID and END_ID".into(),
            ));
        }
        if relationship > 0 && count(FieldKind::Id) > 0 {
            return Err(InputError::Header(
                "header mixes node ID with relationship endpoints".into(),
            ));
        }
        Ok(())
    }

    pub fn entries(&self) -> &[HeaderEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_relationship(&self) -> bool {
        self.entries.iter().any(|e| e.kind == FieldKind::StartId)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_header() {
        let header = Header::parse(&["id:ID(people)", "name", "age:int", "tags:string[]", ":LABEL"])
            .unwrap();
        let entries = header.entries();

        assert_eq!(entries[0].kind, FieldKind::Id);
        assert_eq!(entries[0].group, Some(IdGroup::new("people")));
        assert_eq!(entries[0].name.as_deref(), Some("id"));
        assert_eq!(entries[1].value_type, DataType::String);
        assert_eq!(entries[2].value_type, DataType::Int);
        assert!(entries[3].value_type.is_array());
        assert_eq!(entries[4].kind, FieldKind::Label);
        assert_eq!(entries[4].name, None);
        assert!(!header.is_relationship());
    }

    #[test]
    fn parses_relationship_header() {
        let header =
            Header::parse(&[":START_ID(people)", ":END_ID(movies)", ":TYPE", "role", ":IGNORE"])
                .unwrap();
        assert!(header.is_relationship());
        assert_eq!(header.entries()[1].group, Some(IdGroup::new("movies")));
        assert_eq!(header.entries()[4].kind, FieldKind::Ignore);
        assert_eq!(header.to_string(), ":StartId(people),:EndId(movies),:Type,role:string,:Ignore");
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(Header::parse(&[":int"]).is_err());
        assert!(Header::parse(&["a:point"]).is_err());
        assert!(Header::parse(&[":ID", ":ID"]).is_err());
        assert!(Header::parse(&[":START_ID", "x"]).is_err());
        assert!(Header::parse(&[":ID", ":START_ID", ":END_ID"]).is_err());
        assert!(Header::parse(&["x:TYPE(g)"]).is_err());
        assert!(Header::parse(&["x:ID(g"]).is_err());
        assert!(Header::parse::<&str>(&[]).is_err());
    }
}
