use crate::core::data_type::DataType;
use serde::{Deserialize, Serialize};
use std::{fmt, hash::Hash};

/// A typed property or identifier value extracted from an input record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    StringArray(Vec<String>),
    BooleanArray(Vec<bool>),
    Null,
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Int(v) => v.hash(state),
            Float(v) => {
                // Hash the bits of the float to handle NaN and -0.0 correctly
                v.to_bits().hash(state);
            }
            String(v) => v.hash(state),
            Boolean(v) => v.hash(state),
            IntArray(v) => v.hash(state),
            FloatArray(v) => {
                for f in v {
                    f.to_bits().hash(state);
                }
            }
            StringArray(v) => v.hash(state),
            BooleanArray(v) => v.hash(state),
            Null => {}
        }
    }
}

impl Value {
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::String(v) => Some(v.clone()),
            Value::Boolean(v) => Some(v.to_string()),
            Value::Null => None,
            array => Some(array.to_string()),
        }
    }

    /// Array values with no elements carry no information and are dropped
    /// before they reach an entity.
    pub fn is_empty_array(&self) -> bool {
        match self {
            Value::IntArray(v) => v.is_empty(),
            Value::FloatArray(v) => v.is_empty(),
            Value::StringArray(v) => v.is_empty(),
            Value::BooleanArray(v) => v.is_empty(),
            _ => false,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Long,
            Value::Float(_) => DataType::Double,
            Value::String(_) | Value::Null => DataType::String,
            Value::Boolean(_) => DataType::Boolean,
            Value::IntArray(_) => DataType::Array(Box::new(DataType::Long)),
            Value::FloatArray(_) => DataType::Array(Box::new(DataType::Double)),
            Value::StringArray(_) => DataType::Array(Box::new(DataType::String)),
            Value::BooleanArray(_) => DataType::Array(Box::new(DataType::Boolean)),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::IntArray(v) => write!(f, "[{}]", join(v)),
            Value::FloatArray(v) => write!(f, "[{}]", join(v)),
            Value::StringArray(v) => write!(f, "[{}]", v.join(";")),
            Value::BooleanArray(v) => write!(f, "[{}]", join(v)),
            Value::Null => f.write_str("null"),
        }
    }
}
