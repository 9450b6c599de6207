use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a header column. Integral and floating types collapse to
/// 64-bit values once extracted; the distinction only survives in the header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataType {
    String,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Array(Box<DataType>),
}

impl DataType {
    /// Resolves a header type name such as `int`, `string[]` or `boolean`.
    pub fn from_name(type_name: &str) -> Result<Self, String> {
        let normalized = type_name.trim().to_ascii_lowercase();

        if let Some(inner) = normalized.strip_suffix("[]") {
            let element = Self::from_name(inner)?;
            if matches!(element, DataType::Array(_)) {
                return Err(format!("Nested arrays are not supported: {type_name}"));
            }
            return Ok(DataType::Array(Box::new(element)));
        }

        match normalized.as_str() {
            "string" | "str" | "" => Ok(DataType::String),
            "int" | "short" | "byte" => Ok(DataType::Int),
            "long" => Ok(DataType::Long),
            "float" => Ok(DataType::Float),
            "double" => Ok(DataType::Double),
            "boolean" | "bool" => Ok(DataType::Boolean),
            _ => Err(format!("Unknown column type: {type_name}")),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DataType::Array(_))
    }

    pub fn name(&self) -> String {
        match self {
            DataType::String => "string".to_string(),
            DataType::Int => "int".to_string(),
            DataType::Long => "long".to_string(),
            DataType::Float => "float".to_string(),
            DataType::Double => "double".to_string(),
            DataType::Boolean => "boolean".to_string(),
            DataType::Array(inner) => format!("{}[]", inner.name()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_and_array_names() {
        assert_eq!(DataType::from_name("INT").unwrap(), DataType::Int);
        assert_eq!(
            DataType::from_name("string[]").unwrap(),
            DataType::Array(Box::new(DataType::String))
        );
        assert!(DataType::from_name("int[][]").is_err());
        assert!(DataType::from_name("point").is_err());
    }
}
