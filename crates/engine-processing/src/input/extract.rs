use model::core::{data_type::DataType, value::Value};
use std::str::FromStr;

/// Separator between elements of an array field.
pub const ARRAY_DELIMITER: char = ';';

/// Extracts a typed value from a raw field. `Ok(None)` for an empty field,
/// which leaves the value absent rather than null.
pub fn extract(raw: &str, value_type: &DataType) -> Result<Option<Value>, String> {
    if raw.is_empty() {
        return Ok(None);
    }

    let value = match value_type {
        DataType::String => Value::String(raw.to_string()),
        DataType::Int | DataType::Long => Value::Int(number(raw)?),
        DataType::Float | DataType::Double => Value::Float(number(raw)?),
        DataType::Boolean => Value::Boolean(boolean(raw)?),
        DataType::Array(element) => array(raw, element)?,
    };
    Ok(Some(value))
}

fn number<T: FromStr>(raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| format!("not a number: {e}"))
}

fn boolean(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("not a boolean: '{other}'")),
    }
}

fn array(raw: &str, element: &DataType) -> Result<Value, String> {
    let items = raw
        .split(ARRAY_DELIMITER)
        .map(str::trim)
        .filter(|item| !item.is_empty());

    let value = match element {
        DataType::String => Value::StringArray(items.map(str::to_string).collect()),
        DataType::Int | DataType::Long => {
            Value::IntArray(items.map(number::<i64>).collect::<Result<Vec<_>, String>>()?)
        }
        DataType::Float | DataType::Double => {
            Value::FloatArray(items.map(number::<f64>).collect::<Result<Vec<_>, String>>()?)
        }
        DataType::Boolean => {
            Value::BooleanArray(items.map(boolean).collect::<Result<Vec<_>, String>>()?)
        }
        DataType::Array(_) => return Err("nested arrays are not supported".into()),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_scalars() {
        assert_eq!(extract("42", &DataType::Int), Ok(Some(Value::Int(42))));
        assert_eq!(extract(" 1.5 ", &DataType::Double), Ok(Some(Value::Float(1.5))));
        assert_eq!(extract("TRUE", &DataType::Boolean), Ok(Some(Value::Boolean(true))));
        assert_eq!(
            extract(" padded ", &DataType::String),
            Ok(Some(Value::String(" padded ".into())))
        );
        assert_eq!(extract("", &DataType::Int), Ok(None));
    }

    #[test]
    fn extracts_arrays() {
        let ints = DataType::Array(Box::new(DataType::Int));
        assert_eq!(
            extract("1;2; 3", &ints),
            Ok(Some(Value::IntArray(vec![1, 2, 3])))
        );
        let strings = DataType::Array(Box::new(DataType::String));
        let empty = extract(";", &strings).unwrap().unwrap();
        assert!(empty.is_empty_array());
    }

    #[test]
    fn reports_unparseable_values() {
        assert!(extract("abc", &DataType::Int).is_err());
        assert!(extract("yes", &DataType::Boolean).is_err());
        assert!(extract("1;x", &DataType::Array(Box::new(DataType::Long))).is_err());
    }
}
