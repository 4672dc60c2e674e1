//! Avro schema helpers: sink schema generation, column inference and
//! backward-compatibility checks, all on the JSON form of Avro schemas.

use std::sync::Arc;

use arrow_schema::{DataType, Field, FieldRef};
use eddy_sql::ColumnDefinition;
use serde_json::{json, Value};

/// Name of records generated for sink value schemas.
pub const SINK_RECORD_NAME: &str = "EddyDataSourceSchema";
/// Namespace of generated records.
pub const SINK_RECORD_NAMESPACE: &str = "io.eddy.avro";

/// Errors converting between Avro and Arrow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AvroError {
    /// The schema is not valid JSON.
    #[error("invalid Avro schema JSON: {0}")]
    InvalidJson(String),

    /// The schema shape is not supported.
    #[error("{0}")]
    Unsupported(String),
}

/// Builds the value schema for a sink from its value columns.
///
/// Every field becomes an optional (`["null", T]`) field defaulting to null.
///
/// # Errors
///
/// Returns `AvroError::Unsupported` if a column type has no Avro equivalent.
pub fn sink_value_schema<'a>(
    fields: impl IntoIterator<Item = &'a FieldRef>,
) -> Result<String, AvroError> {
    let fields = fields
        .into_iter()
        .map(|field| -> Result<Value, AvroError> {
            Ok(json!({
                "name": field.name(),
                "type": ["null", arrow_to_avro_type(field.data_type())?],
                "default": null,
            }))
        })
        .collect::<Result<Vec<_>, AvroError>>()?;

    let schema = json!({
        "type": "record",
        "name": SINK_RECORD_NAME,
        "namespace": SINK_RECORD_NAMESPACE,
        "fields": fields,
    });
    Ok(schema.to_string())
}

fn arrow_to_avro_type(data_type: &DataType) -> Result<Value, AvroError> {
    let primitive = match data_type {
        DataType::Boolean => "boolean",
        DataType::Int8 | DataType::Int16 | DataType::Int32 => "int",
        DataType::Int64 => "long",
        DataType::Float32 | DataType::Float64 => "double",
        DataType::Utf8 | DataType::LargeUtf8 => "string",
        DataType::List(item) => {
            return Ok(json!({
                "type": "array",
                "items": ["null", arrow_to_avro_type(item.data_type())?],
            }))
        }
        other => {
            return Err(AvroError::Unsupported(format!(
                "No Avro equivalent for column type: {other}"
            )))
        }
    };
    Ok(Value::String(primitive.to_string()))
}

/// Infers value columns from an Avro record schema.
///
/// Field names are upper-cased; optional unions are unwrapped.
///
/// # Errors
///
/// Returns `AvroError` if the schema is not a record or uses a type that
/// has no column equivalent.
pub fn value_columns(schema: &str) -> Result<Vec<ColumnDefinition>, AvroError> {
    let avro: Value =
        serde_json::from_str(schema).map_err(|e| AvroError::InvalidJson(e.to_string()))?;

    let fields = avro
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AvroError::Unsupported("Avro value schema must be a record with fields".to_string())
        })?;

    fields
        .iter()
        .map(|field| -> Result<ColumnDefinition, AvroError> {
            let name = field.get("name").and_then(Value::as_str).ok_or_else(|| {
                AvroError::Unsupported("Avro field missing 'name'".to_string())
            })?;
            let avro_type = field.get("type").ok_or_else(|| {
                AvroError::Unsupported(format!("Avro field '{name}' missing 'type'"))
            })?;
            Ok(ColumnDefinition::new(
                name.to_ascii_uppercase(),
                avro_to_arrow_type(avro_type)?,
            ))
        })
        .collect()
}

fn avro_to_arrow_type(avro_type: &Value) -> Result<DataType, AvroError> {
    match avro_type {
        Value::String(s) => avro_primitive_to_arrow(s),
        Value::Array(union) => {
            let non_null: Vec<&Value> = union
                .iter()
                .filter(|v| v.as_str() != Some("null"))
                .collect();
            match non_null.as_slice() {
                [single] => avro_to_arrow_type(single),
                _ => Err(AvroError::Unsupported(format!(
                    "Unsupported Avro union: {avro_type}"
                ))),
            }
        }
        Value::Object(obj) => match obj.get("type") {
            Some(Value::String(t)) if t == "array" => {
                let items = obj.get("items").ok_or_else(|| {
                    AvroError::Unsupported("Avro array missing 'items'".to_string())
                })?;
                Ok(DataType::List(Arc::new(Field::new(
                    "item",
                    avro_to_arrow_type(items)?,
                    true,
                ))))
            }
            Some(Value::String(t)) if t != "record" && t != "map" && t != "enum" => {
                avro_primitive_to_arrow(t)
            }
            _ => Err(AvroError::Unsupported(format!(
                "Unsupported Avro type: {avro_type}"
            ))),
        },
        other => Err(AvroError::Unsupported(format!(
            "Unsupported Avro type: {other}"
        ))),
    }
}

fn avro_primitive_to_arrow(avro_type: &str) -> Result<DataType, AvroError> {
    match avro_type {
        "boolean" => Ok(DataType::Boolean),
        "int" => Ok(DataType::Int32),
        "long" => Ok(DataType::Int64),
        "float" | "double" => Ok(DataType::Float64),
        "string" => Ok(DataType::Utf8),
        other => Err(AvroError::Unsupported(format!(
            "Unsupported Avro type: '{other}'"
        ))),
    }
}

/// Whether data written with `writer` can be read with `reader`.
///
/// Applies Avro schema resolution: reader fields missing from the writer
/// need a default, numeric types may widen, and unions resolve branch by
/// branch. Unparseable schemas are never compatible.
#[must_use]
pub fn is_backward_compatible(reader: &str, writer: &str) -> bool {
    match (
        serde_json::from_str::<Value>(reader),
        serde_json::from_str::<Value>(writer),
    ) {
        (Ok(reader), Ok(writer)) => can_read(&reader, &writer),
        _ => false,
    }
}

fn can_read(reader: &Value, writer: &Value) -> bool {
    match (reader, writer) {
        (Value::Array(readers), Value::Array(writers)) => writers
            .iter()
            .all(|w| readers.iter().any(|r| can_read(r, w))),
        (Value::Array(readers), _) => readers.iter().any(|r| can_read(r, writer)),
        (_, Value::Array(writers)) => writers.iter().all(|w| can_read(reader, w)),
        _ => match (type_name(reader), type_name(writer)) {
            (Some("record"), Some("record")) => record_readable(reader, writer),
            (Some("array"), Some("array")) => match (reader.get("items"), writer.get("items")) {
                (Some(r), Some(w)) => can_read(r, w),
                _ => false,
            },
            (Some("map"), Some("map")) => match (reader.get("values"), writer.get("values")) {
                (Some(r), Some(w)) => can_read(r, w),
                _ => false,
            },
            (Some(r), Some(w)) => r == w || promotes_to(w, r),
            _ => false,
        },
    }
}

fn record_readable(reader: &Value, writer: &Value) -> bool {
    let (Some(reader_fields), Some(writer_fields)) = (
        reader.get("fields").and_then(Value::as_array),
        writer.get("fields").and_then(Value::as_array),
    ) else {
        return false;
    };

    reader_fields.iter().all(|rf| {
        let name = rf.get("name").and_then(Value::as_str);
        let written = writer_fields
            .iter()
            .find(|wf| wf.get("name").and_then(Value::as_str) == name);
        match (written, rf.get("type")) {
            (Some(wf), Some(reader_type)) => wf
                .get("type")
                .is_some_and(|writer_type| can_read(reader_type, writer_type)),
            (None, _) => rf.get("default").is_some(),
            (Some(_), None) => false,
        }
    })
}

fn type_name(schema: &Value) -> Option<&str> {
    match schema {
        Value::String(s) => Some(s),
        Value::Object(obj) => obj.get("type").and_then(Value::as_str),
        _ => None,
    }
}

/// Avro's allowed type promotions from writer to reader.
fn promotes_to(writer: &str, reader: &str) -> bool {
    matches!(
        (writer, reader),
        ("int", "long" | "float" | "double")
            | ("long", "float" | "double")
            | ("float", "double")
            | ("string", "bytes")
            | ("bytes", "string")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_schema_fields_are_optional() {
        let fields: Vec<FieldRef> = vec![
            Arc::new(Field::new("COL0", DataType::Int64, true)),
            Arc::new(Field::new("COL1", DataType::Utf8, true)),
        ];
        let schema: Value = serde_json::from_str(&sink_value_schema(&fields).unwrap()).unwrap();
        assert_eq!(schema["type"], "record");
        assert_eq!(schema["fields"][0]["name"], "COL0");
        assert_eq!(schema["fields"][0]["type"], json!(["null", "long"]));
        assert_eq!(schema["fields"][1]["default"], Value::Null);
    }

    #[test]
    fn test_value_columns_from_record() {
        let columns = value_columns(
            r#"{"type":"record","name":"r","fields":[
                {"name":"field","type":["null","int"],"default":null},
                {"name":"tags","type":{"type":"array","items":"string"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(columns[0], ColumnDefinition::new("FIELD", DataType::Int32));
        assert!(matches!(columns[1].data_type, DataType::List(_)));
    }

    #[test]
    fn test_value_columns_rejects_primitive() {
        assert!(value_columns("\"int\"").is_err());
    }

    #[test]
    fn test_new_optional_field_is_compatible() {
        let old = r#"{"type":"record","name":"Test","fields":[{"name":"f1","type":"int"}]}"#;
        let new = r#"{"type":"record","name":"Test","fields":[
            {"name":"f1","type":"long"},
            {"name":"f2","type":["null","string"],"default":null}
        ]}"#;
        assert!(is_backward_compatible(new, old));
    }

    #[test]
    fn test_new_required_field_is_incompatible() {
        let old = r#"{"type":"record","name":"Test","fields":[]}"#;
        let new = r#"{"type":"record","name":"Test","fields":[{"name":"f1","type":"int"}]}"#;
        assert!(!is_backward_compatible(new, old));
    }

    #[test]
    fn test_record_cannot_read_primitive() {
        let record = r#"{"type":"record","name":"Test","fields":[{"name":"f1","type":["null","int"],"default":null}]}"#;
        assert!(!is_backward_compatible(record, "\"int\""));
    }

    #[test]
    fn test_nullable_writer_needs_nullable_reader() {
        assert!(!is_backward_compatible("\"int\"", r#"["null","int"]"#));
        assert!(is_backward_compatible(r#"["null","long"]"#, r#"["null","int"]"#));
    }
}
