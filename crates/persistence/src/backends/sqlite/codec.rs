//! Conversion between typed values and SQLite storage values.

use rusqlite::types::ValueRef;

use crate::error::{StorageResult, ValidationError};
use crate::model::{FieldDef, ResourceSchema};
use crate::types::{DecodeError, FieldKind, FieldValue, Resource, format_timestamp};

use super::query_builder::SqlParam;

/// Converts a value to its bound parameter.
///
/// Booleans are stored as 0/1, timestamps as RFC 3339 text and structured
/// values as their JSON text.
pub fn to_param(value: &FieldValue) -> SqlParam {
    match value {
        FieldValue::Null => SqlParam::Null,
        FieldValue::String(s) => SqlParam::String(s.clone()),
        FieldValue::Integer(i) => SqlParam::Integer(*i),
        FieldValue::Boolean(b) => SqlParam::Integer(i64::from(*b)),
        FieldValue::Timestamp(t) => SqlParam::String(format_timestamp(t)),
        FieldValue::Json(v) => SqlParam::String(v.to_string()),
    }
}

/// Decodes a raw column value of the given kind.
pub fn from_sql(kind: FieldKind, value: ValueRef<'_>) -> Result<FieldValue, DecodeError> {
    match value {
        ValueRef::Null => Ok(FieldValue::Null),
        ValueRef::Integer(i) => match kind {
            FieldKind::Integer => Ok(FieldValue::Integer(i)),
            FieldKind::Boolean => Ok(FieldValue::Boolean(i != 0)),
            FieldKind::String => Ok(FieldValue::String(i.to_string())),
            FieldKind::Timestamp | FieldKind::Json => {
                Err(DecodeError::new(kind, format!("got integer {}", i)))
            }
        },
        ValueRef::Real(f) => match kind {
            FieldKind::String => Ok(FieldValue::String(f.to_string())),
            FieldKind::Integer if f.fract() == 0.0 => Ok(FieldValue::Integer(f as i64)),
            _ => Err(DecodeError::new(kind, format!("got real {}", f))),
        },
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| DecodeError::new(kind, format!("invalid utf-8: {}", e)))?;
            FieldValue::parse(kind, text)
        }
    }
}

/// Encodes a name path for the `fq_name` column and the metadata index.
pub fn fq_name_text(fq_name: &[String]) -> String {
    serde_json::Value::from(fq_name.to_vec()).to_string()
}

/// Encodes every column of `resource` in table order.
///
/// Validates that each type-specific field is declared, matches its kind,
/// and that required fields are present.
pub fn encode_row(
    schema: &ResourceSchema,
    resource: &Resource,
) -> StorageResult<Vec<(String, SqlParam)>> {
    for name in resource.fields.keys() {
        if schema.field(name).is_none() {
            return Err(ValidationError::UnknownField {
                resource_type: schema.name().to_string(),
                field: name.clone(),
            }
            .into());
        }
    }

    let perms = &resource.perms;
    let share = serde_json::to_string(&perms.share)?;
    let optional = |value: &Option<String>| match value {
        Some(v) => SqlParam::String(v.clone()),
        None => SqlParam::Null,
    };
    let timestamp = |value: &Option<chrono::DateTime<chrono::Utc>>| match value {
        Some(t) => SqlParam::String(format_timestamp(t)),
        None => SqlParam::Null,
    };

    let mut row = vec![
        ("uuid".to_string(), SqlParam::string(&resource.uuid)),
        (
            "fq_name".to_string(),
            SqlParam::String(fq_name_text(&resource.fq_name)),
        ),
        (
            "display_name".to_string(),
            SqlParam::string(&resource.display_name),
        ),
        ("parent_uuid".to_string(), optional(&resource.parent_uuid)),
        ("parent_type".to_string(), optional(&resource.parent_type)),
        ("owner".to_string(), SqlParam::string(perms.owner.as_str())),
        (
            "owner_access".to_string(),
            SqlParam::integer(i64::from(perms.owner_access)),
        ),
        ("group_name".to_string(), optional(&perms.group)),
        (
            "group_access".to_string(),
            SqlParam::integer(i64::from(perms.group_access)),
        ),
        (
            "global_access".to_string(),
            SqlParam::integer(i64::from(perms.global_access)),
        ),
        ("share".to_string(), SqlParam::String(share)),
        ("created".to_string(), timestamp(&resource.created)),
        ("last_modified".to_string(), timestamp(&resource.last_modified)),
        ("creator".to_string(), optional(&resource.creator)),
    ];

    for field in schema.fields() {
        let value = resource.fields.get(&field.name).unwrap_or(&FieldValue::Null);
        row.push((field.name.clone(), encode_field(schema.name(), field, value)?));
    }
    Ok(row)
}

/// Validates and encodes one declared field.
pub fn encode_field(owner: &str, field: &FieldDef, value: &FieldValue) -> StorageResult<SqlParam> {
    if value.is_null() && field.required {
        return Err(ValidationError::MissingRequiredField {
            field: format!("{}.{}", owner, field.name),
        }
        .into());
    }
    if !value.matches_kind(field.kind) {
        return Err(ValidationError::InvalidFieldValue {
            field: format!("{}.{}", owner, field.name),
            expected: field.kind.to_string(),
        }
        .into());
    }
    Ok(to_param(value))
}
