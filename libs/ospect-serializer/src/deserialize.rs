//! Reverse engine: strict, type-guided reconstruction of JSON into
//! runtime management values.
//!
//! Every shape mismatch is fatal to the call — there is no partial
//! reconstruction and no fault policy on this path.

use std::sync::Arc;

use serde_json::{Map, Value};

use ospect_api::{
    CompositeDescriptor, CompositeValue, ConvertError, ManagedValue, ResourceName, SimpleKind,
    TabularDescriptor, TabularValue, TypeDescriptor,
};

/// Parse `text` as JSON, then deserialize against `descriptor`.
///
/// Malformed text reports the parser position.
pub fn deserialize_text(
    descriptor: &TypeDescriptor,
    text: &str,
) -> Result<ManagedValue, ConvertError> {
    let value: Value = serde_json::from_str(text)?;
    deserialize(descriptor, &value)
}

/// Deserialize a JSON value against `descriptor`.
///
/// JSON `null` maps to `ManagedValue::Null` for any descriptor.
pub fn deserialize(
    descriptor: &TypeDescriptor,
    input: &Value,
) -> Result<ManagedValue, ConvertError> {
    if input.is_null() {
        return Ok(ManagedValue::Null);
    }
    match descriptor {
        TypeDescriptor::Simple(kind) => deserialize_simple(*kind, input),
        TypeDescriptor::Array { element, dims } => deserialize_array(element, *dims, input),
        TypeDescriptor::Composite(desc) => {
            deserialize_composite(desc, input).map(ManagedValue::Composite)
        }
        TypeDescriptor::Tabular(desc) => {
            deserialize_tabular(desc, input).map(ManagedValue::Tabular)
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Integral parse, strict: fractional input or garbage is rejected,
/// never truncated.
fn integral_i64(kind: &str, input: &Value) -> Result<i64, ConvertError> {
    match input {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| ConvertError::number(kind, n.to_string())),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| ConvertError::number(kind, s.clone())),
        other => Err(ConvertError::shape("number", json_kind(other))),
    }
}

fn deserialize_simple(kind: SimpleKind, input: &Value) -> Result<ManagedValue, ConvertError> {
    match kind {
        SimpleKind::Boolean => match input {
            Value::Bool(b) => Ok(ManagedValue::Bool(*b)),
            Value::String(s) => s
                .parse::<bool>()
                .map(ManagedValue::Bool)
                .map_err(|_| ConvertError::number("Boolean", s.clone())),
            other => Err(ConvertError::shape("boolean", json_kind(other))),
        },
        SimpleKind::Integer => {
            let i = integral_i64("Integer", input)?;
            i32::try_from(i)
                .map(ManagedValue::Int)
                .map_err(|_| ConvertError::number("Integer", i.to_string()))
        }
        SimpleKind::Long => integral_i64("Long", input).map(ManagedValue::Long),
        SimpleKind::Double => match input {
            Value::Number(n) => n
                .as_f64()
                .map(ManagedValue::Double)
                .ok_or_else(|| ConvertError::number("Double", n.to_string())),
            Value::String(s) => s
                .parse::<f64>()
                .map(ManagedValue::Double)
                .map_err(|_| ConvertError::number("Double", s.clone())),
            other => Err(ConvertError::shape("number", json_kind(other))),
        },
        SimpleKind::String => match input {
            Value::String(s) => Ok(ManagedValue::Text(s.clone())),
            Value::Bool(b) => Ok(ManagedValue::Text(b.to_string())),
            Value::Number(n) => Ok(ManagedValue::Text(n.to_string())),
            other => Err(ConvertError::shape("string", json_kind(other))),
        },
        SimpleKind::Date => integral_i64("Date", input).map(ManagedValue::Date),
        SimpleKind::ObjectName => match input {
            Value::String(s) => {
                let name = ResourceName::parse(s)?;
                Ok(ManagedValue::Opaque(Arc::new(name)))
            }
            other => Err(ConvertError::shape("string", json_kind(other))),
        },
        SimpleKind::Void => Err(ConvertError::NoConverter("Void".to_string())),
    }
}

fn deserialize_array(
    element: &TypeDescriptor,
    dims: u32,
    input: &Value,
) -> Result<ManagedValue, ConvertError> {
    let items = input
        .as_array()
        .ok_or_else(|| ConvertError::shape("array", json_kind(input)))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(if dims > 1 {
            deserialize_array(element, dims - 1, item)?
        } else {
            deserialize(element, item)?
        });
    }
    Ok(ManagedValue::Array(out))
}

fn deserialize_composite(
    desc: &CompositeDescriptor,
    input: &Value,
) -> Result<CompositeValue, ConvertError> {
    let obj = input
        .as_object()
        .ok_or_else(|| ConvertError::shape("object", json_kind(input)))?;
    for key in obj.keys() {
        if desc.field(key).is_none() {
            return Err(ConvertError::UnknownField(key.clone()));
        }
    }
    let mut out = CompositeValue::new();
    for (name, field_desc) in desc.iter() {
        let value = match obj.get(name) {
            Some(v) => deserialize(field_desc, v)?,
            None => ManagedValue::Null,
        };
        out.set(name, value);
    }
    Ok(out)
}

fn deserialize_tabular(
    desc: &TabularDescriptor,
    input: &Value,
) -> Result<TabularValue, ConvertError> {
    let obj = input
        .as_object()
        .ok_or_else(|| ConvertError::shape("object", json_kind(input)))?;
    if obj.contains_key("indexNames") || obj.contains_key("values") {
        return tabular_full_form(desc, obj);
    }
    let mut table = TabularValue::new(desc.index_names().to_vec());
    tabular_from_maps(desc, &mut table, &mut Vec::new(), obj, desc.index_names().len())?;
    Ok(table)
}

/// Full form: `{"indexNames": [...], "values": [row, ...]}`.
fn tabular_full_form(
    desc: &TabularDescriptor,
    obj: &Map<String, Value>,
) -> Result<TabularValue, ConvertError> {
    for key in obj.keys() {
        if key != "indexNames" && key != "values" {
            return Err(ConvertError::UnknownField(key.clone()));
        }
    }
    let index_json = obj
        .get("indexNames")
        .ok_or_else(|| ConvertError::BadIndexNames("missing 'indexNames'".to_string()))?;
    let index_arr = index_json
        .as_array()
        .ok_or_else(|| ConvertError::shape("array of index names", json_kind(index_json)))?;
    let mut names = Vec::with_capacity(index_arr.len());
    for v in index_arr {
        names.push(
            v.as_str()
                .ok_or_else(|| ConvertError::shape("string", json_kind(v)))?,
        );
    }
    if names.len() != desc.index_names().len() {
        return Err(ConvertError::BadIndexNames(format!(
            "expected index names {:?}, got {names:?}",
            desc.index_names()
        )));
    }
    for name in &names {
        if !desc.index_names().iter().any(|n| n == name) {
            return Err(ConvertError::BadIndexNames(format!(
                "'{name}' is not a declared index field"
            )));
        }
    }
    let values_json = obj
        .get("values")
        .ok_or_else(|| ConvertError::shape("array of rows under 'values'", "nothing"))?;
    let rows = values_json
        .as_array()
        .ok_or_else(|| ConvertError::shape("array of rows", json_kind(values_json)))?;
    let mut table = TabularValue::new(desc.index_names().to_vec());
    for row_json in rows {
        if !row_json.is_object() {
            return Err(ConvertError::shape("object", json_kind(row_json)));
        }
        let row = deserialize_composite(&desc.row, row_json)?;
        let key = row_key(desc, &row);
        table.insert(key, row)?;
    }
    Ok(table)
}

/// Key tuple of a deserialized row, read in declared index order.
/// Parts may themselves be composite.
fn row_key(desc: &TabularDescriptor, row: &CompositeValue) -> Vec<ManagedValue> {
    desc.index_names()
        .iter()
        .map(|name| row.get(name).cloned().unwrap_or(ManagedValue::Null))
        .collect()
}

/// Compact forms: one map level per index field; leaves are either full
/// row objects or, for single-index two-field rows, bare value-field
/// content keyed by the index value.
fn tabular_from_maps(
    desc: &TabularDescriptor,
    table: &mut TabularValue,
    level_keys: &mut Vec<String>,
    obj: &Map<String, Value>,
    remaining: usize,
) -> Result<(), ConvertError> {
    for (key, val) in obj {
        level_keys.push(key.clone());
        if remaining > 1 {
            let inner = val
                .as_object()
                .ok_or_else(|| ConvertError::shape("object", json_kind(val)))?;
            tabular_from_maps(desc, table, level_keys, inner, remaining - 1)?;
        } else {
            let row = compact_row(desc, level_keys, val)?;
            let key_tuple = row_key(desc, &row);
            table.insert(key_tuple, row)?;
        }
        level_keys.pop();
    }
    Ok(())
}

fn compact_row(
    desc: &TabularDescriptor,
    keys: &[String],
    val: &Value,
) -> Result<CompositeValue, ConvertError> {
    // An object whose keys are all declared row fields is the row itself;
    // anything else is value-field content of a {index, value} pair row.
    let row_object = match val.as_object() {
        Some(m) => m.keys().all(|k| desc.row.field(k).is_some()),
        None => false,
    };
    if row_object {
        let mut row = deserialize_composite(&desc.row, val)?;
        for (i, index_name) in desc.index_names().iter().enumerate() {
            let missing = matches!(row.get(index_name), None | Some(ManagedValue::Null));
            if missing {
                let field_desc = desc
                    .row
                    .field(index_name)
                    .ok_or_else(|| ConvertError::UnknownField(index_name.clone()))?;
                let from_key = deserialize(field_desc, &Value::String(keys[i].clone()))?;
                row.set(index_name, from_key);
            }
        }
        return Ok(row);
    }
    if desc.index_names().len() != 1 || desc.row.len() != 2 {
        return Err(ConvertError::shape("object", json_kind(val)));
    }
    let index_name = &desc.index_names()[0];
    let index_desc = desc
        .row
        .field(index_name)
        .ok_or_else(|| ConvertError::BadIndexNames(index_name.clone()))?;
    let (value_name, value_desc) = desc
        .row
        .iter()
        .find(|(name, _)| name != index_name)
        .ok_or_else(|| {
            ConvertError::BadIndexNames(format!(
                "row of '{}' has no value field besides its index",
                desc.row.type_name
            ))
        })?;
    let index_value = deserialize(index_desc, &Value::String(keys[0].clone()))?;
    let value_value = deserialize(value_desc, val)?;
    let mut row = CompositeValue::new();
    for (name, _) in desc.row.iter() {
        if name == index_name {
            row.set(name, index_value.clone());
        } else if name == value_name {
            row.set(name, value_value.clone());
        }
    }
    Ok(row)
}
