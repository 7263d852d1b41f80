use std::sync::Arc;

use serde_json::{Map, Number, Value};

use ospect_api::{
    CompositeValue, ConvertError, ManagedValue, OpaqueObject, SerializeOptions, TabularValue,
    ValueFaultHandler,
};

use crate::path::PathCursor;
use crate::registry::ExtractorRegistry;

/// Placeholder emitted when `max_depth` cuts a subtree.
pub const DEPTH_LIMIT_MARKER: &str = "[depth limit reached]";
/// Placeholder emitted once the `max_objects` budget is spent.
pub const OBJECT_LIMIT_MARKER: &str = "[object limit exceeded]";
/// Marker appended when `max_collection_size` truncates a collection.
pub const TRUNCATION_MARKER: &str = "[...]";

/// Result of one extraction step: JSON for wire transfer, or the raw
/// runtime sub-value for programmatic access (jsonify=false).
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Json(Value),
    Raw(ManagedValue),
}

/// Forward engine: walks a `ManagedValue`, consulting the frozen registry
/// for opaque nodes, honoring a path for partial extraction and limits
/// for cycle/size safety.
pub struct StateSerializer {
    registry: ExtractorRegistry,
}

impl StateSerializer {
    pub fn new(registry: ExtractorRegistry) -> Self {
        Self { registry }
    }

    /// Serializer with the bundled simplifiers only.
    pub fn with_defaults() -> Self {
        Self::new(ExtractorRegistry::with_defaults())
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Serialize `root` (or the sub-value selected by `path`) to JSON.
    ///
    /// Recoverable errors are offered to `handler` first; the default
    /// policy re-raises, a tolerant one substitutes and continues.
    pub fn serialize<S: AsRef<str>>(
        &self,
        root: &ManagedValue,
        path: &[S],
        options: &SerializeOptions,
        handler: &dyn ValueFaultHandler,
    ) -> Result<Value, ConvertError> {
        tracing::trace!(kind = root.kind_name(), segments = path.len(), "serializing value");
        let mut cursor = PathCursor::new(path);
        let mut ctx = SerializeContext::new(&self.registry, options, handler);
        match ctx.extract(root, &mut cursor, true)? {
            Extracted::Json(v) => Ok(v),
            Extracted::Raw(v) => Ok(json_leaf(&v)),
        }
    }

    /// Like `serialize`, but returns the raw runtime sub-value instead of
    /// coercing leaves to JSON.
    pub fn extract<S: AsRef<str>>(
        &self,
        root: &ManagedValue,
        path: &[S],
        options: &SerializeOptions,
        handler: &dyn ValueFaultHandler,
    ) -> Result<ManagedValue, ConvertError> {
        let mut cursor = PathCursor::new(path);
        let mut ctx = SerializeContext::new(&self.registry, options, handler);
        match ctx.extract(root, &mut cursor, false)? {
            Extracted::Raw(v) => Ok(v),
            Extracted::Json(v) => Ok(json_to_managed(v)),
        }
    }

    /// Write one attribute/element of `target`, returning the previous
    /// value. Read-only kinds (enums, tables) refuse.
    pub fn set_value(
        &self,
        target: &mut ManagedValue,
        attribute: &str,
        value: ManagedValue,
    ) -> Result<ManagedValue, ConvertError> {
        match target {
            ManagedValue::Composite(c) => {
                if c.get(attribute).is_none() {
                    return Err(ConvertError::AttributeNotFound(format!(
                        "field '{attribute}'"
                    )));
                }
                Ok(c.set(attribute, value).unwrap_or(ManagedValue::Null))
            }
            ManagedValue::Array(items) => {
                let idx: usize = attribute.parse().map_err(|_| {
                    ConvertError::AttributeNotFound(format!("array index '{attribute}'"))
                })?;
                let len = items.len();
                let slot = items.get_mut(idx).ok_or_else(|| {
                    ConvertError::AttributeNotFound(format!(
                        "array index '{idx}' out of bounds (length {len})"
                    ))
                })?;
                Ok(std::mem::replace(slot, value))
            }
            ManagedValue::Enum { .. } => Err(ConvertError::ImmutableValue("enum".to_string())),
            ManagedValue::Tabular(_) => Err(ConvertError::ImmutableValue("tabular".to_string())),
            ManagedValue::Opaque(obj) => match self.registry.lookup(obj.type_name()) {
                Some(extractor) => extractor.set_value(obj.as_ref(), attribute, value),
                None => obj.set_attribute(attribute, value),
            },
            scalar => Err(ConvertError::CannotDescend {
                kind: scalar.kind_name().to_string(),
                segment: attribute.to_string(),
            }),
        }
    }
}

/// Per-call traversal state, threaded explicitly — never shared across
/// calls or retained after return.
pub struct SerializeContext<'a> {
    registry: &'a ExtractorRegistry,
    options: &'a SerializeOptions,
    handler: &'a dyn ValueFaultHandler,
    /// Opaque identities on the current descent chain.
    visited: Vec<*const ()>,
    depth: usize,
    emitted: usize,
}

impl<'a> SerializeContext<'a> {
    fn new(
        registry: &'a ExtractorRegistry,
        options: &'a SerializeOptions,
        handler: &'a dyn ValueFaultHandler,
    ) -> Self {
        Self {
            registry,
            options,
            handler,
            visited: Vec::new(),
            depth: 0,
            emitted: 0,
        }
    }

    /// Extract one node, consuming path segments as needed.
    pub fn extract(
        &mut self,
        value: &ManagedValue,
        path: &mut PathCursor,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError> {
        if self.options.max_objects > 0 && self.emitted >= self.options.max_objects {
            return Ok(marker(OBJECT_LIMIT_MARKER, jsonify));
        }
        self.emitted += 1;
        match value {
            ManagedValue::Enum { name, .. } => self.extract_enum(value, name, path, jsonify),
            ManagedValue::Array(items) => self.extract_array(value, items, path, jsonify),
            ManagedValue::Composite(c) => self.extract_composite(c, path, jsonify),
            ManagedValue::Tabular(t) => self.extract_tabular(t, path, jsonify),
            ManagedValue::Opaque(obj) => self.extract_opaque(value, obj, path, jsonify),
            scalar => self.extract_scalar(scalar, path, jsonify),
        }
    }

    /// Offer a recoverable error to the fault handler.
    pub fn fault(
        &mut self,
        fault: ConvertError,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError> {
        tracing::debug!(error = %fault, "offering fault to handler");
        let substitute = self.handler.handle(fault)?;
        Ok(if jsonify {
            Extracted::Json(substitute)
        } else {
            Extracted::Raw(json_to_managed(substitute))
        })
    }

    /// Extract a node that must yield JSON (container building).
    fn extract_json(
        &mut self,
        value: &ManagedValue,
        path: &mut PathCursor,
    ) -> Result<Value, ConvertError> {
        match self.extract(value, path, true)? {
            Extracted::Json(v) => Ok(v),
            Extracted::Raw(v) => Ok(json_leaf(&v)),
        }
    }

    fn depth_exceeded(&self) -> bool {
        self.options.max_depth > 0 && self.depth >= self.options.max_depth
    }

    fn collection_limit(&self, len: usize) -> usize {
        if self.options.max_collection_size > 0 && len > self.options.max_collection_size {
            tracing::debug!(
                len,
                limit = self.options.max_collection_size,
                "collection truncated"
            );
            self.options.max_collection_size
        } else {
            len
        }
    }

    fn extract_scalar(
        &mut self,
        value: &ManagedValue,
        path: &mut PathCursor,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError> {
        if let Some(seg) = path.peek() {
            let segment = seg.to_string();
            return self.fault(
                ConvertError::CannotDescend {
                    kind: value.kind_name().to_string(),
                    segment,
                },
                jsonify,
            );
        }
        Ok(if jsonify {
            Extracted::Json(json_leaf(value))
        } else {
            Extracted::Raw(value.clone())
        })
    }

    fn extract_enum(
        &mut self,
        value: &ManagedValue,
        name: &str,
        path: &mut PathCursor,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError> {
        if let Some(seg) = path.pop() {
            if seg == name {
                // A matching terminal segment selects the name itself.
                return Ok(if jsonify {
                    Extracted::Json(Value::String(name.to_string()))
                } else {
                    Extracted::Raw(ManagedValue::Text(name.to_string()))
                });
            }
            return self.fault(
                ConvertError::AttributeNotFound(format!(
                    "enum value '{name}' does not match path segment '{seg}'"
                )),
                jsonify,
            );
        }
        Ok(if jsonify {
            Extracted::Json(Value::String(name.to_string()))
        } else {
            Extracted::Raw(value.clone())
        })
    }

    fn extract_array(
        &mut self,
        value: &ManagedValue,
        items: &[ManagedValue],
        path: &mut PathCursor,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError> {
        if let Some(seg) = path.pop() {
            let index = seg.parse::<usize>().ok().filter(|i| *i < items.len());
            return match index {
                Some(i) => self.extract(&items[i], path, jsonify),
                None => self.fault(
                    ConvertError::AttributeNotFound(format!(
                        "array index '{seg}' (length {})",
                        items.len()
                    )),
                    jsonify,
                ),
            };
        }
        if !jsonify {
            return Ok(Extracted::Raw(value.clone()));
        }
        if self.depth_exceeded() {
            return Ok(Extracted::Json(Value::String(DEPTH_LIMIT_MARKER.into())));
        }
        self.depth += 1;
        let limit = self.collection_limit(items.len());
        let mut out = Vec::with_capacity(limit.min(items.len()) + 1);
        for item in items.iter().take(limit) {
            let element = self.extract_json(item, path)?;
            out.push(element);
        }
        if limit < items.len() {
            out.push(Value::String(TRUNCATION_MARKER.into()));
        }
        self.depth -= 1;
        Ok(Extracted::Json(Value::Array(out)))
    }

    fn extract_composite(
        &mut self,
        composite: &CompositeValue,
        path: &mut PathCursor,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError> {
        if let Some(seg) = path.pop() {
            return match composite.get(&seg) {
                Some(v) => self.extract(v, path, jsonify),
                None => self.fault(
                    ConvertError::AttributeNotFound(format!("field '{seg}'")),
                    jsonify,
                ),
            };
        }
        if !jsonify {
            return Ok(Extracted::Raw(ManagedValue::Composite(composite.clone())));
        }
        if self.depth_exceeded() {
            return Ok(Extracted::Json(Value::String(DEPTH_LIMIT_MARKER.into())));
        }
        self.depth += 1;
        let limit = self.collection_limit(composite.len());
        let mut map = Map::new();
        for (i, (name, v)) in composite.iter().enumerate() {
            if i >= limit {
                map.insert(TRUNCATION_MARKER.to_string(), Value::Null);
                break;
            }
            let field = self.extract_json(v, path)?;
            map.insert(name.to_string(), field);
        }
        self.depth -= 1;
        Ok(Extracted::Json(Value::Object(map)))
    }

    fn extract_tabular(
        &mut self,
        table: &TabularValue,
        path: &mut PathCursor,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError> {
        if !path.is_empty() {
            let needed = table.index_names().len();
            if path.remaining() < needed {
                return self.fault(
                    ConvertError::AttributeNotFound(format!(
                        "table index needs {needed} path segments, got {}",
                        path.remaining()
                    )),
                    jsonify,
                );
            }
            let mut parts = Vec::with_capacity(needed);
            for _ in 0..needed {
                if let Some(seg) = path.pop() {
                    parts.push(seg);
                }
            }
            return match table.get_by_key_strings(&parts) {
                Some(row) => self.extract_composite(row, path, jsonify),
                None => self.fault(
                    ConvertError::AttributeNotFound(format!(
                        "no row for index [{}]",
                        parts.join(", ")
                    )),
                    jsonify,
                ),
            };
        }
        if !jsonify {
            return Ok(Extracted::Raw(ManagedValue::Tabular(table.clone())));
        }
        if self.depth_exceeded() {
            return Ok(Extracted::Json(Value::String(DEPTH_LIMIT_MARKER.into())));
        }
        // Tables with string-representable keys render as nested maps
        // (one level per index field); anything else needs the full form.
        let stringable = table
            .rows()
            .all(|(key, _)| key.iter().all(|p| p.key_string().is_some()));
        self.depth += 1;
        let result = if stringable {
            self.tabular_as_maps(table)
        } else {
            self.tabular_full_form(table)
        };
        self.depth -= 1;
        result.map(Extracted::Json)
    }

    fn tabular_as_maps(&mut self, table: &TabularValue) -> Result<Value, ConvertError> {
        // A single-index table of two-field rows collapses to a flat
        // key → value-field map.
        let pair_form =
            table.index_names().len() == 1 && table.rows().all(|(_, row)| row.len() == 2);
        let index_name = table.index_names().first().cloned().unwrap_or_default();
        let limit = self.collection_limit(table.len());
        let mut root = Map::new();
        for (i, (key, row)) in table.rows().enumerate() {
            if i >= limit {
                root.insert(TRUNCATION_MARKER.to_string(), Value::Null);
                break;
            }
            let parts: Vec<String> = key
                .iter()
                .map(|p| p.key_string().unwrap_or_default())
                .collect();
            let leaf = if pair_form {
                match row.iter().find(|(name, _)| *name != index_name) {
                    Some((_, v)) => self.extract_json(v, &mut PathCursor::empty())?,
                    None => Value::Null,
                }
            } else {
                self.row_json(row)?
            };
            insert_nested(&mut root, &parts, leaf);
        }
        Ok(Value::Object(root))
    }

    fn tabular_full_form(&mut self, table: &TabularValue) -> Result<Value, ConvertError> {
        let limit = self.collection_limit(table.len());
        let mut values = Vec::with_capacity(limit + 1);
        for (i, (_, row)) in table.rows().enumerate() {
            if i >= limit {
                values.push(Value::String(TRUNCATION_MARKER.into()));
                break;
            }
            values.push(self.row_json(row)?);
        }
        let mut map = Map::new();
        map.insert(
            "indexNames".to_string(),
            Value::Array(
                table
                    .index_names()
                    .iter()
                    .map(|n| Value::String(n.clone()))
                    .collect(),
            ),
        );
        map.insert("values".to_string(), Value::Array(values));
        Ok(Value::Object(map))
    }

    fn row_json(&mut self, row: &CompositeValue) -> Result<Value, ConvertError> {
        match self.extract_composite(row, &mut PathCursor::empty(), true)? {
            Extracted::Json(v) => Ok(v),
            Extracted::Raw(v) => Ok(json_leaf(&v)),
        }
    }

    fn extract_opaque(
        &mut self,
        value: &ManagedValue,
        obj: &Arc<dyn OpaqueObject>,
        path: &mut PathCursor,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError> {
        let identity = Arc::as_ptr(obj) as *const ();
        if self.visited.contains(&identity) {
            tracing::debug!(type_name = obj.type_name(), "cycle detected, truncating");
            return Ok(marker(&format!("[cycle: {}]", obj.type_name()), jsonify));
        }
        if path.is_empty() && !jsonify {
            return Ok(Extracted::Raw(value.clone()));
        }
        self.visited.push(identity);
        let result = match self.registry.lookup(obj.type_name()) {
            Some(extractor) => extractor.extract(self, obj.as_ref(), path, jsonify),
            None => self.default_opaque(obj.as_ref(), path, jsonify),
        };
        self.visited.pop();
        result
    }

    /// Fallback for unregistered opaque types: enumerate readable
    /// attributes into an object map.
    fn default_opaque(
        &mut self,
        obj: &dyn OpaqueObject,
        path: &mut PathCursor,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError> {
        if let Some(seg) = path.pop() {
            return match obj.attribute(&seg) {
                Some(v) => self.extract(&v, path, jsonify),
                None => self.fault(
                    ConvertError::AttributeNotFound(format!(
                        "attribute '{seg}' on {}",
                        obj.type_name()
                    )),
                    jsonify,
                ),
            };
        }
        if self.depth_exceeded() {
            return Ok(Extracted::Json(Value::String(DEPTH_LIMIT_MARKER.into())));
        }
        self.depth += 1;
        let names = obj.attribute_names();
        let limit = self.collection_limit(names.len());
        let mut map = Map::new();
        for (i, name) in names.iter().enumerate() {
            if i >= limit {
                map.insert(TRUNCATION_MARKER.to_string(), Value::Null);
                break;
            }
            if let Some(v) = obj.attribute(name) {
                let attr = self.extract_json(&v, path)?;
                map.insert(name.clone(), attr);
            }
        }
        self.depth -= 1;
        Ok(Extracted::Json(Value::Object(map)))
    }
}

fn marker(text: &str, jsonify: bool) -> Extracted {
    if jsonify {
        Extracted::Json(Value::String(text.to_string()))
    } else {
        Extracted::Raw(ManagedValue::Text(text.to_string()))
    }
}

fn insert_nested(root: &mut Map<String, Value>, parts: &[String], leaf: Value) {
    match parts {
        [] => {}
        [last] => {
            root.insert(last.clone(), leaf);
        }
        [first, rest @ ..] => {
            let child = root
                .entry(first.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(m) = child {
                insert_nested(m, rest, leaf);
            }
        }
    }
}

/// JSON rendition of a leaf value.
fn json_leaf(value: &ManagedValue) -> Value {
    match value {
        ManagedValue::Null => Value::Null,
        ManagedValue::Bool(b) => Value::Bool(*b),
        ManagedValue::Int(i) => Value::from(*i),
        ManagedValue::Long(l) => Value::from(*l),
        ManagedValue::Double(d) => Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        ManagedValue::Text(s) => Value::String(s.clone()),
        ManagedValue::Date(ms) => Value::from(*ms),
        ManagedValue::Enum { name, .. } => Value::String(name.clone()),
        ManagedValue::Opaque(o) => Value::String(o.canonical_form()),
        ManagedValue::Array(_) | ManagedValue::Composite(_) | ManagedValue::Tabular(_) => {
            Value::Null
        }
    }
}

/// Runtime rendition of a substituted JSON value (jsonify=false paths).
fn json_to_managed(value: Value) -> ManagedValue {
    match value {
        Value::Null => ManagedValue::Null,
        Value::Bool(b) => ManagedValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ManagedValue::Long(i),
            None => ManagedValue::Double(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => ManagedValue::Text(s),
        Value::Array(items) => {
            ManagedValue::Array(items.into_iter().map(json_to_managed).collect())
        }
        Value::Object(map) => {
            let mut composite = CompositeValue::new();
            for (k, v) in map {
                composite.set(k, json_to_managed(v));
            }
            ManagedValue::Composite(composite)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::RwLock;

    use ospect_api::{IgnoringFaultHandler, ResourceName, ThrowingFaultHandler};
    use serde_json::json;

    const NO_PATH: &[&str] = &[];

    fn serializer() -> StateSerializer {
        StateSerializer::with_defaults()
    }

    fn opts() -> SerializeOptions {
        SerializeOptions::DEFAULT
    }

    fn league_row(verein: &str, absteiger: bool) -> CompositeValue {
        CompositeValue::new()
            .with_field("verein", ManagedValue::Text(verein.into()))
            .with_field("absteiger", ManagedValue::Bool(absteiger))
    }

    fn memory_state() -> ManagedValue {
        ManagedValue::Composite(
            CompositeValue::new()
                .with_field("verein", ManagedValue::Text("FCN".into()))
                .with_field("platz", ManagedValue::Long(6))
                .with_field("absteiger", ManagedValue::Bool(false)),
        )
    }

    #[derive(Debug)]
    struct TestBean {
        attrs: Vec<(&'static str, ManagedValue)>,
    }

    impl OpaqueObject for TestBean {
        fn type_name(&self) -> &str {
            "TestBean"
        }

        fn canonical_form(&self) -> String {
            "TestBean".to_string()
        }

        fn attribute_names(&self) -> Vec<String> {
            self.attrs.iter().map(|(n, _)| n.to_string()).collect()
        }

        fn attribute(&self, name: &str) -> Option<ManagedValue> {
            self.attrs
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
        }
    }

    #[derive(Debug)]
    struct SelfRef {
        inner: RwLock<Option<ManagedValue>>,
    }

    impl OpaqueObject for SelfRef {
        fn type_name(&self) -> &str {
            "SelfRef"
        }

        fn canonical_form(&self) -> String {
            "SelfRef".to_string()
        }

        fn attribute_names(&self) -> Vec<String> {
            vec!["me".to_string()]
        }

        fn attribute(&self, name: &str) -> Option<ManagedValue> {
            match name {
                "me" => Some(
                    self.inner
                        .read()
                        .map(|guard| guard.clone().unwrap_or(ManagedValue::Null))
                        .unwrap_or(ManagedValue::Null),
                ),
                _ => None,
            }
        }
    }

    #[test]
    fn test_scalar_serialization() {
        let s = serializer();
        let cases = vec![
            (ManagedValue::Null, json!(null)),
            (ManagedValue::Bool(true), json!(true)),
            (ManagedValue::Int(42), json!(42)),
            (ManagedValue::Long(i64::MAX), json!(i64::MAX)),
            (ManagedValue::Double(4.52), json!(4.52)),
            (ManagedValue::Text("bla".into()), json!("bla")),
            (ManagedValue::Date(1_700_000_000_000), json!(1_700_000_000_000i64)),
        ];
        for (value, expected) in cases {
            let out = s
                .serialize(&value, NO_PATH, &opts(), &ThrowingFaultHandler)
                .unwrap();
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn test_composite_serialization_preserves_order() {
        let out = serializer()
            .serialize(&memory_state(), NO_PATH, &opts(), &ThrowingFaultHandler)
            .unwrap();
        assert_eq!(out, json!({"verein": "FCN", "platz": 6, "absteiger": false}));
        let keys: Vec<&String> = out.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["verein", "platz", "absteiger"]);
    }

    #[test]
    fn test_path_selects_sub_value() {
        let s = serializer();
        let out = s
            .serialize(&memory_state(), &["platz"], &opts(), &ThrowingFaultHandler)
            .unwrap();
        assert_eq!(out, json!(6));
    }

    #[test]
    fn test_unknown_path_segment_faults() {
        let s = serializer();
        let err = s
            .serialize(&memory_state(), &["trainer"], &opts(), &ThrowingFaultHandler)
            .unwrap_err();
        assert!(matches!(err, ConvertError::AttributeNotFound(_)));

        // The tolerant policy substitutes null instead.
        let out = s
            .serialize(&memory_state(), &["trainer"], &opts(), &IgnoringFaultHandler)
            .unwrap();
        assert_eq!(out, json!(null));
    }

    #[test]
    fn test_scalar_with_remaining_path_cannot_descend() {
        let err = serializer()
            .serialize(
                &ManagedValue::Long(1),
                &["anything"],
                &opts(),
                &ThrowingFaultHandler,
            )
            .unwrap_err();
        assert!(matches!(err, ConvertError::CannotDescend { .. }));
    }

    #[test]
    fn test_array_index_path() {
        let s = serializer();
        let value = ManagedValue::Array(vec![
            ManagedValue::Int(10),
            ManagedValue::Int(20),
            ManagedValue::Int(30),
        ]);
        let out = s
            .serialize(&value, &["1"], &opts(), &ThrowingFaultHandler)
            .unwrap();
        assert_eq!(out, json!(20));

        for bad in ["3", "x"] {
            let err = s
                .serialize(&value, &[bad], &opts(), &ThrowingFaultHandler)
                .unwrap_err();
            assert!(matches!(err, ConvertError::AttributeNotFound(_)));
        }
    }

    #[test]
    fn test_enum_path_matching() {
        let s = serializer();
        let value = ManagedValue::Enum {
            type_name: "State".into(),
            name: "RUNNING".into(),
        };
        let out = s
            .serialize(&value, &["RUNNING"], &opts(), &ThrowingFaultHandler)
            .unwrap();
        assert_eq!(out, json!("RUNNING"));

        let err = s
            .serialize(&value, &["STOPPED"], &opts(), &ThrowingFaultHandler)
            .unwrap_err();
        assert!(matches!(err, ConvertError::AttributeNotFound(_)));
    }

    #[test]
    fn test_raw_extraction_returns_runtime_values() {
        let s = serializer();
        let value = ManagedValue::Enum {
            type_name: "State".into(),
            name: "RUNNING".into(),
        };
        let raw = s
            .extract(&value, NO_PATH, &opts(), &ThrowingFaultHandler)
            .unwrap();
        // jsonify=false returns the enum instance, not its name string.
        assert_eq!(raw, value);

        let raw = s
            .extract(&memory_state(), &["platz"], &opts(), &ThrowingFaultHandler)
            .unwrap();
        assert_eq!(raw, ManagedValue::Long(6));
    }

    #[test]
    fn test_default_opaque_attribute_listing() {
        let bean = ManagedValue::Opaque(Arc::new(TestBean {
            attrs: vec![
                ("name", ManagedValue::Text("heap".into())),
                ("used", ManagedValue::Long(1024)),
            ],
        }));
        let out = serializer()
            .serialize(&bean, NO_PATH, &opts(), &ThrowingFaultHandler)
            .unwrap();
        assert_eq!(out, json!({"name": "heap", "used": 1024}));

        let out = serializer()
            .serialize(&bean, &["used"], &opts(), &ThrowingFaultHandler)
            .unwrap();
        assert_eq!(out, json!(1024));
    }

    #[test]
    fn test_simplifier_takes_precedence_over_listing() {
        let name = ResourceName::parse("java.lang:type=Memory").unwrap();
        let value = ManagedValue::Opaque(Arc::new(name));
        let out = serializer()
            .serialize(&value, NO_PATH, &opts(), &ThrowingFaultHandler)
            .unwrap();
        // The bundled simplifier renders a single-field record, not the
        // reflective attribute listing.
        assert_eq!(out, json!({"objectName": "java.lang:type=Memory"}));
    }

    #[test]
    fn test_self_reference_terminates() {
        let bean = Arc::new(SelfRef {
            inner: RwLock::new(None),
        });
        *bean.inner.write().unwrap() = Some(ManagedValue::Opaque(bean.clone()));
        let out = serializer()
            .serialize(
                &ManagedValue::Opaque(bean),
                NO_PATH,
                &opts(),
                &ThrowingFaultHandler,
            )
            .unwrap();
        assert_eq!(out, json!({"me": "[cycle: SelfRef]"}));
    }

    #[test]
    fn test_depth_limit() {
        let nested = ManagedValue::Array(vec![ManagedValue::Array(vec![ManagedValue::Array(
            vec![ManagedValue::Int(1)],
        )])]);
        let out = serializer()
            .serialize(
                &nested,
                NO_PATH,
                &opts().with_max_depth(2),
                &ThrowingFaultHandler,
            )
            .unwrap();
        assert_eq!(out, json!([[DEPTH_LIMIT_MARKER]]));
    }

    #[test]
    fn test_collection_truncation() {
        let wide = ManagedValue::Array((0..10).map(ManagedValue::Int).collect());
        let out = serializer()
            .serialize(
                &wide,
                NO_PATH,
                &opts().with_max_collection_size(3),
                &ThrowingFaultHandler,
            )
            .unwrap();
        assert_eq!(out, json!([0, 1, 2, TRUNCATION_MARKER]));
    }

    #[test]
    fn test_object_budget() {
        let wide = ManagedValue::Array((0..10).map(ManagedValue::Int).collect());
        let out = serializer()
            .serialize(
                &wide,
                NO_PATH,
                &opts().with_max_objects(3),
                &ThrowingFaultHandler,
            )
            .unwrap();
        let items = out.as_array().unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(items[0], json!(0));
        assert_eq!(items[1], json!(1));
        assert_eq!(items[2], json!(OBJECT_LIMIT_MARKER));
        assert_eq!(items[9], json!(OBJECT_LIMIT_MARKER));
    }

    #[test]
    fn test_tabular_pair_rows_collapse_to_flat_map() {
        let mut table = TabularValue::new(vec!["key".to_string()]);
        for (k, v) in [("keyOne", "valueOne"), ("keyTwo", "valueTwo")] {
            table
                .insert(
                    vec![ManagedValue::Text(k.into())],
                    CompositeValue::new()
                        .with_field("key", ManagedValue::Text(k.into()))
                        .with_field("value", ManagedValue::Text(v.into())),
                )
                .unwrap();
        }
        let out = serializer()
            .serialize(
                &ManagedValue::Tabular(table),
                NO_PATH,
                &opts(),
                &ThrowingFaultHandler,
            )
            .unwrap();
        assert_eq!(out, json!({"keyOne": "valueOne", "keyTwo": "valueTwo"}));
    }

    #[test]
    fn test_tabular_multi_index_renders_nested_maps() {
        let mut table = TabularValue::new(vec!["verein".to_string(), "region".to_string()]);
        let row = CompositeValue::new()
            .with_field("verein", ManagedValue::Text("fcn".into()))
            .with_field("region", ManagedValue::Text("franconia".into()))
            .with_field("absteiger", ManagedValue::Bool(false));
        table
            .insert(
                vec![
                    ManagedValue::Text("fcn".into()),
                    ManagedValue::Text("franconia".into()),
                ],
                row,
            )
            .unwrap();
        let out = serializer()
            .serialize(
                &ManagedValue::Tabular(table),
                NO_PATH,
                &opts(),
                &ThrowingFaultHandler,
            )
            .unwrap();
        assert_eq!(
            out,
            json!({"fcn": {"franconia": {
                "verein": "fcn", "region": "franconia", "absteiger": false
            }}})
        );
    }

    #[test]
    fn test_tabular_composite_key_uses_full_form() {
        let user = CompositeValue::new()
            .with_field("name", ManagedValue::Text("roland".into()))
            .with_field("age", ManagedValue::Long(44));
        let row = CompositeValue::new()
            .with_field("user", ManagedValue::Composite(user.clone()))
            .with_field("street", ManagedValue::Text("homestreet".into()));
        let mut table = TabularValue::new(vec!["user".to_string(), "street".to_string()]);
        table
            .insert(
                vec![
                    ManagedValue::Composite(user),
                    ManagedValue::Text("homestreet".into()),
                ],
                row,
            )
            .unwrap();
        let out = serializer()
            .serialize(
                &ManagedValue::Tabular(table),
                NO_PATH,
                &opts(),
                &ThrowingFaultHandler,
            )
            .unwrap();
        assert_eq!(
            out,
            json!({
                "indexNames": ["user", "street"],
                "values": [{
                    "user": {"name": "roland", "age": 44},
                    "street": "homestreet"
                }]
            })
        );
    }

    #[test]
    fn test_tabular_path_consumes_one_segment_per_index_field() {
        let mut table = TabularValue::new(vec!["verein".to_string()]);
        table
            .insert(
                vec![ManagedValue::Text("fcn".into())],
                league_row("fcn", false),
            )
            .unwrap();
        table
            .insert(
                vec![ManagedValue::Text("fcb".into())],
                league_row("fcb", true),
            )
            .unwrap();
        let value = ManagedValue::Tabular(table);
        let s = serializer();

        let out = s
            .serialize(&value, &["fcb", "absteiger"], &opts(), &ThrowingFaultHandler)
            .unwrap();
        assert_eq!(out, json!(true));

        let err = s
            .serialize(&value, &["hsv"], &opts(), &ThrowingFaultHandler)
            .unwrap_err();
        assert!(matches!(err, ConvertError::AttributeNotFound(_)));
    }

    #[test]
    fn test_set_value() {
        let s = serializer();

        let mut target = memory_state();
        let old = s
            .set_value(&mut target, "platz", ManagedValue::Long(3))
            .unwrap();
        assert_eq!(old, ManagedValue::Long(6));
        match &target {
            ManagedValue::Composite(c) => {
                assert_eq!(c.get("platz"), Some(&ManagedValue::Long(3)))
            }
            other => panic!("unexpected {other:?}"),
        }
        let err = s
            .set_value(&mut target, "trainer", ManagedValue::Null)
            .unwrap_err();
        assert!(matches!(err, ConvertError::AttributeNotFound(_)));

        let mut arr = ManagedValue::Array(vec![ManagedValue::Int(1), ManagedValue::Int(2)]);
        let old = s.set_value(&mut arr, "0", ManagedValue::Int(9)).unwrap();
        assert_eq!(old, ManagedValue::Int(1));

        let mut en = ManagedValue::Enum {
            type_name: "State".into(),
            name: "RUNNING".into(),
        };
        let err = s
            .set_value(&mut en, "name", ManagedValue::Text("STOPPED".into()))
            .unwrap_err();
        assert_eq!(err, ConvertError::ImmutableValue("enum".to_string()));
    }
}
