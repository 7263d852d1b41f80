use std::fmt;
use std::sync::Arc;

use crate::error::ConvertError;

/// Runtime management value — the closed algebra both engines operate on.
///
/// Structural kinds map onto the descriptor model: scalars ↔ `Simple`,
/// `Array` ↔ `Array`, `Composite` ↔ `Composite`, `Tabular` ↔ `Tabular`.
/// `Opaque` covers everything else: objects that participate in
/// serialization only through a registered handler (or the default
/// attribute listing), never through exhaustive matching here.
#[derive(Debug, Clone)]
pub enum ManagedValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    /// Epoch milliseconds.
    Date(i64),
    /// Enumerated value, represented by its canonical name.
    Enum { type_name: String, name: String },
    Array(Vec<ManagedValue>),
    Composite(CompositeValue),
    Tabular(TabularValue),
    /// Reflectively opaque object, dispatched via the handler registry.
    Opaque(Arc<dyn OpaqueObject>),
}

impl ManagedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ManagedValue::Null)
    }

    /// Lowercase kind name, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ManagedValue::Null => "null",
            ManagedValue::Bool(_) => "boolean",
            ManagedValue::Int(_) => "integer",
            ManagedValue::Long(_) => "long",
            ManagedValue::Double(_) => "double",
            ManagedValue::Text(_) => "string",
            ManagedValue::Date(_) => "date",
            ManagedValue::Enum { .. } => "enum",
            ManagedValue::Array(_) => "array",
            ManagedValue::Composite(_) => "composite",
            ManagedValue::Tabular(_) => "tabular",
            ManagedValue::Opaque(_) => "opaque",
        }
    }

    /// Canonical string form usable as a table index or path segment.
    ///
    /// `None` for kinds that cannot address a row (null and the
    /// structural kinds other than `Opaque`).
    pub fn key_string(&self) -> Option<String> {
        match self {
            ManagedValue::Bool(b) => Some(b.to_string()),
            ManagedValue::Int(i) => Some(i.to_string()),
            ManagedValue::Long(l) => Some(l.to_string()),
            ManagedValue::Double(d) => Some(d.to_string()),
            ManagedValue::Text(s) => Some(s.clone()),
            ManagedValue::Date(ms) => Some(ms.to_string()),
            ManagedValue::Enum { name, .. } => Some(name.clone()),
            ManagedValue::Opaque(o) => Some(o.canonical_form()),
            _ => None,
        }
    }
}

impl PartialEq for ManagedValue {
    fn eq(&self, other: &Self) -> bool {
        use ManagedValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (
                Enum { type_name: t1, name: n1 },
                Enum { type_name: t2, name: n2 },
            ) => t1 == t2 && n1 == n2,
            (Array(a), Array(b)) => a == b,
            (Composite(a), Composite(b)) => a == b,
            (Tabular(a), Tabular(b)) => a == b,
            // Opaque objects compare by type identity and canonical form.
            (Opaque(a), Opaque(b)) => {
                a.type_name() == b.type_name() && a.canonical_form() == b.canonical_form()
            }
            _ => false,
        }
    }
}

/// Named record with a stable field order.
///
/// Field order is meaningful for display only — lookup is by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompositeValue {
    fields: Vec<(String, ManagedValue)>,
}

impl CompositeValue {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Set a field, replacing an existing one with the same name.
    /// Returns the previous value if there was one.
    pub fn set(&mut self, name: impl Into<String>, value: ManagedValue) -> Option<ManagedValue> {
        let name = name.into();
        for (n, v) in &mut self.fields {
            if *n == name {
                return Some(std::mem::replace(v, value));
            }
        }
        self.fields.push((name, value));
        None
    }

    /// Builder-style `set`.
    pub fn with_field(mut self, name: impl Into<String>, value: ManagedValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ManagedValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ManagedValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Table of composite rows addressed by an ordered tuple of index values.
///
/// Insertion establishes the key tuple, which must be unique; lookup is
/// exact-match. Index values may themselves be composite.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularValue {
    index_names: Vec<String>,
    rows: Vec<(Vec<ManagedValue>, CompositeValue)>,
}

impl TabularValue {
    pub fn new(index_names: Vec<String>) -> Self {
        Self {
            index_names,
            rows: Vec::new(),
        }
    }

    pub fn index_names(&self) -> &[String] {
        &self.index_names
    }

    /// Insert a row under `key`. Duplicate key tuples are rejected.
    pub fn insert(&mut self, key: Vec<ManagedValue>, row: CompositeValue) -> Result<(), ConvertError> {
        if self.rows.iter().any(|(k, _)| *k == key) {
            let shown: Vec<String> = key
                .iter()
                .map(|v| v.key_string().unwrap_or_else(|| v.kind_name().to_string()))
                .collect();
            return Err(ConvertError::DuplicateIndex(shown.join(", ")));
        }
        self.rows.push((key, row));
        Ok(())
    }

    pub fn get(&self, key: &[ManagedValue]) -> Option<&CompositeValue> {
        self.rows.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    /// Look a row up by the canonical string forms of its key parts.
    /// Used for path-scoped extraction, where segments arrive as strings.
    pub fn get_by_key_strings(&self, parts: &[String]) -> Option<&CompositeValue> {
        self.rows
            .iter()
            .find(|(k, _)| {
                k.len() == parts.len()
                    && k.iter()
                        .zip(parts)
                        .all(|(v, p)| v.key_string().as_deref() == Some(p.as_str()))
            })
            .map(|(_, r)| r)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&[ManagedValue], &CompositeValue)> {
        self.rows.iter().map(|(k, r)| (k.as_slice(), r))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// An object the engine cannot (and must not) descend into reflectively.
///
/// Implementations expose a flat attribute surface. The default extractor
/// enumerates `attribute_names()` into a JSON object; a registered
/// simplifier replaces that with its own fixed attribute set.
pub trait OpaqueObject: fmt::Debug + Send + Sync {
    /// Exact runtime type name — the registry dispatch key.
    fn type_name(&self) -> &str;

    /// The type's canonical string form (used as a table key or a
    /// one-string rendition of the object).
    fn canonical_form(&self) -> String;

    fn attribute_names(&self) -> Vec<String>;

    fn attribute(&self, name: &str) -> Option<ManagedValue>;

    /// Write an attribute, returning the previous value.
    /// Opaque objects are read-only unless an implementation opts in.
    fn set_attribute(
        &self,
        _name: &str,
        _value: ManagedValue,
    ) -> Result<ManagedValue, ConvertError> {
        Err(ConvertError::ImmutableValue(self.type_name().to_string()))
    }
}

/// Management resource name with a `domain:key=value,key=value` form.
///
/// The canonical form orders properties by key, so two names built from
/// differently ordered property lists compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceName {
    domain: String,
    properties: Vec<(String, String)>,
}

impl ResourceName {
    pub fn parse(name: &str) -> Result<Self, ConvertError> {
        let (domain, props) = name
            .split_once(':')
            .ok_or_else(|| ConvertError::MalformedName(name.to_string()))?;
        if domain.is_empty() || props.is_empty() {
            return Err(ConvertError::MalformedName(name.to_string()));
        }
        let mut properties = Vec::new();
        for pair in props.split(',') {
            let (k, v) = pair
                .split_once('=')
                .ok_or_else(|| ConvertError::MalformedName(name.to_string()))?;
            if k.is_empty() {
                return Err(ConvertError::MalformedName(name.to_string()));
            }
            properties.push((k.to_string(), v.to_string()));
        }
        Ok(Self {
            domain: domain.to_string(),
            properties,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Canonical form: domain plus properties sorted by key.
    pub fn canonical(&self) -> String {
        let mut props = self.properties.clone();
        props.sort();
        let joined: Vec<String> = props.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}:{}", self.domain, joined.join(","))
    }
}

impl OpaqueObject for ResourceName {
    fn type_name(&self) -> &str {
        "ResourceName"
    }

    fn canonical_form(&self) -> String {
        self.canonical()
    }

    fn attribute_names(&self) -> Vec<String> {
        vec!["domain".to_string(), "canonicalName".to_string()]
    }

    fn attribute(&self, name: &str) -> Option<ManagedValue> {
        match name {
            "domain" => Some(ManagedValue::Text(self.domain.clone())),
            "canonicalName" => Some(ManagedValue::Text(self.canonical())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name_canonical_sorts_properties() {
        let a = ResourceName::parse("java.lang:type=Memory,name=heap").unwrap();
        let b = ResourceName::parse("java.lang:name=heap,type=Memory").unwrap();
        assert_eq!(a.canonical(), "java.lang:name=heap,type=Memory");
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.property("type"), Some("Memory"));
    }

    #[test]
    fn test_resource_name_rejects_garbage() {
        assert!(matches!(
            ResourceName::parse("no-colon-here"),
            Err(ConvertError::MalformedName(_))
        ));
        assert!(matches!(
            ResourceName::parse("domain:notapair"),
            Err(ConvertError::MalformedName(_))
        ));
    }

    #[test]
    fn test_composite_keeps_field_order() {
        let c = CompositeValue::new()
            .with_field("zeta", ManagedValue::Int(1))
            .with_field("alpha", ManagedValue::Int(2));
        let names: Vec<&str> = c.field_names().collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(c.get("alpha"), Some(&ManagedValue::Int(2)));
    }

    #[test]
    fn test_tabular_insert_and_lookup() {
        let mut t = TabularValue::new(vec!["verein".to_string()]);
        let row = CompositeValue::new()
            .with_field("verein", ManagedValue::Text("fcn".into()))
            .with_field("absteiger", ManagedValue::Bool(false));
        t.insert(vec![ManagedValue::Text("fcn".into())], row.clone())
            .unwrap();

        assert_eq!(t.get(&[ManagedValue::Text("fcn".into())]), Some(&row));
        assert_eq!(t.get_by_key_strings(&["fcn".to_string()]), Some(&row));
        assert_eq!(t.get(&[ManagedValue::Text("fcb".into())]), None);
    }

    #[test]
    fn test_tabular_rejects_duplicate_key() {
        let mut t = TabularValue::new(vec!["k".to_string()]);
        let row = CompositeValue::new().with_field("k", ManagedValue::Text("a".into()));
        t.insert(vec![ManagedValue::Text("a".into())], row.clone())
            .unwrap();
        let err = t
            .insert(vec![ManagedValue::Text("a".into())], row)
            .unwrap_err();
        assert!(matches!(err, ConvertError::DuplicateIndex(_)));
    }
}
