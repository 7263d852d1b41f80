use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

/// Leaf kind of a `Simple` descriptor.
///
/// `Void` is declarable but has no reverse converter — deserializing
/// against it reports `NoConverter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimpleKind {
    Boolean,
    Integer,
    Long,
    Double,
    String,
    Date,
    ObjectName,
    Void,
}

impl SimpleKind {
    pub fn name(&self) -> &'static str {
        match self {
            SimpleKind::Boolean => "Boolean",
            SimpleKind::Integer => "Integer",
            SimpleKind::Long => "Long",
            SimpleKind::Double => "Double",
            SimpleKind::String => "String",
            SimpleKind::Date => "Date",
            SimpleKind::ObjectName => "ObjectName",
            SimpleKind::Void => "Void",
        }
    }
}

/// Shape a reverse conversion must produce.
///
/// Descriptor trees are built once from static schema information and
/// shared immutably across conversions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeDescriptor {
    Simple(SimpleKind),
    /// `dims` counts nested array levels; `element` is the descriptor
    /// left once all levels are unwound.
    Array {
        element: Box<TypeDescriptor>,
        dims: u32,
    },
    Composite(CompositeDescriptor),
    Tabular(TabularDescriptor),
}

impl TypeDescriptor {
    pub fn array(element: TypeDescriptor, dims: u32) -> Self {
        TypeDescriptor::Array {
            element: Box::new(element),
            dims,
        }
    }

    /// Declared name, used in error messages.
    pub fn kind_name(&self) -> String {
        match self {
            TypeDescriptor::Simple(k) => k.name().to_string(),
            TypeDescriptor::Array { element, dims } => {
                format!("{}[{dims}]", element.kind_name())
            }
            TypeDescriptor::Composite(c) => c.type_name.clone(),
            TypeDescriptor::Tabular(t) => t.row.type_name.clone(),
        }
    }
}

/// Ordered field name → descriptor map of a named record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeDescriptor {
    pub type_name: String,
    fields: Vec<(String, TypeDescriptor)>,
}

impl CompositeDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, descriptor: TypeDescriptor) -> Self {
        self.fields.push((name.into(), descriptor));
        self
    }

    pub fn field(&self, name: &str) -> Option<&TypeDescriptor> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeDescriptor)> {
        self.fields.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Row schema plus the ordered list of index field names that address rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularDescriptor {
    pub row: CompositeDescriptor,
    index_names: Vec<String>,
}

impl TabularDescriptor {
    /// `index_names` must be a non-empty subset of the row's field names.
    pub fn new(row: CompositeDescriptor, index_names: Vec<String>) -> Result<Self, ConvertError> {
        if index_names.is_empty() {
            return Err(ConvertError::BadIndexNames(
                "index field list must not be empty".to_string(),
            ));
        }
        for name in &index_names {
            if row.field(name).is_none() {
                return Err(ConvertError::BadIndexNames(format!(
                    "index field '{name}' is not a row field of '{}'",
                    row.type_name
                )));
            }
        }
        Ok(Self { row, index_names })
    }

    pub fn index_names(&self) -> &[String] {
        &self.index_names
    }
}
