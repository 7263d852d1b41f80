//! Simplifiers: handlers for reflectively opaque types that expose a
//! small fixed set of named attributes instead of full attribute descent.

use std::sync::Arc;

use serde_json::{Map, Value};

use ospect_api::{ConvertError, ManagedValue, OpaqueObject};

use crate::path::PathCursor;
use crate::registry::Extractor;
use crate::serialize::{Extracted, SerializeContext};

type AttributeFn = Arc<dyn Fn(&dyn OpaqueObject) -> ManagedValue + Send + Sync>;

/// An extractor specialization that renders one exact opaque type as a
/// fixed-field record. One attribute is designated as the type's
/// canonical string form.
pub struct Simplifier {
    type_name: String,
    canonical_attribute: String,
    attributes: Vec<(String, AttributeFn)>,
}

impl Simplifier {
    pub fn new(type_name: impl Into<String>, canonical_attribute: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            canonical_attribute: canonical_attribute.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        extract: impl Fn(&dyn OpaqueObject) -> ManagedValue + Send + Sync + 'static,
    ) -> Self {
        self.attributes.push((name.into(), Arc::new(extract)));
        self
    }

    pub fn canonical_attribute(&self) -> &str {
        &self.canonical_attribute
    }
}

impl Extractor for Simplifier {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn extract(
        &self,
        ctx: &mut SerializeContext<'_>,
        obj: &dyn OpaqueObject,
        path: &mut PathCursor,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError> {
        if let Some(seg) = path.pop() {
            return match self.attributes.iter().find(|(name, _)| *name == seg) {
                Some((_, extract)) => {
                    let attr = extract(obj);
                    ctx.extract(&attr, path, jsonify)
                }
                None => ctx.fault(
                    ConvertError::AttributeNotFound(format!(
                        "attribute '{seg}' on {}",
                        self.type_name
                    )),
                    jsonify,
                ),
            };
        }
        let mut map = Map::new();
        for (name, extract) in &self.attributes {
            let attr = extract(obj);
            let rendered = match ctx.extract(&attr, path, true)? {
                Extracted::Json(v) => v,
                Extracted::Raw(v) => Value::String(
                    v.key_string().unwrap_or_else(|| v.kind_name().to_string()),
                ),
            };
            map.insert(name.clone(), rendered);
        }
        Ok(Extracted::Json(Value::Object(map)))
    }
}

/// A URL rendered as `{"url": "<external form>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlValue(pub String);

impl OpaqueObject for UrlValue {
    fn type_name(&self) -> &str {
        "Url"
    }

    fn canonical_form(&self) -> String {
        self.0.clone()
    }

    fn attribute_names(&self) -> Vec<String> {
        vec!["url".to_string()]
    }

    fn attribute(&self, name: &str) -> Option<ManagedValue> {
        match name {
            "url" => Some(ManagedValue::Text(self.0.clone())),
            _ => None,
        }
    }
}

/// A code module rendered as `{"module": "<name>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
}

impl OpaqueObject for ModuleInfo {
    fn type_name(&self) -> &str {
        "Module"
    }

    fn canonical_form(&self) -> String {
        self.name.clone()
    }

    fn attribute_names(&self) -> Vec<String> {
        vec!["module".to_string()]
    }

    fn attribute(&self, name: &str) -> Option<ManagedValue> {
        match name {
            "module" => Some(ManagedValue::Text(self.name.clone())),
            _ => None,
        }
    }
}

pub fn resource_name_simplifier() -> Simplifier {
    Simplifier::new("ResourceName", "objectName")
        .with_attribute("objectName", |o| ManagedValue::Text(o.canonical_form()))
}

pub fn url_simplifier() -> Simplifier {
    Simplifier::new("Url", "url").with_attribute("url", |o| ManagedValue::Text(o.canonical_form()))
}

pub fn module_simplifier() -> Simplifier {
    Simplifier::new("Module", "module")
        .with_attribute("module", |o| ManagedValue::Text(o.canonical_form()))
}

/// The bundled simplifier set, in registration order.
pub fn defaults() -> Vec<Arc<dyn Extractor>> {
    vec![
        Arc::new(resource_name_simplifier()),
        Arc::new(url_simplifier()),
        Arc::new(module_simplifier()),
    ]
}
