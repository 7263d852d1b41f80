use std::collections::HashMap;
use std::sync::Arc;

use ospect_api::{ConvertError, ManagedValue, OpaqueObject};

use crate::path::PathCursor;
use crate::serialize::{Extracted, SerializeContext};

/// Forward handler for one exact runtime type.
///
/// Implementations may consume path segments and recurse through the
/// context. Write support is opt-in; the default refuses.
pub trait Extractor: Send + Sync {
    /// Exact runtime type name this extractor handles — the dispatch key.
    fn type_name(&self) -> &str;

    fn extract(
        &self,
        ctx: &mut SerializeContext<'_>,
        obj: &dyn OpaqueObject,
        path: &mut PathCursor,
        jsonify: bool,
    ) -> Result<Extracted, ConvertError>;

    fn can_set(&self) -> bool {
        false
    }

    fn set_value(
        &self,
        obj: &dyn OpaqueObject,
        attribute: &str,
        value: ManagedValue,
    ) -> Result<ManagedValue, ConvertError> {
        let _ = (obj, attribute, value);
        Err(ConvertError::ImmutableValue(self.type_name().to_string()))
    }
}

/// Startup-frozen extractor table, keyed by exact runtime type name.
///
/// Built once from an externally ordered handler list and never mutated
/// afterwards — concurrent reads need no locking.
pub struct ExtractorRegistry {
    handlers: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Registry with the bundled simplifiers only.
    pub fn with_defaults() -> Self {
        RegistryBuilder::with_defaults().build()
    }

    pub fn lookup(&self, type_name: &str) -> Option<Arc<dyn Extractor>> {
        self.handlers.get(type_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder consuming an already-ordered handler list.
///
/// The list arrives conflict-resolved from the plugin-loading collaborator:
/// the first registration for a type name wins, later ones are ignored.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: Vec<Arc<dyn Extractor>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut builder = Self::new();
        for simplifier in crate::simplifier::defaults() {
            builder.handlers.push(simplifier);
        }
        builder
    }

    pub fn register(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.handlers.push(extractor);
        self
    }

    /// Freeze into an immutable registry.
    pub fn build(self) -> ExtractorRegistry {
        let mut handlers: HashMap<String, Arc<dyn Extractor>> = HashMap::new();
        for extractor in self.handlers {
            handlers
                .entry(extractor.type_name().to_string())
                .or_insert(extractor);
        }
        ExtractorRegistry { handlers }
    }
}
