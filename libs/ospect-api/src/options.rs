use crate::error::ConvertError;

/// Limits for one forward pass. `0` means unlimited.
///
/// Limits truncate deterministically — they never fail the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Nesting depth at which containers collapse to a placeholder.
    pub max_depth: usize,
    /// Per-collection element/entry cap; excess is replaced by a marker.
    pub max_collection_size: usize,
    /// Total emitted-node budget for the whole pass.
    pub max_objects: usize,
}

impl SerializeOptions {
    pub const DEFAULT: SerializeOptions = SerializeOptions {
        max_depth: 0,
        max_collection_size: 0,
        max_objects: 0,
    };

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_collection_size(mut self, max_collection_size: usize) -> Self {
        self.max_collection_size = max_collection_size;
        self
    }

    pub fn with_max_objects(mut self, max_objects: usize) -> Self {
        self.max_objects = max_objects;
        self
    }
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Strategy invoked on every recoverable error in the forward path.
///
/// The handler either substitutes a JSON value and lets the traversal
/// continue, or re-raises the fault and aborts the call.
pub trait ValueFaultHandler: Send + Sync {
    fn handle(&self, fault: ConvertError) -> Result<serde_json::Value, ConvertError>;
}

/// Default policy: every fault aborts the call.
pub struct ThrowingFaultHandler;

impl ValueFaultHandler for ThrowingFaultHandler {
    fn handle(&self, fault: ConvertError) -> Result<serde_json::Value, ConvertError> {
        Err(fault)
    }
}

/// Tolerant policy: substitute `null` and keep going.
pub struct IgnoringFaultHandler;

impl ValueFaultHandler for IgnoringFaultHandler {
    fn handle(&self, _fault: ConvertError) -> Result<serde_json::Value, ConvertError> {
        Ok(serde_json::Value::Null)
    }
}
