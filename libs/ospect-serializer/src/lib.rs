//! Bidirectional conversion between runtime management values and JSON.
//!
//! - [`serialize::StateSerializer`] walks a [`ospect_api::ManagedValue`]
//!   graph into JSON, with path-scoped partial extraction, traversal
//!   limits and a pluggable fault policy.
//! - [`deserialize::deserialize`] reconstructs a value from JSON against
//!   a [`ospect_api::TypeDescriptor`], strictly.
//! - [`registry::ExtractorRegistry`] dispatches opaque runtime objects to
//!   type-specific handlers; [`simplifier`] carries the bundled ones.

pub mod deserialize;
pub mod path;
pub mod registry;
pub mod serialize;
pub mod simplifier;

pub use deserialize::{deserialize, deserialize_text};
pub use path::{PathCursor, escape_segment, join_path, split_path};
pub use registry::{Extractor, ExtractorRegistry, RegistryBuilder};
pub use serialize::{
    DEPTH_LIMIT_MARKER, Extracted, OBJECT_LIMIT_MARKER, SerializeContext, StateSerializer,
    TRUNCATION_MARKER,
};
pub use simplifier::{ModuleInfo, Simplifier, UrlValue};
