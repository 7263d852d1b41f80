pub mod descriptor;
pub mod error;
pub mod options;
pub mod value;

pub use descriptor::{CompositeDescriptor, SimpleKind, TabularDescriptor, TypeDescriptor};
pub use error::ConvertError;
pub use options::{IgnoringFaultHandler, SerializeOptions, ThrowingFaultHandler, ValueFaultHandler};
pub use value::{CompositeValue, ManagedValue, OpaqueObject, ResourceName, TabularValue};
