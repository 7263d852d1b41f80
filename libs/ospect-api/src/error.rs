/// Conversion error — returned by both the forward and the reverse engine.
///
/// Forward-path errors are routed through a `ValueFaultHandler` first and
/// may be substituted; reverse-path errors are always fatal to the call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvertError {
    /// A path segment names a field/element absent from the current node.
    #[error("attribute not found: {0}")]
    AttributeNotFound(String),

    /// A path has remaining segments but the current node is a scalar.
    #[error("cannot descend into {kind} value with remaining path segment '{segment}'")]
    CannotDescend { kind: String, segment: String },

    /// A write was attempted on a structurally read-only value kind.
    #[error("{0} values are immutable and cannot be written to")]
    ImmutableValue(String),

    /// The JSON kind of the input does not match what the descriptor requires.
    #[error("expected a JSON {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// A composite input contains a key not declared in the descriptor.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Tabular full-form `indexNames` do not match the declared index fields.
    #[error("bad index names: {0}")]
    BadIndexNames(String),

    /// A numeric literal does not conform to the target kind
    /// (fractional input for an integral kind, out of range, garbage).
    #[error("invalid {kind} literal: '{literal}'")]
    NumberFormat { kind: String, literal: String },

    /// Raw text input is not well-formed JSON.
    #[error("malformed JSON text at line {line}, column {column}: {message}")]
    MalformedText {
        line: usize,
        column: usize,
        message: String,
    },

    /// The descriptor names a kind with no registered reverse handler.
    #[error("no converter for type {0}")]
    NoConverter(String),

    /// Two tabular rows produced the same index tuple.
    #[error("duplicate index tuple: {0}")]
    DuplicateIndex(String),

    /// A resource name string does not follow `domain:key=value,...`.
    #[error("malformed resource name: {0}")]
    MalformedName(String),
}

impl ConvertError {
    pub fn shape(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn number(kind: impl Into<String>, literal: impl Into<String>) -> Self {
        Self::NumberFormat {
            kind: kind.into(),
            literal: literal.into(),
        }
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedText {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        }
    }
}
