use thiserror::Error;

/// A single parse diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// Raised by [`to_value`](crate::to_value) for host shapes the value model
/// cannot hold, such as a map keyed by arrays.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SerializeError(String);

impl serde::ser::Error for SerializeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        SerializeError(msg.to_string())
    }
}

/// A host value that could not be turned into a [`Value`](crate::Value).
#[derive(Debug, Error)]
#[error("cannot convert binding `{name}`: {source}")]
pub struct ConversionError {
    pub name: String,
    #[source]
    pub source: SerializeError,
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// Every binding that failed to convert, in binding order.
    #[error("{} binding(s) failed to convert: {}", .0.len(), join_lines(.0))]
    Conversion(Vec<ConversionError>),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template parse failed:\n{}", join_lines(.0))]
    Parse(Vec<ParseError>),
    #[error("template not found: {0}")]
    NotFound(String),
}

fn join_lines<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
