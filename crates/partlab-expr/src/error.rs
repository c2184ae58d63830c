//! Expression error types

use thiserror::Error;

/// Result type for expression operations
pub type ExprResult<T> = std::result::Result<T, ExprError>;

/// Errors that can occur during expression parsing, resolution or evaluation
#[derive(Debug, Error)]
pub enum ExprError {
    /// Expression parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Expression evaluation error
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Type error during evaluation
    #[error("Type error: {0}")]
    Type(String),

    /// Unit error during evaluation
    #[error("Unit error: {0}")]
    Unit(String),

    /// Unknown function name
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// A path element could not be resolved
    #[error("Cannot resolve {kind} '{name}'")]
    NotResolved { kind: &'static str, name: String },

    /// A label matched more than one document or object
    #[error("Ambiguous {kind} label '{name}'")]
    Ambiguous { kind: &'static str, name: String },

    /// Error from the document graph
    #[error(transparent)]
    Core(#[from] partlab_core::Error),

    /// Error annotated with the expression it occurred in
    #[error("{source}\nin expression: {expr}")]
    InExpression {
        #[source]
        source: Box<ExprError>,
        expr: String,
    },
}

impl ExprError {
    /// Wrap an error with the rendered expression it occurred in.
    ///
    /// Already-wrapped errors pass through unchanged so nested evaluation
    /// reports the outermost expression only once.
    pub fn in_expression(self, expr: &str) -> Self {
        match self {
            e @ ExprError::InExpression { .. } => e,
            other => ExprError::InExpression {
                source: Box::new(other),
                expr: expr.to_string(),
            },
        }
    }
}
