use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the formulary crate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// An argument given to a public entry point is not acceptable
    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),
    /// The math definition in use is inconsistent
    #[error("InvalidDefinition: {0}")]
    InvalidDefinition(String),
    /// The operation is not allowed in the current state of the service
    #[error("InvalidOperation: {0}")]
    InvalidOperation(String),
    /// The expression parsed, but its types cannot be reconciled
    #[error("ExpressionNotValidLogically: {0}")]
    ExpressionNotValidLogically(String),
    /// No registered function overload accepts the call
    #[error("FunctionCallNotValidLogically: {0}")]
    FunctionCallNotValidLogically(String),
    /// The text does not have the structure of an expression
    #[error("StructuralError: {0}")]
    Structural(String),
    /// No value was supplied for a parameter during evaluation
    #[error("MissingParameter: no value for '{0}'")]
    MissingParameter(String),
    /// A parameter value does not have the type the expression requires
    #[error("ParameterTypeMismatch: {0}")]
    ParameterTypeMismatch(String),
    /// Arithmetic or function failure during evaluation
    #[error("EvaluationError: {0}")]
    Evaluation(String),
    /// The expression was not recognized and cannot be computed
    #[error("NotRecognized: '{0}' was not recognized as an expression")]
    NotRecognized(String),
    /// The operation was cancelled through its cancellation token
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the error belongs to the soft failure channel, i.e. the text
    /// simply does not make sense as an expression.
    pub(crate) fn is_soft(&self) -> bool {
        matches!(self, Self::Structural(_))
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn display() {
        assert_eq!(
            Error::MissingParameter("x".into()).to_string(),
            "MissingParameter: no value for 'x'"
        );
        assert_eq!(Error::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn soft_errors() {
        assert!(Error::Structural("(".into()).is_soft());
        assert!(!Error::ExpressionNotValidLogically("x".into()).is_soft());
    }
}
