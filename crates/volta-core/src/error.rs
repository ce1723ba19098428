//! Unified error type for the volta engine.
//!
//! Only caller errors are fatal: malformed sparse inputs ([`VoltaError::ShapeMismatch`]),
//! invalid circuit data and bad configuration. Numerical failures inside the solvers
//! (singular systems, iteration limits, exhausted line searches) are reported on the
//! result structures instead, so most of the variants below only cross an API boundary
//! when a caller asks for a strict answer.
//!
//! # Example
//!
//! ```ignore
//! use volta_core::{VoltaError, VoltaResult};
//!
//! fn check(circuit: &NumericalCircuit) -> VoltaResult<()> {
//!     circuit.validate()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all volta operations.
#[derive(Error, Debug)]
pub enum VoltaError {
    /// Sparse structure or array lengths disagree with each other
    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// Circuit data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A factorization produced non-finite values
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    /// An island has neither a slack bus nor a PV bus to promote
    #[error("Island {0} has no slack candidate")]
    UnsolvableIsland(usize),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O errors (config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl VoltaError {
    /// Shorthand for a [`VoltaError::ShapeMismatch`].
    pub fn shape(context: impl Into<String>, expected: usize, found: usize) -> Self {
        VoltaError::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }

    /// Whether the error must abort the calling operation.
    ///
    /// Numerical failures are recoverable: the caller keeps the best-known state.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            VoltaError::SingularMatrix(_) | VoltaError::UnsolvableIsland(_)
        )
    }
}

/// Convenience type alias for Results using VoltaError.
pub type VoltaResult<T> = Result<T, VoltaError>;

impl From<anyhow::Error> for VoltaError {
    fn from(err: anyhow::Error) -> Self {
        VoltaError::Other(err.to_string())
    }
}

impl From<String> for VoltaError {
    fn from(s: String) -> Self {
        VoltaError::Other(s)
    }
}

impl From<&str> for VoltaError {
    fn from(s: &str) -> Self {
        VoltaError::Other(s.to_string())
    }
}

impl From<toml::de::Error> for VoltaError {
    fn from(err: toml::de::Error) -> Self {
        VoltaError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_display() {
        let err = VoltaError::shape("Cf rows", 4, 3);
        let msg = err.to_string();
        assert!(msg.contains("Cf rows"));
        assert!(msg.contains("expected 4"));
        assert!(msg.contains("found 3"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_numerical_errors_are_recoverable() {
        assert!(!VoltaError::SingularMatrix("jacobian".into()).is_fatal());
        assert!(!VoltaError::UnsolvableIsland(2).is_fatal());
        assert!(VoltaError::Validation("bad".into()).is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VoltaError = io_err.into();
        assert!(matches!(err, VoltaError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> VoltaResult<()> {
            Err(VoltaError::Validation("test".into()))
        }

        fn outer() -> VoltaResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
