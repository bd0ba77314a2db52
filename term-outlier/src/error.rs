//! Error types for the term-outlier detection library.
//!
//! All fallible operations in this crate return [`Result`], whose error side is the
//! [`OutlierError`] enum. Two kinds of failure deserve special mention:
//!
//! - **Input faults** ([`OutlierError::DimensionMismatch`], [`OutlierError::InvalidCoordinate`])
//!   are raised before an offending batch touches the window, so the detector stays usable.
//! - **Consistency faults** ([`OutlierError::ConsistencyFault`]) signal that two structures
//!   which must agree (for example the micro-cluster tree and the cluster registry) have
//!   diverged. The operation that detected the fault is aborted; the detector should be
//!   discarded afterwards.

use thiserror::Error;

/// The main error type for term-outlier.
#[derive(Error, Debug)]
pub enum OutlierError {
    /// A vector with the wrong dimensionality was supplied.
    #[error("Dimension mismatch at batch position {position}: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Dimensionality fixed by the detector
        expected: usize,
        /// Dimensionality of the rejected vector
        found: usize,
        /// Position of the vector inside its batch
        position: usize,
    },

    /// A vector contained a NaN or infinite coordinate.
    #[error("Invalid coordinate at batch position {position}, dimension {dimension}: {value}")]
    InvalidCoordinate {
        /// Position of the vector inside its batch
        position: usize,
        /// Offending dimension
        dimension: usize,
        /// The rejected value
        value: f64,
    },

    /// Two structures that must be mutated together disagree.
    #[error("Consistency fault in {structure}: {message}")]
    ConsistencyFault {
        /// Structure where the mismatch was detected
        structure: String,
        /// Detailed description of the mismatch
        message: String,
    },

    /// Invalid construction parameters or misuse of a detector.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error when parsing stream input.
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number of the offending record
        line: u64,
        /// Detailed error message
        message: String,
    },

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the CSV reader.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, OutlierError>`.
///
/// # Examples
///
/// ```rust
/// use term_outlier::error::Result;
///
/// fn check_radius(radius: f64) -> Result<f64> {
///     Ok(radius)
/// }
/// # check_radius(1.0).unwrap();
/// ```
pub type Result<T> = std::result::Result<T, OutlierError>;

impl OutlierError {
    /// Creates a new consistency fault for the named structure.
    pub fn consistency(structure: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConsistencyFault {
            structure: structure.into(),
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a new parse error for a 1-based line number.
    pub fn parse(line: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Returns true for faults caused by malformed caller input.
    pub fn is_input_fault(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::InvalidCoordinate { .. }
        )
    }

    /// Returns true when internal structures were found out of sync.
    pub fn is_consistency_fault(&self) -> bool {
        matches!(self, Self::ConsistencyFault { .. })
    }
}

impl From<serde_json::Error> for OutlierError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<OutlierError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| wrap(msg, e.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(&f(), e.into()))
    }
}

// Input and consistency faults keep their variant so callers can still match on them.
fn wrap(msg: &str, err: OutlierError) -> OutlierError {
    match err {
        OutlierError::ConsistencyFault { structure, message } => OutlierError::ConsistencyFault {
            structure,
            message: format!("{msg}: {message}"),
        },
        err if err.is_input_fault() => err,
        OutlierError::Internal(inner) => OutlierError::Internal(format!("{msg}: {inner}")),
        other => OutlierError::Internal(format!("{msg}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OutlierError::DimensionMismatch {
            expected: 2,
            found: 3,
            position: 4,
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch at batch position 4: expected 2, found 3"
        );

        let err = OutlierError::consistency("micro-cluster index", "cluster 7 missing from tree");
        assert_eq!(
            err.to_string(),
            "Consistency fault in micro-cluster index: cluster 7 missing from tree"
        );

        let err = OutlierError::parse(12, "expected a number");
        assert_eq!(err.to_string(), "Parse error at line 12: expected a number");
    }

    #[test]
    fn test_fault_classification() {
        let input = OutlierError::InvalidCoordinate {
            position: 0,
            dimension: 1,
            value: f64::NAN,
        };
        assert!(input.is_input_fault());
        assert!(!input.is_consistency_fault());

        let fault = OutlierError::consistency("registry", "stale entry");
        assert!(fault.is_consistency_fault());
        assert!(!fault.is_input_fault());
    }

    #[test]
    fn test_error_context() {
        let io: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = io.context("opening stream").unwrap_err();
        assert!(err.to_string().contains("opening stream"));

        let fault: std::result::Result<(), OutlierError> =
            Err(OutlierError::consistency("tree", "entry not found"));
        let err = fault.with_context(|| "expiring id 3".to_string()).unwrap_err();
        assert!(err.is_consistency_fault());
        assert!(err.to_string().contains("expiring id 3: entry not found"));
    }
}
