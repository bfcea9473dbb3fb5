//! # Error Types
//!
//! Structured error types for truss_core. Errors serialize to JSON so a
//! batch run can report exactly which node, beam pair or artifact failed.
//!
//! Two classes of failure exist:
//!
//! - **Item-level** (`IsolatedNode`, `InvalidLoad`, `GeometryConstructionFailure`):
//!   one node or beam pair is bad. The stage logs it, records it in its
//!   [`StageReport`](crate::report::StageReport) and carries on.
//! - **Stage-level** (everything else): the stage cannot run at all and
//!   aborts immediately.
//!
//! ## Example
//!
//! ```rust
//! use truss_core::errors::{TrussError, TrussResult};
//!
//! fn check_tolerance(tolerance_mm: f64) -> TrussResult<()> {
//!     if tolerance_mm <= 0.0 {
//!         return Err(TrussError::invalid_input(
//!             "merge_tolerance_mm",
//!             tolerance_mm.to_string(),
//!             "Tolerance must be positive",
//!         ));
//!     }
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for truss_core operations
pub type TrussResult<T> = Result<T, TrussError>;

/// Structured error type for pipeline operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum TrussError {
    /// No line geometry was supplied to the network builder
    #[error("Empty input: no line segments supplied")]
    EmptyInput,

    /// A node with no incident beams reached the joint classifier
    #[error("Isolated node {node_id}: degree 0 has no connector archetype")]
    IsolatedNode { node_id: usize },

    /// A load component is negative or not finite
    #[error("Invalid load at node {node_id}: {component} = {value}")]
    InvalidLoad {
        node_id: usize,
        component: String,
        value: f64,
    },

    /// A required upstream artifact is absent or malformed
    #[error("Missing input: {artifact} at '{path}' - {reason}")]
    MissingInput {
        artifact: String,
        path: String,
        reason: String,
    },

    /// A single solid or boolean operation could not be built
    #[error("Geometry construction failed for '{label}': {reason}")]
    GeometryConstructionFailure { label: String, reason: String },

    /// An input or configuration value is invalid
    #[error("Invalid input for '{field}': {value} - {reason}")]
    InvalidInput {
        field: String,
        value: String,
        reason: String,
    },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// Artifact schema version mismatch
    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: String,
        expected_version: String,
    },
}

impl TrussError {
    /// Create an InvalidInput error
    pub fn invalid_input(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        TrussError::InvalidInput {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidLoad error
    pub fn invalid_load(node_id: usize, component: impl Into<String>, value: f64) -> Self {
        TrussError::InvalidLoad {
            node_id,
            component: component.into(),
            value,
        }
    }

    /// Create a MissingInput error
    pub fn missing_input(artifact: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        TrussError::MissingInput {
            artifact: artifact.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a GeometryConstructionFailure error
    pub fn geometry_failure(label: impl Into<String>, reason: impl Into<String>) -> Self {
        TrussError::GeometryConstructionFailure {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(operation: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        TrussError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization(reason: impl Into<String>) -> Self {
        TrussError::SerializationError {
            reason: reason.into(),
        }
    }

    /// True for failures scoped to a single node or beam pair.
    ///
    /// Stages skip these and keep going; any other error aborts the stage.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            TrussError::IsolatedNode { .. }
                | TrussError::InvalidLoad { .. }
                | TrussError::GeometryConstructionFailure { .. }
        )
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            TrussError::EmptyInput => "EMPTY_INPUT",
            TrussError::IsolatedNode { .. } => "ISOLATED_NODE",
            TrussError::InvalidLoad { .. } => "INVALID_LOAD",
            TrussError::MissingInput { .. } => "MISSING_INPUT",
            TrussError::GeometryConstructionFailure { .. } => "GEOMETRY_CONSTRUCTION_FAILURE",
            TrussError::InvalidInput { .. } => "INVALID_INPUT",
            TrussError::FileError { .. } => "FILE_ERROR",
            TrussError::SerializationError { .. } => "SERIALIZATION_ERROR",
            TrussError::VersionMismatch { .. } => "VERSION_MISMATCH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let error = TrussError::invalid_load(4, "vertical_n", -10.0);
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("InvalidLoad"));
        let roundtrip: TrussError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, roundtrip);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(TrussError::EmptyInput.error_code(), "EMPTY_INPUT");
        assert_eq!(TrussError::IsolatedNode { node_id: 3 }.error_code(), "ISOLATED_NODE");
        assert_eq!(
            TrussError::missing_input("network", "truss_network.json", "not found").error_code(),
            "MISSING_INPUT"
        );
    }

    #[test]
    fn test_item_level_classification() {
        assert!(TrussError::IsolatedNode { node_id: 0 }.is_item_level());
        assert!(TrussError::geometry_failure("Beam_0-1", "degenerate").is_item_level());
        assert!(!TrussError::EmptyInput.is_item_level());
        assert!(!TrussError::missing_input("network", "x", "y").is_item_level());
    }

    #[test]
    fn test_display_includes_context() {
        let error = TrussError::IsolatedNode { node_id: 12 };
        assert!(error.to_string().contains("12"));
    }
}
