//! Error types for OBB tree construction with rich diagnostics.
//!
//! This module provides:
//! - Machine-readable error codes for programmatic handling
//! - Context about which cell or parameter was at fault
//! - Recovery suggestions for common issues
//! - Terminal display via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `OBB-XXXX`:
//! - `OBB-1xxx`: Input errors (missing or malformed mesh data)
//! - `OBB-2xxx`: Parameter errors
//!
//! Queries never fail: an empty or unbuilt tree simply yields no result.
//!
//! # Example
//!
//! ```rust,ignore
//! use mesh_obb::{ObbError, ObbErrorCode};
//!
//! let err = ObbError::invalid_point_index(3, 12, 8);
//! println!("Error code: {}", err.code()); // OBB-1003
//! println!("Recovery: {}", err.recovery_suggestion());
//! ```

// thiserror's Display impls read the struct fields, rustc sometimes misses that.
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for OBB tree operations.
pub type ObbResult<T> = Result<T, ObbError>;

/// Machine-readable error codes for OBB tree operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObbErrorCode {
    // Input errors (1xxx)
    /// OBB-1001: No mesh has been attached to the tree
    NoDataSet = 1001,
    /// OBB-1002: Mesh has no points or no cells
    EmptyMesh = 1002,
    /// OBB-1003: Cell references a point that doesn't exist
    InvalidPointIndex = 1003,

    // Parameter errors (2xxx)
    /// OBB-2001: Build or query parameters are out of range
    InvalidParams = 2001,
}

impl ObbErrorCode {
    /// Returns the error code as a string in the format `OBB-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObbErrorCode::NoDataSet => "OBB-1001",
            ObbErrorCode::EmptyMesh => "OBB-1002",
            ObbErrorCode::InvalidPointIndex => "OBB-1003",
            ObbErrorCode::InvalidParams => "OBB-2001",
        }
    }
}

impl std::fmt::Display for ObbErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for OBB tree errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Attach a mesh before building.
    SetDataSet,
    /// Check the source mesh for the listed problems.
    CheckSourceMesh { checks: Vec<String> },
    /// Adjust the named parameters.
    AdjustParameters { parameters: Vec<(String, String)> },
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::SetDataSet => {
                write!(f, "Call set_data_set() with a mesh before building")
            }
            RecoverySuggestion::CheckSourceMesh { checks } => {
                write!(f, "Check the source mesh for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
        }
    }
}

/// Errors that can occur while building an OBB tree.
#[derive(Debug, Error, Diagnostic)]
pub enum ObbError {
    /// No mesh attached.
    #[error("can't build OBB tree: no mesh attached")]
    #[diagnostic(
        code(mesh_obb::input::no_data_set),
        help("Attach a mesh with set_data_set() before calling build_locator().")
    )]
    NoDataSet,

    /// Mesh has no points or no cells.
    #[error("can't build OBB tree: {details}")]
    #[diagnostic(
        code(mesh_obb::input::empty),
        help("The mesh must have at least one point and one cell.")
    )]
    EmptyMesh { details: String },

    /// Cell references an out-of-range point.
    #[error(
        "invalid point index: cell {cell_id} references point {point_index}, but mesh only has {point_count} points"
    )]
    #[diagnostic(
        code(mesh_obb::input::point_index),
        help("Remove or repair cells that reference missing points.")
    )]
    InvalidPointIndex {
        cell_id: usize,
        point_index: u32,
        point_count: usize,
    },

    /// Build parameters out of range.
    #[error("invalid OBB tree parameters: {details}")]
    #[diagnostic(code(mesh_obb::params::invalid))]
    InvalidParams { details: String },
}

impl ObbError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ObbErrorCode {
        match self {
            ObbError::NoDataSet => ObbErrorCode::NoDataSet,
            ObbError::EmptyMesh { .. } => ObbErrorCode::EmptyMesh,
            ObbError::InvalidPointIndex { .. } => ObbErrorCode::InvalidPointIndex,
            ObbError::InvalidParams { .. } => ObbErrorCode::InvalidParams,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            ObbError::NoDataSet => RecoverySuggestion::SetDataSet,
            ObbError::EmptyMesh { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["mesh has points".into(), "mesh has cells".into()],
            },
            ObbError::InvalidPointIndex { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["cell connectivity".into(), "point count".into()],
            },
            ObbError::InvalidParams { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![
                    ("tolerance".into(), ">= 0".into()),
                    ("good_split_ratio".into(), "in (0, fallback_split_ratio]".into()),
                    ("fallback_split_ratio".into(), "in (0, 1]".into()),
                ],
            },
        }
    }

    /// Create an EmptyMesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        ObbError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create an InvalidPointIndex error.
    pub fn invalid_point_index(cell_id: usize, point_index: u32, point_count: usize) -> Self {
        ObbError::InvalidPointIndex {
            cell_id,
            point_index,
            point_count,
        }
    }

    /// Create an InvalidParams error.
    pub fn invalid_params(details: impl Into<String>) -> Self {
        ObbError::InvalidParams {
            details: details.into(),
        }
    }
}
