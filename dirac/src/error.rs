// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for Dirac operator construction and application.
//!
//! Two failure modes matter to callers: a field handed to an operator does
//! not match what the operator expects (extent, site subset, spin count,
//! precision), or the operator cannot be built from the parameters given.
//! Both abort the call before any output is written.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type DiracResult<T> = Result<T, DiracError>;

/// Errors raised by the field validation layer, the factory and the
/// reference collaborators.
#[derive(Debug, Error)]
pub enum DiracError {
    /// A spinor field disagrees with its partner fields or with the operator.
    #[error("{field} field mismatch in {property}: expected {expected}, found {found}")]
    FieldMismatch {
        /// Role of the offending field in the call (`out`, `in`, `x`, `b`).
        field: &'static str,
        /// Property that disagreed (`site subset`, `extent`, `nspin`, `precision`).
        property: &'static str,
        /// Value required by the operation.
        expected: String,
        /// Value carried by the field.
        found: String,
    },

    /// The requested operator or solve cannot be constructed as configured.
    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    /// A solver parameter record could not be parsed.
    #[error("malformed parameter record: {0}")]
    Param(#[from] serde_json::Error),
}

impl DiracError {
    pub(crate) fn mismatch(
        field: &'static str,
        property: &'static str,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Self::FieldMismatch {
            field,
            property,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_field_mismatch_names_field_and_property() {
        let err = DiracError::mismatch("in", "site subset", "parity", "full");
        let msg = err.to_string();
        assert!(msg.contains("in field"), "{msg}");
        assert!(msg.contains("site subset"), "{msg}");
        assert!(msg.contains("expected parity"), "{msg}");
    }

    #[test]
    fn display_unsupported() {
        let err = DiracError::unsupported("clover inverse missing");
        assert_eq!(
            err.to_string(),
            "unsupported configuration: clover inverse missing"
        );
    }

    #[test]
    fn json_errors_convert() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: DiracError = parse.unwrap_err().into();
        assert!(matches!(err, DiracError::Param(_)));
    }
}
