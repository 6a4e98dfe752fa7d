//! Error types for the translation pipeline.
//!
//! Terminal failures are `Err` values. Recoverable anomalies (unsupported
//! constructs, merge conflicts, unmapped visualizations) are never returned
//! as errors; they travel as [`crate::Diagnostic`]s next to the output.

use crate::artifact::ArtifactKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parse-time failures. All of them abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The document cannot be structurally decoded.
    #[error("malformed workbook '{document}' at byte {position}: {message}")]
    MalformedDocument {
        document: String,
        message: String,
        position: u64,
    },

    /// A worksheet names a data source the workbook does not define.
    #[error("worksheet '{worksheet}' references missing data source '{datasource}'")]
    MissingDataSource {
        worksheet: String,
        datasource: String,
    },

    /// A dashboard zone names a worksheet the workbook does not define.
    #[error("dashboard '{dashboard}' references missing worksheet '{worksheet}'")]
    MissingWorksheet {
        dashboard: String,
        worksheet: String,
    },
}

impl ParseError {
    pub(crate) fn malformed(
        document: &str,
        position: u64,
        message: impl Into<String>,
    ) -> Self {
        ParseError::MalformedDocument {
            document: document.to_string(),
            message: message.into(),
            position,
        }
    }

    /// Reference errors leave the document decodable but the IR inconsistent.
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            ParseError::MissingDataSource { .. } | ParseError::MissingWorksheet { .. }
        )
    }
}

/// A calculation or connection shape outside the supported set.
///
/// Recorded on the IR node it belongs to and surfaced as a warning; the
/// pipeline substitutes a placeholder and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("unsupported {construct} in '{entity}' ({location})")]
pub struct UnsupportedConstructError {
    /// Data source caption or calculated field name.
    pub entity: String,
    /// Where in the workbook the construct was found.
    pub location: String,
    /// Short description of the construct.
    pub construct: String,
}

impl UnsupportedConstructError {
    pub fn new(
        entity: impl Into<String>,
        location: impl Into<String>,
        construct: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            location: location.into(),
            construct: construct.into(),
        }
    }
}

/// Generated text failed structural validation. Always a generator bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("emitter produced malformed {kind} artifact '{artifact}' at line {line}: {detail}")]
pub struct EmitterInvariantViolation {
    pub artifact: String,
    pub kind: ArtifactKind,
    pub line: usize,
    pub detail: String,
}

/// Top-level pipeline error.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    EmitterInvariant(#[from] EmitterInvariantViolation),

    /// Writing into an in-memory buffer or serializing a dashboard failed.
    #[error("failed to render artifact: {0}")]
    Render(String),

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),
}

impl TranslateError {
    /// True when the caller's input (document or configuration) is at fault,
    /// false for internal generator defects.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            TranslateError::Parse(_) | TranslateError::InvalidConfig(_)
        )
    }
}

impl From<std::fmt::Error> for TranslateError {
    fn from(err: std::fmt::Error) -> Self {
        TranslateError::Render(err.to_string())
    }
}

impl From<serde_yaml::Error> for TranslateError {
    fn from(err: serde_yaml::Error) -> Self {
        TranslateError::Render(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_context() {
        let err = ParseError::MissingDataSource {
            worksheet: "Sales Trend".into(),
            datasource: "federated.abc".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Sales Trend"));
        assert!(msg.contains("federated.abc"));
        assert!(err.is_reference_error());

        let err = ParseError::malformed("book", 42, "unexpected end of document");
        assert!(err.to_string().contains("42"));
        assert!(!err.is_reference_error());
    }

    #[test]
    fn input_errors_are_distinguished_from_defects() {
        let parse: TranslateError = ParseError::malformed("book", 0, "bad").into();
        assert!(parse.is_input_error());

        let defect: TranslateError = EmitterInvariantViolation {
            artifact: "orders".into(),
            kind: ArtifactKind::View,
            line: 3,
            detail: "unclosed block".into(),
        }
        .into();
        assert!(!defect.is_input_error());
        assert!(defect.to_string().contains("unclosed block"));
    }

    #[test]
    fn unsupported_construct_display() {
        let err = UnsupportedConstructError::new("Profit Ratio", "datasource 'Orders'", "LOD expression");
        assert_eq!(
            err.to_string(),
            "unsupported LOD expression in 'Profit Ratio' (datasource 'Orders')"
        );
    }
}
