//! Diagnostics channel
//!
//! Non-fatal findings accumulated during a run and returned alongside the
//! artifacts: unsupported constructs, merge conflicts, unmapped
//! visualization types and other review items.

use crate::error::UnsupportedConstructError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Info,
}

/// Diagnostic codes for categorizing findings
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    // =========================================================================
    // Parse-time content findings
    // =========================================================================
    UnsupportedCalculation,
    UnsupportedConnection,

    // =========================================================================
    // Consolidation
    // =========================================================================
    FieldConflict,

    // =========================================================================
    // Emission
    // =========================================================================
    UnmappedVisualization,
    BlendWithoutLink,
    UnresolvedField,
    ViewWithoutExplore,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::UnsupportedCalculation => "unsupported_calculation",
            DiagnosticCode::UnsupportedConnection => "unsupported_connection",
            DiagnosticCode::FieldConflict => "field_conflict",
            DiagnosticCode::UnmappedVisualization => "unmapped_visualization",
            DiagnosticCode::BlendWithoutLink => "blend_without_link",
            DiagnosticCode::UnresolvedField => "unresolved_field",
            DiagnosticCode::ViewWithoutExplore => "view_without_explore",
        }
    }
}

/// A finding with the entity it concerns and where it was found.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Diagnostic {
    /// Create a warning diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            entity: None,
            location: None,
        }
    }

    /// Create an info diagnostic
    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            code,
            message: message.into(),
            entity: None,
            location: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({})", location)?;
        }
        Ok(())
    }
}

// =============================================================================
// Convenience Builders
// =============================================================================

/// Warning for a construct recorded on an IR node during parsing.
pub fn unsupported_construct(err: &UnsupportedConstructError, code: DiagnosticCode) -> Diagnostic {
    Diagnostic::warning(code, err.to_string())
        .with_entity(err.entity.clone())
        .with_location(err.location.clone())
}

/// Warning for a visualization type missing from the mapping table.
pub fn unmapped_visualization(mark: &str, worksheet: &str, fallback: &str) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticCode::UnmappedVisualization,
        format!(
            "visualization type '{}' has no LookML mapping; using '{}'",
            mark, fallback
        ),
    )
    .with_entity(worksheet)
    .with_location(format!("worksheet '{}'", worksheet))
}

/// Warning for differing field definitions merged into one view.
pub fn field_conflict(view_id: &str, field: &str, definitions: usize) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticCode::FieldConflict,
        format!(
            "field '{}' has {} differing definitions; first-seen kept as provisional",
            field, definitions
        ),
    )
    .with_entity(field)
    .with_location(format!("view '{}'", view_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_builders() {
        let diag = unmapped_visualization("Treemap", "Sheet 1", "table");
        assert!(diag.is_warning());
        assert_eq!(diag.code, DiagnosticCode::UnmappedVisualization);
        assert!(diag.message.contains("Treemap"));
        assert_eq!(diag.entity.as_deref(), Some("Sheet 1"));
    }

    #[test]
    fn test_unsupported_construct_carries_location() {
        let err = UnsupportedConstructError::new("Ratio", "datasource 'Orders'", "table calculation WINDOW_SUM");
        let diag = unsupported_construct(&err, DiagnosticCode::UnsupportedCalculation);
        assert_eq!(diag.location.as_deref(), Some("datasource 'Orders'"));
        assert!(diag.to_string().starts_with("[unsupported_calculation]"));
    }

    #[test]
    fn test_info_is_not_warning() {
        let diag = Diagnostic::info(DiagnosticCode::ViewWithoutExplore, "no worksheet uses view");
        assert!(!diag.is_warning());
    }
}
