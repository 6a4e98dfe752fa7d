//! Named text artifacts handed to the storage collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag of an emitted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Model,
    View,
    Dashboard,
    Governance,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactKind::Model => "model",
            ArtifactKind::View => "view",
            ArtifactKind::Dashboard => "dashboard",
            ArtifactKind::Governance => "governance",
        };
        f.write_str(s)
    }
}

/// One generated file's content. `name` is a stable base name produced by
/// the naming service; where it lands on disk is the caller's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub content: String,
}

impl Artifact {
    pub fn new(name: impl Into<String>, kind: ArtifactKind, content: String) -> Self {
        Self {
            name: name.into(),
            kind,
            content,
        }
    }

    /// Conventional LookML project file name for this artifact.
    pub fn suggested_file_name(&self) -> String {
        match self.kind {
            ArtifactKind::Model => format!("{}.model.lkml", self.name),
            ArtifactKind::View => format!("{}.view.lkml", self.name),
            ArtifactKind::Dashboard => format!("{}.dashboard.lookml", self.name),
            ArtifactKind::Governance => "GOVERNANCE_REVIEW.md".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_file_names_follow_lookml_conventions() {
        let view = Artifact::new("orders_1a2b3c4d", ArtifactKind::View, String::new());
        assert_eq!(view.suggested_file_name(), "orders_1a2b3c4d.view.lkml");

        let dash = Artifact::new("overview_00ff00ff", ArtifactKind::Dashboard, String::new());
        assert_eq!(dash.suggested_file_name(), "overview_00ff00ff.dashboard.lookml");

        let gov = Artifact::new("governance", ArtifactKind::Governance, String::new());
        assert_eq!(gov.suggested_file_name(), "GOVERNANCE_REVIEW.md");
    }
}
