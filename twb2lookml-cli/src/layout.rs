//! On-disk project layout.
//!
//! ```text
//! <out>/
//!   consolidation_report.json
//!   lookml/
//!     GOVERNANCE_REVIEW.md
//!     models/<model>.model.lkml
//!     views/<view>.view.lkml
//!     dashboards/<dashboard>.dashboard.lookml
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use twb2lookml_core::{Artifact, ArtifactKind, TranslationOutcome};

pub const REPORT_FILE: &str = "consolidation_report.json";

pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn lookml_dir(&self) -> PathBuf {
        self.root.join("lookml")
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join(REPORT_FILE)
    }

    pub fn path_for(&self, artifact: &Artifact) -> PathBuf {
        let dir = match artifact.kind {
            ArtifactKind::Model => self.lookml_dir().join("models"),
            ArtifactKind::View => self.lookml_dir().join("views"),
            ArtifactKind::Dashboard => self.lookml_dir().join("dashboards"),
            ArtifactKind::Governance => self.lookml_dir(),
        };
        dir.join(artifact.suggested_file_name())
    }

    /// Write every artifact plus the JSON report. Returns the written paths
    /// in artifact order, report last.
    pub fn write(&self, outcome: &TranslationOutcome) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(outcome.artifacts.len() + 1);

        for artifact in &outcome.artifacts {
            let path = self.path_for(artifact);
            write_file(&path, &artifact.content)?;
            tracing::debug!(path = %path.display(), kind = %artifact.kind, "wrote artifact");
            written.push(path);
        }

        let report = serde_json::to_string_pretty(&outcome.report)
            .context("Failed to serialize consolidation report")?;
        let path = self.report_path();
        write_file(&path, &report)?;
        written.push(path);

        Ok(written)
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
