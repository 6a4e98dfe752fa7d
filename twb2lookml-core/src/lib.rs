//! Tableau workbook to LookML translation.
//!
//! Parses `.twb` metadata into a typed IR, consolidates data sources that
//! share a canonical signature into reusable views, scores migration
//! complexity, and emits model, view and dashboard artifacts plus a
//! governance review.
//!
//! # Architecture
//!
//! ```text
//! .twb bytes ──► parser ──► Workbook IR ──► consolidate ──► ConsolidatedView*
//!                                                │                │
//!                              naming (run-scoped Namespace)      ├── score
//!                                                                 ├── emit ──► model / views / dashboards
//!                                                                 └── report ──► GOVERNANCE_REVIEW.md
//! ```
//!
//! # Key Concepts
//!
//! - **Signature**: canonical content string of a data source (normalized
//!   Custom SQL hash, or connection + table). Equal signatures merge.
//! - **Namespace**: per-run identifier registry; identifiers are
//!   `<slug>_<sha256 prefix>` so reruns are byte-identical.
//! - **Diagnostics**: recoverable findings returned next to the artifacts.
//!   Only malformed input, dangling references and emitter defects are
//!   errors.
//!
//! # Example
//!
//! ```ignore
//! use twb2lookml_core::{translate, RunConfig};
//!
//! let bytes = std::fs::read("sales.twb")?;
//! let outcome = translate("sales", &bytes, RunConfig::default())?;
//! for artifact in &outcome.artifacts {
//!     println!("{}", artifact.suggested_file_name());
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod consolidate;
pub mod diagnostics;
pub mod emit;
pub mod error;
pub mod formula;
pub mod ir;
pub mod naming;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod score;
pub mod sql;

pub use artifact::{Artifact, ArtifactKind};
pub use config::{
    DatagroupConfig, NamingConfig, RunConfig, ScoringConfig, ScoringWeights, Thresholds,
    VisualizationConfig,
};
pub use consolidate::{consolidate, ConsolidatedView, Consolidation, FieldConflict};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use error::{EmitterInvariantViolation, ParseError, TranslateError, UnsupportedConstructError};
pub use ir::{DataSource, Workbook};
pub use naming::Namespace;
pub use parser::parse_workbook;
pub use pipeline::{translate, translate_batch, RunContext, TranslationOutcome, WorkbookInput};
pub use report::{render_markdown, GovernanceReport};
pub use score::{Category, ComplexityScore};

/// Looker connection name when none is configured.
pub const DEFAULT_CONNECTION: &str = "enterprise_database";

/// Looker visualization used for unmapped Tableau marks.
pub const DEFAULT_FALLBACK_VIS: &str = "table";

/// Hex characters of the content hash in an identifier.
pub const DEFAULT_HASH_LEN: usize = 8;

/// Maximum length of the readable part of an identifier.
pub const DEFAULT_MAX_SLUG_LEN: usize = 40;

/// Model name for multi-workbook runs without a configured name.
pub const DEFAULT_BATCH_MODEL_NAME: &str = "enterprise";
