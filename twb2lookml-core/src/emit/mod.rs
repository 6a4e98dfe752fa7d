//! LookML emitter
//!
//! Plans and renders the model, view and dashboard artifacts from the
//! consolidated IR, then checks every generated text structurally before it
//! leaves the pipeline.
//!
//! ```text
//!   ConsolidatedView ──plan_view──▶ ViewPlan ──render_view──▶ .view.lkml
//!          │                           │
//!          └──────plan_explores────────┴──render_model──▶ .model.lkml
//!   Dashboard ──build_dashboard──▶ DashboardDoc ──render_dashboard──▶ .dashboard.lookml
//! ```

pub mod calc;
pub mod dashboard;
pub mod lookml;
pub mod model;
pub mod validate;
pub mod view;
pub mod vis;

pub use calc::{translate_formula, TranslationIssue};
pub use dashboard::{build_dashboard, render_dashboard, DashboardContext, DashboardDoc, Element};
pub use model::{plan_explores, render_model, Explore, ExploreJoin, ModelContents};
pub use validate::validate_artifact;
pub use view::{plan_view, render_view, FieldPlan, FieldShape, ViewPlan};
pub use vis::{map_visualization, VisMapping, VIS_TABLE};
