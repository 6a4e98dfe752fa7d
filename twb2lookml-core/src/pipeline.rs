//! Translation pipeline
//!
//! One run: parse every workbook, consolidate all data sources, score,
//! plan and render the artifacts, validate them, and hand back artifacts,
//! diagnostics and the governance report. Stages are strictly sequential and
//! each produces a new value; the only mutable state is the run's
//! [`Namespace`], owned by the [`RunContext`].

use crate::artifact::{Artifact, ArtifactKind};
use crate::config::RunConfig;
use crate::consolidate::{consolidate, Consolidation};
use crate::diagnostics::{field_conflict, unsupported_construct, Diagnostic, DiagnosticCode};
use crate::emit::{
    build_dashboard, plan_explores, plan_view, render_dashboard, render_model, render_view,
    validate_artifact, DashboardContext, ModelContents, ViewPlan,
};
use crate::error::{TranslateError, UnsupportedConstructError};
use crate::ir::{DataSource, Workbook};
use crate::naming::{slugify, Namespace};
use crate::parser::parse_workbook;
use crate::report::{render_markdown, CalculationEntry, GovernanceReport};
use crate::score::{score, ComplexityScore, ScoreInputs};
use crate::DEFAULT_BATCH_MODEL_NAME;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// One workbook document handed in by the caller.
#[derive(Debug, Clone, Copy)]
pub struct WorkbookInput<'a> {
    /// Document name, used in diagnostics and to qualify data sources.
    pub name: &'a str,
    pub bytes: &'a [u8],
}

impl<'a> WorkbookInput<'a> {
    pub fn new(name: &'a str, bytes: &'a [u8]) -> Self {
        Self { name, bytes }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    pub model_name: String,
    /// Model, views, dashboards, governance, in that order.
    pub artifacts: Vec<Artifact>,
    pub diagnostics: Vec<Diagnostic>,
    pub report: GovernanceReport,
}

impl TranslationOutcome {
    pub fn artifacts_of(&self, kind: ArtifactKind) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }
}

/// Per-run state threaded through every stage.
#[derive(Debug)]
pub struct RunContext {
    pub config: RunConfig,
    pub namespace: Namespace,
}

impl RunContext {
    pub fn new(config: RunConfig) -> Result<Self, TranslateError> {
        config.validate()?;
        let namespace = Namespace::new(config.naming.clone());
        Ok(Self { config, namespace })
    }
}

/// Translate a single workbook.
pub fn translate(
    name: &str,
    bytes: &[u8],
    config: RunConfig,
) -> Result<TranslationOutcome, TranslateError> {
    translate_batch(&[WorkbookInput::new(name, bytes)], config)
}

/// Translate several workbooks into one consolidated project.
pub fn translate_batch(
    inputs: &[WorkbookInput<'_>],
    config: RunConfig,
) -> Result<TranslationOutcome, TranslateError> {
    let mut ctx = RunContext::new(config)?;
    run(&mut ctx, inputs)
}

/// Accumulates diagnostics in arrival order, dropping exact duplicates.
#[derive(Default)]
struct DiagnosticSink {
    items: Vec<Diagnostic>,
    seen: HashSet<String>,
}

impl DiagnosticSink {
    fn push(&mut self, diagnostic: Diagnostic) {
        let key = format!(
            "{}|{}|{}",
            diagnostic,
            diagnostic.entity.as_deref().unwrap_or(""),
            diagnostic.code.as_str()
        );
        if !self.seen.insert(key) {
            return;
        }
        if diagnostic.is_warning() {
            warn!(code = diagnostic.code.as_str(), "{}", diagnostic.message);
        } else {
            debug!(code = diagnostic.code.as_str(), "{}", diagnostic.message);
        }
        self.items.push(diagnostic);
    }

    fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }
}

fn construct_code(err: &UnsupportedConstructError) -> DiagnosticCode {
    if err.construct.ends_with("relation")
        || err.construct.contains("connection")
        || err.construct.starts_with("custom SQL")
    {
        DiagnosticCode::UnsupportedConnection
    } else {
        DiagnosticCode::UnsupportedCalculation
    }
}

/// Run every stage against an existing context.
pub fn run(
    ctx: &mut RunContext,
    inputs: &[WorkbookInput<'_>],
) -> Result<TranslationOutcome, TranslateError> {
    let mut names = HashSet::new();
    for input in inputs {
        if !names.insert(input.name) {
            return Err(TranslateError::InvalidConfig(format!(
                "workbook name '{}' appears more than once in the batch",
                input.name
            )));
        }
    }

    // ── Parse ──
    let workbooks = inputs
        .iter()
        .map(|input| parse_workbook(input.name, input.bytes))
        .collect::<Result<Vec<Workbook>, _>>()?;

    let mut diagnostics = DiagnosticSink::default();
    for wb in &workbooks {
        for ds in &wb.datasources {
            diagnostics.extend(
                ds.warnings
                    .iter()
                    .map(|w| unsupported_construct(w, construct_code(w))),
            );
        }
    }

    // ── Consolidate ──
    let datasources: Vec<&DataSource> = workbooks
        .iter()
        .flat_map(|wb| wb.datasources.iter())
        .collect();
    let consolidation = consolidate(&datasources, &mut ctx.namespace);
    info!(
        workbooks = workbooks.len(),
        datasources = datasources.len(),
        views = consolidation.views.len(),
        conflicts = consolidation.conflicts.len(),
        "consolidated data sources"
    );
    diagnostics.extend(
        consolidation
            .conflicts
            .iter()
            .map(|c| field_conflict(&c.view_id, &c.field, c.definitions.len())),
    );

    // ── Score ──
    let scoring = &ctx.config.scoring;
    let view_scores: Vec<ComplexityScore> = consolidation
        .views
        .iter()
        .map(|view| {
            let s = score(&ScoreInputs::for_view(view), scoring);
            debug!(view = %view.id, score = s.score, category = %s.category, "scored view");
            s
        })
        .collect();
    let calculations = score_calculations(&consolidation, ctx);

    // ── Plan ──
    let mut plans: Vec<ViewPlan> = Vec::with_capacity(consolidation.views.len());
    for view in &consolidation.views {
        let (plan, found) = plan_view(view);
        diagnostics.extend(found);
        plans.push(plan);
    }
    let (explores, found) = plan_explores(&workbooks, &consolidation, &plans);
    diagnostics.extend(found);

    let model_name = model_name(ctx, &workbooks);

    // ── Render ──
    let mut artifacts = Vec::new();
    let mut view_artifacts = Vec::with_capacity(consolidation.views.len());
    for ((view, plan), view_score) in consolidation.views.iter().zip(&plans).zip(&view_scores) {
        let content = render_view(view, plan, view_score)?;
        debug!(view = %view.id, bytes = content.len(), "rendered view");
        view_artifacts.push(Artifact::new(view.id.clone(), ArtifactKind::View, content));
    }

    let mut dashboard_artifacts = Vec::new();
    for wb in &workbooks {
        let dash_ctx = DashboardContext {
            model_name: &model_name,
            workbook: wb,
            consolidation: &consolidation,
            plans: &plans,
            visualization: &ctx.config.visualization,
        };
        for dashboard in &wb.dashboards {
            let id = ctx.namespace.claim(
                &dashboard.name,
                &format!("dashboard:{}|{}", wb.name, dashboard.name),
            );
            let (doc, found) = build_dashboard(&id, dashboard, &dash_ctx);
            diagnostics.extend(found);
            let content = render_dashboard(&doc)?;
            debug!(dashboard = %id, elements = doc.elements.len(), "rendered dashboard");
            dashboard_artifacts.push(Artifact::new(id, ArtifactKind::Dashboard, content));
        }
    }

    let contents = ModelContents {
        model_name: &model_name,
        workbooks: workbooks.iter().map(|wb| wb.name.as_str()).collect(),
        view_ids: view_artifacts.iter().map(|a| a.name.as_str()).collect(),
        dashboard_ids: dashboard_artifacts.iter().map(|a| a.name.as_str()).collect(),
        explores: &explores,
    };
    let model = render_model(&contents, &ctx.config)?;
    artifacts.push(Artifact::new(model_name.clone(), ArtifactKind::Model, model));
    artifacts.extend(view_artifacts);
    artifacts.extend(dashboard_artifacts);

    let diagnostics = diagnostics.items;
    let report = GovernanceReport::build(
        workbooks.len(),
        &consolidation,
        &view_scores,
        calculations,
        &diagnostics,
    );
    let governance = render_markdown(&report)?;
    artifacts.push(Artifact::new("governance", ArtifactKind::Governance, governance));

    // ── Validate ──
    for artifact in &artifacts {
        validate_artifact(artifact)?;
    }

    info!(
        model = %model_name,
        artifacts = artifacts.len(),
        warnings = diagnostics.iter().filter(|d| d.is_warning()).count(),
        "translation complete"
    );

    Ok(TranslationOutcome {
        model_name,
        artifacts,
        diagnostics,
        report,
    })
}

/// Calculated fields scored above Automated, in view then catalog order.
fn score_calculations(consolidation: &Consolidation, ctx: &RunContext) -> Vec<CalculationEntry> {
    let mut entries = Vec::new();
    for view in &consolidation.views {
        for merged in &view.fields {
            let Some(calc) = &merged.field.calculation else {
                continue;
            };
            let s = score(&ScoreInputs::for_calculation(calc), &ctx.config.scoring);
            if !s.category.needs_review() && calc.unsupported.is_empty() {
                continue;
            }
            entries.push(CalculationEntry {
                view_id: view.id.clone(),
                field: merged.field.name.clone(),
                formula: calc.formula.clone(),
                score: s,
                unsupported: calc.unsupported.clone(),
            });
        }
    }
    entries
}

fn model_name(ctx: &mut RunContext, workbooks: &[Workbook]) -> String {
    let max = ctx.config.naming.max_slug_len;
    let base = match (&ctx.config.model_name, workbooks) {
        (Some(name), _) => slugify(name, max),
        (None, [single]) => slugify(&single.name, max),
        (None, _) => DEFAULT_BATCH_MODEL_NAME.to_string(),
    };
    ctx.namespace.claim_plain(&base)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKBOOK: &str = r#"<?xml version='1.0' encoding='utf-8' ?>
<workbook>
  <datasources>
    <datasource name='federated.a' caption='Orders'>
      <connection class='postgres' server='db' dbname='shop'>
        <relation name='orders' table='[public].[orders]' type='table' />
      </connection>
      <column name='[Region]' role='dimension' datatype='string' />
      <column name='[Sales]' role='measure' datatype='real' aggregation='Sum' />
    </datasource>
  </datasources>
  <worksheets>
    <worksheet name='By Region'>
      <table>
        <view>
          <datasources><datasource name='federated.a' /></datasources>
          <datasource-dependencies datasource='federated.a'>
            <column name='[Region]' />
            <column name='[Sales]' />
          </datasource-dependencies>
        </view>
        <panes><pane><mark class='Bar' /></pane></panes>
      </table>
    </worksheet>
  </worksheets>
  <dashboards>
    <dashboard name='Overview'>
      <zones><zone name='By Region' x='0' y='0' w='100000' h='100000' /></zones>
    </dashboard>
  </dashboards>
</workbook>"#;

    #[test]
    fn single_workbook_produces_ordered_artifacts() {
        let outcome = translate("sales", WORKBOOK.as_bytes(), RunConfig::default()).unwrap();
        let kinds: Vec<ArtifactKind> = outcome.artifacts.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ArtifactKind::Model,
                ArtifactKind::View,
                ArtifactKind::Dashboard,
                ArtifactKind::Governance
            ]
        );
        assert_eq!(outcome.model_name, "sales");
        assert_eq!(outcome.warnings().count(), 0);
        assert_eq!(outcome.report.summary.views_after_consolidation, 1);
    }

    #[test]
    fn configured_model_name_is_slugified() {
        let config = RunConfig {
            model_name: Some("Sales Analytics".into()),
            ..Default::default()
        };
        let outcome = translate("sales", WORKBOOK.as_bytes(), config).unwrap();
        assert_eq!(outcome.model_name, "sales_analytics");
        assert_eq!(outcome.artifacts[0].name, "sales_analytics");
    }

    #[test]
    fn invalid_config_is_rejected_before_parsing() {
        let mut config = RunConfig::default();
        config.scoring.sql_length_bucket = 0;
        let err = translate("sales", b"not xml", config).unwrap_err();
        assert!(matches!(err, TranslateError::InvalidConfig(_)));
    }

    #[test]
    fn duplicate_batch_names_are_rejected() {
        let inputs = [
            WorkbookInput::new("sales", WORKBOOK.as_bytes()),
            WorkbookInput::new("sales", WORKBOOK.as_bytes()),
        ];
        let err = translate_batch(&inputs, RunConfig::default()).unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn sink_drops_exact_duplicates() {
        let mut sink = DiagnosticSink::default();
        let diag = Diagnostic::warning(DiagnosticCode::UnresolvedField, "missing [x]")
            .with_location("worksheet 'a'");
        sink.push(diag.clone());
        sink.push(diag.clone());
        sink.push(diag.with_location("worksheet 'b'"));
        assert_eq!(sink.items.len(), 2);
    }

    #[test]
    fn connection_constructs_are_classified() {
        let conn = UnsupportedConstructError::new("Orders", "datasource 'Orders'", "join relation");
        assert_eq!(construct_code(&conn), DiagnosticCode::UnsupportedConnection);
        let calc = UnsupportedConstructError::new("Ratio", "datasource 'Orders'", "LOD expression FIXED");
        assert_eq!(construct_code(&calc), DiagnosticCode::UnsupportedCalculation);
        let sql = UnsupportedConstructError::new("Odd", "datasource 'Odd'", "custom SQL containing ';;'");
        assert_eq!(construct_code(&sql), DiagnosticCode::UnsupportedConnection);
    }
}
