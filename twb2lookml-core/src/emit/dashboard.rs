//! LookML dashboard artifacts, rendered from typed structs with `serde_yaml`.

use super::view::ViewPlan;
use super::vis::map_visualization;
use crate::config::VisualizationConfig;
use crate::consolidate::Consolidation;
use crate::diagnostics::{unmapped_visualization, Diagnostic, DiagnosticCode};
use crate::ir::{Dashboard, Workbook, Zone};
use crate::naming::slugify;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tableau zones use a 0..100000 coordinate space on both axes.
const TABLEAU_EXTENT: u64 = 100_000;
/// Newspaper layout width in columns.
const GRID_COLUMNS: u64 = 24;
/// Rows the full dashboard height is scaled onto.
const GRID_ROWS: u64 = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardDoc {
    pub dashboard: String,
    pub title: String,
    pub layout: String,
    pub description: String,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explore: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_text: Option<String>,
    pub row: u64,
    pub col: u64,
    pub width: u64,
    pub height: u64,
}

/// Grid placement `(row, col, width, height)` for a Tableau zone.
pub fn grid_position(zone: &Zone) -> (u64, u64, u64, u64) {
    let scale = |v: u32, cells: u64| u64::from(v).min(TABLEAU_EXTENT) * cells / TABLEAU_EXTENT;
    let col = scale(zone.x, GRID_COLUMNS).min(GRID_COLUMNS - 1);
    let width = scale(zone.w, GRID_COLUMNS).clamp(1, GRID_COLUMNS - col);
    let row = scale(zone.y, GRID_ROWS);
    let height = scale(zone.h, GRID_ROWS).max(1);
    (row, col, width, height)
}

/// Everything a dashboard needs from the rest of the run.
pub struct DashboardContext<'a> {
    pub model_name: &'a str,
    pub workbook: &'a Workbook,
    pub consolidation: &'a Consolidation,
    pub plans: &'a [ViewPlan],
    pub visualization: &'a VisualizationConfig,
}

/// Build the dashboard document for `dashboard` under identifier `id`.
pub fn build_dashboard(
    id: &str,
    dashboard: &Dashboard,
    ctx: &DashboardContext<'_>,
) -> (DashboardDoc, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut elements = Vec::with_capacity(dashboard.zones.len());
    let mut used_names = HashSet::new();
    let wb = ctx.workbook;

    for zone in &dashboard.zones {
        let Some(ws) = wb.worksheet(&zone.worksheet) else {
            continue;
        };

        let base = slugify(&ws.name, 40);
        let mut name = base.clone();
        let mut n = 2;
        while !used_names.insert(name.clone()) {
            name = format!("{}_{}", base, n);
            n += 1;
        }

        let (row, col, width, height) = grid_position(zone);
        let location = format!("workbook '{}' / worksheet '{}'", wb.name, ws.name);

        let view = ws
            .datasource
            .as_deref()
            .and_then(|ds| ctx.consolidation.view_for(&wb.name, ds));

        let Some(view) = view else {
            elements.push(Element {
                name,
                title: ws.name.clone(),
                element_type: "text".to_string(),
                model: None,
                explore: None,
                fields: Vec::new(),
                title_text: Some(ws.name.clone()),
                body_text: Some(format!(
                    "Migrated from Tableau worksheet '{}' without a data source",
                    ws.name
                )),
                note_text: None,
                row,
                col,
                width,
                height,
            });
            continue;
        };

        let mapping = map_visualization(&ws.mark, ctx.visualization);
        if mapping.fallback {
            diagnostics.push(
                unmapped_visualization(&ws.mark, &ws.name, &mapping.looker_type)
                    .with_location(location.clone()),
            );
        }

        let plan = ctx.plans.iter().find(|p| p.view_id == view.id);
        let mut fields = Vec::new();
        for column in &ws.fields {
            match plan.and_then(|p| p.field_by_column(column)) {
                Some(field) => {
                    let reference = format!("{}.{}", view.id, field.query_name());
                    if !fields.contains(&reference) {
                        fields.push(reference);
                    }
                }
                None => diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticCode::UnresolvedField,
                        format!(
                            "worksheet field [{}] has no counterpart in view '{}'",
                            column, view.id
                        ),
                    )
                    .with_entity(column.clone())
                    .with_location(location.clone()),
                ),
            }
        }

        elements.push(Element {
            name,
            title: ws.name.clone(),
            element_type: mapping.looker_type,
            model: Some(ctx.model_name.to_string()),
            explore: Some(view.id.clone()),
            fields,
            title_text: None,
            body_text: None,
            note_text: mapping
                .fallback
                .then(|| format!("Tableau mark '{}' has no direct Looker equivalent", ws.mark)),
            row,
            col,
            width,
            height,
        });
    }

    let doc = DashboardDoc {
        dashboard: id.to_string(),
        title: dashboard.name.clone(),
        layout: "newspaper".to_string(),
        description: format!("Migrated from Tableau workbook '{}'", wb.name),
        elements,
    };
    (doc, diagnostics)
}

/// Serialize as a LookML dashboard file (a one-item YAML list).
pub fn render_dashboard(doc: &DashboardDoc) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&[doc])
}
