//! View artifacts.
//!
//! Rendering happens in two steps: [`plan_view`] decides for every merged
//! field its LookML shape and SQL (translating calculations, substituting
//! placeholders), then [`render_view`] writes the plan out. Dashboards read
//! the same plan to reference fields.

use super::calc::{translate_formula, TranslationIssue};
use super::lookml::{column_sql, embeds_terminator, LookmlWriter};
use crate::consolidate::{ConsolidatedView, MergedField};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{Aggregation, DataOrigin, DataType, Field, Role};
use crate::score::ComplexityScore;
use std::fmt;

/// LookML construct a field renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Dimension,
    DimensionGroup,
    Measure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPlan {
    pub name: String,
    /// Tableau column the field came from.
    pub column: String,
    pub label: Option<String>,
    pub shape: FieldShape,
    pub lookml_type: &'static str,
    pub datatype: DataType,
    pub sql: String,
    /// Original formula of a translated calculation.
    pub formula: Option<String>,
    /// Set when the SQL is a placeholder; holds the reason.
    pub review: Option<String>,
    pub provisional: bool,
}

impl FieldPlan {
    /// Name a query uses to select this field.
    pub fn query_name(&self) -> String {
        match self.shape {
            FieldShape::DimensionGroup => format!("{}_date", self.name),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewPlan {
    pub view_id: String,
    pub fields: Vec<FieldPlan>,
}

impl ViewPlan {
    pub fn field_by_column(&self, column: &str) -> Option<&FieldPlan> {
        self.fields
            .iter()
            .find(|f| f.column == column)
            .or_else(|| self.fields.iter().find(|f| f.label.as_deref() == Some(column)))
    }

    /// Plain dimensions, the candidates for blend join keys.
    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.shape == FieldShape::Dimension && f.review.is_none())
            .map(|f| f.name.as_str())
    }
}

fn aggregates(field: &Field) -> bool {
    field
        .calculation
        .as_ref()
        .is_some_and(|c| !c.aggregations.is_empty())
}

/// Shape depends only on IR content, never on translation outcome.
pub fn shape_of(field: &Field) -> FieldShape {
    if aggregates(field) || field.role == Role::Measure {
        FieldShape::Measure
    } else if field.calculation.is_none() && field.datatype.is_temporal() {
        FieldShape::DimensionGroup
    } else {
        FieldShape::Dimension
    }
}

/// Measure type plus the SQL aggregate to wrap `number` measures in.
fn measure_type(aggregation: Option<&Aggregation>) -> (&'static str, Option<&'static str>) {
    match aggregation {
        Some(Aggregation::Count) => ("number", Some("COUNT")),
        Some(Aggregation::StdDev) => ("number", Some("STDDEV_SAMP")),
        Some(Aggregation::Variance) => ("number", Some("VAR_SAMP")),
        Some(Aggregation::Attribute) => ("max", None),
        Some(agg) => (agg.lookml_measure_type().unwrap_or("sum"), None),
        None => ("sum", None),
    }
}

fn dimension_type(datatype: &DataType) -> &'static str {
    match datatype {
        DataType::Date => "date",
        DataType::DateTime => "date_time",
        other => other.lookml_type(),
    }
}

fn one_line(formula: &str) -> String {
    formula.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decide shape and SQL for every field of `view`.
pub fn plan_view(view: &ConsolidatedView) -> (ViewPlan, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut fields = Vec::with_capacity(view.fields.len());

    for merged in &view.fields {
        fields.push(plan_field(view, merged, &mut diagnostics));
    }

    (
        ViewPlan {
            view_id: view.id.clone(),
            fields,
        },
        diagnostics,
    )
}

fn plan_field(
    view: &ConsolidatedView,
    merged: &MergedField,
    diagnostics: &mut Vec<Diagnostic>,
) -> FieldPlan {
    let field = &merged.field;
    let shape = shape_of(field);
    let calc_is_aggregate = aggregates(field);

    let (measure_lookml, wrapper) = if calc_is_aggregate {
        ("number", None)
    } else {
        measure_type(field.aggregation.as_ref())
    };
    let lookml_type = match shape {
        FieldShape::Measure => measure_lookml,
        FieldShape::DimensionGroup => "time",
        FieldShape::Dimension => dimension_type(&field.datatype),
    };

    let mut review = None;
    let mut formula = None;
    let base_sql = match &field.calculation {
        None => {
            let sql = column_sql(field.remote_name.as_deref().unwrap_or(&field.column));
            if embeds_terminator(&sql) {
                diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticCode::UnresolvedField,
                        format!("column '{}' contains ';;' and cannot be referenced", field.column),
                    )
                    .with_entity(field.label())
                    .with_location(format!("view '{}'", view.id)),
                );
                review = Some("column name contains ';;'".to_string());
            }
            sql
        }
        Some(calc) if !calc.unsupported.is_empty() => {
            review = Some(format!("unsupported {}", calc.unsupported.join(", ")));
            String::new()
        }
        Some(calc) => {
            let resolve = |column: &str| {
                let target = view.field_by_column(column)?;
                if target.field.name == field.name {
                    return None;
                }
                Some(match &target.field.calculation {
                    Some(_) => format!("${{{}}}", target.field.name),
                    None => column_sql(
                        target
                            .field
                            .remote_name
                            .as_deref()
                            .unwrap_or(&target.field.column),
                    ),
                })
            };
            match translate_formula(&calc.formula, resolve) {
                Ok(sql) => {
                    formula = Some(one_line(&calc.formula));
                    sql
                }
                Err(issue) => {
                    let code = match issue {
                        TranslationIssue::UnresolvedField(_) => DiagnosticCode::UnresolvedField,
                        _ => DiagnosticCode::UnsupportedCalculation,
                    };
                    diagnostics.push(
                        Diagnostic::warning(
                            code,
                            format!("calculation '{}' not translated: {}", field.label(), issue),
                        )
                        .with_entity(field.label())
                        .with_location(format!("view '{}'", view.id)),
                    );
                    review = Some(issue.to_string());
                    String::new()
                }
            }
        }
    };

    let sql = if review.is_some() {
        "NULL".to_string()
    } else {
        match (shape, wrapper) {
            (FieldShape::Measure, Some(func)) => format!("{}({})", func, base_sql),
            _ => base_sql,
        }
    };

    FieldPlan {
        name: field.name.clone(),
        column: field.column.clone(),
        label: field.caption.clone(),
        shape,
        lookml_type: if review.is_some() && shape == FieldShape::Measure {
            "number"
        } else {
            lookml_type
        },
        datatype: field.datatype.clone(),
        sql,
        formula,
        review,
        provisional: merged.provisional,
    }
}

/// Render the view artifact.
pub fn render_view(
    view: &ConsolidatedView,
    plan: &ViewPlan,
    score: &ComplexityScore,
) -> Result<String, fmt::Error> {
    let mut w = LookmlWriter::new();

    let sources: Vec<String> = view.sources.iter().map(|s| s.to_string()).collect();
    w.comment(&format!("View: {}", view.display_name))?;
    w.comment(&format!("Merged sources: {}", sources.join(", ")))?;
    w.comment(&format!("Complexity: {} ({})", score.score, score.category))?;
    if score.category.needs_review() {
        w.comment("MANUAL REVIEW REQUIRED")?;
        for factor in &score.factors {
            w.comment(&format!("  {}", factor.detail))?;
        }
        w.comment("See GOVERNANCE_REVIEW.md for details")?;
    }
    w.blank();

    w.open(&format!("view: {}", view.id))?;
    match &view.origin {
        DataOrigin::CustomSql(sql) => {
            w.open("derived_table:")?;
            w.sql("sql", sql)?;
            w.close()?;
        }
        DataOrigin::Table(table) => {
            if table.placeholder {
                w.comment("REVIEW: unsupported connection shape, table reference is a placeholder")?;
            }
            w.sql("sql_table_name", &table.sql_table_name())?;
        }
    }

    for field in &plan.fields {
        w.blank();
        render_field(&mut w, field)?;
    }

    w.close()?;
    Ok(w.finish())
}

fn render_field(w: &mut LookmlWriter, field: &FieldPlan) -> fmt::Result {
    if field.provisional {
        w.comment("CONFLICT: merged sources define this field differently; provisional definition")?;
    }
    if let Some(reason) = &field.review {
        w.comment(&format!("REVIEW: {}", reason))?;
    }

    let keyword = match field.shape {
        FieldShape::Dimension => "dimension",
        FieldShape::DimensionGroup => "dimension_group",
        FieldShape::Measure => "measure",
    };
    w.open(&format!("{}: {}", keyword, field.name))?;
    if let Some(label) = &field.label {
        w.string("label", label)?;
    }
    w.param("type", field.lookml_type)?;
    if field.shape == FieldShape::DimensionGroup {
        match field.datatype {
            DataType::Date => {
                w.param("timeframes", "[raw, date, week, month, quarter, year]")?;
                w.param("convert_tz", "no")?;
                w.param("datatype", "date")?;
            }
            _ => w.param("timeframes", "[raw, time, date, week, month, quarter, year]")?,
        }
    }
    if let Some(formula) = &field.formula {
        w.string("description", &format!("Tableau calculation: {}", formula))?;
    }
    w.sql("sql", &field.sql)?;
    w.close()
}
