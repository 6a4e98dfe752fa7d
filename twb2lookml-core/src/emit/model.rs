//! Model artifact: connection, includes, caching policy and explores.

use super::lookml::{quote, LookmlWriter};
use super::view::ViewPlan;
use crate::config::RunConfig;
use crate::consolidate::Consolidation;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::Workbook;
use crate::naming::slugify;
use std::fmt;

/// An explore rooted at one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explore {
    pub view_id: String,
    pub label: String,
    pub joins: Vec<ExploreJoin>,
}

/// A blended secondary source joined into an explore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploreJoin {
    pub view_id: String,
    pub sql_on: String,
}

/// Explores for every view a worksheet uses as primary source, in view
/// order, with blend secondaries as joins.
pub fn plan_explores(
    workbooks: &[Workbook],
    consolidation: &Consolidation,
    plans: &[ViewPlan],
) -> (Vec<Explore>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut explores: Vec<Explore> = Vec::new();

    let plan_of = |view_id: &str| plans.iter().find(|p| p.view_id == view_id);

    for view in &consolidation.views {
        let mut explore: Option<Explore> = None;

        for wb in workbooks {
            for ws in &wb.worksheets {
                let Some(primary) = ws.datasource.as_deref() else {
                    continue;
                };
                if consolidation.view_for(&wb.name, primary).map(|v| v.id.as_str())
                    != Some(view.id.as_str())
                {
                    continue;
                }

                let explore = explore.get_or_insert_with(|| Explore {
                    view_id: view.id.clone(),
                    label: view.display_name.clone(),
                    joins: Vec::new(),
                });

                for secondary in &ws.secondary {
                    let Some(target) = consolidation.view_for(&wb.name, secondary) else {
                        continue;
                    };
                    if target.id == view.id || explore.joins.iter().any(|j| j.view_id == target.id) {
                        continue;
                    }

                    let shared: Vec<&str> = match (plan_of(&view.id), plan_of(&target.id)) {
                        (Some(left), Some(right)) => {
                            let right_dims: Vec<&str> = right.dimension_names().collect();
                            left.dimension_names()
                                .filter(|d| right_dims.contains(d))
                                .collect()
                        }
                        _ => Vec::new(),
                    };

                    if shared.is_empty() {
                        diagnostics.push(
                            Diagnostic::warning(
                                DiagnosticCode::BlendWithoutLink,
                                format!(
                                    "blend of '{}' into '{}' has no shared dimension; join skipped",
                                    target.display_name, view.display_name
                                ),
                            )
                            .with_entity(&ws.name)
                            .with_location(format!("workbook '{}' / worksheet '{}'", wb.name, ws.name)),
                        );
                        continue;
                    }

                    let sql_on = shared
                        .iter()
                        .map(|d| format!("${{{}.{}}} = ${{{}.{}}}", view.id, d, target.id, d))
                        .collect::<Vec<_>>()
                        .join(" AND ");
                    explore.joins.push(ExploreJoin {
                        view_id: target.id.clone(),
                        sql_on,
                    });
                }
            }
        }

        match explore {
            Some(explore) => explores.push(explore),
            None => diagnostics.push(
                Diagnostic::info(
                    DiagnosticCode::ViewWithoutExplore,
                    format!("no worksheet uses view '{}' as primary source", view.display_name),
                )
                .with_entity(&view.display_name)
                .with_location(format!("view '{}'", view.id)),
            ),
        }
    }

    (explores, diagnostics)
}

/// What the model artifact references.
pub struct ModelContents<'a> {
    pub model_name: &'a str,
    pub workbooks: Vec<&'a str>,
    pub view_ids: Vec<&'a str>,
    pub dashboard_ids: Vec<&'a str>,
    pub explores: &'a [Explore],
}

pub fn render_model(contents: &ModelContents<'_>, config: &RunConfig) -> Result<String, fmt::Error> {
    let mut w = LookmlWriter::new();

    w.comment(&format!("Model: {}", contents.model_name))?;
    w.comment(&format!(
        "Consolidated from Tableau workbooks: {}",
        contents.workbooks.join(", ")
    ))?;
    w.blank();

    w.param("connection", &quote(&config.connection))?;
    w.blank();

    for id in &contents.view_ids {
        w.string("include", &format!("/**/{}.view.lkml", id))?;
    }
    for id in &contents.dashboard_ids {
        w.string("include", &format!("/**/{}.dashboard.lookml", id))?;
    }

    if let Some(datagroup) = &config.datagroup {
        let name = slugify(&datagroup.name, 64);
        w.blank();
        w.open(&format!("datagroup: {}", name))?;
        w.sql("sql_trigger", &datagroup.sql_trigger)?;
        w.string("max_cache_age", &datagroup.max_cache_age)?;
        w.close()?;
        w.blank();
        w.param("persist_with", &name)?;
    }

    for explore in contents.explores {
        w.blank();
        w.open(&format!("explore: {}", explore.view_id))?;
        w.string("label", &explore.label)?;
        for join in &explore.joins {
            w.open(&format!("join: {}", join.view_id))?;
            w.param("type", "left_outer")?;
            w.param("relationship", "many_to_one")?;
            w.sql("sql_on", &join.sql_on)?;
            w.close()?;
        }
        w.close()?;
    }

    Ok(w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_model_with_datagroup_and_joins() {
        let explores = vec![Explore {
            view_id: "orders_aaaa".into(),
            label: "Orders".into(),
            joins: vec![ExploreJoin {
                view_id: "targets_bbbb".into(),
                sql_on: "${orders_aaaa.region} = ${targets_bbbb.region}".into(),
            }],
        }];
        let contents = ModelContents {
            model_name: "sales",
            workbooks: vec!["sales"],
            view_ids: vec!["orders_aaaa", "targets_bbbb"],
            dashboard_ids: vec!["overview_cccc"],
            explores: &explores,
        };
        let text = render_model(&contents, &RunConfig::default()).unwrap();
        assert_eq!(
            text,
            "# Model: sales
# Consolidated from Tableau workbooks: sales

connection: \"enterprise_database\"

include: \"/**/orders_aaaa.view.lkml\"
include: \"/**/targets_bbbb.view.lkml\"
include: \"/**/overview_cccc.dashboard.lookml\"

datagroup: default_datagroup {
  sql_trigger: SELECT MAX(updated_at) FROM etl_metadata ;;
  max_cache_age: \"1 hour\"
}

persist_with: default_datagroup

explore: orders_aaaa {
  label: \"Orders\"
  join: targets_bbbb {
    type: left_outer
    relationship: many_to_one
    sql_on: ${orders_aaaa.region} = ${targets_bbbb.region} ;;
  }
}
"
        );
    }

    #[test]
    fn datagroup_is_optional() {
        let config = RunConfig {
            datagroup: None,
            ..Default::default()
        };
        let contents = ModelContents {
            model_name: "m",
            workbooks: vec![],
            view_ids: vec![],
            dashboard_ids: vec![],
            explores: &[],
        };
        let text = render_model(&contents, &config).unwrap();
        assert!(!text.contains("datagroup"));
        assert!(!text.contains("persist_with"));
    }
}
