//! Governance report: what was merged, how risky each view is, and what
//! needs a human before deployment.
//!
//! The same [`GovernanceReport`] value backs both the Markdown review
//! document and the JSON consolidation report.

use crate::consolidate::{Consolidation, FieldConflict};
use crate::diagnostics::Diagnostic;
use crate::score::{Category, ComplexityScore};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceReport {
    pub summary: Summary,
    pub views: Vec<ViewEntry>,
    pub calculations: Vec<CalculationEntry>,
    pub warnings: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub workbooks_analyzed: usize,
    pub views_before_consolidation: usize,
    pub views_after_consolidation: usize,
    pub views_eliminated: usize,
    pub views_requiring_manual_review: usize,
    pub conflicts: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewEntry {
    pub id: String,
    pub display_name: String,
    pub sources: Vec<String>,
    pub score: ComplexityScore,
    pub conflicts: Vec<ConflictEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub field: String,
    /// `(source, definition)` pairs, first-seen first.
    pub definitions: Vec<(String, String)>,
}

impl From<&FieldConflict> for ConflictEntry {
    fn from(conflict: &FieldConflict) -> Self {
        Self {
            field: conflict.field.clone(),
            definitions: conflict
                .definitions
                .iter()
                .map(|d| (d.source.to_string(), d.describe()))
                .collect(),
        }
    }
}

/// A calculated field scored above Automated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationEntry {
    pub view_id: String,
    pub field: String,
    pub formula: String,
    pub score: ComplexityScore,
    pub unsupported: Vec<String>,
}

impl GovernanceReport {
    /// Assemble the report. `view_scores` is parallel to
    /// `consolidation.views`.
    pub fn build(
        workbooks_analyzed: usize,
        consolidation: &Consolidation,
        view_scores: &[ComplexityScore],
        calculations: Vec<CalculationEntry>,
        diagnostics: &[Diagnostic],
    ) -> Self {
        let views: Vec<ViewEntry> = consolidation
            .views
            .iter()
            .zip(view_scores)
            .map(|(view, score)| ViewEntry {
                id: view.id.clone(),
                display_name: view.display_name.clone(),
                sources: view.sources.iter().map(|s| s.to_string()).collect(),
                score: score.clone(),
                conflicts: view.conflicts.iter().map(ConflictEntry::from).collect(),
            })
            .collect();

        let before = consolidation.source_count();
        let after = views.len();
        let warnings: Vec<Diagnostic> = diagnostics
            .iter()
            .filter(|d| d.is_warning())
            .cloned()
            .collect();

        let summary = Summary {
            workbooks_analyzed,
            views_before_consolidation: before,
            views_after_consolidation: after,
            views_eliminated: before.saturating_sub(after),
            views_requiring_manual_review: views
                .iter()
                .filter(|v| v.score.category.needs_review())
                .count(),
            conflicts: consolidation.conflicts.len(),
            warnings: warnings.len(),
        };

        Self {
            summary,
            views,
            calculations,
            warnings,
        }
    }

    pub fn highest_category(&self) -> Category {
        self.views
            .iter()
            .map(|v| v.score.category)
            .chain(self.calculations.iter().map(|c| c.score.category))
            .max()
            .unwrap_or(Category::Automated)
    }
}

// ── Markdown ───────────────────────────────────────────────────

/// Table cells are single-line with pipes escaped.
fn cell(text: &str) -> String {
    text.replace('\n', " ").replace('|', "\\|")
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Formula text inside a code fence, with embedded fences defused.
fn fenced(text: &str) -> String {
    text.replace("```", "` ` `")
}

/// Render `GOVERNANCE_REVIEW.md`.
pub fn render_markdown(report: &GovernanceReport) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let s = &report.summary;

    writeln!(out, "# Governance Review")?;
    writeln!(out)?;
    writeln!(out, "## Summary")?;
    writeln!(out)?;
    writeln!(out, "| Metric | Value |")?;
    writeln!(out, "|---|---|")?;
    writeln!(out, "| Workbooks analyzed | {} |", s.workbooks_analyzed)?;
    writeln!(out, "| Data sources before consolidation | {} |", s.views_before_consolidation)?;
    writeln!(out, "| Views after consolidation | {} |", s.views_after_consolidation)?;
    writeln!(out, "| Data sources eliminated | {} |", s.views_eliminated)?;
    writeln!(out, "| Views requiring manual review | {} |", s.views_requiring_manual_review)?;
    writeln!(out, "| Field conflicts | {} |", s.conflicts)?;
    writeln!(out, "| Warnings | {} |", s.warnings)?;

    writeln!(out)?;
    writeln!(out, "## Views")?;
    for view in &report.views {
        writeln!(out)?;
        writeln!(out, "### {} (`{}`)", single_line(&view.display_name), view.id)?;
        writeln!(out)?;
        writeln!(
            out,
            "- **Complexity:** {} ({})",
            view.score.score, view.score.category
        )?;
        writeln!(out, "- **Sources merged:** {}", single_line(&view.sources.join(", ")))?;
        if view.score.factors.is_empty() {
            writeln!(out, "- **Factors:** none")?;
        } else {
            writeln!(out, "- **Factors:**")?;
            for factor in &view.score.factors {
                writeln!(out, "  - {}", factor.detail)?;
            }
        }

        if !view.conflicts.is_empty() {
            writeln!(out)?;
            writeln!(out, "**Conflicts** (first definition kept as provisional):")?;
            writeln!(out)?;
            writeln!(out, "| Field | Source | Definition |")?;
            writeln!(out, "|---|---|---|")?;
            for conflict in &view.conflicts {
                for (source, definition) in &conflict.definitions {
                    writeln!(
                        out,
                        "| {} | {} | {} |",
                        cell(&conflict.field),
                        cell(source),
                        cell(definition)
                    )?;
                }
            }
        }
    }

    if !report.calculations.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Calculations Requiring Review")?;
        for calc in &report.calculations {
            writeln!(out)?;
            writeln!(out, "### {} in `{}`", single_line(&calc.field), calc.view_id)?;
            writeln!(out)?;
            writeln!(
                out,
                "- **Complexity:** {} ({})",
                calc.score.score, calc.score.category
            )?;
            if !calc.unsupported.is_empty() {
                writeln!(out, "- **Unsupported:** {}", single_line(&calc.unsupported.join(", ")))?;
            }
            writeln!(out)?;
            writeln!(out, "```")?;
            writeln!(out, "{}", fenced(&calc.formula))?;
            writeln!(out, "```")?;
        }
    }

    if !report.warnings.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Warnings")?;
        writeln!(out)?;
        for warning in &report.warnings {
            writeln!(out, "- {}", single_line(&warning.to_string()))?;
        }
    }

    Ok(out)
}
