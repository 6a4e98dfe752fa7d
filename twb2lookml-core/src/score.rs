//! Complexity scoring (C-Score).
//!
//! A score is a sum of `weight * count` terms with non-negative weights, so
//! adding any factor can only raise it.

use crate::config::{ScoringConfig, Thresholds};
use crate::consolidate::ConsolidatedView;
use crate::ir::{Aggregation, Calculation, Role};
use crate::sql::{count_joins, normalize_sql};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Review category derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Automated,
    FlaggedManualReview,
    HighRisk,
}

impl Category {
    pub fn needs_review(&self) -> bool {
        !matches!(self, Category::Automated)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Automated => f.write_str("Automated"),
            Category::FlaggedManualReview => f.write_str("Flagged-Manual-Review"),
            Category::HighRisk => f.write_str("High-Risk"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Lod,
    Join,
    Aggregation,
    SqlLength,
    Unsupported,
    Conflict,
}

/// One contributing reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factor {
    pub kind: FactorKind,
    pub count: u32,
    pub points: u32,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub score: u32,
    pub category: Category,
    pub factors: Vec<Factor>,
}

/// Raw counts the score is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreInputs {
    pub lod_calculations: u32,
    pub joins: u32,
    pub aggregation_functions: u32,
    /// Characters of normalized Custom SQL.
    pub sql_length: u32,
    pub unsupported: u32,
    pub conflicts: u32,
}

impl ScoreInputs {
    pub fn for_view(view: &ConsolidatedView) -> Self {
        let mut aggregations: BTreeSet<String> = BTreeSet::new();
        let mut lods = 0;
        for merged in &view.fields {
            let field = &merged.field;
            if field.role == Role::Measure {
                if let Some(name) = field.aggregation.as_ref().and_then(Aggregation::function_name) {
                    aggregations.insert(name.to_string());
                }
            }
            if let Some(calc) = &field.calculation {
                lods += calc.lod_count;
                aggregations.extend(calc.aggregations.iter().map(|a| a.to_uppercase()));
            }
        }

        let (joins, sql_length) = match view.custom_sql() {
            Some(sql) => (
                count_joins(sql),
                normalize_sql(sql).chars().count() as u32,
            ),
            None => (0, 0),
        };

        Self {
            lod_calculations: lods,
            joins,
            aggregation_functions: aggregations.len() as u32,
            sql_length,
            unsupported: view.warnings.len() as u32,
            conflicts: view.conflicts.len() as u32,
        }
    }

    pub fn for_calculation(calc: &Calculation) -> Self {
        Self {
            lod_calculations: calc.lod_count,
            aggregation_functions: calc.aggregations.len() as u32,
            unsupported: calc.unsupported.len() as u32,
            ..Default::default()
        }
    }
}

/// Map a score to its category. Any conflict floors the category at
/// manual review.
pub fn categorize(score: u32, conflicts: u32, thresholds: &Thresholds) -> Category {
    let category = if score < thresholds.review {
        Category::Automated
    } else if score <= thresholds.high_risk {
        Category::FlaggedManualReview
    } else {
        Category::HighRisk
    };
    if conflicts > 0 {
        category.max(Category::FlaggedManualReview)
    } else {
        category
    }
}

/// Compute the score for a set of inputs.
pub fn score(inputs: &ScoreInputs, config: &ScoringConfig) -> ComplexityScore {
    let weights = &config.weights;
    let sql_buckets = inputs.sql_length / config.sql_length_bucket.max(1);

    let terms = [
        (FactorKind::Lod, inputs.lod_calculations, weights.lod, "LOD expressions"),
        (FactorKind::Join, inputs.joins, weights.join, "joins in Custom SQL"),
        (
            FactorKind::Aggregation,
            inputs.aggregation_functions,
            weights.aggregation,
            "distinct aggregation functions",
        ),
        (
            FactorKind::SqlLength,
            sql_buckets,
            weights.sql_length,
            "Custom SQL length buckets",
        ),
        (
            FactorKind::Unsupported,
            inputs.unsupported,
            weights.unsupported,
            "unsupported constructs",
        ),
        (FactorKind::Conflict, inputs.conflicts, weights.conflict, "field conflicts"),
    ];

    let mut total: u32 = 0;
    let mut factors = Vec::new();
    for (kind, count, weight, label) in terms {
        if count == 0 {
            continue;
        }
        let points = count.saturating_mul(weight);
        total = total.saturating_add(points);
        factors.push(Factor {
            kind,
            count,
            points,
            detail: format!("{} x {} (+{})", count, label, points),
        });
    }

    ComplexityScore {
        score: total,
        category: categorize(total, inputs.conflicts, &config.thresholds),
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringWeights;
    use proptest::prelude::*;

    #[test]
    fn empty_inputs_are_automated() {
        let s = score(&ScoreInputs::default(), &ScoringConfig::default());
        assert_eq!(s.score, 0);
        assert_eq!(s.category, Category::Automated);
        assert!(s.factors.is_empty());
    }

    #[test]
    fn weights_and_buckets_apply() {
        let inputs = ScoreInputs {
            lod_calculations: 1,
            joins: 2,
            aggregation_functions: 1,
            sql_length: 1200,
            ..Default::default()
        };
        // 5 + 2*2 + 1 + 2 buckets * 1
        let s = score(&inputs, &ScoringConfig::default());
        assert_eq!(s.score, 12);
        assert_eq!(s.category, Category::FlaggedManualReview);
        assert_eq!(s.factors.len(), 4);
        assert_eq!(s.factors[0].kind, FactorKind::Lod);
        assert_eq!(s.factors[3].points, 2);
    }

    #[test]
    fn thresholds_partition_categories() {
        let t = Thresholds {
            review: 5,
            high_risk: 12,
        };
        assert_eq!(categorize(4, 0, &t), Category::Automated);
        assert_eq!(categorize(5, 0, &t), Category::FlaggedManualReview);
        assert_eq!(categorize(12, 0, &t), Category::FlaggedManualReview);
        assert_eq!(categorize(13, 0, &t), Category::HighRisk);
    }

    #[test]
    fn conflict_floors_category() {
        let config = ScoringConfig {
            weights: ScoringWeights {
                conflict: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let inputs = ScoreInputs {
            conflicts: 1,
            ..Default::default()
        };
        let s = score(&inputs, &config);
        assert_eq!(s.score, 0);
        assert_eq!(s.category, Category::FlaggedManualReview);
    }

    #[test]
    fn declared_and_calculated_aggregations_share_names() {
        use crate::config::NamingConfig;
        use crate::consolidate::consolidate;
        use crate::ir::{DataOrigin, DataSource, DataType, Field};
        use crate::naming::Namespace;

        let field = |name: &str, agg: Option<Aggregation>, formula: Option<&str>| Field {
            name: name.to_lowercase(),
            column: name.into(),
            remote_name: formula.is_none().then(|| name.to_lowercase()),
            caption: None,
            role: Role::Measure,
            datatype: DataType::Integer,
            aggregation: agg,
            calculation: formula.map(|f| {
                let analysis = crate::formula::analyze(f);
                Calculation {
                    formula: f.into(),
                    is_lod: false,
                    lod_count: 0,
                    aggregations: analysis.aggregations,
                    unsupported: analysis.unsupported,
                }
            }),
        };
        let ds = DataSource {
            name: "federated.1".into(),
            caption: Some("Orders".into()),
            workbook: "book".into(),
            origin: DataOrigin::CustomSql("SELECT * FROM orders".into()),
            fields: vec![
                field("Customers", Some(Aggregation::CountDistinct), None),
                field("Unique Customers", None, Some("COUNTD([Customers])")),
                field("Spread", Some(Aggregation::StdDev), None),
                field("Spread Calc", None, Some("STDEV([Spread]) + SUM([Spread])")),
            ],
            warnings: Vec::new(),
        };
        let mut ns = Namespace::new(NamingConfig::default());
        let view = consolidate(&[&ds], &mut ns).views.remove(0);

        // COUNTD, STDEV, SUM
        assert_eq!(ScoreInputs::for_view(&view).aggregation_functions, 3);
    }

    fn arb_inputs() -> impl Strategy<Value = ScoreInputs> {
        (0u32..20, 0u32..20, 0u32..20, 0u32..5000, 0u32..10, 0u32..10).prop_map(
            |(lod, joins, aggs, len, unsupported, conflicts)| ScoreInputs {
                lod_calculations: lod,
                joins,
                aggregation_functions: aggs,
                sql_length: len,
                unsupported,
                conflicts,
            },
        )
    }

    fn arb_config() -> impl Strategy<Value = ScoringConfig> {
        (0u32..10, 0u32..10, 0u32..10, 0u32..10, 0u32..10, 0u32..10, 1u32..1000).prop_map(
            |(lod, join, aggregation, sql_length, unsupported, conflict, bucket)| ScoringConfig {
                weights: ScoringWeights {
                    lod,
                    join,
                    aggregation,
                    sql_length,
                    unsupported,
                    conflict,
                },
                sql_length_bucket: bucket,
                thresholds: Thresholds::default(),
            },
        )
    }

    proptest! {
        #[test]
        fn adding_a_factor_never_lowers_the_score(
            inputs in arb_inputs(),
            config in arb_config(),
            which in 0usize..6,
        ) {
            let before = score(&inputs, &config);
            let mut more = inputs;
            match which {
                0 => more.lod_calculations += 1,
                1 => more.joins += 1,
                2 => more.aggregation_functions += 1,
                3 => more.sql_length += config.sql_length_bucket,
                4 => more.unsupported += 1,
                _ => more.conflicts += 1,
            }
            let after = score(&more, &config);
            prop_assert!(after.score >= before.score);
            prop_assert!(after.category >= before.category);
        }
    }
}
