//! Consolidation engine.
//!
//! Clusters data sources by exact canonical signature, one view per cluster.
//! There is no approximate matching: two sources merge only when their
//! normalized SQL or their literal connection and table agree.

use crate::error::UnsupportedConstructError;
use crate::ir::{Aggregation, DataOrigin, DataSource, DataType, Field, Role, SourceRef};
use crate::naming::{content_hash, Namespace};
use crate::sql::normalize_sql;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// One reusable view built from one or more data sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedView {
    /// Content-addressed identifier.
    pub id: String,
    pub display_name: String,
    /// Canonical signature the cluster was keyed on.
    pub signature: String,
    /// Origin of the first-seen source; Custom SQL is kept verbatim.
    pub origin: DataOrigin,
    /// Merged catalog, unique by normalized name, first-seen order.
    pub fields: Vec<MergedField>,
    /// Merged data sources in input order.
    pub sources: Vec<SourceRef>,
    pub conflicts: Vec<FieldConflict>,
    /// Unsupported constructs carried over from every merged source.
    pub warnings: Vec<UnsupportedConstructError>,
}

impl ConsolidatedView {
    pub fn field(&self, name: &str) -> Option<&MergedField> {
        self.fields.iter().find(|f| f.field.name == name)
    }

    /// Field by Tableau column name, as worksheets and formulas refer to it.
    pub fn field_by_column(&self, column: &str) -> Option<&MergedField> {
        self.fields
            .iter()
            .find(|f| f.field.column == column)
            .or_else(|| self.fields.iter().find(|f| f.field.label() == column))
    }

    pub fn custom_sql(&self) -> Option<&str> {
        match &self.origin {
            DataOrigin::CustomSql(sql) => Some(sql),
            DataOrigin::Table(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedField {
    pub field: Field,
    /// Source the kept definition came from.
    pub origin: SourceRef,
    /// Set when another source defined this field differently.
    pub provisional: bool,
}

/// Differing definitions of one field name inside one view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConflict {
    pub view_id: String,
    pub field: String,
    /// First entry is the provisional definition that was kept.
    pub definitions: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDefinition {
    pub source: SourceRef,
    pub role: Role,
    pub datatype: DataType,
    pub aggregation: Option<Aggregation>,
    pub formula: Option<String>,
}

impl FieldDefinition {
    fn of(field: &Field, source: &SourceRef) -> Self {
        Self {
            source: source.clone(),
            role: field.role,
            datatype: field.datatype.clone(),
            aggregation: field.aggregation.clone(),
            formula: field
                .calculation
                .as_ref()
                .map(|c| c.formula.split_whitespace().collect::<Vec<_>>().join(" ")),
        }
    }

    /// Definitions agree when everything but the source matches.
    fn same_as(&self, other: &FieldDefinition) -> bool {
        self.role == other.role
            && self.datatype == other.datatype
            && self.aggregation == other.aggregation
            && self.formula == other.formula
    }

    pub fn describe(&self) -> String {
        let mut out = format!("{} {}", self.role, self.datatype);
        if let Some(agg) = &self.aggregation {
            out.push_str(&format!(" ({})", agg));
        }
        if let Some(formula) = &self.formula {
            out.push_str(&format!(" = {}", formula));
        }
        out
    }
}

/// Output of consolidation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Consolidation {
    pub views: Vec<ConsolidatedView>,
    /// Conflicts of every view, in view order.
    pub conflicts: Vec<FieldConflict>,
    #[serde(skip)]
    by_source: HashMap<(String, String), usize>,
}

impl Consolidation {
    /// View a data source was merged into.
    pub fn view_for(&self, workbook: &str, datasource: &str) -> Option<&ConsolidatedView> {
        self.by_source
            .get(&(workbook.to_string(), datasource.to_string()))
            .map(|&idx| &self.views[idx])
    }

    pub fn source_count(&self) -> usize {
        self.views.iter().map(|v| v.sources.len()).sum()
    }
}

/// Canonical signature of a data source's defining content.
pub fn signature(ds: &DataSource) -> String {
    match &ds.origin {
        DataOrigin::CustomSql(sql) => format!("sql:{}", content_hash(&normalize_sql(sql))),
        DataOrigin::Table(table) if table.placeholder => {
            format!("placeholder:{}|{}", ds.workbook, ds.name)
        }
        DataOrigin::Table(table) => format!("table:{}|{}", table.connection, table.table),
    }
}

/// Shortest display name, lexicographically smallest on ties.
fn choose_display_name<'a>(members: &[&'a DataSource]) -> &'a str {
    members
        .iter()
        .map(|ds| ds.display_name())
        .min_by(|a, b| a.chars().count().cmp(&b.chars().count()).then_with(|| a.cmp(b)))
        .unwrap_or_default()
}

/// Cluster `datasources` (in input order) into views.
pub fn consolidate(datasources: &[&DataSource], namespace: &mut Namespace) -> Consolidation {
    let mut clusters: Vec<(String, Vec<&DataSource>)> = Vec::new();
    let mut cluster_of: HashMap<String, usize> = HashMap::new();

    for &ds in datasources {
        let sig = signature(ds);
        match cluster_of.get(&sig) {
            Some(&idx) => clusters[idx].1.push(ds),
            None => {
                cluster_of.insert(sig.clone(), clusters.len());
                clusters.push((sig, vec![ds]));
            }
        }
    }

    let mut result = Consolidation::default();

    for (sig, members) in clusters {
        let display_name = choose_display_name(&members).to_string();
        let id = namespace.claim(&display_name, &sig);
        let view = merge_cluster(id, display_name, sig, &members);

        debug!(
            view = %view.id,
            sources = view.sources.len(),
            fields = view.fields.len(),
            conflicts = view.conflicts.len(),
            "consolidated view"
        );

        let idx = result.views.len();
        for source in &view.sources {
            result
                .by_source
                .insert((source.workbook.clone(), source.datasource.clone()), idx);
        }
        result.conflicts.extend(view.conflicts.iter().cloned());
        result.views.push(view);
    }

    result
}

fn merge_cluster(
    id: String,
    display_name: String,
    signature: String,
    members: &[&DataSource],
) -> ConsolidatedView {
    let mut fields: Vec<MergedField> = Vec::new();
    let mut conflicts: Vec<FieldConflict> = Vec::new();
    let mut sources = Vec::with_capacity(members.len());
    let mut warnings = Vec::new();

    for ds in members {
        let source = ds.source_ref();
        warnings.extend(ds.warnings.iter().cloned());

        for field in &ds.fields {
            let incoming = FieldDefinition::of(field, &source);
            let Some(pos) = fields.iter().position(|m| m.field.name == field.name) else {
                fields.push(MergedField {
                    field: field.clone(),
                    origin: source.clone(),
                    provisional: false,
                });
                continue;
            };
            let existing = &mut fields[pos];

            let kept = FieldDefinition::of(&existing.field, &existing.origin);
            if kept.same_as(&incoming) {
                continue;
            }

            existing.provisional = true;
            match conflicts.iter_mut().find(|c| c.field == field.name) {
                Some(conflict) => {
                    if !conflict.definitions.iter().any(|d| d.same_as(&incoming)) {
                        conflict.definitions.push(incoming);
                    }
                }
                None => conflicts.push(FieldConflict {
                    view_id: id.clone(),
                    field: field.name.clone(),
                    definitions: vec![kept, incoming],
                }),
            }
        }

        sources.push(source);
    }

    let origin = members
        .first()
        .map(|ds| ds.origin.clone())
        .unwrap_or(DataOrigin::CustomSql(String::new()));

    ConsolidatedView {
        id,
        display_name,
        signature,
        origin,
        fields,
        sources,
        conflicts,
        warnings,
    }
}
