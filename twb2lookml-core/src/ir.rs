//! Intermediate representation of a Tableau workbook.
//!
//! Populated once by the parser and never mutated afterward. Every optional
//! attribute is an explicit `Option`, and a data source's origin is an enum so
//! that a node is either table-backed or Custom-SQL-backed, never both.

use crate::error::UnsupportedConstructError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Workbook ──────────────────────────────────────────────────

/// Root container, elements in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    /// Caller-supplied document name.
    pub name: String,
    pub datasources: Vec<DataSource>,
    pub worksheets: Vec<Worksheet>,
    pub dashboards: Vec<Dashboard>,
}

impl Workbook {
    pub fn datasource(&self, name: &str) -> Option<&DataSource> {
        self.datasources.iter().find(|ds| ds.name == name)
    }

    pub fn worksheet(&self, name: &str) -> Option<&Worksheet> {
        self.worksheets.iter().find(|ws| ws.name == name)
    }
}

// ─── Data sources ──────────────────────────────────────────────

/// One Tableau connection definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Tableau internal name, unique within the workbook.
    pub name: String,
    /// Display caption, when the author set one.
    pub caption: Option<String>,
    /// Name of the owning workbook.
    pub workbook: String,
    pub origin: DataOrigin,
    pub fields: Vec<Field>,
    /// Unsupported connection or calculation shapes found on this node.
    pub warnings: Vec<UnsupportedConstructError>,
}

impl DataSource {
    /// Caption when present, internal name otherwise.
    pub fn display_name(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.name)
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            workbook: self.workbook.clone(),
            datasource: self.name.clone(),
            caption: self.display_name().to_string(),
        }
    }

    pub fn custom_sql(&self) -> Option<&str> {
        match &self.origin {
            DataOrigin::CustomSql(sql) => Some(sql),
            DataOrigin::Table(_) => None,
        }
    }

    pub fn calculations(&self) -> impl Iterator<Item = (&Field, &Calculation)> {
        self.fields
            .iter()
            .filter_map(|f| f.calculation.as_ref().map(|c| (f, c)))
    }
}

/// Where the rows of a data source come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    Table(TableRef),
    /// Custom SQL text, trimmed but otherwise verbatim.
    CustomSql(String),
}

/// Physical table reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub connection: ConnectionSignature,
    /// Tableau's literal table attribute, e.g. `[public].[orders]`.
    pub table: String,
    /// Set when the connection shape was unsupported and this reference only
    /// stands in for it.
    pub placeholder: bool,
}

impl TableRef {
    /// Dotted table name with Tableau's brackets stripped.
    pub fn sql_table_name(&self) -> String {
        let parts: Vec<String> = split_bracketed(&self.table);
        let mut qualified = Vec::new();
        if parts.len() == 1 && !self.connection.schema.is_empty() {
            qualified.push(self.connection.schema.clone());
        }
        qualified.extend(parts);
        qualified.join(".")
    }
}

/// Split `[a].[b]` or `a.b` into its parts without brackets.
fn split_bracketed(table: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_bracket = false;
    let mut chars = table.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' if !in_bracket => in_bracket = true,
            ']' if in_bracket => {
                if chars.peek() == Some(&']') {
                    current.push(']');
                    chars.next();
                } else {
                    in_bracket = false;
                }
            }
            '.' if !in_bracket => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Physical connection attributes; empty strings for absent parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionSignature {
    pub driver: String,
    pub host: String,
    pub database: String,
    pub schema: String,
}

impl fmt::Display for ConnectionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.driver, self.host, self.database, self.schema
        )
    }
}

/// Workbook-qualified data source identity, stable across a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    pub workbook: String,
    pub datasource: String,
    pub caption: String,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workbook, self.caption)
    }
}

// ─── Fields ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Normalized name, legal as a LookML identifier.
    pub name: String,
    /// Tableau column name with brackets stripped.
    pub column: String,
    /// Physical column; `None` for calculated fields.
    pub remote_name: Option<String>,
    pub caption: Option<String>,
    pub role: Role,
    pub datatype: DataType,
    pub aggregation: Option<Aggregation>,
    pub calculation: Option<Calculation>,
}

impl Field {
    pub fn label(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.column)
    }

    pub fn is_calculated(&self) -> bool {
        self.calculation.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Dimension,
    Measure,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dimension" => Some(Role::Dimension),
            "measure" => Some(Role::Measure),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Dimension => f.write_str("dimension"),
            Role::Measure => f.write_str("measure"),
        }
    }
}

/// Declared Tableau datatype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Real,
    Boolean,
    Date,
    DateTime,
    Spatial,
    Unknown(String),
}

impl DataType {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" | "wstr" => DataType::String,
            "integer" | "int" | "i8" | "i4" | "i2" => DataType::Integer,
            "real" | "double" | "float" | "r8" => DataType::Real,
            "boolean" | "bool" => DataType::Boolean,
            "date" => DataType::Date,
            "datetime" | "timestamp" => DataType::DateTime,
            "spatial" => DataType::Spatial,
            other => DataType::Unknown(other.to_string()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Real)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::DateTime)
    }

    /// LookML dimension type for this datatype.
    pub fn lookml_type(&self) -> &'static str {
        match self {
            DataType::Integer | DataType::Real => "number",
            DataType::Boolean => "yesno",
            DataType::Date | DataType::DateTime => "time",
            DataType::String | DataType::Spatial | DataType::Unknown(_) => "string",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => f.write_str("string"),
            DataType::Integer => f.write_str("integer"),
            DataType::Real => f.write_str("real"),
            DataType::Boolean => f.write_str("boolean"),
            DataType::Date => f.write_str("date"),
            DataType::DateTime => f.write_str("datetime"),
            DataType::Spatial => f.write_str("spatial"),
            DataType::Unknown(s) => f.write_str(s),
        }
    }
}

/// Default aggregation declared on a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    CountDistinct,
    Min,
    Max,
    Median,
    Attribute,
    StdDev,
    Variance,
    None,
    Other(String),
}

impl Aggregation {
    /// Map Tableau's aggregation attribute (`Sum`, `CountD`, `Attr`, ...).
    pub fn from_tableau(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Aggregation::Sum,
            "avg" | "average" => Aggregation::Avg,
            "count" | "cnt" => Aggregation::Count,
            "countd" | "count_distinct" => Aggregation::CountDistinct,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "median" => Aggregation::Median,
            "attr" | "attribute" => Aggregation::Attribute,
            "stdev" | "stddev" => Aggregation::StdDev,
            "var" | "variance" => Aggregation::Variance,
            "none" | "" => Aggregation::None,
            other => Aggregation::Other(other.to_string()),
        }
    }

    /// Tableau formula function computing the same aggregation, so declared
    /// and calculated aggregations share one name.
    pub fn function_name(&self) -> Option<&'static str> {
        let name = match self {
            Aggregation::Sum => "SUM",
            Aggregation::Avg => "AVG",
            Aggregation::Count => "COUNT",
            Aggregation::CountDistinct => "COUNTD",
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
            Aggregation::Median => "MEDIAN",
            Aggregation::Attribute => "ATTR",
            Aggregation::StdDev => "STDEV",
            Aggregation::Variance => "VAR",
            Aggregation::None | Aggregation::Other(_) => return Option::None,
        };
        Some(name)
    }

    /// LookML measure type, if one exists for this aggregation.
    pub fn lookml_measure_type(&self) -> Option<&'static str> {
        match self {
            Aggregation::Sum | Aggregation::None => Some("sum"),
            Aggregation::Avg => Some("average"),
            Aggregation::Min => Some("min"),
            Aggregation::Max => Some("max"),
            Aggregation::Median => Some("median"),
            Aggregation::CountDistinct => Some("count_distinct"),
            _ => Option::None,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Count => "count",
            Aggregation::CountDistinct => "countd",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Median => "median",
            Aggregation::Attribute => "attr",
            Aggregation::StdDev => "stdev",
            Aggregation::Variance => "var",
            Aggregation::None => "none",
            Aggregation::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// Formula metadata of a calculated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calculation {
    /// Raw Tableau formula text.
    pub formula: String,
    pub is_lod: bool,
    pub lod_count: u32,
    /// Distinct aggregation functions, upper-cased, in first-use order.
    pub aggregations: Vec<String>,
    /// Constructs outside the translation support set.
    pub unsupported: Vec<String>,
}

impl Calculation {
    pub fn is_translatable(&self) -> bool {
        self.unsupported.is_empty()
    }
}

// ─── Worksheets and dashboards ─────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub name: String,
    /// Primary data source internal name; `None` for text-only sheets.
    pub datasource: Option<String>,
    /// Blended secondary data sources.
    pub secondary: Vec<String>,
    /// Column names (brackets stripped) used from the primary data source.
    pub fields: Vec<String>,
    /// Tableau mark class, `Automatic` when absent.
    pub mark: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub name: String,
    pub size: Option<DashboardSize>,
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSize {
    pub width: u32,
    pub height: u32,
}

/// Worksheet placement in Tableau's 0..100000 coordinate space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub worksheet: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(table: &str, schema: &str) -> TableRef {
        TableRef {
            connection: ConnectionSignature {
                driver: "postgres".into(),
                host: "db.local".into(),
                database: "sales".into(),
                schema: schema.into(),
            },
            table: table.into(),
            placeholder: false,
        }
    }

    #[test]
    fn sql_table_name_strips_brackets() {
        assert_eq!(table("[public].[orders]", "").sql_table_name(), "public.orders");
        assert_eq!(table("[orders]", "analytics").sql_table_name(), "analytics.orders");
        assert_eq!(table("orders", "").sql_table_name(), "orders");
        assert_eq!(table("[odd]]name]", "").sql_table_name(), "odd]name");
    }

    #[test]
    fn datatype_maps_to_lookml() {
        assert_eq!(DataType::parse("integer").lookml_type(), "number");
        assert_eq!(DataType::parse("real").lookml_type(), "number");
        assert_eq!(DataType::parse("boolean").lookml_type(), "yesno");
        assert_eq!(DataType::parse("datetime").lookml_type(), "time");
        assert_eq!(DataType::parse("geometry").lookml_type(), "string");
        assert_eq!(DataType::parse("geometry"), DataType::Unknown("geometry".into()));
    }

    #[test]
    fn aggregation_from_tableau_names() {
        assert_eq!(Aggregation::from_tableau("Sum"), Aggregation::Sum);
        assert_eq!(Aggregation::from_tableau("CountD"), Aggregation::CountDistinct);
        assert_eq!(Aggregation::from_tableau("Attr"), Aggregation::Attribute);
        assert_eq!(Aggregation::from_tableau("Year"), Aggregation::Other("year".into()));
        assert_eq!(Aggregation::Count.lookml_measure_type(), None);
        assert_eq!(Aggregation::Avg.lookml_measure_type(), Some("average"));
    }
}
