//! Typed walk over the decoded workbook tree.

use super::xml::XmlElement;
use crate::error::{ParseError, UnsupportedConstructError};
use crate::formula;
use crate::ir::{
    Aggregation, Calculation, ConnectionSignature, Dashboard, DashboardSize, DataOrigin,
    DataSource, DataType, Field, Role, TableRef, Workbook, Worksheet, Zone,
};
use crate::emit::lookml::embeds_terminator;
use crate::naming::slugify;
use std::collections::HashSet;

/// Pseudo data source holding workbook parameters.
const PARAMETERS: &str = "Parameters";

const FIELD_NAME_MAX_LEN: usize = 64;

pub(super) fn read_workbook(name: &str, root: &XmlElement) -> Result<Workbook, ParseError> {
    let datasources: Vec<DataSource> = root
        .path("datasources")
        .map(|list| {
            list.children_named("datasource")
                .filter(|ds| ds.attr("name") != Some(PARAMETERS))
                .enumerate()
                .map(|(idx, ds)| read_datasource(name, idx, ds))
                .collect()
        })
        .unwrap_or_default();

    let known: HashSet<&str> = datasources.iter().map(|ds| ds.name.as_str()).collect();

    let mut worksheets = Vec::new();
    if let Some(list) = root.path("worksheets") {
        for ws in list.children_named("worksheet") {
            worksheets.push(read_worksheet(ws, &known)?);
        }
    }

    let sheet_names: HashSet<&str> = worksheets.iter().map(|ws| ws.name.as_str()).collect();

    let mut dashboards = Vec::new();
    if let Some(list) = root.path("dashboards") {
        for db in list.children_named("dashboard") {
            dashboards.push(read_dashboard(db, &sheet_names)?);
        }
    }

    Ok(Workbook {
        name: name.to_string(),
        datasources,
        worksheets,
        dashboards,
    })
}

// ── Data sources ──

fn read_datasource(workbook: &str, idx: usize, el: &XmlElement) -> DataSource {
    let caption = el.attr_nonempty("caption").map(str::to_string);
    let name = el
        .attr_nonempty("name")
        .map(str::to_string)
        .or_else(|| caption.clone())
        .unwrap_or_else(|| format!("datasource_{}", idx + 1));
    let display = caption.clone().unwrap_or_else(|| name.clone());
    let location = format!("datasource '{}'", display);

    let mut warnings = Vec::new();
    let connection = el.child("connection");
    let origin = match connection {
        Some(conn) => read_origin(conn, &display, &location, &mut warnings),
        None => {
            warnings.push(UnsupportedConstructError::new(
                &display,
                &location,
                "data source without connection",
            ));
            placeholder(ConnectionSignature::default(), display.clone())
        }
    };

    let fields = read_fields(el, connection, &display, &location, &mut warnings);

    DataSource {
        name,
        caption,
        workbook: workbook.to_string(),
        origin,
        fields,
        warnings,
    }
}

fn placeholder(connection: ConnectionSignature, table: String) -> DataOrigin {
    DataOrigin::Table(TableRef {
        connection,
        table,
        placeholder: true,
    })
}

fn is_relation(el: &XmlElement) -> bool {
    el.name == "relation" || el.name.ends_with(".relation")
}

fn signature_of(conn: &XmlElement) -> ConnectionSignature {
    let get = |key: &str| conn.attr(key).unwrap_or_default().to_string();
    ConnectionSignature {
        driver: get("class"),
        host: get("server"),
        database: get("dbname"),
        schema: get("schema"),
    }
}

fn read_origin(
    conn: &XmlElement,
    display: &str,
    location: &str,
    warnings: &mut Vec<UnsupportedConstructError>,
) -> DataOrigin {
    let relation = conn.children.iter().find(|c| is_relation(c));

    // Federated connections keep the physical attributes on a named connection.
    let physical = if conn.attr("class") == Some("federated") {
        let named: Vec<&XmlElement> = conn
            .path("named-connections")
            .map(|list| list.children_named("named-connection").collect())
            .unwrap_or_default();
        let wanted = relation.and_then(|r| r.attr("connection"));
        named
            .iter()
            .find(|nc| wanted.is_some() && nc.attr("name") == wanted)
            .or_else(|| named.first())
            .copied()
            .and_then(|nc| nc.child("connection"))
            .unwrap_or(conn)
    } else {
        conn
    };
    let signature = signature_of(physical);

    let Some(relation) = relation else {
        warnings.push(UnsupportedConstructError::new(
            display,
            location,
            "connection without relation",
        ));
        return placeholder(signature, display.to_string());
    };

    match relation.attr("type") {
        Some("table") => DataOrigin::Table(TableRef {
            connection: signature,
            table: relation
                .attr_nonempty("table")
                .or_else(|| relation.attr_nonempty("name"))
                .unwrap_or(display)
                .to_string(),
            placeholder: false,
        }),
        Some("text") => {
            let sql = relation.text.trim();
            if embeds_terminator(sql) {
                warnings.push(UnsupportedConstructError::new(
                    display,
                    location,
                    "custom SQL containing ';;'",
                ));
                return placeholder(signature, display.to_string());
            }
            DataOrigin::CustomSql(sql.to_string())
        }
        other => {
            let kind = other.unwrap_or("untyped");
            warnings.push(UnsupportedConstructError::new(
                display,
                location,
                format!("{} relation", kind),
            ));
            let table = relation
                .descendants()
                .into_iter()
                .find(|d| is_relation(d) && d.attr("type") == Some("table"))
                .and_then(|d| d.attr_nonempty("table"))
                .unwrap_or(display)
                .to_string();
            placeholder(signature, table)
        }
    }
}

// ── Fields ──

fn strip_brackets(name: &str) -> String {
    let trimmed = name.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner.replace("]]", "]")
}

fn child_text(el: &XmlElement, name: &str) -> Option<String> {
    el.child(name)
        .map(|c| c.text.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn read_fields(
    ds: &XmlElement,
    connection: Option<&XmlElement>,
    display_name: &str,
    location: &str,
    warnings: &mut Vec<UnsupportedConstructError>,
) -> Vec<Field> {
    let mut fields: Vec<Field> = Vec::new();

    let records = connection
        .and_then(|c| c.path("metadata-records"))
        .map(|list| {
            list.children_named("metadata-record")
                .filter(|r| r.attr("class") == Some("column"))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    for record in records {
        let Some(local) = child_text(record, "local-name") else {
            continue;
        };
        let column = strip_brackets(&local);
        if column.starts_with(':') || fields.iter().any(|f| f.column == column) {
            continue;
        }
        let datatype = child_text(record, "local-type")
            .map(|t| DataType::parse(&t))
            .unwrap_or(DataType::String);
        let role = if datatype.is_numeric() {
            Role::Measure
        } else {
            Role::Dimension
        };
        fields.push(Field {
            name: String::new(),
            remote_name: child_text(record, "remote-name").or_else(|| Some(column.clone())),
            column,
            caption: None,
            role,
            datatype,
            aggregation: child_text(record, "aggregation").map(|a| Aggregation::from_tableau(&a)),
            calculation: None,
        });
    }

    for col in ds.children_named("column") {
        let Some(raw) = col.attr_nonempty("name") else {
            continue;
        };
        let column = strip_brackets(raw);
        if column.starts_with(':') {
            continue;
        }

        let caption = col.attr_nonempty("caption").map(str::to_string);
        let label = caption.clone().unwrap_or_else(|| column.clone());

        let calculation = match col.child("calculation") {
            Some(calc) if calc.attr("class").unwrap_or("tableau") == "tableau" => calc
                .attr("formula")
                .map(|formula| read_calculation(formula, &label, location, warnings)),
            Some(calc) => {
                warnings.push(UnsupportedConstructError::new(
                    &label,
                    location,
                    format!("{} calculation", calc.attr("class").unwrap_or("unknown")),
                ));
                None
            }
            None => None,
        };

        let datatype = col.attr("datatype").map(DataType::parse);
        let role = col.attr("role").and_then(Role::parse);
        let aggregation = col.attr_nonempty("aggregation").map(Aggregation::from_tableau);

        if let Some(existing) = fields.iter_mut().find(|f| f.column == column) {
            if caption.is_some() {
                existing.caption = caption;
            }
            if let Some(role) = role {
                existing.role = role;
            }
            if let Some(datatype) = datatype {
                existing.datatype = datatype;
            }
            if aggregation.is_some() {
                existing.aggregation = aggregation;
            }
            if calculation.is_some() {
                existing.calculation = calculation;
                existing.remote_name = None;
            }
            continue;
        }

        let is_calc = calculation.is_some();
        let role = role.unwrap_or_else(|| match &calculation {
            Some(c) if !c.aggregations.is_empty() => Role::Measure,
            _ => Role::Dimension,
        });
        fields.push(Field {
            name: String::new(),
            remote_name: if is_calc { None } else { Some(column.clone()) },
            column,
            caption,
            role,
            datatype: datatype.unwrap_or(DataType::String),
            aggregation,
            calculation,
        });
    }

    // Normalized names, unique within the data source.
    let mut used = HashSet::new();
    for field in &mut fields {
        let base = slugify(field.label(), FIELD_NAME_MAX_LEN);
        let mut name = base.clone();
        let mut n = 2;
        while !used.insert(name.clone()) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        field.name = name;
    }

    tracing::trace!(datasource = display_name, fields = fields.len(), "read fields");
    fields
}

fn read_calculation(
    formula: &str,
    label: &str,
    location: &str,
    warnings: &mut Vec<UnsupportedConstructError>,
) -> Calculation {
    let analysis = formula::analyze(formula);
    for construct in &analysis.unsupported {
        warnings.push(UnsupportedConstructError::new(label, location, construct));
    }
    Calculation {
        formula: formula.to_string(),
        is_lod: analysis.lod_count > 0,
        lod_count: analysis.lod_count,
        aggregations: analysis.aggregations,
        unsupported: analysis.unsupported,
    }
}

// ── Worksheets ──

fn read_worksheet(el: &XmlElement, known: &HashSet<&str>) -> Result<Worksheet, ParseError> {
    let name = el.attr("name").unwrap_or_default().to_string();
    let view = el.path("table/view");

    let sources: Vec<String> = view
        .and_then(|v| v.child("datasources"))
        .map(|list| {
            list.children_named("datasource")
                .filter_map(|ds| ds.attr_nonempty("name"))
                .filter(|n| *n != PARAMETERS)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Some(missing) = sources.iter().find(|s| !known.contains(s.as_str())) {
        return Err(ParseError::MissingDataSource {
            worksheet: name,
            datasource: missing.clone(),
        });
    }

    let mut sources = sources.into_iter();
    let datasource = sources.next();
    let secondary: Vec<String> = sources.collect();

    let mut fields: Vec<String> = Vec::new();
    if let (Some(view), Some(primary)) = (view, datasource.as_deref()) {
        for deps in view
            .children_named("datasource-dependencies")
            .filter(|d| d.attr("datasource") == Some(primary))
        {
            for child in &deps.children {
                let raw = match child.name.as_str() {
                    "column" => child.attr("name"),
                    "column-instance" => child.attr("column"),
                    _ => None,
                };
                if let Some(raw) = raw {
                    let column = strip_brackets(raw);
                    if !column.starts_with(':') && !fields.contains(&column) {
                        fields.push(column);
                    }
                }
            }
        }
    }

    let mark = el
        .path("table/panes")
        .and_then(|panes| {
            panes
                .children_named("pane")
                .find_map(|p| p.child("mark").and_then(|m| m.attr_nonempty("class")))
        })
        .unwrap_or("Automatic")
        .to_string();

    Ok(Worksheet {
        name,
        datasource,
        secondary,
        fields,
        mark,
    })
}

// ── Dashboards ──

fn parse_u32(el: &XmlElement, key: &str) -> Option<u32> {
    el.attr(key).and_then(|v| v.trim().parse().ok())
}

fn read_dashboard(el: &XmlElement, sheets: &HashSet<&str>) -> Result<Dashboard, ParseError> {
    let name = el.attr("name").unwrap_or_default().to_string();

    let size = el.child("size").and_then(|s| {
        let width = parse_u32(s, "maxwidth").or_else(|| parse_u32(s, "width"))?;
        let height = parse_u32(s, "maxheight").or_else(|| parse_u32(s, "height"))?;
        Some(DashboardSize { width, height })
    });

    let mut zones = Vec::new();
    for zone in el.descendants() {
        if zone.name != "zone" || zone.has_attr("type") || zone.has_attr("type-v2") {
            continue;
        }
        let Some(sheet) = zone.attr_nonempty("name") else {
            continue;
        };
        if !sheets.contains(sheet) {
            return Err(ParseError::MissingWorksheet {
                dashboard: name,
                worksheet: sheet.to_string(),
            });
        }
        zones.push(Zone {
            worksheet: sheet.to_string(),
            x: parse_u32(zone, "x").unwrap_or(0),
            y: parse_u32(zone, "y").unwrap_or(0),
            w: parse_u32(zone, "w").unwrap_or(0),
            h: parse_u32(zone, "h").unwrap_or(0),
        });
    }

    Ok(Dashboard { name, size, zones })
}

#[cfg(test)]
mod tests {
    use super::super::parse_workbook;
    use crate::error::ParseError;
    use crate::ir::{Aggregation, DataOrigin, DataType, Role, Workbook};

    const WORKBOOK: &str = r#"<?xml version='1.0' encoding='utf-8' ?>
<workbook version='18.1'>
  <datasources>
    <datasource name='Parameters' hasconnection='false'>
      <column name='[Target]' datatype='real' role='measure'/>
    </datasource>
    <datasource caption='Orders' name='federated.orders1'>
      <connection class='federated'>
        <named-connections>
          <named-connection name='pg.1'>
            <connection class='postgres' server='db.local' dbname='sales' schema='public'/>
          </named-connection>
        </named-connections>
        <relation connection='pg.1' name='orders' table='[public].[orders]' type='table'/>
        <metadata-records>
          <metadata-record class='column'>
            <remote-name>sales</remote-name>
            <local-name>[sales]</local-name>
            <local-type>real</local-type>
            <aggregation>Sum</aggregation>
          </metadata-record>
          <metadata-record class='column'>
            <remote-name>region</remote-name>
            <local-name>[region]</local-name>
            <local-type>string</local-type>
            <aggregation>Count</aggregation>
          </metadata-record>
          <metadata-record class='column'>
            <remote-name>order_date</remote-name>
            <local-name>[order_date]</local-name>
            <local-type>date</local-type>
          </metadata-record>
        </metadata-records>
      </connection>
      <column caption='Region Name' name='[region]' datatype='string' role='dimension'/>
      <column caption='Sales Per Region' name='[Calculation_1]' datatype='real' role='measure'>
        <calculation class='tableau' formula='{FIXED [region] : SUM([sales])}'/>
      </column>
      <column name='[:Measure Names]' datatype='string' role='dimension'/>
      <column caption='Sales Bin' name='[sales (bin)]' datatype='integer' role='dimension'>
        <calculation class='bin' decimals='0' formula='[sales]' size='10'/>
      </column>
    </datasource>
    <datasource caption='Custom' name='federated.custom1'>
      <connection class='federated'>
        <named-connections>
          <named-connection name='pg.2'>
            <connection class='postgres' server='db.local' dbname='sales'/>
          </named-connection>
        </named-connections>
        <relation connection='pg.2' name='Custom SQL Query' type='text'>
  SELECT o.id, c.name FROM orders o JOIN customers c ON c.id = o.cid
</relation>
      </connection>
    </datasource>
    <datasource caption='Joined' name='federated.join1'>
      <connection class='federated'>
        <relation join='inner' type='join'>
          <relation name='a' table='[public].[a]' type='table'/>
          <relation name='b' table='[public].[b]' type='table'/>
        </relation>
      </connection>
    </datasource>
  </datasources>
  <worksheets>
    <worksheet name='Sales Trend'>
      <table>
        <view>
          <datasources>
            <datasource caption='Orders' name='federated.orders1'/>
            <datasource name='Parameters'/>
            <datasource caption='Custom' name='federated.custom1'/>
          </datasources>
          <datasource-dependencies datasource='federated.orders1'>
            <column datatype='real' name='[sales]' role='measure'/>
            <column-instance column='[order_date]' derivation='Month' name='[tmn:order_date:ok]'/>
            <column-instance column='[sales]' derivation='Sum' name='[sum:sales:qk]'/>
          </datasource-dependencies>
        </view>
        <panes>
          <pane><mark class='Line'/></pane>
        </panes>
      </table>
    </worksheet>
    <worksheet name='Notes'>
      <table><view><datasources/></view></table>
    </worksheet>
  </worksheets>
  <dashboards>
    <dashboard name='Overview'>
      <size maxheight='800' maxwidth='1000'/>
      <zones>
        <zone h='100000' id='1' type-v2='layout-basic' w='100000' x='0' y='0'>
          <zone h='50000' id='2' name='Sales Trend' w='100000' x='0' y='0'/>
          <zone h='50000' id='3' name='Notes' w='50000' x='0' y='50000'/>
          <zone h='50000' id='4' type-v2='text' w='50000' x='50000' y='50000'/>
        </zone>
      </zones>
    </dashboard>
  </dashboards>
</workbook>
"#;

    #[test]
    fn reads_datasources_and_skips_parameters() {
        let wb = parse_workbook("book", WORKBOOK.as_bytes()).unwrap();
        let names: Vec<&str> = wb.datasources.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["federated.orders1", "federated.custom1", "federated.join1"]);

        let orders = &wb.datasources[0];
        assert_eq!(orders.display_name(), "Orders");
        match &orders.origin {
            DataOrigin::Table(t) => {
                assert_eq!(t.table, "[public].[orders]");
                assert_eq!(t.connection.driver, "postgres");
                assert_eq!(t.connection.host, "db.local");
                assert!(!t.placeholder);
            }
            other => panic!("expected table origin, got {:?}", other),
        }
    }

    #[test]
    fn merges_metadata_records_with_columns() {
        let wb = parse_workbook("book", WORKBOOK.as_bytes()).unwrap();
        let orders = &wb.datasources[0];
        let names: Vec<&str> = orders.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["sales", "region_name", "order_date", "sales_per_region", "sales_bin"]
        );

        let sales = &orders.fields[0];
        assert_eq!(sales.role, Role::Measure);
        assert_eq!(sales.datatype, DataType::Real);
        assert_eq!(sales.aggregation, Some(Aggregation::Sum));
        assert_eq!(sales.remote_name.as_deref(), Some("sales"));

        let region = &orders.fields[1];
        assert_eq!(region.role, Role::Dimension);
        assert_eq!(region.column, "region");

        let calc = orders.fields[3].calculation.as_ref().unwrap();
        assert!(calc.is_lod);
        assert_eq!(calc.lod_count, 1);
        assert!(orders.fields[3].remote_name.is_none());

        // Bin calculations stay plain dimensions but are flagged.
        assert!(orders.fields[4].calculation.is_none());
        assert!(orders
            .warnings
            .iter()
            .any(|w| w.construct == "bin calculation"));
        assert!(orders
            .warnings
            .iter()
            .any(|w| w.construct == "LOD expression FIXED"));
    }

    #[test]
    fn reads_custom_sql_and_flags_joins() {
        let wb = parse_workbook("book", WORKBOOK.as_bytes()).unwrap();
        let custom = &wb.datasources[1];
        assert_eq!(
            custom.custom_sql(),
            Some("SELECT o.id, c.name FROM orders o JOIN customers c ON c.id = o.cid")
        );
        assert!(custom.warnings.is_empty());

        let joined = &wb.datasources[2];
        match &joined.origin {
            DataOrigin::Table(t) => {
                assert!(t.placeholder);
                assert_eq!(t.table, "[public].[a]");
            }
            other => panic!("expected placeholder, got {:?}", other),
        }
        assert_eq!(joined.warnings.len(), 1);
        assert_eq!(joined.warnings[0].construct, "join relation");
    }

    #[test]
    fn custom_sql_with_terminator_becomes_placeholder() {
        let doc = r#"<workbook><datasources>
            <datasource caption='Odd' name='federated.odd'>
              <connection class='postgres' server='db' dbname='shop'>
                <relation name='Custom SQL Query' type='text'>SELECT ';;' AS x FROM orders</relation>
              </connection>
            </datasource></datasources></workbook>"#;
        let wb = parse_workbook("book", doc.as_bytes()).unwrap();
        let odd = &wb.datasources[0];
        assert!(odd.custom_sql().is_none());
        match &odd.origin {
            DataOrigin::Table(t) => {
                assert!(t.placeholder);
                assert_eq!(t.table, "Odd");
            }
            other => panic!("expected placeholder, got {:?}", other),
        }
        assert_eq!(odd.warnings.len(), 1);
        assert_eq!(odd.warnings[0].construct, "custom SQL containing ';;'");
    }

    #[test]
    fn parsed_workbook_survives_json() {
        let wb = parse_workbook("book", WORKBOOK.as_bytes()).unwrap();
        let json = serde_json::to_string(&wb).unwrap();
        let back: Workbook = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wb);
        assert_eq!(back.datasources[2].warnings[0].construct, "join relation");
    }

    #[test]
    fn reads_worksheets_and_dashboards() {
        let wb = parse_workbook("book", WORKBOOK.as_bytes()).unwrap();
        let trend = wb.worksheet("Sales Trend").unwrap();
        assert_eq!(trend.datasource.as_deref(), Some("federated.orders1"));
        assert_eq!(trend.secondary, vec!["federated.custom1"]);
        assert_eq!(trend.fields, vec!["sales", "order_date"]);
        assert_eq!(trend.mark, "Line");

        let notes = wb.worksheet("Notes").unwrap();
        assert!(notes.datasource.is_none());
        assert_eq!(notes.mark, "Automatic");

        let overview = &wb.dashboards[0];
        assert_eq!(overview.size.map(|s| s.width), Some(1000));
        let zones: Vec<&str> = overview.zones.iter().map(|z| z.worksheet.as_str()).collect();
        assert_eq!(zones, vec!["Sales Trend", "Notes"]);
        assert_eq!(overview.zones[1].y, 50000);
    }

    #[test]
    fn missing_datasource_is_reference_error() {
        let doc = r#"<workbook><worksheets><worksheet name='S'><table><view>
            <datasources><datasource name='federated.gone'/></datasources>
            </view></table></worksheet></worksheets></workbook>"#;
        let err = parse_workbook("book", doc.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingDataSource {
                worksheet: "S".into(),
                datasource: "federated.gone".into(),
            }
        );
    }

    #[test]
    fn missing_worksheet_is_reference_error() {
        let doc = r#"<workbook><dashboards><dashboard name='D'><zones>
            <zone name='Ghost' x='0' y='0' w='1' h='1'/></zones></dashboard></dashboards></workbook>"#;
        let err = parse_workbook("book", doc.as_bytes()).unwrap_err();
        assert!(err.is_reference_error());
        assert!(err.to_string().contains("Ghost"));
    }
}
