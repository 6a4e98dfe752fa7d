//! Workbook parser: raw `.twb` bytes to a [`Workbook`] IR.
//!
//! Structural problems (undecodable bytes, broken markup, a root other than
//! `<workbook>`) and dangling references abort the parse. Unsupported
//! connection or calculation shapes do not; they are recorded on the data
//! source they belong to.

mod workbook;
mod xml;

use crate::error::ParseError;
use crate::ir::Workbook;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Parse one workbook document. `name` identifies it in diagnostics and in
/// batch consolidation.
pub fn parse_workbook(name: &str, bytes: &[u8]) -> Result<Workbook, ParseError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| {
        ParseError::malformed(name, e.valid_up_to() as u64, format!("invalid UTF-8: {}", e))
    })?;

    let root = xml::parse_document(name, text)?;
    if root.name != "workbook" {
        return Err(ParseError::malformed(
            name,
            0,
            format!("expected <workbook> root element, found <{}>", root.name),
        ));
    }

    let workbook = workbook::read_workbook(name, &root)?;
    tracing::debug!(
        workbook = name,
        datasources = workbook.datasources.len(),
        worksheets = workbook.worksheets.len(),
        dashboards = workbook.dashboards.len(),
        "parsed workbook"
    );
    Ok(workbook)
}
