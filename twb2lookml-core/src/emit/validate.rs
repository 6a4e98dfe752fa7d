//! Structural validation of generated text.
//!
//! A failure here means the generator produced malformed output, never that
//! the input was bad.

use super::dashboard::DashboardDoc;
use super::lookml::TERMINATOR;
use crate::artifact::{Artifact, ArtifactKind};
use crate::error::EmitterInvariantViolation;
use regex::Regex;
use std::sync::LazyLock;

static SQL_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*sql[a-z_]*\s*:").unwrap());

/// Validate one artifact according to its kind.
pub fn validate_artifact(artifact: &Artifact) -> Result<(), EmitterInvariantViolation> {
    let violation = |line: usize, detail: String| EmitterInvariantViolation {
        artifact: artifact.name.clone(),
        kind: artifact.kind,
        line,
        detail,
    };
    let result = match artifact.kind {
        ArtifactKind::Model | ArtifactKind::View => check_lookml(&artifact.content),
        ArtifactKind::Dashboard => check_dashboard(&artifact.content),
        ArtifactKind::Governance => check_markdown(&artifact.content),
    };
    result.map_err(|(line, detail)| violation(line, detail))
}

type Finding = (usize, String);

/// Balanced braces outside comments, strings and SQL bodies; every `sql*:`
/// statement terminated by `;;` with nothing but a comment after it.
pub fn check_lookml(text: &str) -> Result<(), Finding> {
    let mut open_lines: Vec<usize> = Vec::new();
    // Line where an unterminated SQL body started.
    let mut in_sql: Option<usize> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let body = if in_sql.is_some() {
            Some(line)
        } else {
            SQL_KEY.find(line).map(|m| &line[m.end()..])
        };
        if let Some(body) = body {
            match body.find(TERMINATOR) {
                Some(pos) => {
                    in_sql = None;
                    let tail = body[pos + TERMINATOR.len()..].trim_start();
                    if !tail.is_empty() && !tail.starts_with('#') {
                        return Err((line_no, format!("text after ';;' terminator: {}", tail)));
                    }
                    continue;
                }
                None => {
                    in_sql.get_or_insert(line_no);
                    continue;
                }
            }
        }

        let mut chars = line.chars();
        let mut in_string = false;
        while let Some(c) = chars.next() {
            if in_string {
                match c {
                    '\\' => {
                        chars.next();
                    }
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '#' => break,
                '"' => in_string = true,
                '{' => open_lines.push(line_no),
                '}' => {
                    if open_lines.pop().is_none() {
                        return Err((line_no, "closing brace without matching block".to_string()));
                    }
                }
                _ => {}
            }
        }
        if in_string {
            return Err((line_no, "unterminated string literal".to_string()));
        }
    }

    if let Some(start) = in_sql {
        return Err((start, "sql statement not terminated by ';;'".to_string()));
    }
    if let Some(line) = open_lines.pop() {
        return Err((line, "block opened here is never closed".to_string()));
    }
    Ok(())
}

/// The document must re-parse as a dashboard list with named elements.
pub fn check_dashboard(text: &str) -> Result<(), Finding> {
    let docs: Vec<DashboardDoc> = serde_yaml::from_str(text).map_err(|e| {
        let line = e.location().map(|l| l.line()).unwrap_or(0);
        (line, format!("dashboard YAML does not re-parse: {}", e))
    })?;
    if docs.is_empty() {
        return Err((1, "dashboard list is empty".to_string()));
    }
    for doc in &docs {
        if let Some(el) = doc.elements.iter().find(|e| e.name.is_empty()) {
            return Err((0, format!("element '{}' has no name", el.title)));
        }
    }
    Ok(())
}

fn pipe_count(row: &str) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for c in row.chars() {
        if c == '|' && !escaped {
            count += 1;
        }
        escaped = c == '\\' && !escaped;
    }
    count
}

/// Balanced code fences; table rows closed and as wide as their header.
pub fn check_markdown(text: &str) -> Result<(), Finding> {
    let mut fence_open: Option<usize> = None;
    let mut table_width: Option<usize> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            fence_open = match fence_open {
                Some(_) => None,
                None => Some(line_no),
            };
            table_width = None;
            continue;
        }
        if fence_open.is_some() {
            continue;
        }

        if trimmed.starts_with('|') {
            if !trimmed.ends_with('|') || trimmed.len() < 2 {
                return Err((line_no, "table row is not closed with '|'".to_string()));
            }
            let width = pipe_count(trimmed);
            match table_width {
                None => table_width = Some(width),
                Some(expected) if expected != width => {
                    return Err((
                        line_no,
                        format!("table row has {} cells, header has {}", width - 1, expected - 1),
                    ))
                }
                Some(_) => {}
            }
        } else {
            table_width = None;
        }
    }

    if let Some(line) = fence_open {
        return Err((line, "code fence is never closed".to_string()));
    }
    Ok(())
}
