//! Indented LookML block writer.
//!
//! Every `open` must be paired with a `close`; the validator checks the
//! result, but the writer keeps the shape right by construction.

use std::fmt::{self, Write};

const INDENT: &str = "  ";

/// Ends every LookML SQL statement; a body must not contain it.
pub const TERMINATOR: &str = ";;";

/// True when `body` would end its statement early.
pub fn embeds_terminator(body: &str) -> bool {
    body.contains(TERMINATOR)
}

#[derive(Debug, Default)]
pub struct LookmlWriter {
    out: String,
    depth: usize,
}

impl LookmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    /// `<header> {` and one level deeper.
    pub fn open(&mut self, header: &str) -> fmt::Result {
        self.indent();
        writeln!(self.out, "{} {{", header)?;
        self.depth += 1;
        Ok(())
    }

    pub fn close(&mut self) -> fmt::Result {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        writeln!(self.out, "}}")
    }

    /// `key: value` with the value written as-is.
    pub fn param(&mut self, key: &str, value: &str) -> fmt::Result {
        self.indent();
        writeln!(self.out, "{}: {}", key, value)
    }

    /// `key: "value"` with the value quoted.
    pub fn string(&mut self, key: &str, value: &str) -> fmt::Result {
        self.param(key, &quote(value))
    }

    /// `key: body ;;` with the body copied verbatim. Multi-line bodies and
    /// bodies ending in a line comment get the terminator on its own line.
    pub fn sql(&mut self, key: &str, body: &str) -> fmt::Result {
        let body = body.trim();
        self.indent();
        if body.is_empty() {
            return writeln!(self.out, "{}: NULL ;;", key);
        }
        let last_line = body.lines().last().unwrap_or_default();
        if body.contains('\n') || last_line.contains("--") {
            writeln!(self.out, "{}: {}", key, body)?;
            self.indent();
            writeln!(self.out, ";;")
        } else {
            writeln!(self.out, "{}: {} ;;", key, body)
        }
    }

    /// `# text`, one comment line per input line.
    pub fn comment(&mut self, text: &str) -> fmt::Result {
        for line in text.lines() {
            self.indent();
            if line.is_empty() {
                writeln!(self.out, "#")?;
            } else {
                writeln!(self.out, "# {}", line)?;
            }
        }
        Ok(())
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// LookML string literal, kept on one line.
pub fn quote(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped.push('"');
    escaped
}

/// Physical column reference, quoting names that are not plain identifiers.
pub fn column_sql(column: &str) -> String {
    let plain = column
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        format!("${{TABLE}}.{}", column)
    } else {
        format!("${{TABLE}}.\"{}\"", column.replace('"', "\"\""))
    }
}
