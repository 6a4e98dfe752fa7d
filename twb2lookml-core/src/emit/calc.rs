//! Calculated-field translation into LookML SQL.
//!
//! Works token by token. Function calls push their closing text on a stack
//! so rewrites like `ZN(x)` to `COALESCE(x, 0)` compose with nesting.

use super::lookml::embeds_terminator;
use crate::formula::{tokenize, Token, KEYWORDS, SUPPORTED_FUNCTIONS};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationIssue {
    #[error("formula does not tokenize: {0}")]
    Tokenize(String),

    #[error("field [{0}] is not defined in this view")]
    UnresolvedField(String),

    #[error("construct outside the translation set: {0}")]
    Unsupported(String),

    #[error("unbalanced parentheses")]
    Unbalanced,

    #[error("translated SQL contains the LookML terminator ';;'")]
    Terminator,
}

/// How a function call is rewritten.
enum Rewrite {
    /// `NAME(` ... `)`
    Rename(&'static str),
    /// Custom opening and closing text.
    Wrap(&'static str, &'static str),
    /// Zero-argument call replaced by a constant.
    Constant(&'static str),
}

fn rewrite_for(upper: &str) -> Option<Rewrite> {
    use Rewrite::*;
    let rewrite = match upper {
        "COUNTD" => Wrap("COUNT(DISTINCT", ")"),
        "STDEV" => Rename("STDDEV_SAMP"),
        "VAR" => Rename("VAR_SAMP"),
        "ZN" => Wrap("COALESCE(", ", 0)"),
        "IFNULL" => Rename("COALESCE"),
        "ISNULL" => Wrap("(", "IS NULL)"),
        "LEN" => Rename("LENGTH"),
        "MID" => Rename("SUBSTR"),
        "INT" => Wrap("CAST(", "AS INTEGER)"),
        "FLOAT" => Wrap("CAST(", "AS DOUBLE PRECISION)"),
        "STR" => Wrap("CAST(", "AS VARCHAR)"),
        "DATE" => Wrap("CAST(", "AS DATE)"),
        "DATETIME" => Wrap("CAST(", "AS TIMESTAMP)"),
        "YEAR" => Wrap("EXTRACT(YEAR FROM", ")"),
        "QUARTER" => Wrap("EXTRACT(QUARTER FROM", ")"),
        "MONTH" => Wrap("EXTRACT(MONTH FROM", ")"),
        "DAY" => Wrap("EXTRACT(DAY FROM", ")"),
        "TODAY" => Constant("CURRENT_DATE"),
        "NOW" => Constant("CURRENT_TIMESTAMP"),
        "SUM" => Rename("SUM"),
        "AVG" => Rename("AVG"),
        "MIN" => Rename("MIN"),
        "MAX" => Rename("MAX"),
        "COUNT" => Rename("COUNT"),
        "MEDIAN" => Rename("MEDIAN"),
        "ABS" => Rename("ABS"),
        "ROUND" => Rename("ROUND"),
        "CEILING" => Rename("CEILING"),
        "FLOOR" => Rename("FLOOR"),
        "SQRT" => Rename("SQRT"),
        "POWER" => Rename("POWER"),
        "EXP" => Rename("EXP"),
        "LN" => Rename("LN"),
        "LOG" => Rename("LOG"),
        "SIGN" => Rename("SIGN"),
        "UPPER" => Rename("UPPER"),
        "LOWER" => Rename("LOWER"),
        "TRIM" => Rename("TRIM"),
        "LTRIM" => Rename("LTRIM"),
        "RTRIM" => Rename("RTRIM"),
        "REPLACE" => Rename("REPLACE"),
        "LEFT" => Rename("LEFT"),
        "RIGHT" => Rename("RIGHT"),
        _ => return None,
    };
    debug_assert!(SUPPORTED_FUNCTIONS.contains(&upper));
    Some(rewrite)
}

/// Space-aware SQL text builder.
#[derive(Default)]
struct SqlText {
    out: String,
}

impl SqlText {
    fn push(&mut self, piece: &str) {
        let glue = !self.out.is_empty()
            && !self.out.ends_with('(')
            && !self.out.ends_with(' ')
            && !piece.starts_with(')')
            && !piece.starts_with(',');
        if glue {
            self.out.push(' ');
        }
        self.out.push_str(piece);
    }
}

fn sql_string(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Translate `formula`. `resolve` maps a Tableau column name to its LookML
/// SQL reference, or `None` when the view has no such field.
pub fn translate_formula<F>(formula: &str, resolve: F) -> Result<String, TranslationIssue>
where
    F: Fn(&str) -> Option<String>,
{
    let tokens = tokenize(formula).map_err(|e| TranslationIssue::Tokenize(e.to_string()))?;
    let mut sql = SqlText::default();
    let mut closers: Vec<&'static str> = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let next = tokens.get(i + 1);
        match &tokens[i] {
            Token::Ident(word) if matches!(next, Some(Token::LParen)) && !KEYWORDS.contains(&word.to_uppercase().as_str()) => {
                let upper = word.to_uppercase();
                match rewrite_for(&upper) {
                    Some(Rewrite::Rename(name)) => {
                        sql.push(&format!("{}(", name));
                        closers.push(")");
                    }
                    Some(Rewrite::Wrap(open, close)) => {
                        sql.push(open);
                        closers.push(close);
                    }
                    Some(Rewrite::Constant(value)) => {
                        if !matches!(tokens.get(i + 2), Some(Token::RParen)) {
                            return Err(TranslationIssue::Unsupported(format!(
                                "{} with arguments",
                                upper
                            )));
                        }
                        sql.push(value);
                        i += 3;
                        continue;
                    }
                    None => return Err(TranslationIssue::Unsupported(format!("function {}", upper))),
                }
                // Skip the opening parenthesis consumed with the name.
                i += 2;
                continue;
            }
            Token::Ident(word) => {
                let upper = word.to_uppercase();
                match upper.as_str() {
                    "IF" => sql.push("CASE WHEN"),
                    "ELSEIF" => sql.push("WHEN"),
                    _ if KEYWORDS.contains(&upper.as_str()) => sql.push(&upper),
                    _ => return Err(TranslationIssue::Unsupported(format!("identifier {}", word))),
                }
            }
            Token::Field(name) => {
                if matches!(next, Some(Token::Dot)) {
                    return Err(TranslationIssue::Unsupported(format!("qualified reference [{}]", name)));
                }
                let reference =
                    resolve(name).ok_or_else(|| TranslationIssue::UnresolvedField(name.clone()))?;
                sql.push(&reference);
            }
            Token::Str(text) => sql.push(&sql_string(text)),
            Token::DateLit(text) => {
                let keyword = if text.contains(':') { "TIMESTAMP" } else { "DATE" };
                sql.push(&format!("{} {}", keyword, sql_string(text)));
            }
            Token::Number(n) => sql.push(n),
            Token::LParen => {
                sql.push("(");
                closers.push(")");
            }
            Token::RParen => {
                let close = closers.pop().ok_or(TranslationIssue::Unbalanced)?;
                sql.push(close);
            }
            Token::Comma => sql.push(","),
            Token::Op(op) => match op.as_str() {
                "==" => sql.push("="),
                "!=" => sql.push("<>"),
                "^" | "%" => return Err(TranslationIssue::Unsupported(format!("operator {}", op))),
                other => sql.push(other),
            },
            Token::LBrace | Token::RBrace => {
                return Err(TranslationIssue::Unsupported("LOD expression".to_string()))
            }
            Token::Colon | Token::Dot => {
                return Err(TranslationIssue::Unsupported("qualified reference".to_string()))
            }
        }
        i += 1;
    }

    if !closers.is_empty() {
        return Err(TranslationIssue::Unbalanced);
    }
    if embeds_terminator(&sql.out) {
        return Err(TranslationIssue::Terminator);
    }
    Ok(sql.out)
}
