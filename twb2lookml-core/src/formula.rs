//! Tableau calculation formulas.
//!
//! The tokenizer is shared by the parser, which only needs the analysis
//! (LOD count, aggregation functions, unsupported constructs), and by the
//! emitter, which translates supported formulas into LookML SQL.

use std::collections::BTreeSet;
use thiserror::Error;

/// Lexical token of a calculation formula. Whitespace and comments are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `[Field Name]`, brackets removed and `]]` unescaped.
    Field(String),
    /// String literal content, quotes removed.
    Str(String),
    /// `#2024-01-31#` literal content.
    DateLit(String),
    Number(String),
    /// Function name or keyword, original case.
    Ident(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Op(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("unterminated {kind} starting at offset {position}")]
    Unterminated { kind: &'static str, position: usize },

    #[error("unexpected character '{ch}' at offset {position}")]
    UnexpectedChar { ch: char, position: usize },
}

/// Tokenize a formula.
pub fn tokenize(formula: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<(usize, char)> = formula.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let at = |i: usize| chars.get(i).map(|(_, c)| *c);

    while i < chars.len() {
        let (position, c) = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '/' if at(i + 1) == Some('/') => {
                while i < chars.len() && chars[i].1 != '\n' {
                    i += 1;
                }
            }
            '/' if at(i + 1) == Some('*') => {
                i += 2;
                loop {
                    match (at(i), at(i + 1)) {
                        (Some('*'), Some('/')) => {
                            i += 2;
                            break;
                        }
                        (Some(_), _) => i += 1,
                        (None, _) => {
                            return Err(FormulaError::Unterminated {
                                kind: "comment",
                                position,
                            })
                        }
                    }
                }
            }
            '[' => {
                let mut name = String::new();
                i += 1;
                loop {
                    match at(i) {
                        Some(']') if at(i + 1) == Some(']') => {
                            name.push(']');
                            i += 2;
                        }
                        Some(']') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            name.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(FormulaError::Unterminated {
                                kind: "field reference",
                                position,
                            })
                        }
                    }
                }
                tokens.push(Token::Field(name));
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match at(i) {
                        Some(ch) if ch == quote && at(i + 1) == Some(quote) => {
                            text.push(quote);
                            i += 2;
                        }
                        Some(ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(FormulaError::Unterminated {
                                kind: "string literal",
                                position,
                            })
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '#' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match at(i) {
                        Some('#') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(FormulaError::Unterminated {
                                kind: "date literal",
                                position,
                            })
                        }
                    }
                }
                tokens.push(Token::DateLit(text.trim().to_string()));
            }
            _ if c.is_ascii_digit()
                || (c == '.' && at(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let mut text = String::new();
                while let Some(ch) = at(i) {
                    if ch.is_ascii_digit() || ch == '.' {
                        text.push(ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(text));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(ch) = at(i) {
                    if ch.is_alphanumeric() || ch == '_' {
                        text.push(ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(text));
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = at(i + 1);
                let op = match (c, next) {
                    ('=', Some('=')) | ('!', Some('=')) | ('<', Some('=')) | ('>', Some('='))
                    | ('<', Some('>')) => {
                        i += 2;
                        format!("{}{}", c, next.unwrap_or_default())
                    }
                    ('!', _) => return Err(FormulaError::UnexpectedChar { ch: c, position }),
                    _ => {
                        i += 1;
                        c.to_string()
                    }
                };
                tokens.push(Token::Op(op));
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c.to_string()));
                i += 1;
            }
            _ => return Err(FormulaError::UnexpectedChar { ch: c, position }),
        }
    }

    Ok(tokens)
}

// ── Vocabulary ──

/// Aggregation functions, including those outside the translation set.
const AGGREGATIONS: &[&str] = &[
    "SUM", "AVG", "MIN", "MAX", "COUNT", "COUNTD", "MEDIAN", "STDEV", "STDEVP", "VAR", "VARP",
    "ATTR", "PERCENTILE",
];

/// Functions the emitter can translate.
pub(crate) const SUPPORTED_FUNCTIONS: &[&str] = &[
    "SUM", "AVG", "MIN", "MAX", "COUNT", "COUNTD", "MEDIAN", "STDEV", "VAR", "ZN", "IFNULL",
    "ISNULL", "ABS", "ROUND", "CEILING", "FLOOR", "SQRT", "POWER", "EXP", "LN", "LOG", "SIGN",
    "UPPER", "LOWER", "TRIM", "LTRIM", "RTRIM", "REPLACE", "LEFT", "RIGHT", "LEN", "MID", "INT",
    "FLOAT", "STR", "DATE", "DATETIME", "YEAR", "QUARTER", "MONTH", "DAY", "TODAY", "NOW",
];

/// Bare words the emitter can translate.
pub(crate) const KEYWORDS: &[&str] = &[
    "IF", "THEN", "ELSEIF", "ELSE", "END", "CASE", "WHEN", "AND", "OR", "NOT", "TRUE", "FALSE",
    "NULL", "IN",
];

const TABLE_CALCULATIONS: &[&str] = &[
    "LOOKUP", "PREVIOUS_VALUE", "INDEX", "FIRST", "LAST", "SIZE", "TOTAL",
];

const LOD_KEYWORDS: &[&str] = &["FIXED", "INCLUDE", "EXCLUDE"];

fn contains(list: &[&str], upper: &str) -> bool {
    list.iter().any(|w| *w == upper)
}

fn classify_function(upper: &str) -> Option<String> {
    if contains(SUPPORTED_FUNCTIONS, upper) {
        None
    } else if upper.starts_with("WINDOW_")
        || upper.starts_with("RUNNING_")
        || upper.starts_with("RANK")
        || contains(TABLE_CALCULATIONS, upper)
    {
        Some(format!("table calculation {}", upper))
    } else if upper.starts_with("SCRIPT_") {
        Some(format!("script function {}", upper))
    } else if upper.starts_with("RAWSQL") {
        Some(format!("RAWSQL passthrough {}", upper))
    } else if upper == "ATTR" {
        Some("ATTR aggregation".to_string())
    } else {
        Some(format!("function {}", upper))
    }
}

// ── Analysis ──

/// What a formula contains, as far as scoring and translation care.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormulaAnalysis {
    pub lod_count: u32,
    /// Distinct aggregation functions, upper-cased, in first-use order.
    pub aggregations: Vec<String>,
    /// Unsupported constructs, deduplicated, in first-use order.
    pub unsupported: Vec<String>,
    /// Field names referenced directly (not via `[source].[field]`).
    pub field_refs: Vec<String>,
}

impl FormulaAnalysis {
    fn note_unsupported(&mut self, what: String) {
        if !self.unsupported.contains(&what) {
            self.unsupported.push(what);
        }
    }
}

/// Analyze a formula. Tokenization failures are reported as one
/// unsupported construct rather than an error.
pub fn analyze(formula: &str) -> FormulaAnalysis {
    let mut analysis = FormulaAnalysis::default();
    let tokens = match tokenize(formula) {
        Ok(tokens) => tokens,
        Err(err) => {
            analysis.note_unsupported(format!("malformed formula ({})", err));
            return analysis;
        }
    };

    let mut seen_aggs = BTreeSet::new();
    let mut seen_fields = BTreeSet::new();

    for (idx, token) in tokens.iter().enumerate() {
        let next = tokens.get(idx + 1);
        let prev = idx.checked_sub(1).and_then(|p| tokens.get(p));
        match token {
            Token::LBrace => {
                analysis.lod_count += 1;
                let kind = match next {
                    Some(Token::Ident(word)) if contains(LOD_KEYWORDS, &word.to_uppercase()) => {
                        word.to_uppercase()
                    }
                    _ => "table-scoped".to_string(),
                };
                analysis.note_unsupported(format!("LOD expression {}", kind));
            }
            Token::Ident(word) => {
                let upper = word.to_uppercase();
                if matches!(next, Some(Token::LParen)) && !contains(KEYWORDS, &upper) {
                    if contains(AGGREGATIONS, &upper) && seen_aggs.insert(upper.clone()) {
                        analysis.aggregations.push(upper.clone());
                    }
                    if let Some(reason) = classify_function(&upper) {
                        analysis.note_unsupported(reason);
                    }
                } else if !contains(KEYWORDS, &upper)
                    && !(contains(LOD_KEYWORDS, &upper) && matches!(prev, Some(Token::LBrace)))
                {
                    analysis.note_unsupported(format!("identifier {}", word));
                }
            }
            Token::Field(name) => {
                if matches!(next, Some(Token::Dot)) {
                    let target = match tokens.get(idx + 2) {
                        Some(Token::Field(f)) => f.as_str(),
                        _ => "",
                    };
                    if name == "Parameters" {
                        analysis.note_unsupported(format!("parameter reference [{}]", target));
                    } else {
                        analysis.note_unsupported(format!(
                            "cross-source reference [{}].[{}]",
                            name, target
                        ));
                    }
                } else if !matches!(prev, Some(Token::Dot)) && seen_fields.insert(name.clone()) {
                    analysis.field_refs.push(name.clone());
                }
            }
            Token::Op(op) if op == "^" || op == "%" => {
                analysis.note_unsupported(format!("operator {}", op));
            }
            _ => {}
        }
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_fields_literals_and_comments() {
        let tokens = tokenize("SUM([Sales]]x]) // trailing\n + #2024-01-31# + 'it''s' /* c */ >= 1.5").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("SUM".into()),
                Token::LParen,
                Token::Field("Sales]x".into()),
                Token::RParen,
                Token::Op("+".into()),
                Token::DateLit("2024-01-31".into()),
                Token::Op("+".into()),
                Token::Str("it's".into()),
                Token::Op(">=".into()),
                Token::Number("1.5".into()),
            ]
        );
    }

    #[test]
    fn tokenize_reports_unterminated() {
        assert!(matches!(
            tokenize("[Sales"),
            Err(FormulaError::Unterminated { kind: "field reference", .. })
        ));
        assert!(matches!(
            tokenize("\"abc"),
            Err(FormulaError::Unterminated { kind: "string literal", .. })
        ));
    }

    #[test]
    fn analyze_simple_ratio() {
        let a = analyze("SUM([Profit]) / SUM([Sales])");
        assert_eq!(a.lod_count, 0);
        assert_eq!(a.aggregations, vec!["SUM"]);
        assert!(a.unsupported.is_empty());
        assert_eq!(a.field_refs, vec!["Profit", "Sales"]);
    }

    #[test]
    fn analyze_lod_and_table_calcs() {
        let a = analyze("{FIXED [Region] : SUM([Sales])} / WINDOW_SUM(SUM([Sales]))");
        assert_eq!(a.lod_count, 1);
        assert!(a.unsupported.contains(&"LOD expression FIXED".to_string()));
        assert!(a.unsupported.contains(&"table calculation WINDOW_SUM".to_string()));
        assert_eq!(a.aggregations, vec!["SUM"]);
    }

    #[test]
    fn analyze_counts_each_lod() {
        let a = analyze("{ INCLUDE [a] : MAX([b]) } + {EXCLUDE [c] : MIN([d])} + {SUM([e])}");
        assert_eq!(a.lod_count, 3);
        assert!(a.unsupported.contains(&"LOD expression table-scoped".to_string()));
    }

    #[test]
    fn analyze_parameters_and_unknowns() {
        let a = analyze("IF [Sales] > [Parameters].[Target] THEN 'hit' ELSE MAKEPOINT(1, 2) END");
        assert!(a.unsupported.contains(&"parameter reference [Target]".to_string()));
        assert!(a.unsupported.contains(&"function MAKEPOINT".to_string()));
        assert_eq!(a.field_refs, vec!["Sales"]);
    }

    #[test]
    fn analyze_supported_conditional() {
        let a = analyze("IF ISNULL([Discount]) THEN 0 ELSEIF [Discount] > 0.5 THEN 1 ELSE ZN([Discount]) END");
        assert!(a.unsupported.is_empty(), "{:?}", a.unsupported);
        assert!(a.aggregations.is_empty());

        let a = analyze("[Region] IN ('East', 'West') AND NOT([Returned])");
        assert!(a.unsupported.is_empty(), "{:?}", a.unsupported);
    }

    #[test]
    fn analyze_malformed_is_unsupported() {
        let a = analyze("SUM([Sales]");
        assert!(a.unsupported.is_empty());
        let a = analyze("SUM('open");
        assert_eq!(a.unsupported.len(), 1);
        assert!(a.unsupported[0].starts_with("malformed formula"));
    }
}
