//! Splits a script into statement texts on unquoted semicolons.

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};

use super::ParseError;

/// One statement of a script: its exact text and its tokens.
#[derive(Debug, Clone)]
pub struct StatementSlice<'a> {
    /// Text from the first significant token up to and including the `;`
    /// (or the end of input for a trailing statement without one).
    pub text: &'a str,
    /// Body text without the terminating `;`.
    pub body: &'a str,
    /// Tokens of the body.
    pub tokens: Vec<TokenWithSpan>,
}

/// Byte offset of the start of every line, indexed by 0-based line number.
fn build_line_starts(sql: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in sql.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// Convert a 1-based sqlparser `Location` to a byte offset in `sql`.
///
/// Columns count characters, not bytes.
fn location_to_byte_offset(sql: &str, line_starts: &[usize], location: Location) -> usize {
    let line_idx = usize::try_from(location.line)
        .unwrap_or(1)
        .saturating_sub(1);
    let line_start = line_starts.get(line_idx).copied().unwrap_or(0);
    let col_chars = usize::try_from(location.column)
        .unwrap_or(1)
        .saturating_sub(1);

    sql[line_start..]
        .char_indices()
        .nth(col_chars)
        .map_or(sql.len(), |(byte_off, _)| line_start + byte_off)
}

/// Split `sql` into statements.
///
/// Uses the sqlparser tokenizer so that semicolons inside quoted strings and
/// comments are ignored. Segments holding only whitespace or comments are
/// skipped.
///
/// # Errors
///
/// Returns `ParseError::SqlParseError` if the script cannot be tokenized
/// (for example an unterminated string literal).
pub fn split_statements(sql: &str) -> Result<Vec<StatementSlice<'_>>, ParseError> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| ParseError::SqlParseError(e.into()))?;

    let line_starts = build_line_starts(sql);
    let mut statements = Vec::new();
    let mut current: Vec<TokenWithSpan> = Vec::new();
    let mut start: Option<usize> = None;

    for tws in tokens {
        match tws.token {
            Token::SemiColon => {
                let semi_start = location_to_byte_offset(sql, &line_starts, tws.span.start);
                let semi_end = location_to_byte_offset(sql, &line_starts, tws.span.end);
                if let Some(begin) = start.take() {
                    statements.push(StatementSlice {
                        text: &sql[begin..semi_end],
                        body: sql[begin..semi_start].trim_end(),
                        tokens: std::mem::take(&mut current),
                    });
                }
                current.clear();
            }
            Token::EOF => {}
            Token::Whitespace(_) => {
                if start.is_some() {
                    current.push(tws);
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(location_to_byte_offset(sql, &line_starts, tws.span.start));
                }
                current.push(tws);
            }
        }
    }

    if let Some(begin) = start {
        let text = sql[begin..].trim_end();
        statements.push(StatementSlice {
            text,
            body: text,
            tokens: current,
        });
    }

    Ok(statements)
}
