//! Token-level helpers: statement classification, custom keywords and
//! `WITH (...)` option parsing.

use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, TokenWithSpan, Word};

use super::statements::{SourceKind, SourceProperties};
use super::ParseError;

/// The statement shape detected from the leading tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// CREATE STREAM / CREATE TABLE (with or without AS SELECT)
    Create(SourceKind),
    /// INSERT INTO
    InsertInto,
    /// SELECT
    Select,
    /// DROP STREAM / DROP TABLE
    Drop(SourceKind),
    /// TERMINATE
    Terminate,
    /// SET
    Set,
    /// UNSET
    Unset,
    /// SHOW / LIST
    Show,
    /// DESCRIBE
    Describe,
    /// EXPLAIN
    Explain,
    /// Not a recognized statement.
    Unknown,
}

/// Detect which statement the token stream represents.
///
/// Whitespace and comments are skipped; only the first two significant
/// tokens are examined.
pub fn detect_statement_kind(tokens: &[TokenWithSpan]) -> StatementKind {
    let significant: Vec<&TokenWithSpan> = tokens
        .iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
        .collect();

    let Some(first) = significant.first() else {
        return StatementKind::Unknown;
    };
    let second = significant.get(1).map(|t| &t.token);

    match &first.token {
        Token::Word(Word {
            keyword: Keyword::CREATE,
            ..
        }) => source_kind(second).map_or(StatementKind::Unknown, StatementKind::Create),
        Token::Word(Word {
            keyword: Keyword::DROP,
            ..
        }) => source_kind(second).map_or(StatementKind::Unknown, StatementKind::Drop),
        Token::Word(Word {
            keyword: Keyword::INSERT,
            ..
        }) => StatementKind::InsertInto,
        Token::Word(Word {
            keyword: Keyword::SELECT,
            ..
        }) => StatementKind::Select,
        Token::Word(Word {
            keyword: Keyword::SET,
            ..
        }) => StatementKind::Set,
        Token::Word(Word {
            keyword: Keyword::EXPLAIN,
            ..
        }) => StatementKind::Explain,
        Token::Word(
            Word {
                keyword: Keyword::DESCRIBE,
                ..
            }
            | Word {
                keyword: Keyword::DESC,
                ..
            },
        ) => StatementKind::Describe,
        Token::Word(w) if is_word_ci(w, "TERMINATE") => StatementKind::Terminate,
        Token::Word(w) if is_word_ci(w, "UNSET") => StatementKind::Unset,
        Token::Word(w) if is_word_ci(w, "SHOW") || is_word_ci(w, "LIST") => StatementKind::Show,
        _ => StatementKind::Unknown,
    }
}

fn source_kind(token: Option<&Token>) -> Option<SourceKind> {
    match token {
        Some(Token::Word(w)) if is_word_ci(w, "STREAM") => Some(SourceKind::Stream),
        Some(Token::Word(w)) if is_word_ci(w, "TABLE") => Some(SourceKind::Table),
        _ => None,
    }
}

/// Check if a Word matches a keyword string (case-insensitive).
fn is_word_ci(word: &Word, keyword: &str) -> bool {
    word.value.eq_ignore_ascii_case(keyword)
}

/// Try to consume a keyword by its text, whether or not sqlparser knows it.
///
/// Returns `true` and consumes the token if the next token is a word matching
/// `keyword` (case-insensitive). Otherwise nothing is consumed.
pub fn try_parse_custom_keyword(parser: &mut Parser, keyword: &str) -> bool {
    let token = parser.peek_token();
    if let Token::Word(w) = &token.token {
        if is_word_ci(w, keyword) {
            parser.next_token();
            return true;
        }
    }
    false
}

/// Consume a keyword by its text, returning an error if it is not next.
///
/// # Errors
///
/// Returns `ParseError::SyntaxError` if the next token is not a word
/// matching `keyword`.
pub fn expect_custom_keyword(parser: &mut Parser, keyword: &str) -> Result<(), ParseError> {
    if try_parse_custom_keyword(parser, keyword) {
        Ok(())
    } else {
        let actual = parser.peek_token();
        Err(ParseError::SyntaxError(format!(
            "Expected {keyword}, found {actual}"
        )))
    }
}

/// Parse `WITH (key = value, ...)` properties.
///
/// Returns an empty set if no WITH clause is present. Keys are upper-cased;
/// values keep their case.
///
/// # Errors
///
/// Returns `ParseError` if the WITH clause syntax is invalid.
pub fn parse_with_properties(parser: &mut Parser) -> Result<SourceProperties, ParseError> {
    let mut properties = SourceProperties::new();

    if !parser.parse_keyword(Keyword::WITH) {
        return Ok(properties);
    }

    parser
        .expect_token(&Token::LParen)
        .map_err(ParseError::SqlParseError)?;

    loop {
        if parser.consume_token(&Token::RParen) {
            break;
        }

        let key = parse_option_string(parser)?;
        parser
            .expect_token(&Token::Eq)
            .map_err(ParseError::SqlParseError)?;
        let value = parse_option_string(parser)?;

        properties.insert(key, value);

        if !parser.consume_token(&Token::Comma) {
            parser
                .expect_token(&Token::RParen)
                .map_err(ParseError::SqlParseError)?;
            break;
        }
    }

    Ok(properties)
}

/// Parse a single-quoted, double-quoted or bare string, or a number.
pub(crate) fn parse_option_string(parser: &mut Parser) -> Result<String, ParseError> {
    let token = parser.next_token();
    match token.token {
        Token::SingleQuotedString(s) | Token::DoubleQuotedString(s) => Ok(s),
        Token::Word(w) => Ok(w.value),
        Token::Number(n, _) => Ok(n),
        other => Err(ParseError::SyntaxError(format!(
            "Expected string or identifier, found {other}"
        ))),
    }
}
