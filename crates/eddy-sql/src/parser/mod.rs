//! Statement parser.
//!
//! A script is split on unquoted semicolons, each piece is classified from
//! its leading tokens, and a dedicated parser builds the [`Statement`].
//! Parsing is purely syntactic: nothing here looks at the catalog.

use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;

pub mod command_parser;
pub mod ddl_parser;
pub mod query_parser;
pub mod splitter;
pub mod statements;
pub mod tokenizer;

pub use statements::{
    normalize_ident, AliasedRelation, ColumnDefinition, CreateAsSelectStatement,
    CreateSourceStatement, DropSourceStatement, InsertIntoStatement, ParsedStatement,
    SelectStatement, ShowTarget, SourceKind, SourceProperties, Statement, ValueFormat,
};
pub use tokenizer::StatementKind;

/// Parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Error from the underlying SQL parser.
    #[error("SQL parse error: {0}")]
    SqlParseError(#[from] ParserError),

    /// Statement-level syntax error.
    #[error("{0}")]
    SyntaxError(String),

    /// A statement of a script failed to parse.
    #[error("{source}\nStatement: {statement_text}")]
    Statement {
        /// Text of the failing statement.
        statement_text: String,
        /// Underlying error.
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    /// Text of the statement that failed, when known.
    #[must_use]
    pub fn statement_text(&self) -> Option<&str> {
        match self {
            ParseError::Statement { statement_text, .. } => Some(statement_text),
            _ => None,
        }
    }

    /// The error message without the statement text.
    #[must_use]
    pub fn raw_message(&self) -> String {
        match self {
            ParseError::Statement { source, .. } => source.raw_message(),
            other => other.to_string(),
        }
    }
}

/// Parse a script of semicolon-separated statements.
///
/// Each returned statement keeps its exact text. The first statement that
/// fails aborts parsing.
///
/// # Errors
///
/// Returns `ParseError::Statement` naming the failing statement, or
/// `ParseError::SqlParseError` if the script cannot be tokenized.
pub fn parse_statements(sql: &str) -> Result<Vec<ParsedStatement>, ParseError> {
    splitter::split_statements(sql)?
        .into_iter()
        .map(|slice| {
            let statement = parse_single(slice.body, &slice.tokens).map_err(|source| {
                ParseError::Statement {
                    statement_text: slice.text.to_string(),
                    source: Box::new(source),
                }
            })?;
            tracing::trace!(kind = statement.label(), "Parsed statement");
            Ok(ParsedStatement {
                text: slice.text.to_string(),
                statement,
            })
        })
        .collect()
}

/// Parse exactly one statement, without a terminating semicolon.
///
/// # Errors
///
/// Returns `ParseError` if the text is not a single valid statement.
pub fn parse_statement(sql: &str) -> Result<Statement, ParseError> {
    let mut parsed = parse_statements(sql)?;
    match (parsed.pop(), parsed.is_empty()) {
        (Some(stmt), true) => Ok(stmt.statement),
        (None, _) => Err(ParseError::SyntaxError("Empty statement".to_string())),
        (Some(_), false) => Err(ParseError::SyntaxError(
            "Expected a single statement".to_string(),
        )),
    }
}

fn parse_single(
    body: &str,
    tokens: &[sqlparser::tokenizer::TokenWithSpan],
) -> Result<Statement, ParseError> {
    let kind = tokenizer::detect_statement_kind(tokens);
    if kind == StatementKind::Explain {
        return command_parser::parse_explain(body);
    }

    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect).try_with_sql(body)?;

    match kind {
        StatementKind::Create(_) => ddl_parser::parse_create(&mut parser),
        StatementKind::Drop(_) => ddl_parser::parse_drop(&mut parser),
        StatementKind::InsertInto => ddl_parser::parse_insert_into(&mut parser),
        StatementKind::Select => {
            let query = query_parser::parse_select(&mut parser)?;
            expect_end(&mut parser)?;
            Ok(Statement::Query(Box::new(query)))
        }
        StatementKind::Terminate => command_parser::parse_terminate(&mut parser),
        StatementKind::Set => command_parser::parse_set(&mut parser),
        StatementKind::Unset => command_parser::parse_unset(&mut parser),
        StatementKind::Show => command_parser::parse_show(&mut parser),
        StatementKind::Describe => command_parser::parse_describe(&mut parser),
        StatementKind::Explain | StatementKind::Unknown => {
            let first = body.split_whitespace().next().unwrap_or_default();
            Err(ParseError::SyntaxError(format!(
                "Unsupported statement starting with '{first}'"
            )))
        }
    }
}

/// Fail unless the parser is at the end of the statement.
pub(crate) fn expect_end(parser: &mut Parser) -> Result<(), ParseError> {
    let next = parser.peek_token();
    if next.token == Token::EOF {
        Ok(())
    } else {
        Err(ParseError::SyntaxError(format!(
            "Unexpected input after end of statement: {next}"
        )))
    }
}
