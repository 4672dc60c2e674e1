//! Parsers for session and administrative commands.

use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use super::statements::{normalize_ident, ShowTarget, Statement};
use super::tokenizer::{
    expect_custom_keyword, parse_option_string, try_parse_custom_keyword,
};
use super::{expect_end, ParseError};

/// Parse `TERMINATE query_id`.
///
/// # Errors
///
/// Returns `ParseError` if no query id follows.
pub fn parse_terminate(parser: &mut Parser) -> Result<Statement, ParseError> {
    expect_custom_keyword(parser, "TERMINATE")?;
    let query_id = normalize_ident(&parser.parse_identifier().map_err(ParseError::SqlParseError)?);
    expect_end(parser)?;
    Ok(Statement::TerminateQuery { query_id })
}

/// Parse `SET 'name' [= | TO] 'value'`.
///
/// # Errors
///
/// Returns `ParseError` if the name or value is missing.
pub fn parse_set(parser: &mut Parser) -> Result<Statement, ParseError> {
    parser
        .expect_keyword(Keyword::SET)
        .map_err(ParseError::SqlParseError)?;
    let name = parse_option_string(parser)?;
    if !parser.consume_token(&Token::Eq) {
        let _ = parser.parse_keyword(Keyword::TO);
    }
    let value = parse_option_string(parser)?;
    expect_end(parser)?;
    Ok(Statement::SetProperty { name, value })
}

/// Parse `UNSET 'name'`.
///
/// # Errors
///
/// Returns `ParseError` if the name is missing.
pub fn parse_unset(parser: &mut Parser) -> Result<Statement, ParseError> {
    expect_custom_keyword(parser, "UNSET")?;
    let name = parse_option_string(parser)?;
    expect_end(parser)?;
    Ok(Statement::UnsetProperty { name })
}

/// Parse `SHOW | LIST (STREAMS | TABLES | QUERIES | TOPICS | PROPERTIES)`.
///
/// # Errors
///
/// Returns `ParseError` for an unknown listing target.
pub fn parse_show(parser: &mut Parser) -> Result<Statement, ParseError> {
    if !try_parse_custom_keyword(parser, "SHOW") {
        expect_custom_keyword(parser, "LIST")?;
    }
    let target = [
        ("STREAMS", ShowTarget::Streams),
        ("TABLES", ShowTarget::Tables),
        ("QUERIES", ShowTarget::Queries),
        ("TOPICS", ShowTarget::Topics),
        ("PROPERTIES", ShowTarget::Properties),
    ]
    .into_iter()
    .find_map(|(keyword, target)| try_parse_custom_keyword(parser, keyword).then_some(target))
    .ok_or_else(|| {
        ParseError::SyntaxError(format!(
            "Expected STREAMS, TABLES, QUERIES, TOPICS or PROPERTIES, found {}",
            parser.peek_token()
        ))
    })?;
    expect_end(parser)?;
    Ok(Statement::Show(target))
}

/// Parse `DESCRIBE [EXTENDED] name`.
///
/// # Errors
///
/// Returns `ParseError` if no name follows.
pub fn parse_describe(parser: &mut Parser) -> Result<Statement, ParseError> {
    if !try_parse_custom_keyword(parser, "DESCRIBE") {
        expect_custom_keyword(parser, "DESC")?;
    }
    let extended = try_parse_custom_keyword(parser, "EXTENDED");
    let name = normalize_ident(&parser.parse_identifier().map_err(ParseError::SqlParseError)?);
    expect_end(parser)?;
    Ok(Statement::Describe { name, extended })
}

/// Build an `EXPLAIN` statement from the statement body.
///
/// # Errors
///
/// Returns `ParseError::SyntaxError` if nothing follows EXPLAIN.
pub fn parse_explain(body: &str) -> Result<Statement, ParseError> {
    let target = body
        .get("EXPLAIN".len()..)
        .map(str::trim)
        .unwrap_or_default();
    if target.is_empty() {
        return Err(ParseError::SyntaxError(
            "EXPLAIN requires a query id or statement".to_string(),
        ));
    }
    Ok(Statement::Explain {
        target: target.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;

    fn parser_for(sql: &str) -> Parser<'static> {
        static DIALECT: GenericDialect = GenericDialect {};
        Parser::new(&DIALECT).try_with_sql(sql).unwrap()
    }

    #[test]
    fn test_parse_terminate() {
        let mut parser = parser_for("TERMINATE ctas_bar_0");
        assert_eq!(
            parse_terminate(&mut parser).unwrap(),
            Statement::TerminateQuery {
                query_id: "CTAS_BAR_0".to_string()
            }
        );
    }

    #[test]
    fn test_parse_set_and_unset() {
        let mut parser = parser_for("SET 'auto.offset.reset' = 'earliest'");
        assert_eq!(
            parse_set(&mut parser).unwrap(),
            Statement::SetProperty {
                name: "auto.offset.reset".to_string(),
                value: "earliest".to_string()
            }
        );

        let mut parser = parser_for("UNSET 'auto.offset.reset'");
        assert_eq!(
            parse_unset(&mut parser).unwrap(),
            Statement::UnsetProperty {
                name: "auto.offset.reset".to_string()
            }
        );
    }

    #[test]
    fn test_parse_show_and_list() {
        let mut parser = parser_for("LIST STREAMS");
        assert_eq!(
            parse_show(&mut parser).unwrap(),
            Statement::Show(ShowTarget::Streams)
        );
        let mut parser = parser_for("show queries");
        assert_eq!(
            parse_show(&mut parser).unwrap(),
            Statement::Show(ShowTarget::Queries)
        );
        let mut parser = parser_for("SHOW FUNCTIONS");
        assert!(parse_show(&mut parser).is_err());
    }

    #[test]
    fn test_parse_describe() {
        let mut parser = parser_for("DESCRIBE EXTENDED orders");
        assert_eq!(
            parse_describe(&mut parser).unwrap(),
            Statement::Describe {
                name: "ORDERS".to_string(),
                extended: true
            }
        );
    }

    #[test]
    fn test_parse_explain() {
        assert_eq!(
            parse_explain("EXPLAIN CSAS_FOO_0").unwrap(),
            Statement::Explain {
                target: "CSAS_FOO_0".to_string()
            }
        );
        assert!(parse_explain("EXPLAIN").is_err());
    }
}
