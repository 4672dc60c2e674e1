//! Parsers for CREATE STREAM/TABLE [AS SELECT], INSERT INTO and DROP.

use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use super::query_parser::parse_select;
use super::statements::{
    normalize_ident, ColumnDefinition, CreateAsSelectStatement, CreateSourceStatement,
    DropSourceStatement, InsertIntoStatement, SourceKind, Statement,
};
use super::tokenizer::{expect_custom_keyword, parse_with_properties, try_parse_custom_keyword};
use super::{expect_end, ParseError};
use crate::types::sql_type_to_arrow;

/// Parse `CREATE (STREAM | TABLE) name [(col type, ...)] [WITH (...)] [AS SELECT ...]`.
///
/// # Errors
///
/// Returns `ParseError` on malformed syntax, unsupported column types or a
/// column list combined with `AS SELECT`.
pub fn parse_create(parser: &mut Parser) -> Result<Statement, ParseError> {
    parser
        .expect_keyword(Keyword::CREATE)
        .map_err(ParseError::SqlParseError)?;
    let kind = parse_source_kind(parser)?;
    let name = normalize_ident(&parser.parse_identifier().map_err(ParseError::SqlParseError)?);

    let columns = if parser.consume_token(&Token::LParen) {
        parse_columns(parser)?
    } else {
        Vec::new()
    };

    let properties = parse_with_properties(parser)?;

    if parser.parse_keyword(Keyword::AS) {
        if !columns.is_empty() {
            return Err(ParseError::SyntaxError(format!(
                "CREATE {kind} AS SELECT cannot declare a column list"
            )));
        }
        let query = parse_select(parser)?;
        expect_end(parser)?;
        return Ok(Statement::CreateAsSelect(Box::new(CreateAsSelectStatement {
            kind,
            name,
            properties,
            query,
        })));
    }

    expect_end(parser)?;
    Ok(Statement::CreateSource(Box::new(CreateSourceStatement {
        kind,
        name,
        columns,
        properties,
    })))
}

/// Parse `INSERT INTO name SELECT ...`.
///
/// # Errors
///
/// Returns `ParseError` on malformed syntax.
pub fn parse_insert_into(parser: &mut Parser) -> Result<Statement, ParseError> {
    parser
        .expect_keywords(&[Keyword::INSERT, Keyword::INTO])
        .map_err(ParseError::SqlParseError)?;
    let target = normalize_ident(&parser.parse_identifier().map_err(ParseError::SqlParseError)?);
    let query = parse_select(parser)?;
    expect_end(parser)?;
    Ok(Statement::InsertInto(Box::new(InsertIntoStatement {
        target,
        query,
    })))
}

/// Parse `DROP (STREAM | TABLE) [IF EXISTS] name [DELETE TOPIC]`.
///
/// # Errors
///
/// Returns `ParseError` on malformed syntax.
pub fn parse_drop(parser: &mut Parser) -> Result<Statement, ParseError> {
    parser
        .expect_keyword(Keyword::DROP)
        .map_err(ParseError::SqlParseError)?;
    let kind = parse_source_kind(parser)?;
    let if_exists = parser.parse_keywords(&[Keyword::IF, Keyword::EXISTS]);
    let name = normalize_ident(&parser.parse_identifier().map_err(ParseError::SqlParseError)?);

    let delete_topic = if try_parse_custom_keyword(parser, "DELETE") {
        expect_custom_keyword(parser, "TOPIC")?;
        true
    } else {
        false
    };

    expect_end(parser)?;
    Ok(Statement::DropSource(DropSourceStatement {
        kind,
        name,
        if_exists,
        delete_topic,
    }))
}

fn parse_source_kind(parser: &mut Parser) -> Result<SourceKind, ParseError> {
    if try_parse_custom_keyword(parser, "STREAM") {
        Ok(SourceKind::Stream)
    } else {
        expect_custom_keyword(parser, "TABLE")?;
        Ok(SourceKind::Table)
    }
}

/// Parse `col type, ...)` after the opening parenthesis.
fn parse_columns(parser: &mut Parser) -> Result<Vec<ColumnDefinition>, ParseError> {
    let mut columns: Vec<ColumnDefinition> = Vec::new();
    loop {
        if parser.consume_token(&Token::RParen) {
            break;
        }
        let def = parser.parse_column_def().map_err(ParseError::SqlParseError)?;
        let name = normalize_ident(&def.name);
        if columns.iter().any(|c| c.name == name) {
            return Err(ParseError::SyntaxError(format!(
                "Duplicate column name: {name}"
            )));
        }
        columns.push(ColumnDefinition::new(name, sql_type_to_arrow(&def.data_type)?));

        if !parser.consume_token(&Token::Comma) {
            parser
                .expect_token(&Token::RParen)
                .map_err(ParseError::SqlParseError)?;
            break;
        }
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;
    use sqlparser::dialect::GenericDialect;

    fn parser_for(sql: &str) -> Parser<'static> {
        static DIALECT: GenericDialect = GenericDialect {};
        Parser::new(&DIALECT).try_with_sql(sql).unwrap()
    }

    #[test]
    fn test_parse_create_stream() {
        let mut parser = parser_for(
            "CREATE STREAM s1 (col1 BIGINT, \"Col2\" VARCHAR) WITH (kafka_topic = 'in', value_format = 'JSON')",
        );
        let Statement::CreateSource(stmt) = parse_create(&mut parser).unwrap() else {
            panic!("expected CREATE STREAM");
        };
        assert_eq!(stmt.kind, SourceKind::Stream);
        assert_eq!(stmt.name, "S1");
        assert_eq!(stmt.columns[0], ColumnDefinition::new("COL1", DataType::Int64));
        assert_eq!(stmt.columns[1], ColumnDefinition::new("Col2", DataType::Utf8));
        assert_eq!(stmt.properties.kafka_topic(), Some("in"));
    }

    #[test]
    fn test_parse_create_table_as_select() {
        let mut parser = parser_for("create table bar with (partitions = 2) as select * from test2");
        let Statement::CreateAsSelect(stmt) = parse_create(&mut parser).unwrap() else {
            panic!("expected CTAS");
        };
        assert_eq!(stmt.kind, SourceKind::Table);
        assert_eq!(stmt.name, "BAR");
        assert_eq!(stmt.properties.partitions().unwrap(), Some(2));
        assert_eq!(stmt.query.relations[0].name, "TEST2");
    }

    #[test]
    fn test_parse_create_without_columns() {
        let mut parser = parser_for("CREATE STREAM s WITH (kafka_topic='t', value_format='AVRO')");
        let Statement::CreateSource(stmt) = parse_create(&mut parser).unwrap() else {
            panic!("expected CREATE STREAM");
        };
        assert!(stmt.columns.is_empty());
    }

    #[test]
    fn test_parse_create_rejects_duplicate_columns() {
        let mut parser = parser_for("CREATE STREAM s (a INT, A BIGINT)");
        assert!(parse_create(&mut parser).is_err());
    }

    #[test]
    fn test_parse_insert_into() {
        let mut parser = parser_for("insert into bar select * from orders");
        let Statement::InsertInto(stmt) = parse_insert_into(&mut parser).unwrap() else {
            panic!("expected INSERT INTO");
        };
        assert_eq!(stmt.target, "BAR");
        assert_eq!(stmt.query.relations[0].name, "ORDERS");
    }

    #[test]
    fn test_parse_drop_variants() {
        let mut parser = parser_for("DROP STREAM IF EXISTS bar DELETE TOPIC");
        assert_eq!(
            parse_drop(&mut parser).unwrap(),
            Statement::DropSource(DropSourceStatement {
                kind: SourceKind::Stream,
                name: "BAR".to_string(),
                if_exists: true,
                delete_topic: true,
            })
        );

        let mut parser = parser_for("drop table foo");
        let Statement::DropSource(stmt) = parse_drop(&mut parser).unwrap() else {
            panic!("expected DROP");
        };
        assert_eq!(stmt.kind, SourceKind::Table);
        assert!(!stmt.if_exists);
        assert!(!stmt.delete_topic);
    }

    #[test]
    fn test_parse_drop_rejects_trailing_tokens() {
        let mut parser = parser_for("DROP TABLE foo DELETE");
        assert!(parse_drop(&mut parser).is_err());
    }
}
