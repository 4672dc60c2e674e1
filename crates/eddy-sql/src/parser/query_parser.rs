//! SELECT query parsing and relation extraction.

use sqlparser::ast::{GroupByExpr, Query, SetExpr, TableFactor};
use sqlparser::parser::Parser;

use super::statements::{normalize_ident, object_name_to_string, AliasedRelation, SelectStatement};
use super::ParseError;

/// Parse a SELECT query at the parser's current position.
///
/// # Errors
///
/// Returns `ParseError` if the query is malformed or is not a plain SELECT
/// over named relations.
pub fn parse_select(parser: &mut Parser) -> Result<SelectStatement, ParseError> {
    let query = parser.parse_query().map_err(ParseError::SqlParseError)?;
    select_statement_from_query(query)
}

/// Build a [`SelectStatement`] from an already parsed query.
///
/// # Errors
///
/// Returns `ParseError::SyntaxError` for set operations, VALUES bodies,
/// a missing FROM clause, or derived tables and table functions in FROM.
pub fn select_statement_from_query(query: Box<Query>) -> Result<SelectStatement, ParseError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select.clone(),
        other => {
            return Err(ParseError::SyntaxError(format!(
                "Only SELECT queries are supported, found: {other}"
            )))
        }
    };

    if select.from.is_empty() {
        return Err(ParseError::SyntaxError(
            "SELECT must read FROM a stream or table".to_string(),
        ));
    }

    let mut relations = Vec::new();
    for table in &select.from {
        relations.push(extract_relation(&table.relation)?);
        for join in &table.joins {
            relations.push(extract_relation(&join.relation)?);
        }
    }

    let has_group_by = match &select.group_by {
        GroupByExpr::Expressions(exprs, _) => !exprs.is_empty(),
        _ => true,
    };

    Ok(SelectStatement {
        query,
        select,
        relations,
        has_group_by,
    })
}

/// Extract the source name and alias from a table factor.
fn extract_relation(factor: &TableFactor) -> Result<AliasedRelation, ParseError> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let name = object_name_to_string(name);
            let alias = alias
                .as_ref()
                .map_or_else(|| name.clone(), |a| normalize_ident(&a.name));
            Ok(AliasedRelation { name, alias })
        }
        other => Err(ParseError::SyntaxError(format!(
            "Unsupported relation in FROM clause: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;

    fn parse(sql: &str) -> Result<SelectStatement, ParseError> {
        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect).try_with_sql(sql).unwrap();
        parse_select(&mut parser)
    }

    #[test]
    fn test_single_relation_defaults_alias() {
        let stmt = parse("select * from test1").unwrap();
        assert_eq!(
            stmt.relations,
            vec![AliasedRelation {
                name: "TEST1".to_string(),
                alias: "TEST1".to_string()
            }]
        );
        assert!(!stmt.has_group_by);
    }

    #[test]
    fn test_join_relations_in_order() {
        let stmt = parse(
            "SELECT o.orderid, t.col1 FROM orders o JOIN test2 t ON o.itemid = t.col0",
        )
        .unwrap();
        let names: Vec<_> = stmt
            .relations
            .iter()
            .map(|r| (r.name.as_str(), r.alias.as_str()))
            .collect();
        assert_eq!(names, vec![("ORDERS", "O"), ("TEST2", "T")]);
    }

    #[test]
    fn test_group_by_detected() {
        let stmt = parse("SELECT col0, COUNT(*) FROM test1 GROUP BY col0").unwrap();
        assert!(stmt.has_group_by);
    }

    #[test]
    fn test_missing_from_rejected() {
        assert!(parse("SELECT 1").is_err());
    }

    #[test]
    fn test_union_rejected() {
        let err = parse("SELECT * FROM a UNION SELECT * FROM b").unwrap_err();
        assert!(err.to_string().contains("Only SELECT queries"));
    }
}
