//! Resolves SELECT queries against the metastore.
//!
//! Analysis decides what a query produces: the kind of relation (stream or
//! table) and the schema of its rows. Expressions are only typed, never
//! evaluated.

use std::collections::HashSet;
use std::sync::Arc;

use arrow_schema::{DataType, Field, FieldRef, Schema, SchemaRef};
use eddy_sql::parser::normalize_ident;
use eddy_sql::types::sql_type_to_arrow;
use eddy_sql::{SelectStatement, SourceKind, ValueFormat};
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, SelectItem,
    UnaryOperator, Value,
};

use crate::metastore::MetaStore;

/// Reasons a query cannot be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// A FROM relation names an unknown source.
    #[error("{0} does not exist.")]
    SourceNotFound(String),

    /// A column reference matches no relation.
    #[error("Column {0} cannot be resolved.")]
    UnresolvedColumn(String),

    /// Two result columns share a name.
    #[error("Duplicate column name in query result: {0}")]
    DuplicateColumn(String),

    /// The expression cannot be typed.
    #[error("{0}")]
    Unsupported(String),
}

/// A FROM relation bound to its data source.
#[derive(Debug, Clone)]
pub struct ResolvedRelation {
    /// Source name.
    pub name: String,
    /// Alias used in the query.
    pub alias: String,
    /// Kind of the source.
    pub kind: SourceKind,
    /// Backing topic.
    pub topic: String,
    /// Value format.
    pub value_format: ValueFormat,
    /// Full source schema.
    pub schema: SchemaRef,
}

impl ResolvedRelation {
    fn field(&self, name: &str) -> Option<&FieldRef> {
        self.schema.fields().iter().find(|f| f.name() == name)
    }

    fn value_fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.schema
            .fields()
            .iter()
            .filter(|f| !crate::metastore::is_implicit_column(f.name()))
    }
}

/// What a query reads and produces.
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    /// Relations in FROM order.
    pub relations: Vec<ResolvedRelation>,
    /// Stream or table.
    pub result_kind: SourceKind,
    /// Value columns of the result.
    pub result_schema: SchemaRef,
}

impl QueryAnalysis {
    /// Names of the sources read, without duplicates, in FROM order.
    #[must_use]
    pub fn source_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.relations
            .iter()
            .filter(|r| seen.insert(r.name.clone()))
            .map(|r| r.name.clone())
            .collect()
    }

    /// The leftmost relation.
    #[must_use]
    pub fn left(&self) -> &ResolvedRelation {
        &self.relations[0]
    }
}

/// Analyzes `select` against the current catalog.
///
/// # Errors
///
/// Returns `AnalysisError` if a source or column cannot be resolved.
pub fn analyze(select: &SelectStatement, metastore: &MetaStore) -> Result<QueryAnalysis, AnalysisError> {
    let relations = select
        .relations
        .iter()
        .map(|rel| {
            let source = metastore
                .get_source(&rel.name)
                .ok_or_else(|| AnalysisError::SourceNotFound(rel.name.clone()))?;
            Ok(ResolvedRelation {
                name: source.name.clone(),
                alias: rel.alias.clone(),
                kind: source.kind,
                topic: source.topic.clone(),
                value_format: source.value_format,
                schema: Arc::clone(&source.schema),
            })
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    if relations.is_empty() {
        return Err(AnalysisError::Unsupported(
            "Query must read from at least one source".to_string(),
        ));
    }

    let result_kind = if select.has_group_by {
        SourceKind::Table
    } else if relations.len() == 1 {
        relations[0].kind
    } else if relations.iter().any(|r| r.kind == SourceKind::Stream) {
        SourceKind::Stream
    } else {
        SourceKind::Table
    };

    let scope = Scope {
        relations: &relations,
    };
    if let Some(filter) = &select.select.selection {
        scope.infer_type(filter)?;
    }
    let result_schema = scope.result_schema(&select.select.projection)?;

    Ok(QueryAnalysis {
        relations,
        result_kind,
        result_schema,
    })
}

struct Scope<'a> {
    relations: &'a [ResolvedRelation],
}

impl Scope<'_> {
    fn result_schema(&self, projection: &[SelectItem]) -> Result<SchemaRef, AnalysisError> {
        let prefixed = self.relations.len() > 1;
        let mut fields: Vec<FieldRef> = Vec::new();

        for (index, item) in projection.iter().enumerate() {
            match item {
                SelectItem::Wildcard(_) => {
                    for relation in self.relations {
                        fields.extend(relation_columns(relation, prefixed));
                    }
                }
                SelectItem::QualifiedWildcard(..) => {
                    let rendered = item.to_string();
                    let qualifier = rendered
                        .trim_end_matches('*')
                        .trim_end_matches('.')
                        .trim_matches('"')
                        .to_ascii_uppercase();
                    let relation = self.relation(&qualifier)?;
                    fields.extend(relation_columns(relation, prefixed));
                }
                SelectItem::UnnamedExpr(expr) => {
                    let name = default_column_name(expr, index);
                    fields.push(Arc::new(Field::new(name, self.infer_type(expr)?, true)));
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    fields.push(Arc::new(Field::new(
                        normalize_ident(alias),
                        self.infer_type(expr)?,
                        true,
                    )));
                }
                #[allow(unreachable_patterns)]
                other => {
                    return Err(AnalysisError::Unsupported(format!(
                        "Unsupported select item: {other}"
                    )))
                }
            }
        }

        let mut names = HashSet::new();
        if let Some(duplicate) = fields.iter().find(|f| !names.insert(f.name().clone())) {
            return Err(AnalysisError::DuplicateColumn(duplicate.name().clone()));
        }
        Ok(Arc::new(Schema::new(fields)))
    }

    fn relation(&self, qualifier: &str) -> Result<&ResolvedRelation, AnalysisError> {
        self.relations
            .iter()
            .find(|r| r.alias == qualifier || r.name == qualifier)
            .ok_or_else(|| AnalysisError::SourceNotFound(qualifier.to_string()))
    }

    fn column(&self, name: &str) -> Result<DataType, AnalysisError> {
        self.relations
            .iter()
            .find_map(|r| r.field(name))
            .map(|f| f.data_type().clone())
            .ok_or_else(|| AnalysisError::UnresolvedColumn(name.to_string()))
    }

    fn qualified_column(&self, qualifier: &str, name: &str) -> Result<DataType, AnalysisError> {
        self.relation(qualifier)
            .ok()
            .and_then(|r| r.field(name))
            .map(|f| f.data_type().clone())
            .ok_or_else(|| AnalysisError::UnresolvedColumn(format!("{qualifier}.{name}")))
    }

    fn infer_type(&self, expr: &Expr) -> Result<DataType, AnalysisError> {
        match expr {
            Expr::Identifier(ident) => self.column(&normalize_ident(ident)),
            Expr::CompoundIdentifier(parts) => match parts.as_slice() {
                [qualifier, name] => {
                    self.qualified_column(&normalize_ident(qualifier), &normalize_ident(name))
                }
                _ => Err(AnalysisError::UnresolvedColumn(expr.to_string())),
            },
            Expr::Value(value) => Ok(literal_type(&value.value)),
            Expr::Nested(inner) => self.infer_type(inner),
            Expr::Cast { data_type, .. } => {
                sql_type_to_arrow(data_type).map_err(|e| AnalysisError::Unsupported(e.to_string()))
            }
            Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => {
                    self.infer_type(expr)?;
                    Ok(DataType::Boolean)
                }
                _ => self.infer_type(expr),
            },
            Expr::BinaryOp { left, op, right } => {
                let left = self.infer_type(left)?;
                let right = self.infer_type(right)?;
                Ok(binary_result_type(op, left, right))
            }
            Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
                self.infer_type(inner)?;
                Ok(DataType::Boolean)
            }
            Expr::Between { expr, low, high, .. } => {
                self.infer_type(expr)?;
                self.infer_type(low)?;
                self.infer_type(high)?;
                Ok(DataType::Boolean)
            }
            Expr::InList { expr, list, .. } => {
                self.infer_type(expr)?;
                for item in list {
                    self.infer_type(item)?;
                }
                Ok(DataType::Boolean)
            }
            Expr::Like { expr, .. } | Expr::ILike { expr, .. } => {
                self.infer_type(expr)?;
                Ok(DataType::Boolean)
            }
            Expr::Function(function) => {
                let name = function.name.to_string().to_ascii_uppercase();
                let argument = match &function.args {
                    FunctionArguments::List(list) => list.args.first().and_then(|arg| match arg {
                        FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Some(e),
                        _ => None,
                    }),
                    _ => None,
                };
                let argument_type = argument.map(|e| self.infer_type(e)).transpose()?;
                Ok(function_result_type(&name, argument_type))
            }
            _ => Ok(DataType::Utf8),
        }
    }
}

fn relation_columns(relation: &ResolvedRelation, prefixed: bool) -> Vec<FieldRef> {
    relation
        .value_fields()
        .map(|f| {
            if prefixed {
                Arc::new(Field::new(
                    format!("{}_{}", relation.alias, f.name()),
                    f.data_type().clone(),
                    true,
                ))
            } else {
                Arc::clone(f)
            }
        })
        .collect()
}

fn default_column_name(expr: &Expr, index: usize) -> String {
    match expr {
        Expr::Identifier(ident) => normalize_ident(ident),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map_or_else(|| format!("KSQL_COL_{index}"), normalize_ident),
        _ => format!("KSQL_COL_{index}"),
    }
}

fn literal_type(value: &Value) -> DataType {
    match value {
        Value::Number(n, _) if n.contains(['.', 'e', 'E']) => DataType::Float64,
        Value::Number(..) => DataType::Int64,
        Value::Boolean(_) => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

fn binary_result_type(op: &BinaryOperator, left: DataType, right: DataType) -> DataType {
    match op {
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::Lt
        | BinaryOperator::LtEq
        | BinaryOperator::Gt
        | BinaryOperator::GtEq
        | BinaryOperator::And
        | BinaryOperator::Or => DataType::Boolean,
        BinaryOperator::StringConcat => DataType::Utf8,
        _ if left == DataType::Float64 || right == DataType::Float64 => DataType::Float64,
        _ => left,
    }
}

fn function_result_type(name: &str, argument: Option<DataType>) -> DataType {
    match name {
        "COUNT" => DataType::Int64,
        "AVG" => DataType::Float64,
        "SUM" | "MIN" | "MAX" | "TOPK" | "ABS" | "CEIL" | "FLOOR" | "ROUND" => {
            argument.unwrap_or(DataType::Float64)
        }
        "LEN" | "LENGTH" => DataType::Int32,
        "TIMESTAMPTOSTRING" | "UCASE" | "LCASE" | "CONCAT" | "SUBSTRING" | "TRIM" => {
            DataType::Utf8
        }
        "STRINGTOTIMESTAMP" => DataType::Int64,
        _ => argument.unwrap_or(DataType::Utf8),
    }
}
