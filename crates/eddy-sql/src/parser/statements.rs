//! Statement types produced by the Eddy parser.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use arrow_schema::DataType;
use sqlparser::ast::{Ident, ObjectName, ObjectNamePart, Query, Select};

use super::ParseError;

/// Whether a data source is an unbounded stream of facts or a changelog table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Append-only event stream.
    Stream,
    /// Changelog keyed by `ROWKEY`.
    Table,
}

impl SourceKind {
    /// Upper-case keyword used in statements and messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Stream => "STREAM",
            SourceKind::Table => "TABLE",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialization format of topic message values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueFormat {
    /// JSON objects.
    Json,
    /// Avro records backed by a schema registry subject.
    Avro,
    /// Comma separated values.
    Delimited,
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueFormat::Json => "JSON",
            ValueFormat::Avro => "AVRO",
            ValueFormat::Delimited => "DELIMITED",
        })
    }
}

impl FromStr for ValueFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JSON" => Ok(ValueFormat::Json),
            "AVRO" => Ok(ValueFormat::Avro),
            "DELIMITED" => Ok(ValueFormat::Delimited),
            other => Err(ParseError::SyntaxError(format!(
                "Unsupported value format: {other}"
            ))),
        }
    }
}

/// Property keys understood in a `WITH (...)` clause.
pub mod property {
    /// Backing topic name.
    pub const KAFKA_TOPIC: &str = "KAFKA_TOPIC";
    /// Value serialization format.
    pub const VALUE_FORMAT: &str = "VALUE_FORMAT";
    /// Key column.
    pub const KEY: &str = "KEY";
    /// Column carrying the event timestamp.
    pub const TIMESTAMP: &str = "TIMESTAMP";
    /// Sink topic partition count.
    pub const PARTITIONS: &str = "PARTITIONS";
    /// Sink topic replication factor.
    pub const REPLICAS: &str = "REPLICAS";
}

/// Properties from a `WITH (...)` clause. Keys are stored upper-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceProperties {
    values: BTreeMap<String, String>,
}

impl SourceProperties {
    /// Creates an empty property set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a property, upper-casing the key.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.values
            .insert(key.as_ref().to_ascii_uppercase(), value.into());
    }

    /// Looks up a property by (case-insensitive) key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// The `KAFKA_TOPIC` property.
    #[must_use]
    pub fn kafka_topic(&self) -> Option<&str> {
        self.get(property::KAFKA_TOPIC)
    }

    /// The `KEY` property, upper-cased like any other column name.
    #[must_use]
    pub fn key_field(&self) -> Option<String> {
        self.get(property::KEY).map(str::to_ascii_uppercase)
    }

    /// The `VALUE_FORMAT` property.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::SyntaxError` for an unknown format name.
    pub fn value_format(&self) -> Result<Option<ValueFormat>, ParseError> {
        self.get(property::VALUE_FORMAT)
            .map(ValueFormat::from_str)
            .transpose()
    }

    /// The `PARTITIONS` property.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::SyntaxError` if the value is not a positive integer.
    pub fn partitions(&self) -> Result<Option<u32>, ParseError> {
        self.parse_count(property::PARTITIONS)
    }

    /// The `REPLICAS` property.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::SyntaxError` if the value is not a positive integer.
    pub fn replicas(&self) -> Result<Option<u16>, ParseError> {
        self.parse_count(property::REPLICAS)
    }

    fn parse_count<T: FromStr>(&self, key: &str) -> Result<Option<T>, ParseError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.trim().parse::<T>().map(Some).map_err(|_| {
            ParseError::SyntaxError(format!("Invalid value for {key}: '{raw}'"))
        })
    }

    /// Iterates over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns `true` if no property is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A declared column: upper-cased name and Arrow type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Column type.
    pub data_type: DataType,
}

impl ColumnDefinition {
    /// Creates a column definition.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A relation in a FROM clause together with the alias it is referenced by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasedRelation {
    /// Name of the referenced data source.
    pub name: String,
    /// Alias; defaults to the source name.
    pub alias: String,
}

/// A SELECT query plus the structural facts the engine needs about it.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// The parsed query.
    pub query: Box<Query>,
    /// The query's SELECT body.
    pub select: Box<Select>,
    /// Relations in FROM order: the leftmost first, then joined relations.
    pub relations: Vec<AliasedRelation>,
    /// Whether the query aggregates with GROUP BY.
    pub has_group_by: bool,
}

/// `CREATE STREAM|TABLE name (columns) WITH (...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSourceStatement {
    /// Stream or table.
    pub kind: SourceKind,
    /// Source name.
    pub name: String,
    /// Declared value columns, possibly empty for schema-inferred formats.
    pub columns: Vec<ColumnDefinition>,
    /// WITH clause.
    pub properties: SourceProperties,
}

/// `CREATE STREAM|TABLE name [WITH (...)] AS SELECT ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateAsSelectStatement {
    /// Declared kind of the sink.
    pub kind: SourceKind,
    /// Sink name.
    pub name: String,
    /// WITH clause.
    pub properties: SourceProperties,
    /// The query feeding the sink.
    pub query: SelectStatement,
}

/// `INSERT INTO name SELECT ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertIntoStatement {
    /// Existing target source.
    pub target: String,
    /// The query feeding the target.
    pub query: SelectStatement,
}

/// `DROP STREAM|TABLE [IF EXISTS] name [DELETE TOPIC]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropSourceStatement {
    /// Kind named by the statement.
    pub kind: SourceKind,
    /// Source name.
    pub name: String,
    /// Whether a missing source is tolerated.
    pub if_exists: bool,
    /// Whether the backing topic should be deleted too.
    pub delete_topic: bool,
}

/// Objects listed by `SHOW` / `LIST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowTarget {
    /// `SHOW STREAMS`
    Streams,
    /// `SHOW TABLES`
    Tables,
    /// `SHOW QUERIES`
    Queries,
    /// `SHOW TOPICS`
    Topics,
    /// `SHOW PROPERTIES`
    Properties,
}

/// The closed set of statements the engine understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// CREATE STREAM / CREATE TABLE over an existing topic.
    CreateSource(Box<CreateSourceStatement>),
    /// CREATE STREAM AS SELECT / CREATE TABLE AS SELECT.
    CreateAsSelect(Box<CreateAsSelectStatement>),
    /// INSERT INTO ... SELECT.
    InsertInto(Box<InsertIntoStatement>),
    /// Bare SELECT, run as a transient query.
    Query(Box<SelectStatement>),
    /// DROP STREAM / DROP TABLE.
    DropSource(DropSourceStatement),
    /// TERMINATE query_id.
    TerminateQuery {
        /// Target query id.
        query_id: String,
    },
    /// SET 'name' = 'value'.
    SetProperty {
        /// Property name.
        name: String,
        /// Property value.
        value: String,
    },
    /// UNSET 'name'.
    UnsetProperty {
        /// Property name.
        name: String,
    },
    /// SHOW / LIST.
    Show(ShowTarget),
    /// DESCRIBE [EXTENDED] name.
    Describe {
        /// Source name.
        name: String,
        /// Whether EXTENDED was given.
        extended: bool,
    },
    /// EXPLAIN query_id | statement.
    Explain {
        /// Everything after the EXPLAIN keyword.
        target: String,
    },
}

impl Statement {
    /// Short label used in logs and messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Statement::CreateSource(s) => match s.kind {
                SourceKind::Stream => "CREATE STREAM",
                SourceKind::Table => "CREATE TABLE",
            },
            Statement::CreateAsSelect(s) => match s.kind {
                SourceKind::Stream => "CREATE STREAM AS SELECT",
                SourceKind::Table => "CREATE TABLE AS SELECT",
            },
            Statement::InsertInto(_) => "INSERT INTO",
            Statement::Query(_) => "SELECT",
            Statement::DropSource(s) => match s.kind {
                SourceKind::Stream => "DROP STREAM",
                SourceKind::Table => "DROP TABLE",
            },
            Statement::TerminateQuery { .. } => "TERMINATE",
            Statement::SetProperty { .. } => "SET",
            Statement::UnsetProperty { .. } => "UNSET",
            Statement::Show(_) => "SHOW",
            Statement::Describe { .. } => "DESCRIBE",
            Statement::Explain { .. } => "EXPLAIN",
        }
    }

    /// The SELECT query embedded in this statement, if any.
    #[must_use]
    pub fn select(&self) -> Option<&SelectStatement> {
        match self {
            Statement::CreateAsSelect(s) => Some(&s.query),
            Statement::InsertInto(s) => Some(&s.query),
            Statement::Query(s) => Some(s),
            _ => None,
        }
    }
}

/// A statement together with its exact source text, including the terminating `;`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    /// Statement text as written.
    pub text: String,
    /// Parsed statement.
    pub statement: Statement,
}

/// Normalizes an identifier: unquoted identifiers are upper-cased,
/// quoted ones keep their case.
#[must_use]
pub fn normalize_ident(ident: &Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_ascii_uppercase()
    }
}

/// Normalized name of the last part of an object name (`db.schema.name` -> `NAME`).
#[must_use]
pub fn object_name_to_string(name: &ObjectName) -> String {
    match name.0.last() {
        Some(ObjectNamePart::Identifier(ident)) => normalize_ident(ident),
        #[allow(unreachable_patterns)]
        Some(other) => other.to_string().to_ascii_uppercase(),
        None => String::new(),
    }
}
