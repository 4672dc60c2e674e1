//! Error types for the execution engine.

use eddy_sql::{ParseError, SourceKind};

use crate::config::ConfigError;
use crate::query_id::QueryId;
use crate::services::ServiceError;

/// Errors raised by the metastore.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetaStoreError {
    /// A source with the same name is already registered.
    #[error("Cannot add the new data source. Another data source with the same name already exists: {kind} name:{name}")]
    DuplicateSource {
        /// Kind of the existing source.
        kind: SourceKind,
        /// Source name.
        name: String,
    },

    /// Queries still read from or write into the source.
    #[error(
        "Cannot drop {name}.\nThe following queries read from this source: [{}].\nThe following queries write into this source: [{}].\nYou need to terminate them before dropping {name}.",
        join_ids(.readers),
        join_ids(.writers)
    )]
    ReferentialIntegrity {
        /// Source name.
        name: String,
        /// Reading queries, in registration order.
        readers: Vec<QueryId>,
        /// Writing queries, in registration order.
        writers: Vec<QueryId>,
    },

    /// No source with this name exists.
    #[error("{0} does not exist.")]
    SourceNotFound(String),
}

fn join_ids(ids: &[QueryId]) -> String {
    ids.iter()
        .map(QueryId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures detected while checking or changing topics and schemas.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExternalResourceError {
    /// A source refers to a topic that does not exist.
    #[error("Kafka topic does not exist: {0}")]
    TopicNotFound(String),

    /// A sink topic exists with another shape.
    #[error(
        "A Kafka topic with the name '{topic}' already exists, with different partition/replica configuration than required. \
         Eddy expects {expected_partitions} partitions (topic has {actual_partitions}), \
         and {expected_replicas} replication factor (topic has {actual_replicas})."
    )]
    TopicConfigMismatch {
        /// Topic name.
        topic: String,
        /// Partitions required by the statement.
        expected_partitions: u32,
        /// Partitions of the existing topic.
        actual_partitions: u32,
        /// Replicas required by the statement.
        expected_replicas: u16,
        /// Replicas of the existing topic.
        actual_replicas: u16,
    },

    /// The schema registry would not accept the derived schema.
    #[error("Cannot register avro schema for {topic} as the schema registry rejected it, (maybe schema evolution issues?)")]
    SchemaRejected {
        /// Sink topic.
        topic: String,
    },

    /// A schema-less AVRO source has no registered value schema.
    #[error("Avro schema for message values on topic {topic} does not exist in the Schema Registry.")]
    SchemaNotFound {
        /// Source topic.
        topic: String,
    },

    /// A collaborator call failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Why a statement was rejected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StatementErrorKind {
    /// The statement is invalid for the current catalog.
    #[error("{0}")]
    Invalid(String),

    /// A referenced source could not be resolved while preparing.
    #[error("Failed to prepare statement: {0}")]
    Prepare(String),

    /// The statement kind cannot be executed by the engine.
    #[error("Statement not executable")]
    NotExecutable,

    /// The engine has been closed.
    #[error("Engine is closed")]
    Closed,

    /// The catalog refused the change.
    #[error(transparent)]
    MetaStore(#[from] MetaStoreError),

    /// A topic or schema check or change failed.
    #[error(transparent)]
    ExternalResource(#[from] ExternalResourceError),
}

impl From<ServiceError> for StatementErrorKind {
    fn from(error: ServiceError) -> Self {
        Self::ExternalResource(ExternalResourceError::Service(error))
    }
}

impl From<ParseError> for StatementErrorKind {
    fn from(error: ParseError) -> Self {
        Self::Invalid(error.raw_message())
    }
}

/// A rejected statement together with its text.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}\nStatement: {statement_text}")]
pub struct StatementError {
    statement_text: String,
    #[source]
    kind: StatementErrorKind,
}

impl StatementError {
    /// Creates an error for the statement `statement_text`.
    #[must_use]
    pub fn new(statement_text: impl Into<String>, kind: impl Into<StatementErrorKind>) -> Self {
        Self {
            statement_text: statement_text.into(),
            kind: kind.into(),
        }
    }

    /// The message without the statement text.
    #[must_use]
    pub fn raw_message(&self) -> String {
        self.kind.to_string()
    }

    /// The text of the rejected statement.
    #[must_use]
    pub fn statement_text(&self) -> &str {
        &self.statement_text
    }

    /// The failure category.
    #[must_use]
    pub fn kind(&self) -> &StatementErrorKind {
        &self.kind
    }
}

/// Top-level engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A statement could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A statement was rejected.
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referential_integrity_message() {
        let err = MetaStoreError::ReferentialIntegrity {
            name: "FOO".to_string(),
            readers: vec![],
            writers: vec![QueryId::new("CTAS_FOO_1")],
        };
        assert_eq!(
            err.to_string(),
            "Cannot drop FOO.\nThe following queries read from this source: [].\n\
             The following queries write into this source: [CTAS_FOO_1].\n\
             You need to terminate them before dropping FOO."
        );
    }

    #[test]
    fn test_statement_error_facets() {
        let err = StatementError::new(
            "select * from bar;",
            StatementErrorKind::Prepare("BAR does not exist.".to_string()),
        );
        assert_eq!(
            err.raw_message(),
            "Failed to prepare statement: BAR does not exist."
        );
        assert_eq!(err.statement_text(), "select * from bar;");
        assert!(err.to_string().ends_with("Statement: select * from bar;"));
    }

    #[test]
    fn test_duplicate_source_message() {
        let err = MetaStoreError::DuplicateSource {
            kind: SourceKind::Table,
            name: "FOO".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot add the new data source. Another data source with the same name already exists: TABLE name:FOO"
        );
    }
}
