use std::fmt;

use super::ServiceError;

/// A schema version stored under a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredSchema {
    /// Registry-wide schema id.
    pub id: i32,
    /// Version within the subject, starting at 1.
    pub version: i32,
    /// Avro schema JSON.
    pub schema: String,
}

/// Subject holding the value schema of `topic`.
#[must_use]
pub fn value_subject(topic: &str) -> String {
    format!("{topic}-value")
}

/// Client for an Avro schema registry.
pub trait SchemaRegistry: Send + Sync + fmt::Debug {
    /// Registers `schema` under `subject`, returning its id.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::SchemaRegistry` if the registry refuses it.
    fn register(&self, subject: &str, schema: &str) -> Result<i32, ServiceError>;

    /// Latest version registered under `subject`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the registry cannot be queried.
    fn latest_schema(&self, subject: &str) -> Result<Option<RegisteredSchema>, ServiceError>;

    /// All subjects, sorted.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the registry cannot be queried.
    fn list_subjects(&self) -> Result<Vec<String>, ServiceError>;

    /// Deletes `subject` and all its versions.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the subject cannot be deleted.
    fn delete_subject(&self, subject: &str) -> Result<(), ServiceError>;

    /// Whether `schema` could be registered under `subject` without
    /// breaking readers of the latest version. Registers nothing.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the registry cannot be queried.
    fn test_compatibility(&self, subject: &str, schema: &str) -> Result<bool, ServiceError>;
}
