use std::fmt;

use super::ServiceError;

/// Partition and replica counts of an existing topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicDescription {
    /// Number of partitions.
    pub partitions: u32,
    /// Replication factor.
    pub replicas: u16,
}

/// Administrative access to the message broker's topics.
pub trait TopicAdmin: Send + Sync + fmt::Debug {
    /// Whether `topic` exists.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the broker cannot be queried.
    fn topic_exists(&self, topic: &str) -> Result<bool, ServiceError>;

    /// Partition and replica counts of `topic`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::UnknownTopic` if the topic does not exist.
    fn describe_topic(&self, topic: &str) -> Result<TopicDescription, ServiceError>;

    /// Creates `topic` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the topic cannot be created.
    fn create_topic(&self, topic: &str, partitions: u32, replicas: u16)
        -> Result<(), ServiceError>;

    /// Deletes the given topics.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if a topic cannot be deleted.
    fn delete_topics(&self, topics: &[String]) -> Result<(), ServiceError>;

    /// Deletes the internal (changelog and repartition) topics of an application.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if cleanup fails.
    fn delete_internal_topics(&self, application_id: &str) -> Result<(), ServiceError>;
}
