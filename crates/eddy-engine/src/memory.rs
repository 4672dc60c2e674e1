//! In-memory collaborators.
//!
//! These back the embedded server and the test suites. Every mutating call
//! is recorded so callers can assert on what the engine did.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::avro;
use crate::services::{
    QueryPlan, QueryRuntime, QueryTopology, RegisteredSchema, SchemaRegistry, ServiceError,
    TopicAdmin, TopicDescription,
};

/// A mutating call made against [`InMemoryTopicAdmin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicAdminCall {
    /// `create_topic` for a topic that did not exist.
    Create {
        /// Topic name.
        topic: String,
        /// Partitions.
        partitions: u32,
        /// Replicas.
        replicas: u16,
    },
    /// `delete_topics`.
    Delete(Vec<String>),
    /// `delete_internal_topics`.
    DeleteInternal(String),
}

/// Topic admin backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryTopicAdmin {
    topics: Mutex<BTreeMap<String, TopicDescription>>,
    calls: Mutex<Vec<TopicAdminCall>>,
}

impl InMemoryTopicAdmin {
    /// Creates an admin with no topics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pre-existing topic without recording a call.
    pub fn add_topic(&self, topic: &str, partitions: u32, replicas: u16) {
        self.topics.lock().insert(
            topic.to_string(),
            TopicDescription {
                partitions,
                replicas,
            },
        );
    }

    /// Names of all current topics.
    #[must_use]
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.lock().keys().cloned().collect()
    }

    /// Every recorded call, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<TopicAdminCall> {
        self.calls.lock().clone()
    }

    /// Topics created through `create_topic`.
    #[must_use]
    pub fn created_topics(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TopicAdminCall::Create { topic, .. } => Some(topic.clone()),
                _ => None,
            })
            .collect()
    }

    /// Topics removed through `delete_topics`.
    #[must_use]
    pub fn deleted_topics(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TopicAdminCall::Delete(topics) => Some(topics.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Application ids passed to `delete_internal_topics`.
    #[must_use]
    pub fn internal_topic_cleanups(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TopicAdminCall::DeleteInternal(app_id) => Some(app_id.clone()),
                _ => None,
            })
            .collect()
    }
}

impl TopicAdmin for InMemoryTopicAdmin {
    fn topic_exists(&self, topic: &str) -> Result<bool, ServiceError> {
        Ok(self.topics.lock().contains_key(topic))
    }

    fn describe_topic(&self, topic: &str) -> Result<TopicDescription, ServiceError> {
        self.topics
            .lock()
            .get(topic)
            .copied()
            .ok_or_else(|| ServiceError::UnknownTopic(topic.to_string()))
    }

    fn create_topic(
        &self,
        topic: &str,
        partitions: u32,
        replicas: u16,
    ) -> Result<(), ServiceError> {
        let mut topics = self.topics.lock();
        if topics.contains_key(topic) {
            return Ok(());
        }
        topics.insert(
            topic.to_string(),
            TopicDescription {
                partitions,
                replicas,
            },
        );
        self.calls.lock().push(TopicAdminCall::Create {
            topic: topic.to_string(),
            partitions,
            replicas,
        });
        Ok(())
    }

    fn delete_topics(&self, topics: &[String]) -> Result<(), ServiceError> {
        let mut existing = self.topics.lock();
        for topic in topics {
            existing.remove(topic);
        }
        self.calls
            .lock()
            .push(TopicAdminCall::Delete(topics.to_vec()));
        Ok(())
    }

    fn delete_internal_topics(&self, application_id: &str) -> Result<(), ServiceError> {
        self.calls
            .lock()
            .push(TopicAdminCall::DeleteInternal(application_id.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    subjects: BTreeMap<String, Vec<RegisteredSchema>>,
    next_id: i32,
    registrations: Vec<String>,
}

/// Schema registry backed by a map.
///
/// `register` always accepts; compatibility is only checked by
/// `test_compatibility`.
#[derive(Debug, Default)]
pub struct InMemorySchemaRegistry {
    state: Mutex<RegistryState>,
}

impl InMemorySchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subjects passed to `register`, oldest first.
    #[must_use]
    pub fn registrations(&self) -> Vec<String> {
        self.state.lock().registrations.clone()
    }
}

impl SchemaRegistry for InMemorySchemaRegistry {
    fn register(&self, subject: &str, schema: &str) -> Result<i32, ServiceError> {
        let mut state = self.state.lock();
        state.registrations.push(subject.to_string());
        if let Some(existing) = state
            .subjects
            .get(subject)
            .and_then(|versions| versions.iter().find(|v| v.schema == schema))
        {
            return Ok(existing.id);
        }
        state.next_id += 1;
        let id = state.next_id;
        let versions = state.subjects.entry(subject.to_string()).or_default();
        let version = versions.last().map_or(1, |v| v.version + 1);
        versions.push(RegisteredSchema {
            id,
            version,
            schema: schema.to_string(),
        });
        Ok(id)
    }

    fn latest_schema(&self, subject: &str) -> Result<Option<RegisteredSchema>, ServiceError> {
        Ok(self
            .state
            .lock()
            .subjects
            .get(subject)
            .and_then(|versions| versions.last().cloned()))
    }

    fn list_subjects(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.state.lock().subjects.keys().cloned().collect())
    }

    fn delete_subject(&self, subject: &str) -> Result<(), ServiceError> {
        self.state.lock().subjects.remove(subject);
        Ok(())
    }

    fn test_compatibility(&self, subject: &str, schema: &str) -> Result<bool, ServiceError> {
        Ok(self
            .latest_schema(subject)?
            .map_or(true, |latest| avro::is_backward_compatible(schema, &latest.schema)))
    }
}

/// Lifecycle event of a topology built by [`InMemoryQueryRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    /// `start` was called.
    Started(String),
    /// `close` was called.
    Closed(String),
}

/// Runtime whose topologies only record their lifecycle.
#[derive(Debug, Default)]
pub struct InMemoryQueryRuntime {
    built: Mutex<Vec<QueryPlan>>,
    events: Arc<Mutex<Vec<TopologyEvent>>>,
}

impl InMemoryQueryRuntime {
    /// Creates a runtime with empty logs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plans passed to `build`, oldest first.
    #[must_use]
    pub fn built_plans(&self) -> Vec<QueryPlan> {
        self.built.lock().clone()
    }

    /// Start and close events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<TopologyEvent> {
        self.events.lock().clone()
    }
}

impl QueryRuntime for InMemoryQueryRuntime {
    fn build(&self, plan: &QueryPlan) -> Result<Box<dyn QueryTopology>, ServiceError> {
        self.built.lock().push(plan.clone());
        Ok(Box::new(InMemoryTopology {
            application_id: plan.application_id.clone(),
            running: false,
            events: Arc::clone(&self.events),
        }))
    }
}

#[derive(Debug)]
struct InMemoryTopology {
    application_id: String,
    running: bool,
    events: Arc<Mutex<Vec<TopologyEvent>>>,
}

impl QueryTopology for InMemoryTopology {
    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn start(&mut self) -> Result<(), ServiceError> {
        if self.running {
            return Err(ServiceError::Runtime(format!(
                "{} is already running",
                self.application_id
            )));
        }
        self.running = true;
        self.events
            .lock()
            .push(TopologyEvent::Started(self.application_id.clone()));
        Ok(())
    }

    fn close(&mut self) {
        self.running = false;
        self.events
            .lock()
            .push(TopologyEvent::Closed(self.application_id.clone()));
    }
}
