//! Overlay collaborators used by sandboxed engines.
//!
//! Reads fall through to the wrapped service unless the sandbox itself
//! created or deleted the resource; writes only touch the overlay.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    QueryPlan, QueryRuntime, QueryTopology, RegisteredSchema, SchemaRegistry, ServiceError,
    TopicAdmin, TopicDescription,
};
use crate::avro;

#[derive(Debug, Default)]
struct TopicOverlay {
    created: HashMap<String, TopicDescription>,
    deleted: HashSet<String>,
}

/// Topic admin that records creates and deletes locally.
#[derive(Debug)]
pub struct SandboxedTopicAdmin {
    inner: Arc<dyn TopicAdmin>,
    overlay: Mutex<TopicOverlay>,
}

impl SandboxedTopicAdmin {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn TopicAdmin>) -> Self {
        Self {
            inner,
            overlay: Mutex::new(TopicOverlay::default()),
        }
    }
}

impl TopicAdmin for SandboxedTopicAdmin {
    fn topic_exists(&self, topic: &str) -> Result<bool, ServiceError> {
        {
            let overlay = self.overlay.lock();
            if overlay.deleted.contains(topic) {
                return Ok(false);
            }
            if overlay.created.contains_key(topic) {
                return Ok(true);
            }
        }
        self.inner.topic_exists(topic)
    }

    fn describe_topic(&self, topic: &str) -> Result<TopicDescription, ServiceError> {
        {
            let overlay = self.overlay.lock();
            if overlay.deleted.contains(topic) {
                return Err(ServiceError::UnknownTopic(topic.to_string()));
            }
            if let Some(description) = overlay.created.get(topic) {
                return Ok(*description);
            }
        }
        self.inner.describe_topic(topic)
    }

    fn create_topic(
        &self,
        topic: &str,
        partitions: u32,
        replicas: u16,
    ) -> Result<(), ServiceError> {
        if self.topic_exists(topic)? {
            return Ok(());
        }
        let mut overlay = self.overlay.lock();
        overlay.deleted.remove(topic);
        overlay.created.insert(
            topic.to_string(),
            TopicDescription {
                partitions,
                replicas,
            },
        );
        Ok(())
    }

    fn delete_topics(&self, topics: &[String]) -> Result<(), ServiceError> {
        let mut overlay = self.overlay.lock();
        for topic in topics {
            overlay.created.remove(topic);
            overlay.deleted.insert(topic.clone());
        }
        Ok(())
    }

    fn delete_internal_topics(&self, _application_id: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SchemaOverlay {
    registered: HashMap<String, Vec<RegisteredSchema>>,
    deleted: HashSet<String>,
    next_id: i32,
}

/// Schema registry that records registrations and deletions locally.
#[derive(Debug)]
pub struct SandboxedSchemaRegistry {
    inner: Arc<dyn SchemaRegistry>,
    overlay: Mutex<SchemaOverlay>,
}

impl SandboxedSchemaRegistry {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            inner,
            overlay: Mutex::new(SchemaOverlay::default()),
        }
    }
}

impl SchemaRegistry for SandboxedSchemaRegistry {
    fn register(&self, subject: &str, schema: &str) -> Result<i32, ServiceError> {
        let latest = self.latest_schema(subject)?;
        let mut overlay = self.overlay.lock();
        if let Some(existing) = latest.as_ref().filter(|s| s.schema == schema) {
            return Ok(existing.id);
        }
        overlay.next_id += 1;
        let id = overlay.next_id;
        let version = latest.map_or(1, |s| s.version + 1);
        overlay.deleted.remove(subject);
        overlay
            .registered
            .entry(subject.to_string())
            .or_default()
            .push(RegisteredSchema {
                id,
                version,
                schema: schema.to_string(),
            });
        Ok(id)
    }

    fn latest_schema(&self, subject: &str) -> Result<Option<RegisteredSchema>, ServiceError> {
        {
            let overlay = self.overlay.lock();
            if let Some(latest) = overlay.registered.get(subject).and_then(|v| v.last()) {
                return Ok(Some(latest.clone()));
            }
            if overlay.deleted.contains(subject) {
                return Ok(None);
            }
        }
        self.inner.latest_schema(subject)
    }

    fn list_subjects(&self) -> Result<Vec<String>, ServiceError> {
        let mut subjects: BTreeSet<String> = self.inner.list_subjects()?.into_iter().collect();
        let overlay = self.overlay.lock();
        subjects.retain(|s| !overlay.deleted.contains(s));
        subjects.extend(overlay.registered.keys().cloned());
        Ok(subjects.into_iter().collect())
    }

    fn delete_subject(&self, subject: &str) -> Result<(), ServiceError> {
        let mut overlay = self.overlay.lock();
        overlay.registered.remove(subject);
        overlay.deleted.insert(subject.to_string());
        Ok(())
    }

    fn test_compatibility(&self, subject: &str, schema: &str) -> Result<bool, ServiceError> {
        let local = {
            let overlay = self.overlay.lock();
            if let Some(latest) = overlay.registered.get(subject).and_then(|v| v.last()) {
                Some(latest.schema.clone())
            } else if overlay.deleted.contains(subject) {
                return Ok(true);
            } else {
                None
            }
        };
        match local {
            Some(existing) => Ok(avro::is_backward_compatible(schema, &existing)),
            None => self.inner.test_compatibility(subject, schema),
        }
    }
}

/// Runtime whose topologies never process anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SandboxedQueryRuntime;

impl QueryRuntime for SandboxedQueryRuntime {
    fn build(&self, plan: &QueryPlan) -> Result<Box<dyn QueryTopology>, ServiceError> {
        Ok(Box::new(InertTopology::new(plan.application_id.clone())))
    }
}

/// A topology that accepts start and close and does nothing.
#[derive(Debug, Clone)]
pub struct InertTopology {
    application_id: String,
}

impl InertTopology {
    /// Creates an inert topology for `application_id`.
    #[must_use]
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
        }
    }
}

impl QueryTopology for InertTopology {
    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn start(&mut self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemorySchemaRegistry, InMemoryTopicAdmin};

    #[test]
    fn test_topic_overlay_hides_writes() {
        let real = Arc::new(InMemoryTopicAdmin::new());
        real.add_topic("existing", 1, 1);
        let sandbox = SandboxedTopicAdmin::new(real.clone());

        sandbox.create_topic("new", 2, 1).unwrap();
        sandbox.delete_topics(&["existing".to_string()]).unwrap();

        assert!(sandbox.topic_exists("new").unwrap());
        assert!(!sandbox.topic_exists("existing").unwrap());
        assert_eq!(
            sandbox.describe_topic("new").unwrap(),
            TopicDescription {
                partitions: 2,
                replicas: 1
            }
        );

        assert!(!real.topic_exists("new").unwrap());
        assert!(real.topic_exists("existing").unwrap());
        assert!(real.created_topics().is_empty());
        assert!(real.deleted_topics().is_empty());
    }

    #[test]
    fn test_schema_overlay_hides_writes() {
        let real = Arc::new(InMemorySchemaRegistry::new());
        real.register("kept-value", "\"int\"").unwrap();
        let sandbox = SandboxedSchemaRegistry::new(real.clone());

        sandbox.register("new-value", "\"string\"").unwrap();
        sandbox.delete_subject("kept-value").unwrap();

        assert_eq!(sandbox.list_subjects().unwrap(), vec!["new-value".to_string()]);
        assert!(sandbox.latest_schema("kept-value").unwrap().is_none());
        assert_eq!(real.list_subjects().unwrap(), vec!["kept-value".to_string()]);
    }

    #[test]
    fn test_schema_overlay_compatibility_uses_local_versions() {
        let real = Arc::new(InMemorySchemaRegistry::new());
        let sandbox = SandboxedSchemaRegistry::new(real);

        sandbox.register("t-value", "\"int\"").unwrap();
        assert!(sandbox.test_compatibility("t-value", "\"long\"").unwrap());
        assert!(!sandbox.test_compatibility("t-value", "\"string\"").unwrap());
    }

    #[test]
    fn test_inert_topology() {
        let mut topology = InertTopology::new("_eddy-app");
        assert_eq!(topology.application_id(), "_eddy-app");
        assert!(topology.start().is_ok());
        topology.close();
    }
}
