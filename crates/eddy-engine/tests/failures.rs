//! Collaborator failures leave no partial effects behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eddy_engine::memory::{
    InMemoryQueryRuntime, InMemorySchemaRegistry, InMemoryTopicAdmin, TopologyEvent,
};
use eddy_engine::services::{
    RegisteredSchema, SchemaRegistry, ServiceError, TopicAdmin, TopicDescription,
};
use eddy_engine::{
    EngineBuilder, EngineConfig, ExecuteResult, ExecutionEngine, PropertyOverrides,
    StatementError,
};

#[derive(Debug, Default)]
struct FlakyTopicAdmin {
    inner: InMemoryTopicAdmin,
    fail_create: AtomicBool,
}

impl TopicAdmin for FlakyTopicAdmin {
    fn topic_exists(&self, topic: &str) -> Result<bool, ServiceError> {
        self.inner.topic_exists(topic)
    }

    fn describe_topic(&self, topic: &str) -> Result<TopicDescription, ServiceError> {
        self.inner.describe_topic(topic)
    }

    fn create_topic(&self, topic: &str, partitions: u32, replicas: u16) -> Result<(), ServiceError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ServiceError::TopicAdmin("boom".to_string()));
        }
        self.inner.create_topic(topic, partitions, replicas)
    }

    fn delete_topics(&self, topics: &[String]) -> Result<(), ServiceError> {
        self.inner.delete_topics(topics)
    }

    fn delete_internal_topics(&self, application_id: &str) -> Result<(), ServiceError> {
        self.inner.delete_internal_topics(application_id)
    }
}

#[derive(Debug, Default)]
struct FlakySchemaRegistry {
    inner: InMemorySchemaRegistry,
    fail_register: AtomicBool,
    fail_delete: AtomicBool,
}

impl SchemaRegistry for FlakySchemaRegistry {
    fn register(&self, subject: &str, schema: &str) -> Result<i32, ServiceError> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(ServiceError::SchemaRegistry("unavailable".to_string()));
        }
        self.inner.register(subject, schema)
    }

    fn latest_schema(&self, subject: &str) -> Result<Option<RegisteredSchema>, ServiceError> {
        self.inner.latest_schema(subject)
    }

    fn list_subjects(&self) -> Result<Vec<String>, ServiceError> {
        self.inner.list_subjects()
    }

    fn delete_subject(&self, subject: &str) -> Result<(), ServiceError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ServiceError::SchemaRegistry("unavailable".to_string()));
        }
        self.inner.delete_subject(subject)
    }

    fn test_compatibility(&self, subject: &str, schema: &str) -> Result<bool, ServiceError> {
        self.inner.test_compatibility(subject, schema)
    }
}

struct Harness {
    engine: ExecutionEngine,
    topics: Arc<FlakyTopicAdmin>,
    registry: Arc<FlakySchemaRegistry>,
    runtime: Arc<InMemoryQueryRuntime>,
}

impl Harness {
    fn new() -> Self {
        let topics = Arc::new(FlakyTopicAdmin::default());
        topics.inner.add_topic("test1", 1, 1);
        let registry = Arc::new(FlakySchemaRegistry::default());
        let runtime = Arc::new(InMemoryQueryRuntime::new());
        let engine = EngineBuilder::new()
            .topic_admin(topics.clone())
            .schema_registry(registry.clone())
            .runtime(runtime.clone())
            .build();
        let harness = Self {
            engine,
            topics,
            registry,
            runtime,
        };
        harness
            .run(
                "CREATE STREAM test1 (col0 BIGINT, col1 VARCHAR) \
                   WITH (KAFKA_TOPIC='test1', VALUE_FORMAT='JSON');",
            )
            .unwrap();
        harness
    }

    fn run(&self, sql: &str) -> Result<ExecuteResult, StatementError> {
        let parsed = self.engine.parse(sql).unwrap();
        let prepared = self.engine.prepare(&parsed[0])?;
        self.engine.execute(
            &prepared,
            &EngineConfig::default(),
            &mut PropertyOverrides::new(),
        )
    }

    fn closed_topologies(&self) -> usize {
        self.runtime
            .events()
            .iter()
            .filter(|e| matches!(e, TopologyEvent::Closed(_)))
            .count()
    }
}

#[test]
fn test_failed_topic_creation_closes_topology() {
    let h = Harness::new();
    h.topics.fail_create.store(true, Ordering::SeqCst);

    let err = h
        .run("CREATE STREAM bar AS SELECT * FROM test1;")
        .unwrap_err();
    assert_eq!(err.raw_message(), "Topic admin error: boom");
    assert_eq!(h.runtime.built_plans().len(), 1);
    assert_eq!(h.closed_topologies(), 1);
    assert!(!h.engine.metastore().contains_source("BAR"));
    assert_eq!(h.engine.number_of_live_queries(), 0);

    h.topics.fail_create.store(false, Ordering::SeqCst);
    let query = h
        .run("CREATE STREAM bar AS SELECT * FROM test1;")
        .unwrap()
        .query
        .unwrap();
    assert_eq!(query.id().as_str(), "CSAS_BAR_1");
}

#[test]
fn test_failed_schema_registration_removes_new_topic() {
    let h = Harness::new();
    h.registry.fail_register.store(true, Ordering::SeqCst);

    let err = h
        .run("CREATE STREAM bar WITH (VALUE_FORMAT='AVRO') AS SELECT * FROM test1;")
        .unwrap_err();
    assert_eq!(err.raw_message(), "Schema registry error: unavailable");
    assert_eq!(h.closed_topologies(), 1);
    assert_eq!(h.topics.inner.created_topics(), ["BAR".to_string()]);
    assert_eq!(h.topics.inner.deleted_topics(), ["BAR".to_string()]);
    assert!(!h.topics.inner.topic_names().contains(&"BAR".to_string()));
    assert!(!h.engine.metastore().contains_source("BAR"));
    assert_eq!(h.engine.number_of_persistent_queries(), 0);
}

#[test]
fn test_failed_registration_keeps_existing_topic() {
    let h = Harness::new();
    h.topics.inner.add_topic("BAR", 4, 1);
    h.registry.fail_register.store(true, Ordering::SeqCst);

    h.run("CREATE STREAM bar WITH (VALUE_FORMAT='AVRO') AS SELECT * FROM test1;")
        .unwrap_err();
    assert!(h.topics.inner.topic_names().contains(&"BAR".to_string()));
    assert!(h.topics.inner.deleted_topics().is_empty());
}

#[test]
fn test_failed_subject_delete_keeps_source_and_topic() {
    let h = Harness::new();
    h.run("CREATE STREAM bar WITH (VALUE_FORMAT='AVRO') AS SELECT * FROM test1;")
        .unwrap()
        .query
        .unwrap()
        .start()
        .unwrap();
    h.run("TERMINATE CSAS_BAR_0;").unwrap();
    h.registry.fail_delete.store(true, Ordering::SeqCst);

    let err = h.run("DROP STREAM bar DELETE TOPIC;").unwrap_err();
    assert_eq!(err.raw_message(), "Schema registry error: unavailable");
    assert!(h.engine.metastore().contains_source("BAR"));
    assert!(h.topics.inner.topic_names().contains(&"BAR".to_string()));
    assert!(h.topics.inner.deleted_topics().is_empty());
    assert_eq!(h.registry.list_subjects().unwrap(), ["BAR-value".to_string()]);

    h.registry.fail_delete.store(false, Ordering::SeqCst);
    h.run("DROP STREAM bar DELETE TOPIC;").unwrap();
    assert!(!h.engine.metastore().contains_source("BAR"));
    assert_eq!(h.topics.inner.deleted_topics(), ["BAR".to_string()]);
    assert!(h.registry.list_subjects().unwrap().is_empty());
}
