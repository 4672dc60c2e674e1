//! Shared fixture for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use eddy_engine::memory::{InMemoryQueryRuntime, InMemorySchemaRegistry, InMemoryTopicAdmin};
use eddy_engine::{
    EngineBuilder, EngineConfig, ExecuteResult, ExecutionEngine, PropertyOverrides,
    StatementError,
};

pub struct Fixture {
    pub engine: ExecutionEngine,
    pub topics: Arc<InMemoryTopicAdmin>,
    pub registry: Arc<InMemorySchemaRegistry>,
    pub runtime: Arc<InMemoryQueryRuntime>,
    pub config: EngineConfig,
}

/// An engine with streams TEST1 and ORDERS and tables TEST2 and TEST3.
pub fn fixture() -> Fixture {
    let topics = Arc::new(InMemoryTopicAdmin::new());
    for topic in ["test1", "test2", "test3", "orders_topic"] {
        topics.add_topic(topic, 1, 1);
    }
    let registry = Arc::new(InMemorySchemaRegistry::new());
    let runtime = Arc::new(InMemoryQueryRuntime::new());
    let engine = EngineBuilder::new()
        .topic_admin(topics.clone())
        .schema_registry(registry.clone())
        .runtime(runtime.clone())
        .build();

    let fixture = Fixture {
        engine,
        topics,
        registry,
        runtime,
        config: EngineConfig::default(),
    };
    fixture.run_script(
        "CREATE STREAM test1 (col0 BIGINT, col1 VARCHAR, col2 DOUBLE) \
           WITH (KAFKA_TOPIC='test1', VALUE_FORMAT='JSON');\
         CREATE TABLE test2 (col0 BIGINT, col1 VARCHAR, col2 DOUBLE) \
           WITH (KAFKA_TOPIC='test2', VALUE_FORMAT='JSON', KEY='col0');\
         CREATE TABLE test3 (col0 BIGINT, col1 VARCHAR) \
           WITH (KAFKA_TOPIC='test3', VALUE_FORMAT='JSON');\
         CREATE STREAM orders (ordertime BIGINT, orderid BIGINT, itemid VARCHAR, orderunits DOUBLE) \
           WITH (KAFKA_TOPIC='orders_topic', VALUE_FORMAT='JSON');",
    );
    fixture
}

impl Fixture {
    /// Runs every statement of `sql`, panicking on failure.
    pub fn run_script(&self, sql: &str) -> Vec<ExecuteResult> {
        let mut overrides = PropertyOverrides::new();
        self.engine
            .parse(sql)
            .unwrap()
            .iter()
            .map(|parsed| {
                let prepared = self.engine.prepare(parsed).unwrap();
                self.engine
                    .execute(&prepared, &self.config, &mut overrides)
                    .unwrap()
            })
            .collect()
    }

    /// Runs a single statement on `engine`.
    pub fn run_on(
        &self,
        engine: &ExecutionEngine,
        sql: &str,
    ) -> Result<ExecuteResult, StatementError> {
        self.run_with(engine, sql, &mut PropertyOverrides::new())
    }

    /// Runs a single statement on `engine` with the given overrides.
    pub fn run_with(
        &self,
        engine: &ExecutionEngine,
        sql: &str,
        overrides: &mut PropertyOverrides,
    ) -> Result<ExecuteResult, StatementError> {
        let parsed = engine.parse(sql).unwrap();
        assert_eq!(parsed.len(), 1, "expected one statement in {sql}");
        let prepared = engine.prepare(&parsed[0])?;
        engine.execute(&prepared, &self.config, overrides)
    }

    /// Runs a single statement on the fixture's engine.
    pub fn run(&self, sql: &str) -> Result<ExecuteResult, StatementError> {
        self.run_on(&self.engine, sql)
    }
}
