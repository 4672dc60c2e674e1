//! Fluent builder for [`ExecutionEngine`] construction.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::ExecutionEngine;
use crate::memory::{InMemoryQueryRuntime, InMemorySchemaRegistry, InMemoryTopicAdmin};
use crate::services::{QueryRuntime, SchemaRegistry, ServiceContext, TopicAdmin};

/// Fluent builder for an [`ExecutionEngine`].
///
/// Collaborators that are not set default to the in-memory ones.
///
/// # Example
///
/// ```rust
/// use eddy_engine::EngineBuilder;
///
/// let engine = EngineBuilder::new().service_id("pipeline_").build();
/// assert_eq!(engine.config().service_id, "pipeline_");
/// assert!(!engine.is_sandbox());
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    topic_admin: Option<Arc<dyn TopicAdmin>>,
    schema_registry: Option<Arc<dyn SchemaRegistry>>,
    runtime: Option<Arc<dyn QueryRuntime>>,
}

impl EngineBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the service id used in application ids.
    #[must_use]
    pub fn service_id(mut self, service_id: impl Into<String>) -> Self {
        self.config.service_id = service_id.into();
        self
    }

    /// Sets the topic admin.
    #[must_use]
    pub fn topic_admin(mut self, topic_admin: Arc<dyn TopicAdmin>) -> Self {
        self.topic_admin = Some(topic_admin);
        self
    }

    /// Sets the schema registry client.
    #[must_use]
    pub fn schema_registry(mut self, schema_registry: Arc<dyn SchemaRegistry>) -> Self {
        self.schema_registry = Some(schema_registry);
        self
    }

    /// Sets the query runtime.
    #[must_use]
    pub fn runtime(mut self, runtime: Arc<dyn QueryRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> ExecutionEngine {
        let services = ServiceContext::new(
            self.topic_admin
                .unwrap_or_else(|| Arc::new(InMemoryTopicAdmin::new())),
            self.schema_registry
                .unwrap_or_else(|| Arc::new(InMemorySchemaRegistry::new())),
            self.runtime
                .unwrap_or_else(|| Arc::new(InMemoryQueryRuntime::new())),
        );
        tracing::debug!(service_id = %self.config.service_id, "Engine built");
        ExecutionEngine::new(services, self.config)
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("topic_admin", &self.topic_admin.is_some())
            .field("schema_registry", &self.schema_registry.is_some())
            .field("runtime", &self.runtime.is_some())
            .finish()
    }
}
