//! Collaborators the engine talks to: topic administration, the schema
//! registry and the query runtime.
//!
//! Each collaborator is a trait. [`ServiceContext`] bundles one of each and
//! [`ServiceContext::sandboxed`] wraps them in overlays that never reach the
//! underlying service for writes.

use std::fmt;
use std::sync::Arc;

mod runtime;
mod sandbox;
mod schema_registry;
mod topic_admin;

pub use runtime::{QueryPlan, QueryRuntime, QueryTopology, SinkPlan};
pub use sandbox::{InertTopology, SandboxedQueryRuntime, SandboxedSchemaRegistry, SandboxedTopicAdmin};
pub use schema_registry::{value_subject, RegisteredSchema, SchemaRegistry};
pub use topic_admin::{TopicAdmin, TopicDescription};

/// Errors reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The topic is not known to the cluster.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Topic administration failed.
    #[error("Topic admin error: {0}")]
    TopicAdmin(String),

    /// Schema registry call failed.
    #[error("Schema registry error: {0}")]
    SchemaRegistry(String),

    /// The runtime could not build or start a query.
    #[error("Query runtime error: {0}")]
    Runtime(String),
}

/// The collaborators used by one engine.
#[derive(Clone)]
pub struct ServiceContext {
    topic_admin: Arc<dyn TopicAdmin>,
    schema_registry: Arc<dyn SchemaRegistry>,
    runtime: Arc<dyn QueryRuntime>,
}

impl ServiceContext {
    /// Bundles the three collaborators.
    #[must_use]
    pub fn new(
        topic_admin: Arc<dyn TopicAdmin>,
        schema_registry: Arc<dyn SchemaRegistry>,
        runtime: Arc<dyn QueryRuntime>,
    ) -> Self {
        Self {
            topic_admin,
            schema_registry,
            runtime,
        }
    }

    /// Topic administration.
    #[must_use]
    pub fn topic_admin(&self) -> &Arc<dyn TopicAdmin> {
        &self.topic_admin
    }

    /// Schema registry.
    #[must_use]
    pub fn schema_registry(&self) -> &Arc<dyn SchemaRegistry> {
        &self.schema_registry
    }

    /// Query runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn QueryRuntime> {
        &self.runtime
    }

    /// A context whose writes land in private overlays and whose runtime
    /// builds inert topologies.
    #[must_use]
    pub fn sandboxed(&self) -> Self {
        Self {
            topic_admin: Arc::new(SandboxedTopicAdmin::new(Arc::clone(&self.topic_admin))),
            schema_registry: Arc::new(SandboxedSchemaRegistry::new(Arc::clone(
                &self.schema_registry,
            ))),
            runtime: Arc::new(SandboxedQueryRuntime),
        }
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("topic_admin", &self.topic_admin)
            .field("schema_registry", &self.schema_registry)
            .field("runtime", &self.runtime)
            .finish()
    }
}
