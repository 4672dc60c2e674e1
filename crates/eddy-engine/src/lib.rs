//! # Eddy Engine
//!
//! Statement execution for the Eddy streaming SQL engine.
//!
//! The [`ExecutionEngine`] turns parsed statements into long-lived
//! streaming queries and keeps the [`MetaStore`](metastore::MetaStore)
//! catalog consistent with them:
//!
//! ```rust
//! use eddy_engine::memory::InMemoryTopicAdmin;
//! use eddy_engine::{EngineBuilder, EngineConfig, PropertyOverrides};
//! use std::sync::Arc;
//!
//! let admin = Arc::new(InMemoryTopicAdmin::new());
//! admin.add_topic("pageviews", 1, 1);
//! let engine = EngineBuilder::new().topic_admin(admin).build();
//!
//! let queries = engine
//!     .execute_script(
//!         "CREATE STREAM pageviews (pageid VARCHAR) \
//!            WITH (KAFKA_TOPIC='pageviews', VALUE_FORMAT='JSON'); \
//!          CREATE TABLE views AS SELECT pageid, COUNT(*) AS cnt FROM pageviews GROUP BY pageid;",
//!         &EngineConfig::default(),
//!         &mut PropertyOverrides::new(),
//!     )
//!     .unwrap();
//! assert_eq!(queries[0].id().as_str(), "CTAS_VIEWS_0");
//! ```
//!
//! ## Sandboxes
//!
//! [`ExecutionEngine::create_sandbox`] returns an engine over a deep copy of
//! the catalog and registry, wired to overlay collaborators. Statements
//! executed there behave exactly as they would for real, but leave the
//! parent engine, its id counters and all external state untouched.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analyzer;
pub mod avro;
mod builder;
pub mod config;
mod engine;
pub mod error;
pub mod memory;
pub mod metastore;
pub mod query;
pub mod query_id;
mod registry;
pub mod services;
mod standalone;

pub use builder::EngineBuilder;
pub use config::{EngineConfig, PropertyOverrides};
pub use engine::{ExecuteResult, ExecutionEngine, PreparedStatement};
pub use error::{
    EngineError, ExternalResourceError, MetaStoreError, StatementError, StatementErrorKind,
};
pub use metastore::{DataSource, MetaStore};
pub use query::{QueryHandle, QueryKind, QueryState};
pub use query_id::QueryId;
pub use standalone::StandaloneExecutor;
