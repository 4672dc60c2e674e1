//! Query handles and their lifecycle.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use arrow_schema::SchemaRef;
use eddy_sql::SourceKind;
use parking_lot::Mutex;

use crate::query_id::QueryId;
use crate::registry::EngineState;
use crate::services::{QueryTopology, ServiceError, TopicAdmin};

/// Whether a query outlives the request that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Bare SELECT; never recorded in the catalog.
    Transient,
    /// CREATE ... AS SELECT or INSERT INTO; writes into a sink.
    Persistent,
}

/// Lifecycle state of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryState {
    /// Built but not running.
    Created,
    /// Running.
    Started,
    /// Closed; terminal.
    Closed,
}

/// Immutable description of a query.
#[derive(Debug, Clone)]
pub struct QueryMetadata {
    /// Query id.
    pub id: QueryId,
    /// Transient or persistent.
    pub kind: QueryKind,
    /// Text of the statement that created the query.
    pub statement_text: String,
    /// Sources read, in FROM order.
    pub source_names: Vec<String>,
    /// Sink written; `None` for transient queries.
    pub sink_name: Option<String>,
    /// Kind of the produced relation.
    pub result_kind: SourceKind,
    /// Schema of the produced rows.
    pub result_schema: SchemaRef,
    /// Application id owning the query's internal topics.
    pub application_id: String,
    /// Effective properties at creation time.
    pub properties: BTreeMap<String, String>,
}

struct QueryInner {
    metadata: QueryMetadata,
    state: Mutex<QueryState>,
    topology: Mutex<Option<Box<dyn QueryTopology>>>,
    topic_admin: Arc<dyn TopicAdmin>,
    owner: Weak<EngineState>,
}

/// Shared handle to a registered query.
///
/// Clones refer to the same query.
#[derive(Clone)]
pub struct QueryHandle {
    inner: Arc<QueryInner>,
}

impl QueryHandle {
    pub(crate) fn new(
        metadata: QueryMetadata,
        topology: Option<Box<dyn QueryTopology>>,
        topic_admin: Arc<dyn TopicAdmin>,
        owner: Weak<EngineState>,
    ) -> Self {
        Self::with_state(metadata, QueryState::Created, topology, topic_admin, owner)
    }

    fn with_state(
        metadata: QueryMetadata,
        state: QueryState,
        topology: Option<Box<dyn QueryTopology>>,
        topic_admin: Arc<dyn TopicAdmin>,
        owner: Weak<EngineState>,
    ) -> Self {
        Self {
            inner: Arc::new(QueryInner {
                metadata,
                state: Mutex::new(state),
                topology: Mutex::new(topology),
                topic_admin,
                owner,
            }),
        }
    }

    /// An independent copy bound to another engine, without a topology.
    pub(crate) fn detached_copy(
        &self,
        topic_admin: Arc<dyn TopicAdmin>,
        owner: Weak<EngineState>,
    ) -> Self {
        Self::with_state(
            self.inner.metadata.clone(),
            self.state(),
            None,
            topic_admin,
            owner,
        )
    }

    /// Query id.
    #[must_use]
    pub fn id(&self) -> &QueryId {
        &self.inner.metadata.id
    }

    /// Transient or persistent.
    #[must_use]
    pub fn kind(&self) -> QueryKind {
        self.inner.metadata.kind
    }

    /// Full description.
    #[must_use]
    pub fn metadata(&self) -> &QueryMetadata {
        &self.inner.metadata
    }

    /// Text of the statement that created the query.
    #[must_use]
    pub fn statement_text(&self) -> &str {
        &self.inner.metadata.statement_text
    }

    /// Sources read.
    #[must_use]
    pub fn source_names(&self) -> &[String] {
        &self.inner.metadata.source_names
    }

    /// Sink written, for persistent queries.
    #[must_use]
    pub fn sink_name(&self) -> Option<&str> {
        self.inner.metadata.sink_name.as_deref()
    }

    /// Application id owning the query's internal topics.
    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.inner.metadata.application_id
    }

    /// Schema of the produced rows.
    #[must_use]
    pub fn result_schema(&self) -> &SchemaRef {
        &self.inner.metadata.result_schema
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> QueryState {
        *self.inner.state.lock()
    }

    /// Whether the query has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == QueryState::Closed
    }

    /// Starts processing. Starting a running query does nothing.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Runtime` if the query is closed or its
    /// topology fails to start.
    pub fn start(&self) -> Result<(), ServiceError> {
        let mut state = self.inner.state.lock();
        match *state {
            QueryState::Started => return Ok(()),
            QueryState::Closed => {
                return Err(ServiceError::Runtime(format!(
                    "Query {} is closed",
                    self.id()
                )))
            }
            QueryState::Created => {}
        }
        if let Some(topology) = self.inner.topology.lock().as_mut() {
            topology.start()?;
        }
        *state = QueryState::Started;
        tracing::info!(query_id = %self.id(), application_id = %self.application_id(), "Query started");
        Ok(())
    }

    /// Stops the query and removes it from its engine.
    ///
    /// Idempotent. Internal topics are only cleaned up if the query was
    /// started; cleanup failures are logged, never returned.
    pub fn close(&self) {
        let previous = {
            let mut state = self.inner.state.lock();
            if *state == QueryState::Closed {
                return;
            }
            std::mem::replace(&mut *state, QueryState::Closed)
        };

        if let Some(mut topology) = self.inner.topology.lock().take() {
            topology.close();
        }

        if previous == QueryState::Started {
            if let Err(e) = self
                .inner
                .topic_admin
                .delete_internal_topics(self.application_id())
            {
                tracing::warn!(
                    query_id = %self.id(),
                    error = %e,
                    "Failed to delete internal topics"
                );
            }
        }

        if let Some(owner) = self.inner.owner.upgrade() {
            owner.deregister(self.id());
        }
        tracing::debug!(query_id = %self.id(), "Query closed");
    }
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("id", self.id())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("sink", &self.sink_name())
            .finish_non_exhaustive()
    }
}
