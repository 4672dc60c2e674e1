use std::collections::BTreeMap;
use std::fmt;

use arrow_schema::SchemaRef;
use eddy_sql::ValueFormat;

use super::ServiceError;
use crate::query::QueryKind;
use crate::query_id::QueryId;

/// Where a persistent query writes its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkPlan {
    /// Sink source name.
    pub name: String,
    /// Sink topic.
    pub topic: String,
    /// Output value format.
    pub value_format: ValueFormat,
    /// Partition count of the sink topic.
    pub partitions: u32,
    /// Replication factor of the sink topic.
    pub replicas: u16,
}

/// Everything the runtime needs to build a query's processing graph.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Query id.
    pub query_id: QueryId,
    /// Application id that owns the query's internal topics.
    pub application_id: String,
    /// Transient or persistent.
    pub kind: QueryKind,
    /// Statement text the query was built from.
    pub statement_text: String,
    /// Names of the sources read, in FROM order.
    pub sources: Vec<String>,
    /// Output sink; `None` for transient queries.
    pub sink: Option<SinkPlan>,
    /// Schema of the produced rows.
    pub result_schema: SchemaRef,
    /// Effective runtime properties.
    pub properties: BTreeMap<String, String>,
}

/// A built processing graph. Nothing runs until [`start`](Self::start).
pub trait QueryTopology: Send + fmt::Debug {
    /// Application id of this topology.
    fn application_id(&self) -> &str;

    /// Starts processing.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Runtime` if the graph cannot start.
    fn start(&mut self) -> Result<(), ServiceError>;

    /// Stops processing and releases resources. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Builds processing graphs for queries.
pub trait QueryRuntime: Send + Sync + fmt::Debug {
    /// Builds a topology for `plan` without side effects.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Runtime` if the plan cannot be built.
    fn build(&self, plan: &QueryPlan) -> Result<Box<dyn QueryTopology>, ServiceError>;
}
