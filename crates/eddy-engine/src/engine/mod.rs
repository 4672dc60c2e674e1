//! The statement execution engine.
//!
//! Every statement goes through the same pipeline: parse, prepare against
//! the current metastore, then execute. Execution re-validates, checks
//! external resources, builds the query topology, performs external effects
//! and finally commits the catalog and registry change as one unit.
//!
//! A sandbox engine runs the identical pipeline against a deep copy of the
//! state and sandboxed collaborators.

mod ddl;
mod persistent;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eddy_sql::{ParseError, ParsedStatement, Statement};

use crate::analyzer::{self, AnalysisError, QueryAnalysis};
use crate::config::{EngineConfig, PropertyOverrides};
use crate::error::{EngineError, StatementError, StatementErrorKind};
use crate::metastore::MetaStore;
use crate::query::{QueryHandle, QueryKind, QueryState};
use crate::query_id::{QueryId, QueryIdGenerator, QueryIdSource, QueryIdView, SandboxQueryIds};
use crate::registry::EngineState;
use crate::services::ServiceContext;

/// A parsed statement resolved against the metastore.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    parsed: ParsedStatement,
    analysis: Option<QueryAnalysis>,
}

impl PreparedStatement {
    /// Statement text, including the terminating semicolon.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.parsed.text
    }

    /// The parsed statement.
    #[must_use]
    pub fn statement(&self) -> &Statement {
        &self.parsed.statement
    }

    /// Result of analyzing the statement's SELECT, if it has one.
    #[must_use]
    pub fn analysis(&self) -> Option<&QueryAnalysis> {
        self.analysis.as_ref()
    }
}

/// Outcome of executing one statement.
#[derive(Debug, Clone, Default)]
pub struct ExecuteResult {
    /// Message for statements that produce one.
    pub command_result: Option<String>,
    /// Query created by the statement.
    pub query: Option<QueryHandle>,
}

impl ExecuteResult {
    fn message(message: impl Into<String>) -> Self {
        Self {
            command_result: Some(message.into()),
            query: None,
        }
    }

    fn query(handle: QueryHandle) -> Self {
        Self {
            command_result: None,
            query: Some(handle),
        }
    }
}

/// Executes statements against a metastore and a query registry.
///
/// Cloning is not supported; use [`create_sandbox`](Self::create_sandbox)
/// for an isolated copy.
#[derive(Debug)]
pub struct ExecutionEngine {
    state: Arc<EngineState>,
    services: ServiceContext,
    persistent_ids: Arc<dyn QueryIdSource>,
    transient_ids: Arc<dyn QueryIdSource>,
    config: EngineConfig,
    sandbox: bool,
    closed: AtomicBool,
}

impl ExecutionEngine {
    /// Creates an engine with an empty metastore.
    #[must_use]
    pub fn new(services: ServiceContext, config: EngineConfig) -> Self {
        Self {
            state: Arc::new(EngineState::default()),
            services,
            persistent_ids: Arc::new(QueryIdGenerator::new()),
            transient_ids: Arc::new(QueryIdGenerator::new()),
            config,
            sandbox: false,
            closed: AtomicBool::new(false),
        }
    }

    /// Splits and parses `sql`. Never consults the metastore.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` carrying the text of the first bad statement.
    pub fn parse(&self, sql: &str) -> Result<Vec<ParsedStatement>, ParseError> {
        eddy_sql::parse_statements(sql)
    }

    /// Resolves `statement` against the current metastore.
    ///
    /// Names that already exist are not rejected here; `execute` checks
    /// them against the catalog at that point.
    ///
    /// # Errors
    ///
    /// Returns `StatementErrorKind::Prepare` if a source or column cannot
    /// be resolved.
    pub fn prepare(&self, statement: &ParsedStatement) -> Result<PreparedStatement, StatementError> {
        let analysis = match statement.statement.select() {
            Some(select) => {
                let metastore = self.state.metastore.read();
                let analysis = analyzer::analyze(select, &metastore).map_err(|e| {
                    StatementError::new(&statement.text, StatementErrorKind::Prepare(e.to_string()))
                })?;
                Some(analysis)
            }
            None => None,
        };
        tracing::debug!(statement = statement.statement.label(), "Statement prepared");
        Ok(PreparedStatement {
            parsed: statement.clone(),
            analysis,
        })
    }

    /// Executes a prepared statement.
    ///
    /// Query statements run with `config` combined with `overrides`. SET
    /// and UNSET change `overrides` in place and never read it.
    ///
    /// # Errors
    ///
    /// Returns `StatementError` if validation or an external call fails.
    /// Nothing is committed in that case.
    pub fn execute(
        &self,
        statement: &PreparedStatement,
        config: &EngineConfig,
        overrides: &mut PropertyOverrides,
    ) -> Result<ExecuteResult, StatementError> {
        let text = statement.text();
        if self.is_closed() {
            return Err(StatementError::new(text, StatementErrorKind::Closed));
        }

        let result = match statement.statement() {
            Statement::CreateSource(create) => self.create_source(create, text),
            Statement::CreateAsSelect(create) => effective_config(config, overrides)
                .and_then(|config| self.create_as_select(create, text, &config)),
            Statement::InsertInto(insert) => effective_config(config, overrides)
                .and_then(|config| self.insert_into(insert, text, &config)),
            Statement::Query(select) => effective_config(config, overrides)
                .and_then(|config| self.transient_query(select, text, &config)),
            Statement::DropSource(drop) => self.drop_source(drop),
            Statement::TerminateQuery { query_id } => self.terminate(query_id),
            Statement::SetProperty { name, value } => {
                overrides.insert(name.clone(), value.clone());
                Ok(ExecuteResult::message(format!("property:{name} set to {value}")))
            }
            Statement::UnsetProperty { name } => {
                overrides.remove(name);
                Ok(ExecuteResult::message(format!("property:{name} unset")))
            }
            Statement::Show(_) | Statement::Describe { .. } | Statement::Explain { .. } => {
                Err(StatementErrorKind::NotExecutable)
            }
        };
        result.map_err(|kind| StatementError::new(text, kind))
    }

    /// Parses, prepares and executes every statement in `sql`.
    ///
    /// Stops at the first failure; statements before it stay applied.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Parse` or `EngineError::Statement`.
    pub fn execute_script(
        &self,
        sql: &str,
        config: &EngineConfig,
        overrides: &mut PropertyOverrides,
    ) -> Result<Vec<QueryHandle>, EngineError> {
        let mut queries = Vec::new();
        for parsed in self.parse(sql)? {
            let prepared = self.prepare(&parsed)?;
            if let Some(query) = self.execute(&prepared, config, overrides)?.query {
                queries.push(query);
            }
        }
        Ok(queries)
    }

    /// Creates an isolated copy of this engine.
    ///
    /// The sandbox sees the current catalog and queries, predicts the ids
    /// this engine would allocate, and never touches external state.
    #[must_use]
    pub fn create_sandbox(&self) -> ExecutionEngine {
        let services = self.services.sandboxed();
        let state = self.state.sandbox_copy(services.topic_admin());
        tracing::debug!(
            persistent_queries = self.number_of_persistent_queries(),
            "Sandbox created"
        );
        ExecutionEngine {
            state,
            services,
            persistent_ids: Arc::new(SandboxQueryIds::new(QueryIdView::new(Arc::clone(
                &self.persistent_ids,
            )))),
            transient_ids: Arc::new(SandboxQueryIds::new(QueryIdView::new(Arc::clone(
                &self.transient_ids,
            )))),
            config: self.config.clone(),
            sandbox: true,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of registered queries, transient and persistent.
    #[must_use]
    pub fn number_of_live_queries(&self) -> usize {
        self.state.queries.lock().len()
    }

    /// Number of registered persistent queries.
    #[must_use]
    pub fn number_of_persistent_queries(&self) -> usize {
        self.state.queries.lock().persistent().count()
    }

    /// Looks up a registered persistent query.
    #[must_use]
    pub fn persistent_query(&self, id: &QueryId) -> Option<QueryHandle> {
        self.state
            .queries
            .lock()
            .get(id)
            .filter(|q| q.kind() == QueryKind::Persistent)
            .cloned()
    }

    /// All registered persistent queries, oldest first.
    #[must_use]
    pub fn persistent_queries(&self) -> Vec<QueryHandle> {
        self.state.queries.lock().persistent().cloned().collect()
    }

    /// A snapshot of the catalog.
    #[must_use]
    pub fn metastore(&self) -> MetaStore {
        self.state.metastore.read().clone()
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The collaborators this engine uses.
    #[must_use]
    pub fn services(&self) -> &ServiceContext {
        &self.services
    }

    /// Whether this engine is a sandbox.
    #[must_use]
    pub fn is_sandbox(&self) -> bool {
        self.sandbox
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes every registered query. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let queries = self.state.queries.lock().all();
        let count = queries.len();
        for query in queries {
            query.close();
        }
        if self.sandbox {
            tracing::debug!(queries = count, "Sandbox closed");
        } else {
            tracing::info!(queries = count, "Engine closed");
        }
    }

    fn terminate(&self, query_id: &str) -> Result<ExecuteResult, StatementErrorKind> {
        let id = QueryId::new(query_id);
        let handle = self
            .persistent_query(&id)
            .filter(|q| q.state() == QueryState::Started)
            .ok_or(StatementErrorKind::NotExecutable)?;
        handle.close();
        tracing::info!(query_id = %id, "Query terminated");
        Ok(ExecuteResult::message(format!("Query {id} terminated.")))
    }

    fn application_id(&self, config: &EngineConfig, kind: QueryKind, id: &QueryId) -> String {
        let prefix = match kind {
            QueryKind::Persistent => &config.persistent_query_prefix,
            QueryKind::Transient => &config.transient_query_prefix,
        };
        format!("_eddy-{}{prefix}{id}", config.service_id)
    }
}

fn effective_config(
    config: &EngineConfig,
    overrides: &PropertyOverrides,
) -> Result<EngineConfig, StatementErrorKind> {
    config
        .with_overrides(overrides)
        .map_err(|e| StatementErrorKind::Invalid(e.to_string()))
}

fn analysis_error(error: AnalysisError) -> StatementErrorKind {
    StatementErrorKind::Invalid(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryQueryRuntime, InMemorySchemaRegistry, InMemoryTopicAdmin};

    fn engine() -> (ExecutionEngine, Arc<InMemoryTopicAdmin>) {
        let admin = Arc::new(InMemoryTopicAdmin::new());
        admin.add_topic("test1", 1, 1);
        let services = ServiceContext::new(
            admin.clone(),
            Arc::new(InMemorySchemaRegistry::new()),
            Arc::new(InMemoryQueryRuntime::new()),
        );
        (ExecutionEngine::new(services, EngineConfig::default()), admin)
    }

    fn run(engine: &ExecutionEngine, sql: &str) -> Result<ExecuteResult, StatementError> {
        let parsed = engine.parse(sql).unwrap().remove(0);
        let prepared = engine.prepare(&parsed)?;
        engine.execute(&prepared, &EngineConfig::default(), &mut PropertyOverrides::new())
    }

    #[test]
    fn test_set_and_unset_update_overrides() {
        let (engine, _) = engine();
        let mut overrides = PropertyOverrides::new();
        let config = EngineConfig::default();

        let set = engine.parse("SET 'auto.offset.reset' = 'earliest';").unwrap();
        let prepared = engine.prepare(&set[0]).unwrap();
        let result = engine.execute(&prepared, &config, &mut overrides).unwrap();
        assert_eq!(
            result.command_result.as_deref(),
            Some("property:auto.offset.reset set to earliest")
        );
        assert_eq!(
            overrides.get("auto.offset.reset").map(String::as_str),
            Some("earliest")
        );

        let unset = engine.parse("UNSET 'auto.offset.reset';").unwrap();
        let prepared = engine.prepare(&unset[0]).unwrap();
        let result = engine.execute(&prepared, &config, &mut overrides).unwrap();
        assert_eq!(
            result.command_result.as_deref(),
            Some("property:auto.offset.reset unset")
        );
        assert!(overrides.is_empty());
    }

    #[test]
    fn test_show_is_not_executable() {
        let (engine, _) = engine();
        let err = run(&engine, "SHOW STREAMS;").unwrap_err();
        assert!(matches!(err.kind(), StatementErrorKind::NotExecutable));
        assert_eq!(err.raw_message(), "Statement not executable");
    }

    #[test]
    fn test_transient_query_ids_and_app_id() {
        let (engine, _) = engine();
        run(
            &engine,
            "CREATE STREAM test1 (col0 BIGINT) WITH (KAFKA_TOPIC='test1', VALUE_FORMAT='JSON');",
        )
        .unwrap();

        let query = run(&engine, "SELECT * FROM test1;").unwrap().query.unwrap();
        assert_eq!(query.id().as_str(), "TRANSIENT_0");
        assert_eq!(query.kind(), QueryKind::Transient);
        assert_eq!(query.application_id(), "_eddy-default_transient_TRANSIENT_0");
        assert_eq!(engine.number_of_live_queries(), 1);
        assert_eq!(engine.number_of_persistent_queries(), 0);

        query.close();
        assert_eq!(engine.number_of_live_queries(), 0);
    }

    #[test]
    fn test_closed_engine_rejects_statements() {
        let (engine, _) = engine();
        engine.close();
        engine.close();
        let err = run(&engine, "SET 'a' = 'b';").unwrap_err();
        assert!(matches!(err.kind(), StatementErrorKind::Closed));
        assert_eq!(err.raw_message(), "Engine is closed");
    }

    #[test]
    fn test_bad_sink_override_only_fails_queries() {
        let (engine, _) = engine();
        run(
            &engine,
            "CREATE STREAM test1 (col0 BIGINT) WITH (KAFKA_TOPIC='test1', VALUE_FORMAT='JSON');",
        )
        .unwrap();
        let config = EngineConfig::default();
        let mut overrides = PropertyOverrides::new();
        let exec = |sql: &str, overrides: &mut PropertyOverrides| {
            let parsed = engine.parse(sql).unwrap();
            let prepared = engine.prepare(&parsed[0]).unwrap();
            engine.execute(&prepared, &config, overrides)
        };

        let result = exec("SET 'sink.partitions' = 'many';", &mut overrides).unwrap();
        assert_eq!(
            result.command_result.as_deref(),
            Some("property:sink.partitions set to many")
        );
        exec("SET 'auto.offset.reset' = 'earliest';", &mut overrides).unwrap();

        let err = exec("CREATE STREAM s AS SELECT * FROM test1;", &mut overrides).unwrap_err();
        assert_eq!(
            err.raw_message(),
            "Invalid value 'many' for property 'sink.partitions'"
        );

        let result = exec("UNSET 'sink.partitions';", &mut overrides).unwrap();
        assert_eq!(
            result.command_result.as_deref(),
            Some("property:sink.partitions unset")
        );
        assert!(!overrides.contains_key("sink.partitions"));
        exec("CREATE STREAM s AS SELECT * FROM test1;", &mut overrides).unwrap();
    }
}
