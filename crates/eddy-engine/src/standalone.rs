//! Runs a fixed script of statements without a request-serving front end.
//!
//! The whole script is validated in a sandbox before anything touches the
//! real engine, so a bad statement anywhere leaves no partial state behind.

use eddy_sql::{ParsedStatement, Statement};

use crate::config::{EngineConfig, PropertyOverrides};
use crate::engine::ExecutionEngine;
use crate::error::{EngineError, StatementError, StatementErrorKind};
use crate::query::{QueryHandle, QueryKind};

/// Executes a queries file and keeps its persistent queries running until
/// [`stop`](Self::stop).
#[derive(Debug)]
pub struct StandaloneExecutor {
    engine: ExecutionEngine,
    config: EngineConfig,
    queries: Vec<QueryHandle>,
}

impl StandaloneExecutor {
    /// Wraps `engine`, executing with the engine's own configuration.
    #[must_use]
    pub fn new(engine: ExecutionEngine) -> Self {
        let config = engine.config().clone();
        Self {
            engine,
            config,
            queries: Vec::new(),
        }
    }

    /// Validates `script` in a sandbox, then executes it and starts every
    /// persistent query it creates.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Parse` for a syntax error and
    /// `EngineError::Statement` for an unsupported or invalid statement.
    /// Validation failures leave the engine untouched.
    pub fn start(&mut self, script: &str) -> Result<(), EngineError> {
        let statements = self.engine.parse(script)?;
        for statement in &statements {
            check_supported(statement)?;
        }

        self.validate(&statements)?;

        let mut overrides = PropertyOverrides::new();
        for statement in &statements {
            let prepared = self.engine.prepare(statement)?;
            let result = self.engine.execute(&prepared, &self.config, &mut overrides)?;
            if let Some(query) = result.query {
                if query.kind() == QueryKind::Persistent {
                    query.start().map_err(|e| {
                        StatementError::new(query.statement_text(), StatementErrorKind::from(e))
                    })?;
                }
                self.queries.push(query);
            }
        }

        tracing::info!(
            statements = statements.len(),
            queries = self.queries.len(),
            "Queries file executed"
        );
        Ok(())
    }

    fn validate(&self, statements: &[ParsedStatement]) -> Result<(), EngineError> {
        let sandbox = self.engine.create_sandbox();
        let mut overrides = PropertyOverrides::new();
        let result = statements.iter().try_for_each(|statement| {
            let prepared = sandbox.prepare(statement)?;
            sandbox.execute(&prepared, &self.config, &mut overrides)?;
            Ok::<(), StatementError>(())
        });
        sandbox.close();
        result?;
        tracing::debug!(statements = statements.len(), "Queries file validated");
        Ok(())
    }

    /// Queries created by [`start`](Self::start).
    #[must_use]
    pub fn queries(&self) -> &[QueryHandle] {
        &self.queries
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Closes the engine and every query.
    pub fn stop(&self) {
        self.engine.close();
    }
}

fn check_supported(statement: &ParsedStatement) -> Result<(), StatementError> {
    match statement.statement {
        Statement::CreateSource(_)
        | Statement::CreateAsSelect(_)
        | Statement::InsertInto(_)
        | Statement::SetProperty { .. }
        | Statement::UnsetProperty { .. } => Ok(()),
        _ => Err(StatementError::new(
            &statement.text,
            StatementErrorKind::Invalid(format!("Unsupported statement: {}", statement.text)),
        )),
    }
}
