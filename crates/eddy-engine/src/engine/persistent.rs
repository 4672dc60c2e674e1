//! Query-creating statements: CREATE ... AS SELECT, INSERT INTO and bare
//! SELECT.

use std::sync::Arc;

use arrow_schema::SchemaRef;
use eddy_sql::parser::{CreateAsSelectStatement, InsertIntoStatement};
use eddy_sql::types::arrow_type_to_sql;
use eddy_sql::{SelectStatement, SourceKind, ValueFormat};

use super::{analysis_error, ExecuteResult, ExecutionEngine};
use crate::analyzer::{self, QueryAnalysis};
use crate::avro;
use crate::config::EngineConfig;
use crate::error::{ExternalResourceError, MetaStoreError, StatementErrorKind};
use crate::metastore::{source_schema, DataSource, MetaStore};
use crate::query::{QueryHandle, QueryKind, QueryMetadata};
use crate::query_id::QueryId;
use crate::services::{value_subject, QueryPlan, QueryTopology, SinkPlan};

impl ExecutionEngine {
    pub(super) fn create_as_select(
        &self,
        create: &CreateAsSelectStatement,
        text: &str,
        config: &EngineConfig,
    ) -> Result<ExecuteResult, StatementErrorKind> {
        let mut metastore = self.state.metastore.write();
        let analysis = analyzer::analyze(&create.query, &metastore).map_err(analysis_error)?;

        if analysis.result_kind != create.kind {
            let (produced, statement) = match analysis.result_kind {
                SourceKind::Table => ("TABLE", "CREATE TABLE AS SELECT"),
                SourceKind::Stream => ("STREAM", "CREATE STREAM AS SELECT"),
            };
            return Err(StatementErrorKind::Invalid(format!(
                "Invalid result type. Your SELECT query produces a {produced}. \
                 Please use {statement} statement instead."
            )));
        }
        if let Some(existing) = metastore.get_source(&create.name) {
            return Err(MetaStoreError::DuplicateSource {
                kind: existing.kind,
                name: existing.name.clone(),
            }
            .into());
        }

        let props = &create.properties;
        let sink = SinkPlan {
            name: create.name.clone(),
            topic: props
                .kafka_topic()
                .map_or_else(|| create.name.clone(), str::to_string),
            value_format: props
                .value_format()?
                .unwrap_or(analysis.left().value_format),
            partitions: props.partitions()?.unwrap_or(config.sink.partitions),
            replicas: props.replicas()?.unwrap_or(config.sink.replicas),
        };

        let avro_schema = if sink.value_format == ValueFormat::Avro {
            let schema = avro::sink_value_schema(analysis.result_schema.fields())
                .map_err(|e| StatementErrorKind::Invalid(e.to_string()))?;
            let compatible = self
                .services
                .schema_registry()
                .test_compatibility(&value_subject(&sink.topic), &schema)?;
            if !compatible {
                return Err(ExternalResourceError::SchemaRejected {
                    topic: sink.topic.clone(),
                }
                .into());
            }
            Some(schema)
        } else {
            None
        };
        let topic_exists = self.check_sink_topic(&sink)?;

        let prefix = match create.kind {
            SourceKind::Stream => "CSAS",
            SourceKind::Table => "CTAS",
        };
        let id = QueryId::new(format!(
            "{prefix}_{}_{}",
            create.name,
            self.persistent_ids.next_id()
        ));
        let metadata = self.query_metadata(
            id,
            QueryKind::Persistent,
            text,
            &analysis,
            Some(create.name.clone()),
            config,
        );
        let plan = plan_for(&metadata, Some(sink.clone()));
        let mut topology = self.services.runtime().build(&plan)?;

        let created = self
            .create_sink(&sink, topic_exists, avro_schema.as_deref())
            .and_then(|()| {
                metastore.add_source(DataSource {
                    name: create.name.clone(),
                    kind: create.kind,
                    topic: sink.topic.clone(),
                    value_format: sink.value_format,
                    schema: source_schema(analysis.result_schema.fields().iter().cloned()),
                    key_field: props.key_field(),
                    sql_expression: text.to_string(),
                })?;
                Ok(())
            });
        if let Err(e) = created {
            topology.close();
            return Err(e);
        }
        let handle = self.commit_persistent(&mut metastore, metadata, topology)?;

        tracing::info!(
            query_id = %handle.id(),
            sink = %create.name,
            topic = %sink.topic,
            sandbox = self.sandbox,
            "Persistent query registered"
        );
        Ok(ExecuteResult::query(handle))
    }

    pub(super) fn insert_into(
        &self,
        insert: &InsertIntoStatement,
        text: &str,
        config: &EngineConfig,
    ) -> Result<ExecuteResult, StatementErrorKind> {
        let mut metastore = self.state.metastore.write();
        let analysis = analyzer::analyze(&insert.query, &metastore).map_err(analysis_error)?;

        let target = metastore.get_source(&insert.target).ok_or_else(|| {
            StatementErrorKind::Invalid(format!(
                "Sink does not exist for the INSERT INTO statement: {}",
                insert.target
            ))
        })?;
        if target.kind != SourceKind::Stream {
            return Err(StatementErrorKind::Invalid(format!(
                "INSERT INTO can only be used to insert into a stream. {} is a table.",
                target.name
            )));
        }
        let target_schema = source_schema(target.value_fields().cloned());
        let result_schema = source_schema(analysis.result_schema.fields().iter().cloned());
        if !same_columns(&target_schema, &result_schema) {
            return Err(StatementErrorKind::Invalid(format!(
                "Incompatible schema between results and sink. Result schema is {}, \
                 but the sink schema is {}.",
                render_columns(&result_schema),
                render_columns(&target_schema)
            )));
        }

        let admin = self.services.topic_admin();
        let topic = admin.describe_topic(&target.topic)?;
        let sink = SinkPlan {
            name: target.name.clone(),
            topic: target.topic.clone(),
            value_format: target.value_format,
            partitions: topic.partitions,
            replicas: topic.replicas,
        };

        let id = QueryId::new(format!("INSERTQUERY_{}", self.persistent_ids.next_id()));
        let metadata = self.query_metadata(
            id,
            QueryKind::Persistent,
            text,
            &analysis,
            Some(sink.name.clone()),
            config,
        );
        let plan = plan_for(&metadata, Some(sink));
        let topology = self.services.runtime().build(&plan)?;

        let handle = self.commit_persistent(&mut metastore, metadata, topology)?;
        tracing::info!(
            query_id = %handle.id(),
            sink = %insert.target,
            sandbox = self.sandbox,
            "Persistent query registered"
        );
        Ok(ExecuteResult::query(handle))
    }

    pub(super) fn transient_query(
        &self,
        select: &SelectStatement,
        text: &str,
        config: &EngineConfig,
    ) -> Result<ExecuteResult, StatementErrorKind> {
        let analysis = {
            let metastore = self.state.metastore.read();
            analyzer::analyze(select, &metastore).map_err(analysis_error)?
        };

        let id = QueryId::new(format!("TRANSIENT_{}", self.transient_ids.next_id()));
        let metadata = self.query_metadata(id, QueryKind::Transient, text, &analysis, None, config);
        let topology = self.services.runtime().build(&plan_for(&metadata, None))?;

        let handle = QueryHandle::new(
            metadata,
            Some(topology),
            Arc::clone(self.services.topic_admin()),
            Arc::downgrade(&self.state),
        );
        self.state.queries.lock().register(handle.clone());
        tracing::debug!(query_id = %handle.id(), "Transient query registered");
        Ok(ExecuteResult::query(handle))
    }

    fn query_metadata(
        &self,
        id: QueryId,
        kind: QueryKind,
        text: &str,
        analysis: &QueryAnalysis,
        sink_name: Option<String>,
        config: &EngineConfig,
    ) -> QueryMetadata {
        let application_id = self.application_id(config, kind, &id);
        QueryMetadata {
            id,
            kind,
            statement_text: text.to_string(),
            source_names: analysis.source_names(),
            sink_name,
            result_kind: analysis.result_kind,
            result_schema: Arc::clone(&analysis.result_schema),
            application_id,
            properties: config.properties.clone(),
        }
    }

    /// Fails if the sink topic exists with a different shape. Returns
    /// whether the topic exists.
    fn check_sink_topic(&self, sink: &SinkPlan) -> Result<bool, StatementErrorKind> {
        let admin = self.services.topic_admin();
        if !admin.topic_exists(&sink.topic)? {
            return Ok(false);
        }
        let existing = admin.describe_topic(&sink.topic)?;
        if existing.partitions != sink.partitions || existing.replicas != sink.replicas {
            return Err(ExternalResourceError::TopicConfigMismatch {
                topic: sink.topic.clone(),
                expected_partitions: sink.partitions,
                actual_partitions: existing.partitions,
                expected_replicas: sink.replicas,
                actual_replicas: existing.replicas,
            }
            .into());
        }
        Ok(true)
    }

    /// Creates the sink topic and registers its value schema.
    ///
    /// A topic created here is deleted again if the registration fails.
    fn create_sink(
        &self,
        sink: &SinkPlan,
        topic_exists: bool,
        avro_schema: Option<&str>,
    ) -> Result<(), StatementErrorKind> {
        let admin = self.services.topic_admin();
        if !topic_exists {
            admin.create_topic(&sink.topic, sink.partitions, sink.replicas)?;
        }
        let Some(schema) = avro_schema else {
            return Ok(());
        };
        if let Err(e) = self
            .services
            .schema_registry()
            .register(&value_subject(&sink.topic), schema)
        {
            if !topic_exists {
                if let Err(cleanup) = admin.delete_topics(std::slice::from_ref(&sink.topic)) {
                    tracing::warn!(
                        topic = %sink.topic,
                        error = %cleanup,
                        "Failed to delete sink topic after schema registration failed"
                    );
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Records the query's catalog edges and registers its handle.
    ///
    /// Called with the metastore write guard held, which orders this before
    /// the registry lock. The topology is closed if the catalog refuses.
    fn commit_persistent(
        &self,
        metastore: &mut MetaStore,
        metadata: QueryMetadata,
        mut topology: Box<dyn QueryTopology>,
    ) -> Result<QueryHandle, StatementErrorKind> {
        let sink = metadata.sink_name.clone().unwrap_or_default();
        if let Err(e) = metastore.add_persistent_query(&metadata.id, &metadata.source_names, &sink) {
            topology.close();
            return Err(e.into());
        }
        let handle = QueryHandle::new(
            metadata,
            Some(topology),
            Arc::clone(self.services.topic_admin()),
            Arc::downgrade(&self.state),
        );
        self.state.queries.lock().register(handle.clone());
        Ok(handle)
    }
}

fn plan_for(metadata: &QueryMetadata, sink: Option<SinkPlan>) -> QueryPlan {
    QueryPlan {
        query_id: metadata.id.clone(),
        application_id: metadata.application_id.clone(),
        kind: metadata.kind,
        statement_text: metadata.statement_text.clone(),
        sources: metadata.source_names.clone(),
        sink,
        result_schema: Arc::clone(&metadata.result_schema),
        properties: metadata.properties.clone(),
    }
}

fn same_columns(left: &SchemaRef, right: &SchemaRef) -> bool {
    left.fields().len() == right.fields().len()
        && left
            .fields()
            .iter()
            .zip(right.fields().iter())
            .all(|(l, r)| l.name() == r.name() && l.data_type() == r.data_type())
}

fn render_columns(schema: &SchemaRef) -> String {
    let columns = schema
        .fields()
        .iter()
        .filter(|f| !crate::metastore::is_implicit_column(f.name()))
        .map(|f| format!("{} {}", f.name(), arrow_type_to_sql(f.data_type())))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{columns}]")
}
