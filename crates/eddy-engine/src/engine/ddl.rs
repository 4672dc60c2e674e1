//! CREATE STREAM/TABLE and DROP.

use std::sync::Arc;

use arrow_schema::{Field, FieldRef};
use eddy_sql::parser::statements::property;
use eddy_sql::parser::{CreateSourceStatement, DropSourceStatement};
use eddy_sql::types::arrow_type_to_sql;
use eddy_sql::{ColumnDefinition, SourceKind, ValueFormat};

use super::{ExecuteResult, ExecutionEngine};
use crate::avro;
use crate::error::{ExternalResourceError, MetaStoreError, StatementErrorKind};
use crate::metastore::{source_schema, DataSource, ROWKEY, ROWTIME};
use crate::services::value_subject;

impl ExecutionEngine {
    pub(super) fn create_source(
        &self,
        create: &CreateSourceStatement,
        text: &str,
    ) -> Result<ExecuteResult, StatementErrorKind> {
        let props = &create.properties;
        let topic = props.kafka_topic().ok_or_else(|| {
            StatementErrorKind::Invalid(
                "Corresponding Kafka topic (KAFKA_TOPIC) should be set in WITH clause.".to_string(),
            )
        })?;
        let value_format = props.value_format()?.ok_or_else(|| {
            StatementErrorKind::Invalid(
                "Topic format(VALUE_FORMAT) should be set in WITH clause.".to_string(),
            )
        })?;

        let mut metastore = self.state.metastore.write();
        if let Some(existing) = metastore.get_source(&create.name) {
            return Err(MetaStoreError::DuplicateSource {
                kind: existing.kind,
                name: existing.name.clone(),
            }
            .into());
        }

        let admin = self.services.topic_admin();
        if !admin.topic_exists(topic)? {
            return Err(ExternalResourceError::TopicNotFound(topic.to_string()).into());
        }

        let (columns, inferred) = if create.columns.is_empty() {
            if value_format != ValueFormat::Avro {
                return Err(StatementErrorKind::Invalid(
                    "The statement does not define any columns.".to_string(),
                ));
            }
            (self.infer_avro_columns(topic)?, true)
        } else {
            (create.columns.clone(), false)
        };

        for (name, key) in [
            ("KEY", props.key_field()),
            (
                "TIMESTAMP",
                props.get(property::TIMESTAMP).map(str::to_ascii_uppercase),
            ),
        ] {
            if let Some(column) = key {
                let known = column == ROWTIME
                    || column == ROWKEY
                    || columns.iter().any(|c| c.name == column);
                if !known {
                    return Err(StatementErrorKind::Invalid(format!(
                        "The {name} column set in the WITH clause does not exist in the schema: {column}"
                    )));
                }
            }
        }

        let sql_expression = if inferred {
            render_create(create.kind, &create.name, &columns, topic)
        } else {
            text.to_string()
        };
        let fields: Vec<FieldRef> = columns
            .iter()
            .map(|c| Arc::new(Field::new(&c.name, c.data_type.clone(), true)))
            .collect();

        metastore.add_source(DataSource {
            name: create.name.clone(),
            kind: create.kind,
            topic: topic.to_string(),
            value_format,
            schema: source_schema(fields),
            key_field: props.key_field(),
            sql_expression,
        })?;

        tracing::info!(
            name = %create.name,
            kind = %create.kind,
            topic,
            sandbox = self.sandbox,
            "Source created"
        );
        Ok(ExecuteResult::message(match create.kind {
            SourceKind::Stream => "Stream created",
            SourceKind::Table => "Table created",
        }))
    }

    fn infer_avro_columns(&self, topic: &str) -> Result<Vec<ColumnDefinition>, StatementErrorKind> {
        let latest = self
            .services
            .schema_registry()
            .latest_schema(&value_subject(topic))?
            .ok_or_else(|| ExternalResourceError::SchemaNotFound {
                topic: topic.to_string(),
            })?;
        avro::value_columns(&latest.schema)
            .map_err(|e| StatementErrorKind::Invalid(e.to_string()))
    }

    pub(super) fn drop_source(
        &self,
        drop: &DropSourceStatement,
    ) -> Result<ExecuteResult, StatementErrorKind> {
        let mut metastore = self.state.metastore.write();

        let Some(source) = metastore.get_source(&drop.name) else {
            let message = format!("Source {} does not exist.", drop.name);
            return if drop.if_exists {
                Ok(ExecuteResult::message(message))
            } else {
                Err(StatementErrorKind::Invalid(message))
            };
        };
        if source.kind != drop.kind {
            return Err(StatementErrorKind::Invalid(format!(
                "Incompatible data source type is {}, but statement was DROP {}",
                source.kind, drop.kind
            )));
        }
        let source = metastore.check_removable(&drop.name)?.clone();

        if drop.delete_topic {
            let shared = metastore
                .sources_on_topic(&source.topic)
                .iter()
                .any(|s| s.name != source.name);
            if shared {
                tracing::warn!(
                    name = %source.name,
                    topic = %source.topic,
                    "Topic is used by other sources; not deleting it"
                );
            } else {
                if source.value_format == ValueFormat::Avro {
                    self.services
                        .schema_registry()
                        .delete_subject(&value_subject(&source.topic))?;
                }
                self.services
                    .topic_admin()
                    .delete_topics(std::slice::from_ref(&source.topic))?;
            }
        }

        metastore.remove_source(&drop.name)?;
        tracing::info!(
            name = %drop.name,
            delete_topic = drop.delete_topic,
            sandbox = self.sandbox,
            "Source dropped"
        );
        Ok(ExecuteResult::message(format!(
            "Source {} was dropped.",
            drop.name
        )))
    }
}

fn render_create(kind: SourceKind, name: &str, columns: &[ColumnDefinition], topic: &str) -> String {
    let columns = columns
        .iter()
        .map(|c| format!("{} {}", c.name, arrow_type_to_sql(&c.data_type)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE {kind} {name} ({columns}) WITH (KAFKA_TOPIC='{topic}', VALUE_FORMAT='AVRO');"
    )
}
