//! Catalog of named data sources and the queries that read and write them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use arrow_schema::{DataType, Field, FieldRef, Schema, SchemaRef};
use eddy_sql::{SourceKind, ValueFormat};

use crate::error::MetaStoreError;
use crate::query_id::QueryId;

/// Implicit event-time column present in every source.
pub const ROWTIME: &str = "ROWTIME";
/// Implicit message-key column present in every source.
pub const ROWKEY: &str = "ROWKEY";

/// Returns `true` for the implicit `ROWTIME` / `ROWKEY` columns.
#[must_use]
pub fn is_implicit_column(name: &str) -> bool {
    name == ROWTIME || name == ROWKEY
}

/// Builds a source schema: implicit columns first, then `value_fields`.
#[must_use]
pub fn source_schema(value_fields: impl IntoIterator<Item = FieldRef>) -> SchemaRef {
    let mut fields: Vec<FieldRef> = vec![
        Arc::new(Field::new(ROWTIME, DataType::Int64, true)),
        Arc::new(Field::new(ROWKEY, DataType::Utf8, true)),
    ];
    fields.extend(
        value_fields
            .into_iter()
            .filter(|f| !is_implicit_column(f.name())),
    );
    Arc::new(Schema::new(fields))
}

/// A named stream or table backed by a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    /// Source name.
    pub name: String,
    /// Stream or table.
    pub kind: SourceKind,
    /// Backing topic.
    pub topic: String,
    /// Value serialization format.
    pub value_format: ValueFormat,
    /// Full schema including `ROWTIME` and `ROWKEY`.
    pub schema: SchemaRef,
    /// Key column, if declared.
    pub key_field: Option<String>,
    /// Statement text that defined the source.
    pub sql_expression: String,
}

impl DataSource {
    /// The value columns: every column except the implicit ones.
    pub fn value_fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.schema
            .fields()
            .iter()
            .filter(|f| !is_implicit_column(f.name()))
    }

    /// Looks up a column, implicit columns included.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldRef> {
        self.schema.fields().iter().find(|f| f.name() == name)
    }
}

/// Data sources by name plus the source/query edges.
///
/// `Clone` yields a fully independent copy; schemas are shared immutably.
#[derive(Debug, Clone, Default)]
pub struct MetaStore {
    sources: BTreeMap<String, DataSource>,
    readers: HashMap<String, Vec<QueryId>>,
    writers: HashMap<String, Vec<QueryId>>,
}

impl MetaStore {
    /// Creates an empty metastore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source.
    ///
    /// # Errors
    ///
    /// Returns `MetaStoreError::DuplicateSource` if the name is taken.
    pub fn add_source(&mut self, source: DataSource) -> Result<(), MetaStoreError> {
        if let Some(existing) = self.sources.get(&source.name) {
            return Err(MetaStoreError::DuplicateSource {
                kind: existing.kind,
                name: existing.name.clone(),
            });
        }
        self.sources.insert(source.name.clone(), source);
        Ok(())
    }

    /// Looks up a source by name.
    #[must_use]
    pub fn get_source(&self, name: &str) -> Option<&DataSource> {
        self.sources.get(name)
    }

    /// Returns `true` if a source with this name exists.
    #[must_use]
    pub fn contains_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// All sources in name order.
    pub fn sources(&self) -> impl Iterator<Item = &DataSource> {
        self.sources.values()
    }

    /// Number of registered sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Sources backed by `topic`.
    #[must_use]
    pub fn sources_on_topic(&self, topic: &str) -> Vec<&DataSource> {
        self.sources.values().filter(|s| s.topic == topic).collect()
    }

    /// Checks that `name` exists and no query reads or writes it.
    ///
    /// # Errors
    ///
    /// Returns `SourceNotFound` or `ReferentialIntegrity`.
    pub fn check_removable(&self, name: &str) -> Result<&DataSource, MetaStoreError> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| MetaStoreError::SourceNotFound(name.to_string()))?;

        let readers = self.readers.get(name).cloned().unwrap_or_default();
        let writers = self.writers.get(name).cloned().unwrap_or_default();
        if !readers.is_empty() || !writers.is_empty() {
            return Err(MetaStoreError::ReferentialIntegrity {
                name: name.to_string(),
                readers,
                writers,
            });
        }
        Ok(source)
    }

    /// Removes a source that no query references. Nothing changes on error.
    ///
    /// # Errors
    ///
    /// Returns `SourceNotFound` or `ReferentialIntegrity`.
    pub fn remove_source(&mut self, name: &str) -> Result<DataSource, MetaStoreError> {
        self.check_removable(name)?;
        self.readers.remove(name);
        self.writers.remove(name);
        self.sources
            .remove(name)
            .ok_or_else(|| MetaStoreError::SourceNotFound(name.to_string()))
    }

    /// Records that query `id` reads `sources` and writes `sink`.
    ///
    /// # Errors
    ///
    /// Returns `SourceNotFound` if any named source is missing; nothing is
    /// recorded in that case.
    pub fn add_persistent_query(
        &mut self,
        id: &QueryId,
        sources: &[String],
        sink: &str,
    ) -> Result<(), MetaStoreError> {
        if let Some(missing) = sources
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(sink))
            .find(|name| !self.sources.contains_key(*name))
        {
            return Err(MetaStoreError::SourceNotFound(missing.to_string()));
        }

        for source in sources {
            let readers = self.readers.entry(source.clone()).or_default();
            if !readers.contains(id) {
                readers.push(id.clone());
            }
        }
        let writers = self.writers.entry(sink.to_string()).or_default();
        if !writers.contains(id) {
            writers.push(id.clone());
        }
        Ok(())
    }

    /// Removes every edge of query `id`.
    pub fn remove_persistent_query(&mut self, id: &QueryId) {
        for edges in [&mut self.readers, &mut self.writers] {
            edges.retain(|_, ids| {
                ids.retain(|q| q != id);
                !ids.is_empty()
            });
        }
    }

    /// Ids of queries reading from `name`.
    #[must_use]
    pub fn queries_with_source(&self, name: &str) -> HashSet<QueryId> {
        self.readers
            .get(name)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids of queries writing into `name`.
    #[must_use]
    pub fn queries_with_sink(&self, name: &str) -> HashSet<QueryId> {
        self.writers
            .get(name)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, kind: SourceKind, topic: &str) -> DataSource {
        DataSource {
            name: name.to_string(),
            kind,
            topic: topic.to_string(),
            value_format: ValueFormat::Json,
            schema: source_schema([Arc::new(Field::new("COL0", DataType::Int64, true))]),
            key_field: None,
            sql_expression: String::new(),
        }
    }

    fn store() -> MetaStore {
        let mut store = MetaStore::new();
        store
            .add_source(source("TEST1", SourceKind::Stream, "test1"))
            .unwrap();
        store
            .add_source(source("FOO", SourceKind::Table, "FOO"))
            .unwrap();
        store
    }

    #[test]
    fn test_schema_has_implicit_columns_first() {
        let s = source("S", SourceKind::Stream, "s");
        let names: Vec<_> = s.schema.fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["ROWTIME", "ROWKEY", "COL0"]);
        assert_eq!(s.value_fields().count(), 1);
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let mut store = store();
        let err = store
            .add_source(source("FOO", SourceKind::Stream, "other"))
            .unwrap_err();
        assert!(matches!(
            err,
            MetaStoreError::DuplicateSource {
                kind: SourceKind::Table,
                ..
            }
        ));
    }

    #[test]
    fn test_referential_integrity() {
        let mut store = store();
        let id = QueryId::new("CTAS_FOO_1");
        store
            .add_persistent_query(&id, &["TEST1".to_string()], "FOO")
            .unwrap();

        let err = store.remove_source("FOO").unwrap_err();
        assert_eq!(
            err,
            MetaStoreError::ReferentialIntegrity {
                name: "FOO".to_string(),
                readers: vec![],
                writers: vec![id.clone()],
            }
        );
        assert!(store.contains_source("FOO"));
        assert!(store.remove_source("TEST1").is_err());

        store.remove_persistent_query(&id);
        assert!(store.queries_with_sink("FOO").is_empty());
        assert!(store.remove_source("FOO").is_ok());
        assert!(store.remove_source("TEST1").is_ok());
    }

    #[test]
    fn test_add_query_with_unknown_source_changes_nothing() {
        let mut store = store();
        let err = store
            .add_persistent_query(&QueryId::new("Q"), &["TEST1".to_string()], "MISSING")
            .unwrap_err();
        assert_eq!(err, MetaStoreError::SourceNotFound("MISSING".to_string()));
        assert!(store.queries_with_source("TEST1").is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let original = store();
        let mut copy = original.clone();
        copy.add_source(source("BAR", SourceKind::Stream, "BAR"))
            .unwrap();
        copy.add_persistent_query(&QueryId::new("CSAS_BAR_0"), &["TEST1".to_string()], "BAR")
            .unwrap();

        assert!(!original.contains_source("BAR"));
        assert!(original.queries_with_source("TEST1").is_empty());
        assert_eq!(copy.queries_with_source("TEST1").len(), 1);
    }

    #[test]
    fn test_sources_on_topic() {
        let mut store = store();
        store
            .add_source(source("TEST1_COPY", SourceKind::Stream, "test1"))
            .unwrap();
        assert_eq!(store.sources_on_topic("test1").len(), 2);
        assert_eq!(store.sources_on_topic("FOO").len(), 1);
    }
}
