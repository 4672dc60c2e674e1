use std::sync::Arc;

use eddy_engine::memory::{InMemoryQueryRuntime, InMemoryTopicAdmin, TopologyEvent};
use eddy_engine::{EngineBuilder, EngineError, QueryState, StandaloneExecutor};

fn executor() -> (StandaloneExecutor, Arc<InMemoryTopicAdmin>, Arc<InMemoryQueryRuntime>) {
    let topics = Arc::new(InMemoryTopicAdmin::new());
    topics.add_topic("pageviews", 1, 1);
    let runtime = Arc::new(InMemoryQueryRuntime::new());
    let engine = EngineBuilder::new()
        .topic_admin(topics.clone())
        .runtime(runtime.clone())
        .build();
    (StandaloneExecutor::new(engine), topics, runtime)
}

const SCRIPT: &str = "
    CREATE STREAM pageviews (viewtime BIGINT, userid VARCHAR, pageid VARCHAR)
      WITH (KAFKA_TOPIC='pageviews', VALUE_FORMAT='JSON');
    SET 'sink.partitions' = '2';
    CREATE STREAM pageviews_user1 AS SELECT * FROM pageviews WHERE userid = 'User_1';
    CREATE TABLE views_per_page AS SELECT pageid, COUNT(*) AS views FROM pageviews GROUP BY pageid;
    INSERT INTO pageviews_user1 SELECT * FROM pageviews WHERE userid = 'User_2';
";

#[test]
fn test_start_runs_every_persistent_query() {
    let (mut executor, topics, runtime) = executor();
    executor.start(SCRIPT).unwrap();

    let ids: Vec<&str> = executor.queries().iter().map(|q| q.id().as_str()).collect();
    assert_eq!(
        ids,
        [
            "CSAS_PAGEVIEWS_USER1_0",
            "CTAS_VIEWS_PER_PAGE_1",
            "INSERTQUERY_2"
        ]
    );
    assert!(executor
        .queries()
        .iter()
        .all(|q| q.state() == QueryState::Started));
    assert_eq!(
        topics.created_topics(),
        ["PAGEVIEWS_USER1".to_string(), "VIEWS_PER_PAGE".to_string()]
    );
    assert_eq!(topics.calls().len(), 2);
    assert_eq!(runtime.built_plans().len(), 3);

    executor.stop();
    assert_eq!(executor.engine().number_of_live_queries(), 0);
    let closed = runtime
        .events()
        .iter()
        .filter(|e| matches!(e, TopologyEvent::Closed(_)))
        .count();
    assert_eq!(closed, 3);
    assert_eq!(topics.internal_topic_cleanups().len(), 3);
}

#[test]
fn test_invalid_script_leaves_engine_untouched() {
    let (mut executor, topics, runtime) = executor();
    let err = executor
        .start(
            "CREATE STREAM pageviews (pageid VARCHAR) WITH (KAFKA_TOPIC='pageviews', VALUE_FORMAT='JSON');
             CREATE STREAM copied AS SELECT * FROM pageviews;
             CREATE TABLE bad AS SELECT * FROM pageviews;",
        )
        .unwrap_err();

    assert!(matches!(err, EngineError::Statement(_)));
    assert!(err.to_string().starts_with("Invalid result type."));
    assert_eq!(executor.engine().metastore().source_count(), 0);
    assert!(topics.created_topics().is_empty());
    assert!(runtime.built_plans().is_empty());
    assert!(executor.queries().is_empty());
}

#[test]
fn test_unsupported_statement_is_rejected() {
    let (mut executor, _, _) = executor();
    let err = executor
        .start(
            "CREATE STREAM pageviews (pageid VARCHAR) WITH (KAFKA_TOPIC='pageviews', VALUE_FORMAT='JSON');
             SELECT * FROM pageviews;",
        )
        .unwrap_err();
    let EngineError::Statement(err) = err else {
        panic!("expected a statement error");
    };
    assert_eq!(
        err.raw_message(),
        "Unsupported statement: SELECT * FROM pageviews;"
    );
    assert_eq!(executor.engine().metastore().source_count(), 0);
}

#[test]
fn test_parse_error_aborts_start() {
    let (mut executor, _, _) = executor();
    let err = executor.start("blah;").unwrap_err();
    assert!(matches!(err, EngineError::Parse(_)));
}
