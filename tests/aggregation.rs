use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use dualboard::io::memory::{MemoryBackend, Row};
use dualboard::model::{EntityType, Origin, Record, TaskStatus};
use dualboard::partition::{
    Backend, ChangeNotifier, PartitionHandle, PartitionSet, Query, Subscription,
    SubscriptionRequest,
};
use dualboard::{DualSource, Result};
use serde_json::{Value, json};

fn rows(value: Value) -> Vec<Row> {
    value
        .as_array()
        .expect("array of rows")
        .iter()
        .map(|row| row.as_object().cloned().expect("object row"))
        .collect()
}

fn present(backend: &MemoryBackend) -> PartitionHandle {
    PartitionHandle::Present(Arc::new(backend.clone()))
}

fn source(alec: &MemoryBackend, nate: &MemoryBackend) -> DualSource {
    DualSource::new(PartitionSet::new(present(alec), present(nate)))
}

fn field<'a>(record: &'a Record, name: &str) -> &'a Value {
    record.get(name).expect("field present")
}

fn timestamp(seconds: i64) -> String {
    DateTime::from_timestamp(1_700_000_000 + seconds, 0)
        .expect("valid timestamp")
        .to_rfc3339()
}

#[tokio::test]
async fn absent_partitions_yield_empty_views() {
    let source = DualSource::new(PartitionSet::empty());

    assert!(source.get_all_engineers().await.is_empty());
    assert!(source.get_all_tasks().await.is_empty());
    assert!(source.get_all_feed().await.is_empty());

    let counts = source.get_task_counts().await;
    for status in TaskStatus::ALL {
        assert_eq!(counts.total.get(status), 0);
        assert_eq!(counts.alec.get(status), 0);
        assert_eq!(counts.nate.get(status), 0);
    }
}

#[tokio::test]
async fn engineers_filter_partition_a_to_managed_subset() {
    let alec = MemoryBackend::for_origin(Origin::Alec).with_rows(
        "engineers",
        rows(json!([{"id": 1, "manager": "jarvis"}, {"id": 2, "manager": "other"}])),
    );
    let nate = MemoryBackend::for_origin(Origin::Nate).with_rows("engineers", rows(json!([{"id": 9}])));

    let engineers = source(&alec, &nate).get_all_engineers().await;
    let values: Vec<Value> = engineers
        .iter()
        .map(|record| serde_json::to_value(record).expect("serialised"))
        .collect();

    assert_eq!(
        values,
        vec![
            json!({"id": 1, "manager": "jarvis", "origin": "alec"}),
            json!({"id": 9, "origin": "nate"}),
        ]
    );
}

#[tokio::test]
async fn partition_a_precedes_partition_b_regardless_of_completion() {
    let alec = MemoryBackend::for_origin(Origin::Alec)
        .with_rows("tasks", rows(json!([{"id": 30, "status": "queued"}, {"id": 40}])));
    let nate = MemoryBackend::for_origin(Origin::Nate)
        .with_rows("tasks", rows(json!([{"id": 1, "status": "blocked"}, {"id": 2}])));
    alec.set_query_delay(Some(Duration::from_millis(50)));

    let tasks = source(&alec, &nate).get_all_tasks().await;
    let origins: Vec<Option<Origin>> = tasks.iter().map(Record::origin).collect();
    let ids: Vec<&Value> = tasks.iter().map(|record| field(record, "id")).collect();

    assert_eq!(
        origins,
        vec![Some(Origin::Alec), Some(Origin::Alec), Some(Origin::Nate), Some(Origin::Nate)]
    );
    assert_eq!(ids, vec![&json!(30), &json!(40), &json!(1), &json!(2)]);
}

#[tokio::test]
async fn task_counts_sum_partitions_into_total() {
    let alec = MemoryBackend::for_origin(Origin::Alec).with_rows(
        "tasks",
        rows(json!([
            {"status": "queued"},
            {"status": "queued"},
            {"status": "in_progress"},
            {"status": "archived"},
            {"title": "no status"}
        ])),
    );
    let nate = MemoryBackend::for_origin(Origin::Nate).with_rows(
        "tasks",
        rows(json!([
            {"status": "queued"},
            {"status": "completed"},
            {"status": "blocked"}
        ])),
    );
    let source = source(&alec, &nate);

    let counts = source.get_task_counts().await;
    for status in TaskStatus::ALL {
        assert_eq!(
            counts.total.get(status),
            counts.alec.get(status) + counts.nate.get(status)
        );
    }
    assert_eq!(counts.total.queued, 3);
    assert_eq!(counts.alec.in_progress, 1);
    assert_eq!(counts.nate.blocked, 1);

    let task_count = source.get_all_tasks().await.len();
    assert_eq!(task_count, 8);
    assert_eq!(counts.total.sum(), 6);
    assert!(counts.total.sum() < task_count);
}

#[tokio::test]
async fn feed_is_sorted_capped_and_drawn_from_local_top_fifty() {
    let alec_rows: Vec<Value> = (0..80)
        .map(|i| json!({"id": format!("a{i}"), "created_at": timestamp(i * 3)}))
        .collect();
    let nate_rows: Vec<Value> = (0..70)
        .map(|i| json!({"id": format!("n{i}"), "created_at": timestamp(i * 4 + 1)}))
        .collect();
    let alec = MemoryBackend::for_origin(Origin::Alec).with_rows("feed", rows(Value::Array(alec_rows)));
    let nate = MemoryBackend::for_origin(Origin::Nate).with_rows("feed", rows(Value::Array(nate_rows)));

    let feed = source(&alec, &nate).get_all_feed().await;
    assert_eq!(feed.len(), 50);

    let times: Vec<_> = feed
        .iter()
        .map(|record| record.timestamp("created_at").expect("timestamp"))
        .collect();
    assert!(times.windows(2).all(|pair| pair[0] >= pair[1]));

    let alec_local: HashSet<String> = (30..80).map(|i| format!("a{i}")).collect();
    let nate_local: HashSet<String> = (20..70).map(|i| format!("n{i}")).collect();
    for record in &feed {
        let id = field(record, "id").as_str().expect("string id").to_string();
        match record.origin() {
            Some(Origin::Alec) => assert!(alec_local.contains(&id), "{id} outside alec top 50"),
            Some(Origin::Nate) => assert!(nate_local.contains(&id), "{id} outside nate top 50"),
            None => panic!("record without origin"),
        }
    }
}

#[tokio::test]
async fn feed_excludes_items_without_timestamp() {
    let alec = MemoryBackend::for_origin(Origin::Alec).with_rows(
        "feed",
        rows(json!([
            {"id": "old", "created_at": timestamp(0)},
            {"id": "undated"},
            {"id": "garbled", "created_at": "soon"}
        ])),
    );
    let nate = MemoryBackend::for_origin(Origin::Nate)
        .with_rows("feed", rows(json!([{"id": "new", "created_at": timestamp(60)}])));

    let feed = source(&alec, &nate).get_all_feed().await;
    let ids: Vec<&Value> = feed.iter().map(|record| field(record, "id")).collect();
    assert_eq!(ids, vec![&json!("new"), &json!("old")]);
}

#[tokio::test]
async fn failing_partition_contributes_nothing() {
    let alec = MemoryBackend::for_origin(Origin::Alec)
        .with_rows("engineers", rows(json!([{"id": 1, "manager": "jarvis"}])));
    alec.set_fail_queries(true);
    let nate = MemoryBackend::for_origin(Origin::Nate)
        .with_rows("engineers", rows(json!([{"id": 7}, {"id": 8}, {"id": 9}])));

    let engineers = source(&alec, &nate).get_all_engineers().await;

    assert_eq!(engineers.len(), 3);
    assert!(engineers.iter().all(|record| record.origin() == Some(Origin::Nate)));
    assert_eq!(alec.query_count(), 1);
}

struct PanickingBackend;

#[async_trait]
impl Backend for PanickingBackend {
    async fn query(&self, _query: &Query) -> Result<Vec<Row>> {
        panic!("backend client crashed");
    }

    async fn subscribe(
        &self,
        _request: &SubscriptionRequest,
        _notifier: ChangeNotifier,
    ) -> Result<Box<dyn Subscription>> {
        panic!("backend client crashed");
    }
}

#[tokio::test]
async fn panicking_partition_contributes_nothing() {
    let nate = MemoryBackend::for_origin(Origin::Nate).with_rows("tasks", rows(json!([{"id": 5}])));
    let source = DualSource::new(PartitionSet::new(
        PartitionHandle::Present(Arc::new(PanickingBackend)),
        present(&nate),
    ));

    let tasks = source.get_all_tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].origin(), Some(Origin::Nate));
}

#[tokio::test]
async fn single_present_partition_is_aggregated_alone() {
    let nate = MemoryBackend::for_origin(Origin::Nate)
        .with_rows("engineers", rows(json!([{"id": 3, "manager": "other"}])));
    let source = DualSource::new(PartitionSet::new(PartitionHandle::Absent, present(&nate)));

    let engineers = source.aggregator().aggregate(EntityType::Engineers).await;
    assert_eq!(engineers.len(), 1);
    assert_eq!(field(&engineers[0], "origin"), &json!("nate"));
}

#[tokio::test]
async fn feed_orders_offsetless_and_offset_timestamps_together() {
    let alec = MemoryBackend::for_origin(Origin::Alec).with_rows(
        "feed",
        rows(json!([
            {"id": "naive", "created_at": "2024-05-01T10:00:00"},
            {"id": "spaced", "created_at": "2024-05-01 08:00:00+00"}
        ])),
    );
    let nate = MemoryBackend::for_origin(Origin::Nate).with_rows(
        "feed",
        rows(json!([
            {"id": "offset", "created_at": "2024-05-01T11:00:00+02:00"},
            {"id": "zulu", "created_at": "2024-05-01T12:00:00Z"}
        ])),
    );

    let feed = source(&alec, &nate).get_all_feed().await;
    let ids: Vec<&Value> = feed.iter().map(|record| field(record, "id")).collect();
    assert_eq!(
        ids,
        vec![&json!("zulu"), &json!("naive"), &json!("offset"), &json!("spaced")]
    );
}

/// Returns every stored row in insertion order, ignoring filter, order and
/// limit.
struct UnboundedBackend {
    rows: Vec<Row>,
}

#[async_trait]
impl Backend for UnboundedBackend {
    async fn query(&self, _query: &Query) -> Result<Vec<Row>> {
        Ok(self.rows.clone())
    }

    async fn subscribe(
        &self,
        request: &SubscriptionRequest,
        _notifier: ChangeNotifier,
    ) -> Result<Box<dyn Subscription>> {
        Err(dualboard::SyncError::Subscribe {
            channel: request.channel.clone(),
            reason: "not supported".to_string(),
        })
    }
}

#[tokio::test]
async fn feed_caps_each_partition_even_when_backend_ignores_limit() {
    let alec_rows: Vec<Value> = (0..80)
        .map(|i| json!({"id": format!("a{i}"), "created_at": timestamp(i * 10)}))
        .collect();
    let nate_rows: Vec<Value> = (0..3)
        .map(|i| json!({"id": format!("n{i}"), "created_at": timestamp(i)}))
        .collect();
    let alec = UnboundedBackend {
        rows: rows(Value::Array(alec_rows)),
    };
    let nate = MemoryBackend::for_origin(Origin::Nate).with_rows("feed", rows(Value::Array(nate_rows)));
    let source = DualSource::new(PartitionSet::new(
        PartitionHandle::Present(Arc::new(alec)),
        present(&nate),
    ));

    let feed = source.get_all_feed().await;
    let alec_ids: Vec<&str> = feed
        .iter()
        .filter(|record| record.origin() == Some(Origin::Alec))
        .filter_map(|record| field(record, "id").as_str())
        .collect();

    assert_eq!(alec_ids.len(), 50);
    assert_eq!(alec_ids.first(), Some(&"a79"));
    assert_eq!(alec_ids.last(), Some(&"a30"));
    assert!(alec_ids.iter().all(|id| id[1..].parse::<i64>().expect("numeric id") >= 30));
    assert_eq!(feed.len(), 50);
}
