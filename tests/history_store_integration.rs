//! Integration tests for the SQLite history store.
//!
//! Exercised through the `HistoryStoreFactory` / `HistoryStore` ports so
//! the behaviour holds for whatever the registry opens.

use serde_json::{json, Map};
use tempfile::TempDir;

use trackbridge::adapters::sqlite::SqliteStoreFactory;
use trackbridge::domain::event::{QueryCondition, SortColumn, SortDirection};
use trackbridge::domain::foundation::{ProjectId, RunId};
use trackbridge::ports::{HistoryStoreFactory, WriteOptions};

// =============================================================================
// Test Infrastructure
// =============================================================================

fn factory(dir: &TempDir) -> SqliteStoreFactory {
    SqliteStoreFactory::new(dir.path(), "projectdb", false)
}

fn project(id: &str) -> ProjectId {
    ProjectId::new(id).unwrap()
}

fn run(id: &str) -> RunId {
    RunId::new(id).unwrap()
}

// =============================================================================
// Status
// =============================================================================

#[tokio::test]
async fn status_is_an_upsert_per_run_and_series() {
    let dir = TempDir::new().unwrap();
    let store = factory(&dir).open(&project("p1")).await.unwrap();

    store.set_status(&run("r1"), "config", &json!({"lr": 0.1})).await.unwrap();
    store.set_status(&run("r1"), "config", &json!({"lr": 0.01})).await.unwrap();
    store.set_status(&run("r1"), "progress", &json!(0.5)).await.unwrap();
    store.set_status(&run("r2"), "config", &json!({"lr": 1})).await.unwrap();

    let all = store.get_status(None, None).await.unwrap();
    assert_eq!(all["r1"]["config"], json!({"lr": 0.01}));
    assert_eq!(all["r1"].len(), 2);
    assert_eq!(all["r2"]["config"], json!({"lr": 1}));

    let only_config = store.get_status(None, Some("config")).await.unwrap();
    assert!(only_config.values().all(|by_series| by_series.len() == 1));

    let one_run = store.get_status(Some(&run("r2")), None).await.unwrap();
    assert_eq!(one_run.keys().collect::<Vec<_>>(), vec!["r2"]);
}

// =============================================================================
// Retention
// =============================================================================

#[tokio::test]
async fn retention_keeps_most_recent_rows() {
    let dir = TempDir::new().unwrap();
    let store = factory(&dir).open(&project("p2")).await.unwrap();

    for i in 0..15 {
        store
            .write_event(
                "scalar",
                &json!(i),
                WriteOptions::new()
                    .run_id(run("r1"))
                    .series("loss")
                    .retention_limit(Some(10)),
            )
            .await
            .unwrap();
    }
    // Another series of the same run is counted separately.
    store
        .write_event(
            "scalar",
            &json!("other"),
            WriteOptions::new().run_id(run("r1")).series("acc").retention_limit(Some(10)),
        )
        .await
        .unwrap();

    let loss = store
        .read_events("scalar", &QueryCondition::new().with_series("loss"))
        .await
        .unwrap();
    let values: Vec<_> = loss.iter().map(|row| row.json.clone()).collect();
    assert_eq!(values, (5..15).map(|i| json!(i)).collect::<Vec<_>>());

    let acc = store
        .read_events("scalar", &QueryCondition::new().with_series("acc"))
        .await
        .unwrap();
    assert_eq!(acc.len(), 1);
}

#[tokio::test]
async fn unlimited_writes_are_never_trimmed() {
    let dir = TempDir::new().unwrap();
    let store = factory(&dir).open(&project("p3")).await.unwrap();
    for i in 0..12 {
        store
            .write_event("log", &json!(i), WriteOptions::new().run_id(run("r")))
            .await
            .unwrap();
    }
    let rows = store
        .read_events(
            "log",
            &QueryCondition::new()
                .order_by(SortColumn::Id, SortDirection::Desc)
                .with_limit(3),
        )
        .await
        .unwrap();
    assert_eq!(rows.iter().map(|r| r.json.clone()).collect::<Vec<_>>(), vec![
        json!(11),
        json!(10),
        json!(9)
    ]);
}

// =============================================================================
// Cascade delete
// =============================================================================

#[tokio::test]
async fn deleting_a_run_removes_its_rows_everywhere() {
    let dir = TempDir::new().unwrap();
    let store = factory(&dir).open(&project("p4")).await.unwrap();

    for r in ["r1", "r2"] {
        store
            .write_event("log", &json!(r), WriteOptions::new().run_id(run(r)))
            .await
            .unwrap();
        store
            .write_blob(
                "image",
                &json!({"name": r}),
                &[1, 2, 3],
                WriteOptions::new().run_id(run(r)).series("sample"),
            )
            .await
            .unwrap();
        store.set_status(&run(r), "progress", &json!(1.0)).await.unwrap();
    }

    assert!(store.delete_run_id(&run("r2")).await.unwrap());
    assert!(!store.delete_run_id(&run("r2")).await.unwrap());

    let runs: Vec<_> = store
        .get_run_ids()
        .await
        .unwrap()
        .into_iter()
        .map(|info| info.run_id)
        .collect();
    assert_eq!(runs, vec![run("r1")]);

    let logs = store.read_events("log", &QueryCondition::new()).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].run_id.as_deref(), Some("r1"));

    let images = store.read_blobs("image", &QueryCondition::new(), false).await.unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].blob.as_deref(), Some(&[1u8, 2, 3][..]));

    let status = store.get_status(None, None).await.unwrap();
    assert!(!status.contains_key("r2"));
}

// =============================================================================
// Reopen and discovery
// =============================================================================

#[tokio::test]
async fn history_survives_reopen_and_is_discovered() {
    let dir = TempDir::new().unwrap();
    {
        let store = factory(&dir).open(&project("persisted")).await.unwrap();
        let mut updates = Map::new();
        updates.insert("owner".into(), json!("me"));
        store.fetch_or_create_metadata(&run("r"), Some(updates)).await.unwrap();
        store
            .write_event("progress", &json!({"step": 1}), WriteOptions::new().run_id(run("r")))
            .await
            .unwrap();
    }

    let factory = factory(&dir);
    assert_eq!(factory.discover().await.unwrap(), vec![project("persisted")]);

    let store = factory.open(&project("persisted")).await.unwrap();
    let metadata = store.fetch_or_create_metadata(&run("r"), None).await.unwrap();
    assert_eq!(metadata["owner"], "me");
    assert_eq!(
        store.series_of("progress", None).await.unwrap(),
        Vec::<String>::new()
    );
    assert_eq!(store.read_events("progress", &QueryCondition::new()).await.unwrap().len(), 1);
}
