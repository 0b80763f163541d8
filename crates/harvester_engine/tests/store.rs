use std::sync::Once;
use std::time::{Duration, Instant};

use harvester_core::{Record, RunSummary, StopReason, UpsertOutcome};
use harvester_engine::{MemoryStore, RecordStore, SqliteStore, StoreError, TableSchema};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn schema() -> TableSchema {
    TableSchema::search_timeline()
}

fn post(id: &str, text: &str, likes: u64) -> Record {
    Record::new(id, "Test")
        .with_field("author", "alice")
        .with_field("text", text)
        .with_field("timestamp", "2024-05-01T10:00:00Z")
        .with_counter("likes", likes)
}

fn stores() -> Vec<(&'static str, Box<dyn RecordStore>)> {
    vec![
        ("memory", Box::new(MemoryStore::new())),
        ("sqlite", Box::new(SqliteStore::in_memory(schema()).unwrap())),
    ]
}

#[test]
fn second_sighting_merges_instead_of_inserting() {
    init_logging();
    for (name, store) in stores() {
        let record = post("https://x.test/alice/status/1", "hello", 5);
        assert_eq!(store.upsert(&record).unwrap(), UpsertOutcome::Inserted, "{name}");
        assert_eq!(store.upsert(&record).unwrap(), UpsertOutcome::Merged, "{name}");
        assert_eq!(store.count("Test").unwrap(), 1, "{name}");
    }
}

#[test]
fn counters_never_decrease() {
    for (name, store) in stores() {
        store.upsert(&post("p1", "hello", 10)).unwrap();
        store.upsert(&post("p1", "hello", 4)).unwrap();
        let stored = store.get("p1", "Test").unwrap().unwrap();
        assert_eq!(stored.counter("likes"), 10, "{name}");

        store.upsert(&post("p1", "hello", 12)).unwrap();
        let stored = store.get("p1", "Test").unwrap().unwrap();
        assert_eq!(stored.counter("likes"), 12, "{name}");
    }
}

#[test]
fn blank_text_does_not_clobber_stored_text() {
    for (name, store) in stores() {
        store.upsert(&post("p1", "original caption", 1)).unwrap();
        store.upsert(&post("p1", "   ", 1)).unwrap();
        let stored = store.get("p1", "Test").unwrap().unwrap();
        assert_eq!(stored.text(), "original caption", "{name}");

        store.upsert(&post("p1", "edited caption", 1)).unwrap();
        let stored = store.get("p1", "Test").unwrap().unwrap();
        assert_eq!(stored.text(), "edited caption", "{name}");
    }
}

#[test]
fn same_item_in_two_groups_is_two_rows() {
    for (name, store) in stores() {
        let mut other = post("p1", "hello", 1);
        other.group_key = "Other".to_string();
        assert_eq!(store.upsert(&post("p1", "hello", 1)).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&other).unwrap(), UpsertOutcome::Inserted, "{name}");
        assert_eq!(store.count("Test").unwrap(), 1, "{name}");
        assert_eq!(store.count("Other").unwrap(), 1, "{name}");
        assert_eq!(store.count("Missing").unwrap(), 0, "{name}");
    }
}

#[test]
fn unidentified_records_are_rejected() {
    for (name, store) in stores() {
        let result = store.upsert(&post("  ", "hello", 1));
        assert!(matches!(result, Err(StoreError::Unidentified)), "{name}");
        assert_eq!(store.count("Test").unwrap(), 0, "{name}");
    }
}

#[test]
fn flushed_rows_survive_reopen_and_unflushed_rows_do_not() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("harvest.db");

    {
        let store = SqliteStore::open(&db, schema()).unwrap();
        store.upsert(&post("p1", "one", 1)).unwrap();
        store.upsert(&post("p2", "two", 2)).unwrap();
        store.flush().unwrap();
        store.upsert(&post("p3", "three", 3)).unwrap();
        // Dropped without a flush: the open batch is lost.
    }

    let store = SqliteStore::open(&db, schema()).unwrap();
    assert_eq!(store.count("Test").unwrap(), 2);
    assert!(store.get("p3", "Test").unwrap().is_none());
    assert_eq!(store.get("p2", "Test").unwrap().unwrap().counter("likes"), 2);
}

#[test]
fn reopening_with_wider_schema_adds_columns() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("harvest.db");
    let narrow = TableSchema::new("posts", ["text"], ["likes"]);
    {
        let store = SqliteStore::open(&db, narrow).unwrap();
        store
            .upsert(&Record::new("p1", "Test").with_field("text", "hi"))
            .unwrap();
        store.flush().unwrap();
    }

    let wide = TableSchema::new("posts", ["text", "location"], ["likes", "views"]);
    let store = SqliteStore::open(&db, wide).unwrap();
    let merged = Record::new("p1", "Test")
        .with_field("location", "Oslo")
        .with_counter("views", 7);
    assert_eq!(store.upsert(&merged).unwrap(), UpsertOutcome::Merged);

    let stored = store.get("p1", "Test").unwrap().unwrap();
    assert_eq!(stored.text(), "hi");
    assert_eq!(stored.field("location"), "Oslo");
    assert_eq!(stored.counter("views"), 7);
}

#[test]
fn invalid_schemas_are_refused() {
    let bad_table = TableSchema::new("posts; drop", ["text"], ["likes"]);
    assert!(matches!(
        SqliteStore::in_memory(bad_table),
        Err(StoreError::InvalidSchema(_))
    ));

    let reserved = TableSchema::new("posts", ["group_key"], Vec::<String>::new());
    assert!(matches!(
        SqliteStore::in_memory(reserved),
        Err(StoreError::InvalidSchema(_))
    ));

    let duplicate = TableSchema::new("posts", ["likes"], ["likes"]);
    assert!(matches!(
        SqliteStore::in_memory(duplicate),
        Err(StoreError::InvalidSchema(_))
    ));

    let runs_table = TableSchema::new("harvest_runs", ["text"], ["likes"]);
    assert!(matches!(
        SqliteStore::in_memory(runs_table),
        Err(StoreError::InvalidSchema(_))
    ));
}

#[test]
fn run_summaries_are_recorded() {
    let summary = RunSummary {
        group_key: "Test".to_string(),
        attempted_count: 5,
        saved_count: 3,
        merged_count: 1,
        skipped_count: 0,
        miss_count: 1,
        rounds: 2,
        running_total: 3,
        stop_reason: StopReason::RowLimit,
    };

    let sqlite = SqliteStore::in_memory(schema()).unwrap();
    sqlite.record_run(&summary).unwrap();
    assert_eq!(sqlite.runs("Test").unwrap(), vec![summary.clone()]);
    assert!(sqlite.runs("Other").unwrap().is_empty());

    let memory = MemoryStore::new();
    memory.record_run(&summary).unwrap();
    assert_eq!(memory.runs().unwrap(), vec![summary]);
}

#[test]
fn memory_store_lists_records_per_group() {
    let store = MemoryStore::new();
    store.upsert(&post("b", "two", 1)).unwrap();
    store.upsert(&post("a", "one", 1)).unwrap();
    store.flush().unwrap();

    let ids: Vec<String> = store
        .records("Test")
        .unwrap()
        .into_iter()
        .map(|r| r.source_item_id)
        .collect();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(store.flush_count().unwrap(), 1);
}

#[test]
fn text_is_stored_as_given() {
    for (name, store) in stores() {
        store.upsert(&post("p1", "  padded caption ", 1)).unwrap();
        store.flush().unwrap();
        let stored = store.get("p1", "Test").unwrap().unwrap();
        assert_eq!(stored.text(), "  padded caption ", "{name}");
    }
}

#[test]
fn staged_writes_are_visible_before_flush() {
    for (name, store) in stores() {
        store.upsert(&post("p1", "hello", 3)).unwrap();
        store.upsert(&post("p1", "", 8)).unwrap();
        assert_eq!(store.count("Test").unwrap(), 1, "{name}");
        let staged = store.get("p1", "Test").unwrap().unwrap();
        assert_eq!(staged.text(), "hello", "{name}");
        assert_eq!(staged.counter("likes"), 8, "{name}");

        store.flush().unwrap();
        assert_eq!(store.upsert(&post("p1", "", 2)).unwrap(), UpsertOutcome::Merged, "{name}");
        assert_eq!(store.get("p1", "Test").unwrap().unwrap().counter("likes"), 8, "{name}");
    }
}

#[test]
fn unflushed_batch_does_not_block_another_writer() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("harvest.db");
    let first = SqliteStore::open(&db, schema()).unwrap();
    let second = SqliteStore::open(&db, schema()).unwrap();

    assert_eq!(first.upsert(&post("p1", "one", 1)).unwrap(), UpsertOutcome::Inserted);
    let started = Instant::now();
    assert_eq!(second.upsert(&post("p2", "two", 2)).unwrap(), UpsertOutcome::Inserted);
    second.flush().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(second.count("Test").unwrap(), 1);

    // Both sides saw p1 as new; the shared table still merges it into one row.
    second.upsert(&post("p1", "", 9)).unwrap();
    second.flush().unwrap();
    first.flush().unwrap();

    let reopened = SqliteStore::open(&db, schema()).unwrap();
    assert_eq!(reopened.count("Test").unwrap(), 2);
    let p1 = reopened.get("p1", "Test").unwrap().unwrap();
    assert_eq!(p1.text(), "one");
    assert_eq!(p1.counter("likes"), 9);
}

#[test]
fn unknown_stop_reason_in_history_is_an_error() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("harvest.db");
    let summary = RunSummary {
        group_key: "Test".to_string(),
        attempted_count: 1,
        saved_count: 1,
        merged_count: 0,
        skipped_count: 0,
        miss_count: 0,
        rounds: 1,
        running_total: 1,
        stop_reason: StopReason::Idle,
    };
    {
        let store = SqliteStore::open(&db, schema()).unwrap();
        store.record_run(&summary).unwrap();
    }
    rusqlite::Connection::open(&db)
        .unwrap()
        .execute("UPDATE harvest_runs SET stop_reason = 'GONE_FISHING'", [])
        .unwrap();

    let store = SqliteStore::open(&db, schema()).unwrap();
    assert!(matches!(store.runs("Test"), Err(StoreError::Sqlite(_))));
}
