//! BotDatabase behaviour tests.
//!
//! Save counting uses `MemoryFs` with a long debounce so the background
//! writer never fires on its own: a change is observable as a pending save,
//! and `flush()` reports whether one was written.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use botdb_state::*;

const PATH: &str = "/var/lib/botdb/alpha.json";

fn parked() -> PersistenceConfig {
    PersistenceConfig {
        save_debounce_ms: Some(60_000),
        ..PersistenceConfig::default()
    }
}

async fn open_memory(fs: &Arc<MemoryFs>) -> BotDatabase {
    let options = DatabaseOptions::default()
        .with_fs(fs.clone())
        .with_persistence(parked())
        .with_bot("alpha");
    BotDatabase::create_or_load(PATH, options).await.unwrap()
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../tests/fixtures/state")
        .join(name)
}

fn pair(key: &str, name: &str) -> (String, String) {
    (key.to_string(), name.to_string())
}

// ── Pending redemption queue ───────────────────────────────────────

#[tokio::test]
async fn enqueue_then_peek_on_empty_queue() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;

    assert_eq!(db.peek_pending(), None);
    assert_eq!(db.enqueue_pending([("KEY-1", "Portal")]).unwrap(), 1);
    assert_eq!(db.peek_pending(), Some(pair("KEY-1", "Portal")));
    assert_eq!(db.pending_len(), 1);
}

#[tokio::test]
async fn enqueue_existing_key_is_a_silent_noop() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;
    db.enqueue_pending([("KEY-1", "Portal")]).unwrap();
    assert!(db.flush().await.unwrap());

    assert_eq!(db.enqueue_pending([("KEY-1", "Something else")]).unwrap(), 0);
    assert_eq!(db.pending_len(), 1);
    assert_eq!(db.peek_pending(), Some(pair("KEY-1", "Portal")));
    assert!(!db.has_pending_save());
    assert!(!db.flush().await.unwrap());
    assert_eq!(fs.write_count(), 1);
}

#[tokio::test]
async fn batch_appends_only_new_keys_in_batch_order() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;
    db.enqueue_pending([("B", "Game B"), ("D", "Game D")]).unwrap();
    assert!(db.flush().await.unwrap());

    let added = db
        .enqueue_pending([
            ("E", "Game E"),
            ("B", "dup"),
            ("A", "Game A"),
            ("E", "dup in batch"),
        ])
        .unwrap();

    assert_eq!(added, 2);
    assert_eq!(
        db.pending_snapshot(),
        vec![
            pair("B", "Game B"),
            pair("D", "Game D"),
            pair("E", "Game E"),
            pair("A", "Game A"),
        ]
    );

    // One save for the whole batch.
    assert!(db.flush().await.unwrap());
    assert_eq!(fs.write_count(), 2);
}

#[tokio::test]
async fn invalid_batches_are_rejected_without_mutation() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;

    let empty: Vec<(String, String)> = Vec::new();
    assert!(matches!(
        db.enqueue_pending(empty),
        Err(StateError::InvalidArgument(_))
    ));
    assert!(matches!(
        db.enqueue_pending([("GOOD", "Game"), ("  ", "Blank")]),
        Err(StateError::InvalidArgument(_))
    ));

    assert_eq!(db.pending_len(), 0);
    assert!(!db.has_pending_save());
}

#[tokio::test]
async fn remove_pending_keeps_order_and_is_idempotent() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;
    db.enqueue_pending([("A", "Game A"), ("B", "Game B"), ("C", "Game C")])
        .unwrap();
    db.flush().await.unwrap();

    assert!(db.remove_pending("B").unwrap());
    assert!(db.flush().await.unwrap());
    assert_eq!(db.pending_snapshot(), vec![pair("A", "Game A"), pair("C", "Game C")]);

    assert!(!db.remove_pending("B").unwrap());
    assert!(!db.has_pending_save());
    assert!(!db.flush().await.unwrap());
    assert_eq!(fs.write_count(), 2);

    assert!(matches!(db.remove_pending(""), Err(StateError::InvalidArgument(_))));
}

// ── Decaying exclusions ────────────────────────────────────────────

#[tokio::test]
async fn sweep_removes_entries_at_or_before_now() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;
    let now = 1_700_000_000;
    db.ignore_risky_app(10, now - 60).unwrap();
    db.ignore_risky_app(20, now).unwrap();
    db.ignore_risky_app(30, now + 1).unwrap();
    db.flush().await.unwrap();

    // Reads never expire entries on their own.
    assert_eq!(db.risky_ignored_until(10), Some(now - 60));

    assert_eq!(db.sweep_expired(now).unwrap(), 2);
    assert!(!db.is_risky_ignored(10));
    assert!(!db.is_risky_ignored(20));
    assert_eq!(db.risky_ignored(), vec![(30, now + 1)]);

    // Both removals share one save.
    assert!(db.flush().await.unwrap());
    assert_eq!(fs.write_count(), 2);

    assert_eq!(db.sweep_expired(now).unwrap(), 0);
    assert!(!db.has_pending_save());
}

#[tokio::test]
async fn reignoring_with_same_expiry_does_not_save() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;
    assert!(db.ignore_risky_app(10, 500).unwrap());
    db.flush().await.unwrap();

    assert!(!db.ignore_risky_app(10, 500).unwrap());
    assert!(!db.has_pending_save());
    assert!(db.ignore_risky_app(10, 900).unwrap());
    assert!(db.has_pending_save());
    assert!(db.unignore_risky_app(10).unwrap());
    assert!(!db.unignore_risky_app(10).unwrap());
}

// ── Sets ───────────────────────────────────────────────────────────

#[tokio::test]
async fn app_sets_are_independent() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;

    assert!(db.add_app(AppSet::FarmingBlacklist, 730).unwrap());
    assert!(!db.add_app(AppSet::FarmingBlacklist, 730).unwrap());
    assert_eq!(db.add_apps(AppSet::MatchActivelyBlacklisted, [570, 440, 570]).unwrap(), 2);

    assert!(db.contains_app(AppSet::FarmingBlacklist, 730));
    assert!(!db.contains_app(AppSet::FarmingPriorityQueue, 730));
    assert_eq!(db.app_ids(AppSet::MatchActivelyBlacklisted), vec![440, 570]);

    assert!(db.remove_app(AppSet::FarmingBlacklist, 730).unwrap());
    assert!(!db.remove_app(AppSet::FarmingBlacklist, 730).unwrap());
    assert!(matches!(
        db.add_app(AppSet::FarmingBlacklist, 0),
        Err(StateError::InvalidArgument(_))
    ));
    assert!(matches!(
        db.add_trading_blacklisted(0),
        Err(StateError::InvalidArgument(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_disjoint_adds_are_all_kept() {
    const THREADS: u32 = 8;
    const PER_THREAD: u32 = 250;

    let fs = Arc::new(MemoryFs::new());
    let db = Arc::new(open_memory(&fs).await);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = db.clone();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let app_id = 1 + t * PER_THREAD + i;
                    assert!(db.add_app(AppSet::FarmingPriorityQueue, app_id).unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let ids = db.app_ids(AppSet::FarmingPriorityQueue);
    assert_eq!(ids.len(), (THREADS * PER_THREAD) as usize);
    assert_eq!(ids.first(), Some(&1));
    assert_eq!(ids.last(), Some(&(THREADS * PER_THREAD)));

    assert!(db.flush().await.unwrap());
    assert_eq!(fs.write_count(), 1);
}

// ── Secrets ────────────────────────────────────────────────────────

#[tokio::test]
async fn setting_a_secret_to_its_current_value_never_saves() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;

    assert!(!db.set_access_token(None).unwrap());
    assert!(!db.has_pending_save());

    assert!(db.set_access_token(Some("token-1".to_string())).unwrap());
    assert!(db.flush().await.unwrap());

    assert!(!db.set_access_token(Some("token-1".to_string())).unwrap());
    assert!(!db.set_refresh_token(None).unwrap());
    assert!(!db.set_steam_guard_data(None).unwrap());
    assert!(!db.has_pending_save());
    assert!(!db.flush().await.unwrap());
    assert_eq!(fs.write_count(), 1);

    assert!(db.set_refresh_token(Some("refresh".to_string())).unwrap());
    assert!(db.has_pending_save());
}

#[tokio::test]
async fn authenticator_replacement_and_change_detection() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;
    let first = MobileAuthenticator::new("c2hhcmVk", "aWRlbnRpdHk=").with_device_id("android:1");

    assert!(db.set_mobile_authenticator(Some(first.clone())).unwrap());
    db.flush().await.unwrap();
    assert!(!db.set_mobile_authenticator(Some(first.clone())).unwrap());
    assert!(!db.has_pending_save());

    let second = MobileAuthenticator::new("bmV3", "bmV3aWQ=");
    assert!(db.set_mobile_authenticator(Some(second.clone())).unwrap());
    assert_eq!(db.mobile_authenticator(), Some(second));

    let blank = MobileAuthenticator::new("", "x");
    assert!(matches!(
        db.set_mobile_authenticator(Some(blank)),
        Err(StateError::InvalidArgument(_))
    ));

    assert!(db.set_mobile_authenticator(None).unwrap());
    assert!(!db.has_mobile_authenticator());
}

// ── Round-trip and file format ─────────────────────────────────────

#[tokio::test]
async fn reload_yields_equivalent_document() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;

    db.set_access_token(Some("access".to_string())).unwrap();
    db.set_refresh_token(Some("refresh".to_string())).unwrap();
    db.set_steam_guard_data(Some("guard".to_string())).unwrap();
    db.set_mobile_authenticator(Some(MobileAuthenticator::new("c2hhcmVk", "aWQ=")))
        .unwrap();
    for (i, set) in AppSet::ALL.into_iter().enumerate() {
        db.add_apps(set, [100 + i as u32, 200 + i as u32]).unwrap();
    }
    db.add_trading_blacklisted(76561198000000042).unwrap();
    db.ignore_risky_app(218620, 4_102_444_800).unwrap();
    db.enqueue_pending([("Z-KEY", "Zeta"), ("A-KEY", "Alpha")]).unwrap();
    db.flush().await.unwrap();
    let before = db.to_file();
    db.dispose();

    let reloaded = open_memory(&fs).await;
    assert_eq!(reloaded.to_file(), before);
    assert_eq!(reloaded.peek_pending(), Some(pair("Z-KEY", "Zeta")));
    assert_eq!(reloaded.access_token().as_deref(), Some("access"));
}

#[tokio::test]
async fn empty_collections_are_omitted_from_output() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;
    db.add_app(AppSet::FarmingBlacklist, 10).unwrap();
    db.flush().await.unwrap();
    let written = fs.contents(Path::new(PATH)).unwrap();
    assert!(written.contains("farming_blacklist_app_ids"));

    db.clear_apps(AppSet::FarmingBlacklist).unwrap();
    db.flush().await.unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&fs.contents(Path::new(PATH)).unwrap()).unwrap();
    assert_eq!(written, serde_json::json!({}));
}

#[tokio::test]
async fn fixture_loads_and_unknown_fields_survive_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full.json");
    std::fs::copy(fixture("full.json"), &path).unwrap();

    let options = DatabaseOptions::default().with_persistence(parked());
    let db = BotDatabase::create_or_load(&path, options).await.unwrap();

    assert_eq!(db.app_ids(AppSet::FarmingBlacklist), vec![303700, 335590, 368020]);
    assert!(db.contains_app(AppSet::FarmingPriorityQueue, 730));
    assert!(db.is_trading_blacklisted(76561198000000001));
    assert_eq!(db.risky_ignored_until(252490), Some(4_102_444_800));
    assert_eq!(db.peek_pending(), Some(pair("AAAAA-BBBBB-CCCCC", "Portal 2")));
    assert_eq!(
        db.mobile_authenticator().and_then(|a| a.device_id),
        Some("android:0f1e2d3c".to_string())
    );

    db.remove_pending("AAAAA-BBBBB-CCCCC").unwrap();
    assert!(db.flush().await.unwrap());

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["ui_theme"], "dark");
    assert_eq!(saved["mobile_authenticator"]["revocation_code"], "R98765");
    assert_eq!(
        saved["games_to_redeem_in_background"],
        serde_json::json!({ "DDDDD-EEEEE-FFFFF": "Half-Life 2" })
    );
}

// ── Load failures ──────────────────────────────────────────────────

#[tokio::test]
async fn broken_files_fail_to_load_and_stay_untouched() {
    let cases: [(&str, fn(&StateError) -> bool); 3] = [
        ("blank.json", |e| matches!(e, StateError::Empty { .. })),
        ("truncated.json", |e| matches!(e, StateError::Malformed { .. })),
        ("zero_app_id.json", |e| matches!(e, StateError::Invalid { .. })),
    ];

    for (name, expected) in cases {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::copy(fixture(name), &path).unwrap();
        let original = std::fs::read(&path).unwrap();

        let err = BotDatabase::create_or_load(&path, DatabaseOptions::default())
            .await
            .unwrap_err();
        assert!(expected(&err), "{name}: unexpected error {err}");
        assert!(err.is_load_error());
        assert_eq!(std::fs::read(&path).unwrap(), original, "{name} was modified");
    }
}

#[tokio::test]
async fn missing_file_creates_fresh_document_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("new-bot.json");

    let db = BotDatabase::create_or_load(&path, DatabaseOptions::default())
        .await
        .unwrap();
    assert_eq!(db.lifecycle(), Lifecycle::Live);
    assert_eq!(db.to_file(), DatabaseFile::default());
    assert!(!path.exists());
}

#[tokio::test]
async fn empty_path_is_an_invalid_argument() {
    let err = BotDatabase::create_or_load("", DatabaseOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StateError::InvalidArgument(_)));
}

// ── Disposal ───────────────────────────────────────────────────────

#[tokio::test]
async fn mutations_after_dispose_fail_fast() {
    let fs = Arc::new(MemoryFs::new());
    let db = open_memory(&fs).await;
    db.set_mobile_authenticator(Some(MobileAuthenticator::new("a", "b")))
        .unwrap();
    db.enqueue_pending([("A", "Game A")]).unwrap();

    db.dispose();
    assert_eq!(db.lifecycle(), Lifecycle::Disposed);
    assert!(!db.has_mobile_authenticator());

    assert!(matches!(db.add_app(AppSet::FarmingBlacklist, 1), Err(StateError::Disposed(_))));
    assert!(matches!(db.enqueue_pending([("B", "Game B")]), Err(StateError::Disposed(_))));
    assert!(matches!(db.remove_pending("A"), Err(StateError::Disposed(_))));
    assert!(matches!(db.sweep_expired(0), Err(StateError::Disposed(_))));
    assert!(matches!(db.set_access_token(None), Err(StateError::Disposed(_))));
    assert!(matches!(db.flush().await, Err(StateError::Disposed(_))));

    // Reads still work; nothing was written.
    assert_eq!(db.peek_pending(), Some(pair("A", "Game A")));
    assert_eq!(fs.write_count(), 0);
}

#[tokio::test]
async fn close_returns_only_after_in_flight_write_lands() {
    let fs = Arc::new(MemoryFs::new());
    fs.set_write_delay(Duration::from_millis(200));
    let options = DatabaseOptions::default()
        .with_fs(fs.clone())
        .with_persistence(PersistenceConfig::immediate());
    let db = BotDatabase::create_or_load(PATH, options).await.unwrap();

    db.add_app(AppSet::FarmingBlacklist, 440).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fs.writes_in_flight(), 1);

    db.close().await;
    assert_eq!(db.lifecycle(), Lifecycle::Disposed);
    assert_eq!(fs.writes_in_flight(), 0);
    assert_eq!(fs.write_count(), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(fs.write_count(), 1);
    assert_eq!(fs.max_concurrent_writes(), 1);
}

// ── Background persistence ─────────────────────────────────────────

async fn wait_for_file(
    path: &Path,
    mut done: impl FnMut(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..300 {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) {
                if done(&value) {
                    return value;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("state file {} never reached the expected content", path.display());
}

#[tokio::test]
async fn redemption_scenario_settles_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bot.json");
    let options = DatabaseOptions::default().with_persistence(PersistenceConfig {
        save_debounce_ms: Some(20),
        ..PersistenceConfig::default()
    });
    let db = BotDatabase::create_or_load(&path, options).await.unwrap();

    db.enqueue_pending([("A", "Game A"), ("B", "Game B")]).unwrap();
    assert_eq!(db.peek_pending(), Some(pair("A", "Game A")));
    assert!(db.remove_pending("A").unwrap());
    assert_eq!(db.peek_pending(), Some(pair("B", "Game B")));

    let saved = wait_for_file(&path, |v| {
        v["games_to_redeem_in_background"] == serde_json::json!({ "B": "Game B" })
    })
    .await;
    assert_eq!(saved.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn background_save_failure_is_swallowed_and_healed_by_next_change() {
    let fs = Arc::new(MemoryFs::new());
    let options = DatabaseOptions::default()
        .with_fs(fs.clone())
        .with_persistence(PersistenceConfig::immediate());
    let db = BotDatabase::create_or_load(PATH, options).await.unwrap();

    fs.set_fail_writes(true);
    db.add_app(AppSet::FarmingBlacklist, 10).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fs.write_count(), 0);
    assert_eq!(db.lifecycle(), Lifecycle::Live);

    fs.set_fail_writes(false);
    db.add_app(AppSet::FarmingBlacklist, 20).unwrap();
    for _ in 0..200 {
        if fs.write_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let saved: serde_json::Value =
        serde_json::from_str(&fs.contents(Path::new(PATH)).unwrap()).unwrap();
    assert_eq!(saved["farming_blacklist_app_ids"], serde_json::json!([10, 20]));
}
