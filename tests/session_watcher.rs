//! Integration Tests - Session File Token Rotation
//!
//! Exercises `TokenWatcher` against a real temp file and the scripted
//! transport: a rewritten session file must move the live stream onto
//! the new token.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};

use btc_price_stream::adapters::session::{SessionStore, TokenWatcher};
use btc_price_stream::domain::ConnectionStatus;
use btc_price_stream::ports::TokenSource;

use common::{client, ScriptedConnector};

fn session_file(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("btc-watcher-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("session.json")
}

fn write_token(path: &PathBuf, token: &str) {
    std::fs::write(path, format!(r#"{{"auth_token":"{token}"}}"#)).unwrap();
}

#[tokio::test]
async fn test_rewritten_session_moves_stream_to_new_token() {
    let path = session_file("rotate");
    write_token(&path, "first.session.token");

    let store = Arc::new(SessionStore::new());
    assert_ok!(store.load_file(&path));

    let connector = ScriptedConnector::new();
    let _first = connector.accept();
    let _second = connector.accept();
    let client = client(&connector, Arc::clone(&store) as Arc<dyn TokenSource>);
    assert_ok!(client.connect().await);

    let mut watcher = TokenWatcher::new(
        path.clone(),
        Duration::from_secs(5),
        Arc::clone(&store),
        Arc::clone(&client),
    );

    // First look records the file; same token, so the stream stays put.
    assert!(watcher.check_and_reload().await);
    assert!(!watcher.check_and_reload().await);
    assert_eq!(connector.open_count(), 1);

    write_token(&path, "second.session.token");
    assert!(watcher.check_and_reload().await);

    assert_eq!(store.auth_token().as_deref(), Some("second.session.token"));
    let urls = connector.open_urls();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[1].query(), Some("token=second.session.token"));
    assert_eq!(client.connection_status(), ConnectionStatus::Connected);

    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[tokio::test]
async fn test_missing_or_broken_file_keeps_session() {
    let path = session_file("broken");
    write_token(&path, "kept.session.token");

    let store = Arc::new(SessionStore::new());
    assert_ok!(store.load_file(&path));
    let connector = ScriptedConnector::new();
    let client = client(&connector, Arc::clone(&store) as Arc<dyn TokenSource>);

    let mut watcher = TokenWatcher::new(
        path.clone(),
        Duration::from_secs(5),
        Arc::clone(&store),
        Arc::clone(&client),
    );
    assert!(watcher.check_and_reload().await);

    std::fs::write(&path, "{ not json").unwrap();
    assert!(!watcher.check_and_reload().await);
    assert_err!(SessionStore::read_file(&path));

    std::fs::remove_file(&path).unwrap();
    assert!(!watcher.check_and_reload().await);

    assert_eq!(store.auth_token().as_deref(), Some("kept.session.token"));
    assert_eq!(connector.open_count(), 0);

    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[tokio::test]
async fn test_watcher_stops_on_shutdown() {
    let path = session_file("shutdown");
    write_token(&path, "idle.session.token");

    let store = Arc::new(SessionStore::new());
    let connector = ScriptedConnector::new();
    let client = client(&connector, Arc::clone(&store) as Arc<dyn TokenSource>);
    let watcher = TokenWatcher::new(path.clone(), Duration::from_millis(10), store, client);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(watcher.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();

    assert_ok!(tokio::time::timeout(Duration::from_secs(1), handle).await);
    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}
