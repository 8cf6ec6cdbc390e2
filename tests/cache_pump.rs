mod common;

use common::{test_config, ScriptedEngine};
use spectrum_sync::api::dto::SourceIdDto;
use spectrum_sync::sync::FlushOutcome;
use spectrum_sync::{CanvasTransform, NodeHandle, Position, SyncSession};
use std::sync::Arc;
use std::time::Duration;

async fn session_with_source(engine: Arc<ScriptedEngine>) -> (SyncSession<ScriptedEngine>, NodeHandle) {
    let session = SyncSession::new(engine, test_config());
    let handle = session
        .add_source_node(SourceIdDto::PrismChannel { channel: 0 }, None, None)
        .await
        .unwrap();
    (session, handle)
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_moves_coalesces_into_one_write() {
    let engine = Arc::new(ScriptedEngine::new());
    let (session, handle) = session_with_source(engine.clone()).await;

    for i in 1..=10 {
        session
            .move_node(handle, Position::new(10.0 * i as f64, 5.0))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(engine.cache_write_count(), 0);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let writes = engine.cache_writes();
    assert_eq!(writes.len(), 1);
    let pos = writes[0].node_positions["source:prism:0"];
    assert_eq!((pos.x, pos.y), (100.0, 5.0));
}

#[tokio::test(start_paused = true)]
async fn test_single_flight_with_one_follow_up() {
    let engine = Arc::new(ScriptedEngine::new());
    let (session, handle) = session_with_source(engine.clone()).await;
    engine.set_cache_delay(Duration::from_secs(5));

    session.move_node(handle, Position::new(1.0, 1.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(session.pump().is_in_flight());

    // Edits while the write hangs; each debounce expiry finds it in flight
    session.move_node(handle, Position::new(2.0, 2.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    session.move_node(handle, Position::new(3.0, 3.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(engine.cache_write_count(), 0);

    tokio::time::sleep(Duration::from_secs(20)).await;
    let writes = engine.cache_writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(engine.max_cache_in_flight(), 1);
    let last = writes[1].node_positions["source:prism:0"];
    assert_eq!((last.x, last.y), (3.0, 3.0));
    assert!(!session.pump().is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_layout_is_not_resent() {
    let engine = Arc::new(ScriptedEngine::new());
    let (session, handle) = session_with_source(engine.clone()).await;

    session.move_node(handle, Position::new(50.0, 50.0)).unwrap();
    assert_eq!(session.pump().flush().await, FlushOutcome::Sent);

    session.move_node(handle, Position::new(60.0, 60.0)).unwrap();
    session.move_node(handle, Position::new(50.0, 50.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(engine.cache_write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_canvas_commit_skips_debounce() {
    let engine = Arc::new(ScriptedEngine::new());
    let session = SyncSession::new(engine.clone(), test_config());

    assert!(session.commit_canvas(CanvasTransform::new(-120.0, 40.0, 0.75).unwrap()));
    tokio::time::sleep(Duration::from_millis(1)).await;

    let writes = engine.cache_writes();
    assert_eq!(writes.len(), 1);
    let canvas = writes[0].canvas_transform.unwrap();
    assert_eq!((canvas.x, canvas.y, canvas.scale), (-120.0, 40.0, 0.75));
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_retries_on_next_edit() {
    let engine = Arc::new(ScriptedEngine::new());
    let (session, handle) = session_with_source(engine.clone()).await;
    engine.fail_cache(true);

    session.move_node(handle, Position::new(7.0, 7.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(engine.cache_write_count(), 0);
    assert!(!session.pump().is_scheduled());

    engine.fail_cache(false);
    session.move_node(handle, Position::new(8.0, 8.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let writes = engine.cache_writes();
    assert_eq!(writes.len(), 1);
    let pos = writes[0].node_positions["source:prism:0"];
    assert_eq!((pos.x, pos.y), (8.0, 8.0));
}
