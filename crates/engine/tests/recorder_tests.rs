//! Integration tests for the recording task.
//!
//! A `SimulatedPlayer` is manipulated the way a user would (volume drag,
//! seek, pause) while `start_recording` samples it on the paused clock.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use cuemark_core::{parse, serialize_session, PlaybackMode, RawEventKind};
use cuemark_engine::{
    start_recording, EngineError, PlayerAdapter, RecorderConfig, SimulatedPlayer,
};
use tokio_util::sync::CancellationToken;

async fn sleep_secs(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

// ---------------------------------------------------------------------------
// Test: a scripted manipulation is captured once per change
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn records_each_manipulation_once() {
    let player = Arc::new(SimulatedPlayer::playing_from(120.0, 0.0));
    let cancel = CancellationToken::new();
    let handle = start_recording(player.clone(), 7, RecorderConfig::default(), &cancel)
        .await
        .unwrap();

    sleep_secs(2.0).await;
    player.set_volume(50).await.unwrap();
    sleep_secs(2.0).await;
    player.seek_to(60.0).await.unwrap();
    sleep_secs(2.0).await;
    player.pause().await.unwrap();
    sleep_secs(3.0).await;
    player.play().await.unwrap();
    sleep_secs(1.0).await;
    handle.mark().unwrap();
    sleep_secs(0.5).await;

    let session = handle.stop().await.unwrap();

    assert_eq!(session.document_id, 7);
    assert_eq!(session.initial_volume, 100);
    assert_eq!(session.initial_rate, 1.0);
    assert_eq!(session.total_duration, 120.0);

    assert_eq!(session.count_of(RawEventKind::Volume), 1);
    assert_eq!(session.count_of(RawEventKind::Speed), 0);
    assert_eq!(session.count_of(RawEventKind::Seek), 1);
    assert_eq!(session.count_of(RawEventKind::Pause), 1);
    assert_eq!(session.count_of(RawEventKind::Manual), 1);

    let pause = session
        .raw_events
        .iter()
        .find(|e| e.kind == RawEventKind::Pause)
        .unwrap();
    assert_eq!(pause.value, 3.0);

    let seek = session
        .raw_events
        .iter()
        .find(|e| e.kind == RawEventKind::Seek)
        .unwrap();
    assert!((seek.value - 60.0).abs() < 0.5, "destination {}", seek.value);
}

// ---------------------------------------------------------------------------
// Test: the recording serializes to text that parses back
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn recording_serializes_to_parseable_text() {
    let player = Arc::new(SimulatedPlayer::playing_from(120.0, 0.0));
    let cancel = CancellationToken::new();
    let handle = start_recording(player.clone(), 1, RecorderConfig::default(), &cancel)
        .await
        .unwrap();

    sleep_secs(2.0).await;
    player.set_volume(50).await.unwrap();
    sleep_secs(2.0).await;
    player.seek_to(60.0).await.unwrap();
    sleep_secs(2.0).await;
    player.pause().await.unwrap();
    sleep_secs(3.0).await;
    player.play().await.unwrap();
    sleep_secs(1.0).await;

    let session = handle.stop().await.unwrap();
    let text = serialize_session(&session);
    let annotations = parse(&text);

    assert_eq!(annotations.len(), 3, "text:\n{text}");
    assert_eq!(annotations[0].volume, 50);
    assert_eq!(annotations[0].mode, PlaybackMode::Jump);
    assert_eq!(annotations[1].mode, PlaybackMode::Pause { seconds: 3 });
    // The seek crosses more than 30 s, so the text has two blocks.
    assert!(text.contains("\n\n"));
}

// ---------------------------------------------------------------------------
// Test: start fails when the player cannot be read
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn start_fails_without_player() {
    let player = Arc::new(SimulatedPlayer::playing_from(120.0, 0.0));
    player.fail_next(1).await;

    let result = start_recording(player, 1, RecorderConfig::default(), &CancellationToken::new()).await;

    assert_matches!(result, Err(EngineError::Player(_)));
}

// ---------------------------------------------------------------------------
// Test: cancelling the parent token abandons the recording
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn cancelled_recording_cannot_be_stopped() {
    let player = Arc::new(SimulatedPlayer::playing_from(120.0, 0.0));
    let cancel = CancellationToken::new();
    let handle = start_recording(player, 1, RecorderConfig::default(), &cancel)
        .await
        .unwrap();

    cancel.cancel();
    sleep_secs(0.5).await;

    assert_matches!(handle.stop().await, Err(EngineError::Closed));
}
