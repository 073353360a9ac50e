//! `cuemark-sim` -- plays a notes file against the simulated player.
//!
//! Reconciles the notes into an in-memory store, starts a playback session
//! over a `SimulatedPlayer`, lets it run for the video duration and then logs
//! every command the player received.
//!
//! # Environment variables
//!
//! | Variable                    | Required | Default | Description                              |
//! |-----------------------------|----------|---------|------------------------------------------|
//! | `CUEMARK_NOTES_FILE`        | yes      | --      | Path to the annotated notes text         |
//! | `CUEMARK_SIM_DURATION_SECS` | no       | `60`    | Length of the simulated video            |
//! | `CUEMARK_SIM_REALTIME`      | no       | `true`  | `false` runs on a paused clock (instant) |
//!
//! Engine tuning is read by `EngineConfig::from_env`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cuemark_engine::{
    EngineConfig, InMemoryAnnotationRepository, PlaybackSession, Reconciler, SimulatedPlayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default simulated video length.
const DEFAULT_DURATION_SECS: f64 = 60.0;

const SESSION_ID: i64 = 1;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cuemark_engine=info,cuemark_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let notes_path = std::env::var("CUEMARK_NOTES_FILE")
        .context("CUEMARK_NOTES_FILE environment variable is required")?;
    let notes = std::fs::read_to_string(&notes_path)
        .with_context(|| format!("Failed to read notes file {notes_path}"))?;

    let duration: f64 = std::env::var("CUEMARK_SIM_DURATION_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|d: &f64| d.is_finite() && *d > 0.0)
        .unwrap_or(DEFAULT_DURATION_SECS);

    let realtime = std::env::var("CUEMARK_SIM_REALTIME")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(true);

    if !realtime {
        tokio::time::pause();
    }

    let config = EngineConfig::from_env();
    let repository = Arc::new(InMemoryAnnotationRepository::new());
    let annotations = Reconciler::new(repository.clone())
        .reconcile(SESSION_ID, &notes)
        .await?;

    tracing::info!(
        notes_path = %notes_path,
        duration,
        realtime,
        count = annotations.len(),
        "Starting cuemark-sim",
    );
    for a in &annotations {
        tracing::info!(document_index = a.document_index, annotation = %a, "Parsed annotation");
    }

    let player = Arc::new(SimulatedPlayer::playing_from(duration, 0.0));
    let (session, handle) =
        PlaybackSession::new(SESSION_ID, player.clone(), repository, config);
    let task = tokio::spawn(session.run());

    // Let the video play out, plus time for a final pause-resume.
    tokio::time::sleep(Duration::from_secs_f64(duration + 5.0)).await;

    handle.shutdown();
    task.await.context("Playback session panicked")?;

    for call in player.calls().await {
        tracing::info!(at_ms = call.at.as_millis() as u64, call = ?call.call, "Player command");
    }

    Ok(())
}
