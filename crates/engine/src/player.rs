//! Player Adapter capability.
//!
//! The engine never owns a media player; it drives one through
//! [`PlayerAdapter`]. Every poll re-reads the player into a fresh
//! [`PlayerSnapshot`], so no command is ever assumed to have succeeded.

use async_trait::async_trait;
use cuemark_core::types::Seconds;
use serde::{Deserialize, Serialize};

use crate::error::PlayerError;

/// Playback state reported by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Unstarted,
    Playing,
    Paused,
    Buffering,
    Ended,
}

/// Point-in-time view of the player used for one resolver tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub current_time: Seconds,
    pub volume: u8,
    pub rate: f64,
    pub state: PlayerState,
}

/// Passive notifications pushed by the player integration.
///
/// Delivery order relative to the engine's own polls is not guaranteed.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerNotification {
    StateChanged(PlayerState),
    Error(String),
}

/// Capability interface over an external, seekable media player.
#[async_trait]
pub trait PlayerAdapter: Send + Sync {
    async fn current_time(&self) -> Result<Seconds, PlayerError>;

    async fn duration(&self) -> Result<Seconds, PlayerError>;

    async fn playback_rate(&self) -> Result<f64, PlayerError>;

    async fn set_playback_rate(&self, rate: f64) -> Result<(), PlayerError>;

    /// Volume as a percentage, 0-100.
    async fn volume(&self) -> Result<u8, PlayerError>;

    async fn set_volume(&self, percent: u8) -> Result<(), PlayerError>;

    async fn play(&self) -> Result<(), PlayerError>;

    async fn pause(&self) -> Result<(), PlayerError>;

    async fn seek_to(&self, seconds: Seconds) -> Result<(), PlayerError>;

    async fn state(&self) -> Result<PlayerState, PlayerError>;
}

/// Read time, volume, rate and state in one pass.
///
/// The first failing call aborts the read; callers skip the tick.
pub async fn read_snapshot(player: &dyn PlayerAdapter) -> Result<PlayerSnapshot, PlayerError> {
    Ok(PlayerSnapshot {
        current_time: player.current_time().await?,
        volume: player.volume().await?,
        rate: player.playback_rate().await?,
        state: player.state().await?,
    })
}
