//! In-process [`PlayerAdapter`] driven by tokio's clock.
//!
//! Media time advances with `tokio::time::Instant` scaled by the playback
//! rate, so under a paused test runtime the player moves exactly as far as
//! the test sleeps. Commands are logged with their offset from creation.

use std::time::Duration;

use async_trait::async_trait;
use cuemark_core::types::Seconds;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::PlayerError;
use crate::player::{PlayerAdapter, PlayerState};

/// A command received by the simulated player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCall {
    SetVolume(u8),
    SetRate(f64),
    SeekTo(Seconds),
    Play,
    Pause,
}

/// A logged command and when it arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoggedCall {
    pub at: Duration,
    pub call: PlayerCall,
}

#[derive(Debug)]
struct Inner {
    created: Instant,
    duration: Seconds,
    position: Seconds,
    anchored_at: Instant,
    rate: f64,
    volume: u8,
    state: PlayerState,
    failures_left: u32,
    calls: Vec<LoggedCall>,
}

impl Inner {
    /// Fold elapsed playback into `position` and detect end of media.
    fn settle(&mut self) {
        let now = Instant::now();
        if self.state == PlayerState::Playing {
            let dt = now.duration_since(self.anchored_at).as_secs_f64();
            self.position = (self.position + dt * self.rate).min(self.duration);
            if self.position >= self.duration {
                self.state = PlayerState::Ended;
            }
        }
        self.anchored_at = now;
    }

    fn check(&mut self) -> Result<(), PlayerError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(PlayerError::Unavailable("simulated failure".to_string()));
        }
        self.settle();
        Ok(())
    }

    fn log(&mut self, call: PlayerCall) {
        let at = Instant::now().duration_since(self.created);
        self.calls.push(LoggedCall { at, call });
    }
}

#[derive(Debug)]
pub struct SimulatedPlayer {
    inner: Mutex<Inner>,
}

impl SimulatedPlayer {
    /// A cued, not yet playing video of `duration` seconds.
    pub fn new(duration: Seconds) -> Self {
        Self::build(duration, 0.0, PlayerState::Unstarted)
    }

    /// A video already playing from `position`.
    pub fn playing_from(duration: Seconds, position: Seconds) -> Self {
        Self::build(duration, position.clamp(0.0, duration), PlayerState::Playing)
    }

    fn build(duration: Seconds, position: Seconds, state: PlayerState) -> Self {
        let now = Instant::now();
        Self {
            inner: Mutex::new(Inner {
                created: now,
                duration,
                position,
                anchored_at: now,
                rate: 1.0,
                volume: 100,
                state,
                failures_left: 0,
                calls: Vec::new(),
            }),
        }
    }

    /// Make the next `n` adapter calls fail.
    pub async fn fail_next(&self, n: u32) {
        self.inner.lock().await.failures_left = n;
    }

    pub async fn calls(&self) -> Vec<LoggedCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn clear_log(&self) {
        self.inner.lock().await.calls.clear();
    }
}

#[async_trait]
impl PlayerAdapter for SimulatedPlayer {
    async fn current_time(&self) -> Result<Seconds, PlayerError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.position)
    }

    async fn duration(&self) -> Result<Seconds, PlayerError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.duration)
    }

    async fn playback_rate(&self) -> Result<f64, PlayerError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.rate)
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        if !(0.25..=2.0).contains(&rate) {
            return Err(PlayerError::Rejected(format!("unsupported rate {rate}")));
        }
        inner.rate = rate;
        inner.log(PlayerCall::SetRate(rate));
        Ok(())
    }

    async fn volume(&self) -> Result<u8, PlayerError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.volume)
    }

    async fn set_volume(&self, percent: u8) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        inner.volume = percent.min(100);
        inner.log(PlayerCall::SetVolume(percent));
        Ok(())
    }

    async fn play(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        if inner.position < inner.duration {
            inner.state = PlayerState::Playing;
        }
        inner.log(PlayerCall::Play);
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        if inner.state != PlayerState::Ended {
            inner.state = PlayerState::Paused;
        }
        inner.log(PlayerCall::Pause);
        Ok(())
    }

    async fn seek_to(&self, seconds: Seconds) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        inner.position = seconds.clamp(0.0, inner.duration);
        if inner.state == PlayerState::Ended && inner.position < inner.duration {
            inner.state = PlayerState::Paused;
        }
        inner.log(PlayerCall::SeekTo(seconds));
        Ok(())
    }

    async fn state(&self) -> Result<PlayerState, PlayerError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.state)
    }
}
