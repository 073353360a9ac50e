//! Recorder: turns live player manipulation into [`RawEvent`]s.
//!
//! [`Recorder`] is the synchronous core. It is fed samples with explicit
//! timestamps and decides which ones are real changes. [`start_recording`]
//! wraps it in a task with one periodic sampler per signal, all posting into
//! one inbox.

use std::sync::Arc;
use std::time::Duration;

use cuemark_core::types::{DbId, Seconds, Timestamp};
use cuemark_core::{RawEvent, RawEventKind, RecordingSession};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::RecorderConfig;
use crate::error::{EngineError, PlayerError};
use crate::player::{read_snapshot, PlayerAdapter, PlayerSnapshot, PlayerState};
use crate::timer::spawn_ticker;

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Last recorded value of one signal and when it was recorded.
#[derive(Debug, Clone, Copy)]
struct Tracked {
    recorded: f64,
    changed_at: Option<Timestamp>,
}

impl Tracked {
    fn new(value: f64) -> Self {
        Self {
            recorded: value,
            changed_at: None,
        }
    }
}

/// A pause that has not been resumed yet.
#[derive(Debug, Clone, Copy)]
struct OpenPause {
    event_index: usize,
    since: Timestamp,
}

pub struct Recorder {
    config: RecorderConfig,
    id: Uuid,
    document_id: DbId,
    started_at: Timestamp,
    initial_volume: u8,
    initial_rate: f64,
    events: Vec<RawEvent>,

    volume: Tracked,
    rate: Tracked,
    /// Most recent rate seen, recorded or not; used to predict position.
    live_rate: f64,

    last_position: Seconds,
    last_position_at: Timestamp,
    last_seek: Option<(usize, Timestamp)>,

    paused: bool,
    open_pause: Option<OpenPause>,
    pause_changed_at: Option<Timestamp>,
}

impl Recorder {
    /// Begin a recording from the player's current levels. No event is
    /// emitted for the baseline.
    pub fn start(
        config: RecorderConfig,
        document_id: DbId,
        initial: &PlayerSnapshot,
        started_at: Timestamp,
    ) -> Self {
        tracing::info!(
            document_id,
            current_time = initial.current_time,
            volume = initial.volume,
            rate = initial.rate,
            "Recording started"
        );

        Self {
            config,
            id: Uuid::new_v4(),
            document_id,
            started_at,
            initial_volume: initial.volume,
            initial_rate: initial.rate,
            events: Vec::new(),
            volume: Tracked::new(f64::from(initial.volume)),
            rate: Tracked::new(initial.rate),
            live_rate: initial.rate,
            last_position: initial.current_time,
            last_position_at: started_at,
            last_seek: None,
            paused: initial.state == PlayerState::Paused,
            open_pause: None,
            pause_changed_at: None,
        }
    }

    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    /// Last media position seen by [`Self::observe_position`].
    pub fn last_position(&self) -> Seconds {
        self.last_position
    }

    pub fn observe_volume(&mut self, time: Seconds, volume: u8, at: Timestamp) -> bool {
        let (min_delta, debounce) = (self.config.volume_min_delta, self.config.volume_debounce);
        let value = f64::from(volume);
        if !Self::is_change(&self.volume, value, min_delta, debounce, at) {
            return false;
        }
        let previous = std::mem::replace(&mut self.volume.recorded, value);
        self.volume.changed_at = Some(at);
        self.push(RawEvent::new(RawEventKind::Volume, time, value, previous, at));
        true
    }

    pub fn observe_rate(&mut self, time: Seconds, rate: f64, at: Timestamp) -> bool {
        self.live_rate = rate;
        let (min_delta, debounce) = (self.config.speed_min_delta, self.config.speed_debounce);
        if !Self::is_change(&self.rate, rate, min_delta, debounce, at) {
            return false;
        }
        let previous = std::mem::replace(&mut self.rate.recorded, rate);
        self.rate.changed_at = Some(at);
        self.push(RawEvent::new(RawEventKind::Speed, time, rate, previous, at));
        true
    }

    /// Compare `time` with where playback should be by now. A large enough
    /// difference is a seek; a second jump inside the seek debounce window
    /// moves the previous seek's destination instead of adding a new event.
    pub fn observe_position(&mut self, time: Seconds, at: Timestamp) -> bool {
        let expected = self.expected_position(at);
        self.last_position = time;
        self.last_position_at = at;

        if (time - expected).abs() <= self.config.seek_min_delta {
            return false;
        }

        if let Some((index, seek_at)) = self.last_seek {
            if elapsed(seek_at, at) < self.config.seek_debounce {
                if let Some(event) = self.events.get_mut(index) {
                    event.value = time;
                    tracing::debug!(destination = time, "Seek destination updated");
                    return false;
                }
            }
        }

        let from = expected.max(0.0);
        self.last_seek = Some((self.events.len(), at));
        self.push(RawEvent::new(RawEventKind::Seek, from, time, from, at));
        true
    }

    /// Track paused/playing transitions. Other states are ignored.
    pub fn observe_state(&mut self, time: Seconds, state: PlayerState, at: Timestamp) -> bool {
        match state {
            PlayerState::Paused if !self.paused => {
                if let Some(changed) = self.pause_changed_at {
                    if elapsed(changed, at) < self.config.pause_debounce {
                        return false;
                    }
                }
                self.paused = true;
                self.pause_changed_at = Some(at);
                self.open_pause = Some(OpenPause {
                    event_index: self.events.len(),
                    since: at,
                });
                self.last_position = time;
                self.last_position_at = at;
                self.push(RawEvent::new(RawEventKind::Pause, time, 0.0, 0.0, at));
                true
            }
            PlayerState::Playing if self.paused => {
                self.paused = false;
                self.pause_changed_at = Some(at);
                self.close_pause(at);
                self.last_position = time;
                self.last_position_at = at;
                false
            }
            _ => false,
        }
    }

    /// Record a user-requested marker at `time`.
    pub fn mark_manual(&mut self, time: Seconds, at: Timestamp) {
        self.push(RawEvent::new(RawEventKind::Manual, time, 0.0, 0.0, at));
    }

    /// Finish the recording. A pause still open is closed at `at`.
    pub fn stop(mut self, total_duration: Seconds, at: Timestamp) -> RecordingSession {
        self.close_pause(at);

        tracing::info!(
            recording_id = %self.id,
            document_id = self.document_id,
            count = self.events.len(),
            "Recording stopped"
        );

        RecordingSession {
            id: self.id,
            document_id: self.document_id,
            title: None,
            total_duration,
            initial_volume: self.initial_volume,
            initial_rate: self.initial_rate,
            created_at: self.started_at,
            updated_at: at,
            raw_events: self.events,
        }
    }

    // -- helpers -------------------------------------------------------------

    fn is_change(
        tracked: &Tracked,
        value: f64,
        min_delta: f64,
        debounce: Duration,
        at: Timestamp,
    ) -> bool {
        // Small epsilon so a delta of exactly `min_delta` counts despite
        // float representation.
        if (value - tracked.recorded).abs() + 1e-9 < min_delta {
            return false;
        }
        match tracked.changed_at {
            Some(changed) => elapsed(changed, at) >= debounce,
            None => true,
        }
    }

    fn expected_position(&self, at: Timestamp) -> Seconds {
        if self.paused {
            return self.last_position;
        }
        let dt = elapsed(self.last_position_at, at).as_secs_f64();
        self.last_position + dt * self.live_rate
    }

    fn close_pause(&mut self, at: Timestamp) {
        if let Some(open) = self.open_pause.take() {
            let seconds = elapsed(open.since, at).as_secs_f64().round();
            if let Some(event) = self.events.get_mut(open.event_index) {
                event.value = seconds;
            }
        }
    }

    fn push(&mut self, event: RawEvent) {
        tracing::debug!(
            kind = event.kind.as_str(),
            time = event.time,
            value = event.value,
            "Recorded event"
        );
        self.events.push(event);
    }
}

/// Non-negative wall time between two timestamps.
fn elapsed(from: Timestamp, to: Timestamp) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

// ---------------------------------------------------------------------------
// RecordingClock
// ---------------------------------------------------------------------------

/// Wall-clock timestamps derived from tokio's monotonic clock, so paused
/// test time produces consistent `captured_at` values.
#[derive(Debug, Clone, Copy)]
pub struct RecordingClock {
    wall_start: Timestamp,
    started: Instant,
}

impl RecordingClock {
    pub fn start() -> Self {
        Self {
            wall_start: chrono::Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        let millis = i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.wall_start + chrono::Duration::milliseconds(millis)
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Signal {
    Speed,
    Volume,
    Position,
    State,
}

enum RecorderEvent {
    Sample(Signal),
    Mark,
    Stop(oneshot::Sender<RecordingSession>),
}

/// Handle to a running recording task. Dropping it abandons the recording.
#[derive(Debug)]
pub struct RecordingHandle {
    inbox: mpsc::UnboundedSender<RecorderEvent>,
    cancel: CancellationToken,
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl RecordingHandle {
    /// Add a manual marker at the player's current position.
    pub fn mark(&self) -> Result<(), EngineError> {
        self.inbox
            .send(RecorderEvent::Mark)
            .map_err(|_| EngineError::Closed)
    }

    /// Stop sampling and return the finished recording.
    pub async fn stop(self) -> Result<RecordingSession, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(RecorderEvent::Stop(reply))
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)
    }
}

/// Start recording `player` for `document_id`.
///
/// Fails only if the player cannot be read for the baseline. Afterwards,
/// failing samples are logged and skipped. Cancelling `cancel` ends the task
/// without producing a session.
pub async fn start_recording(
    player: Arc<dyn PlayerAdapter>,
    document_id: DbId,
    config: RecorderConfig,
    cancel: &CancellationToken,
) -> Result<RecordingHandle, EngineError> {
    let clock = RecordingClock::start();
    let baseline = read_snapshot(player.as_ref()).await?;
    let recorder = Recorder::start(config, document_id, &baseline, clock.now());

    let (tx, rx) = mpsc::unbounded_channel();
    let token = cancel.child_token();

    for (period, signal) in [
        (config.speed_poll, Signal::Speed),
        (config.volume_poll, Signal::Volume),
        (config.position_poll, Signal::Position),
        (config.state_poll, Signal::State),
    ] {
        spawn_ticker(period, tx.clone(), move || RecorderEvent::Sample(signal), token.clone());
    }

    tokio::spawn(run_recording(player, recorder, clock, rx, token.clone()));

    Ok(RecordingHandle {
        inbox: tx,
        cancel: token,
    })
}

async fn run_recording(
    player: Arc<dyn PlayerAdapter>,
    mut recorder: Recorder,
    clock: RecordingClock,
    mut inbox: mpsc::UnboundedReceiver<RecorderEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Recording cancelled");
                return;
            }
            event = inbox.recv() => event,
        };

        match event {
            Some(RecorderEvent::Sample(signal)) => {
                if let Err(e) = sample(player.as_ref(), &mut recorder, signal, clock.now()).await {
                    tracing::warn!(error = %e, ?signal, "Recorder sample skipped");
                }
            }
            Some(RecorderEvent::Mark) => {
                let time = match player.current_time().await {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(error = %e, "Player unavailable, marking last known position");
                        recorder.last_position()
                    }
                };
                recorder.mark_manual(time, clock.now());
            }
            Some(RecorderEvent::Stop(reply)) => {
                cancel.cancel();
                let total = match player.duration().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(error = %e, "Duration unavailable, using last position");
                        recorder.last_position()
                    }
                };
                let _ = reply.send(recorder.stop(total, clock.now()));
                return;
            }
            None => return,
        }
    }
}

async fn sample(
    player: &dyn PlayerAdapter,
    recorder: &mut Recorder,
    signal: Signal,
    at: Timestamp,
) -> Result<(), PlayerError> {
    let time = player.current_time().await?;
    match signal {
        Signal::Speed => {
            recorder.observe_rate(time, player.playback_rate().await?, at);
        }
        Signal::Volume => {
            recorder.observe_volume(time, player.volume().await?, at);
        }
        Signal::Position => {
            recorder.observe_position(time, at);
        }
        Signal::State => {
            recorder.observe_state(time, player.state().await?, at);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
