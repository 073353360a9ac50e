//! Playback session runtime.
//!
//! A [`PlaybackSession`] owns the resolver, the reconciler and the player
//! handle for one document and drains a single ordered inbox. The execution
//! poll, the reconcile debounce and the pause-resume timer are independent
//! tasks posting into that inbox, so every state change happens on one task.
//! Callers talk to a running session through its [`SessionHandle`].

use std::sync::Arc;

use cuemark_core::types::{DbId, Seconds};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{EngineError, PlayerError};
use crate::player::{read_snapshot, PlayerAdapter, PlayerNotification, PlayerState};
use crate::reconciler::Reconciler;
use crate::repository::AnnotationRepository;
use crate::resolver::{Directive, ExecutionResolver};
use crate::timer::{spawn_ticker, OneShot};

/// Everything that can happen to a session, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Execution poll.
    Tick,
    /// The notes text was edited.
    TextChanged(String),
    /// The reconcile debounce for edit `generation` elapsed.
    ReconcileDue { generation: u64 },
    /// The pause-mode resume timer fired.
    ResumeDue,
    Player(PlayerNotification),
    /// The user asked to seek.
    Seek(Seconds),
    /// A different video was loaded into the player.
    VideoChanged,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cloneable sender side of a running [`PlaybackSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inbox: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn text_changed(&self, text: impl Into<String>) -> Result<(), EngineError> {
        self.send(EngineEvent::TextChanged(text.into()))
    }

    pub fn notify(&self, notification: PlayerNotification) -> Result<(), EngineError> {
        self.send(EngineEvent::Player(notification))
    }

    pub fn seek(&self, seconds: Seconds) -> Result<(), EngineError> {
        self.send(EngineEvent::Seek(seconds))
    }

    pub fn video_changed(&self) -> Result<(), EngineError> {
        self.send(EngineEvent::VideoChanged)
    }

    /// Stop the session and every timer it owns.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn send(&self, event: EngineEvent) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Closed);
        }
        self.inbox.send(event).map_err(|_| EngineError::Closed)
    }
}

// ---------------------------------------------------------------------------
// PlaybackSession
// ---------------------------------------------------------------------------

pub struct PlaybackSession {
    session_id: DbId,
    config: EngineConfig,
    player: Arc<dyn PlayerAdapter>,
    reconciler: Reconciler,
    resolver: ExecutionResolver,

    sender: mpsc::UnboundedSender<EngineEvent>,
    inbox: mpsc::UnboundedReceiver<EngineEvent>,
    cancel: CancellationToken,

    /// Latest edit not yet reconciled.
    pending_text: Option<String>,
    /// Bumped on every edit; only the newest debounce may reconcile.
    generation: u64,
    debounce: OneShot,
    resume: OneShot,
}

impl PlaybackSession {
    pub fn new(
        session_id: DbId,
        player: Arc<dyn PlayerAdapter>,
        repository: Arc<dyn AnnotationRepository>,
        config: EngineConfig,
    ) -> (Self, SessionHandle) {
        let (sender, inbox) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let handle = SessionHandle {
            inbox: sender.clone(),
            cancel: cancel.clone(),
        };

        let session = Self {
            session_id,
            resolver: ExecutionResolver::new(config.resolver),
            config,
            player,
            reconciler: Reconciler::new(repository),
            sender,
            inbox,
            cancel,
            pending_text: None,
            generation: 0,
            debounce: OneShot::default(),
            resume: OneShot::default(),
        };

        (session, handle)
    }

    /// Run until [`SessionHandle::shutdown`] is called.
    pub async fn run(mut self) {
        tracing::info!(session_id = self.session_id, "Playback session started");

        match self.reconciler.load(self.session_id).await {
            Ok(list) => {
                tracing::info!(session_id = self.session_id, count = list.len(), "Annotations loaded");
                let directives = self.resolver.load_annotations(list);
                self.apply(directives).await;
            }
            Err(e) => {
                tracing::error!(session_id = self.session_id, error = %e, "Failed to load annotations");
            }
        }

        spawn_ticker(
            self.config.poll_interval,
            self.sender.clone(),
            || EngineEvent::Tick,
            self.cancel.child_token(),
        );

        let cancel = self.cancel.clone();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.inbox.recv() => event,
            };
            match event {
                Some(event) => self.handle(event).await,
                None => break,
            }
        }

        self.debounce.cancel();
        self.resume.cancel();
        tracing::info!(session_id = self.session_id, "Playback session stopped");
    }

    async fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Tick => self.tick().await,
            EngineEvent::TextChanged(text) => {
                self.pending_text = Some(text);
                self.generation += 1;
                self.debounce.arm(
                    self.config.reconcile_debounce,
                    self.sender.clone(),
                    EngineEvent::ReconcileDue {
                        generation: self.generation,
                    },
                    &self.cancel,
                );
            }
            EngineEvent::ReconcileDue { generation } => {
                if generation == self.generation {
                    self.reconcile().await;
                }
            }
            EngineEvent::ResumeDue => {
                let directives = self.resolver.resume_due();
                self.apply(directives).await;
            }
            EngineEvent::Player(PlayerNotification::StateChanged(PlayerState::Ended)) => {
                self.resume.cancel();
                let directives = self.resolver.end_of_media();
                self.apply(directives).await;
            }
            EngineEvent::Player(PlayerNotification::StateChanged(state)) => {
                tracing::debug!(session_id = self.session_id, ?state, "Player state changed");
            }
            EngineEvent::Player(PlayerNotification::Error(message)) => {
                tracing::warn!(session_id = self.session_id, error = %message, "Player reported error");
            }
            EngineEvent::Seek(seconds) => {
                let directives = self.resolver.user_seek(seconds);
                self.apply(directives).await;
            }
            EngineEvent::VideoChanged => {
                tracing::info!(session_id = self.session_id, "Video changed, execution reset");
                self.resume.cancel();
                let directives = self.resolver.reset();
                self.apply(directives).await;
            }
        }
    }

    async fn tick(&mut self) {
        let snapshot = match read_snapshot(self.player.as_ref()).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(session_id = self.session_id, error = %e, "Player read failed, tick skipped");
                return;
            }
        };

        tracing::trace!(
            session_id = self.session_id,
            current_time = snapshot.current_time,
            phase = ?self.resolver.phase(),
            "Tick"
        );

        let directives = self.resolver.tick(&snapshot);
        self.apply(directives).await;
    }

    async fn reconcile(&mut self) {
        let Some(text) = self.pending_text.take() else {
            return;
        };

        match self.reconciler.reconcile(self.session_id, &text).await {
            Ok(list) => {
                tracing::info!(session_id = self.session_id, count = list.len(), "Notes reconciled");
                let directives = self.resolver.load_annotations(list);
                self.apply(directives).await;
            }
            Err(e) => {
                // Nothing is kept; the next edit triggers a fresh pass.
                tracing::error!(session_id = self.session_id, error = %e, "Reconcile failed");
            }
        }
    }

    /// Send directives to the player. A failed command is logged and the
    /// rest still go out; the next tick re-reads the player anyway.
    async fn apply(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            if let Err(e) = self.execute(directive).await {
                tracing::warn!(
                    session_id = self.session_id,
                    error = %e,
                    ?directive,
                    "Player command failed"
                );
            }
        }
    }

    async fn execute(&mut self, directive: Directive) -> Result<(), PlayerError> {
        match directive {
            Directive::SetVolume(v) => self.player.set_volume(v).await,
            Directive::SetRate(r) => self.player.set_playback_rate(r).await,
            Directive::SeekTo { seconds, .. } => self.player.seek_to(seconds).await,
            Directive::Pause => self.player.pause().await,
            Directive::Play => self.player.play().await,
            Directive::ScheduleResume { after } => {
                self.resume
                    .arm(after, self.sender.clone(), EngineEvent::ResumeDue, &self.cancel);
                Ok(())
            }
        }
    }
}
