//! `cuemark-engine` -- runtime that keeps a media player in step with
//! annotated notes.
//!
//! The [`session::PlaybackSession`] reconciles the notes into stored
//! annotations, polls the player and applies whatever the
//! [`resolver::ExecutionResolver`] decides. The [`recorder`] runs the other
//! direction, capturing manual player changes as a recording.

pub mod config;
pub mod error;
pub mod player;
pub mod reconciler;
pub mod recorder;
pub mod repository;
pub mod resolver;
pub mod session;
pub mod simulated;
pub mod timer;

pub use config::{EngineConfig, RecorderConfig, ResolverConfig};
pub use error::{EngineError, PlayerError, RepositoryError};
pub use player::{PlayerAdapter, PlayerNotification, PlayerSnapshot, PlayerState};
pub use reconciler::Reconciler;
pub use recorder::{start_recording, Recorder, RecordingHandle};
pub use repository::{AnnotationRepository, InMemoryAnnotationRepository};
pub use resolver::{Directive, ExecutionResolver, ExecutionState, Phase, SeekOrigin};
pub use session::{EngineEvent, PlaybackSession, SessionHandle};
pub use simulated::SimulatedPlayer;
