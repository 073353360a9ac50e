//! Recorded player manipulation: [`RawEvent`]s and [`RecordingSession`]s.
//!
//! A recording captures what the user did to the player (speed, volume,
//! seeks, pauses, manual marks) so it can be turned back into annotation
//! text by [`crate::serializer`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::{DbId, Seconds, Timestamp};

/// Maximum length of a recording title.
pub const MAX_TITLE_LENGTH: usize = 200;

// ---------------------------------------------------------------------------
// RawEvent
// ---------------------------------------------------------------------------

/// Kind of change captured by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawEventKind {
    Speed,
    Volume,
    Seek,
    Pause,
    Manual,
}

impl RawEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Speed => "speed",
            Self::Volume => "volume",
            Self::Seek => "seek",
            Self::Pause => "pause",
            Self::Manual => "manual",
        }
    }
}

/// One detected change in player state.
///
/// `value`/`previous_value` depend on the kind: rates for `Speed`, percents
/// for `Volume`, the destination/origin position for `Seek`, and for `Pause`
/// the paused duration in whole seconds (0 until playback resumes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: Uuid,
    /// Media position at which the change happened. For a seek this is the
    /// position the user left.
    pub time: Seconds,
    pub kind: RawEventKind,
    pub value: f64,
    pub previous_value: f64,
    pub captured_at: Timestamp,
}

impl RawEvent {
    pub fn new(
        kind: RawEventKind,
        time: Seconds,
        value: f64,
        previous_value: f64,
        captured_at: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            time,
            kind,
            value,
            previous_value,
            captured_at,
        }
    }

    /// Media position where playback continues after this event.
    pub fn resume_position(&self) -> Seconds {
        match self.kind {
            RawEventKind::Seek => self.value,
            _ => self.time,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSession
// ---------------------------------------------------------------------------

/// A finished recording: ordered events plus the metadata needed to replay
/// them as annotation text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSession {
    pub id: Uuid,
    pub document_id: DbId,
    pub title: Option<String>,
    pub total_duration: Seconds,
    /// Player volume when recording started.
    pub initial_volume: u8,
    /// Player rate when recording started.
    pub initial_rate: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub raw_events: Vec<RawEvent>,
}

impl RecordingSession {
    /// Set or clear the title. The only mutation a finished recording allows.
    pub fn rename(&mut self, title: Option<String>, now: Timestamp) -> Result<(), CoreError> {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if let Some(t) = &title {
            if t.chars().count() > MAX_TITLE_LENGTH {
                return Err(CoreError::Validation(format!(
                    "title must be at most {MAX_TITLE_LENGTH} characters"
                )));
            }
        }

        self.title = title;
        self.updated_at = now;
        Ok(())
    }

    /// Number of events of the given kind.
    pub fn count_of(&self, kind: RawEventKind) -> usize {
        self.raw_events.iter().filter(|e| e.kind == kind).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
