//! Playback annotation model and validation.
//!
//! An [`Annotation`] is one time-windowed action extracted from a notes
//! document: while the player is inside `[start_time, end_time]` the volume
//! and rate are forced to the annotation's values, and when the window ends
//! its [`PlaybackMode`] decides what happens next.
//!
//! Annotations are ordered by [`Annotation::document_index`] (their position
//! in the source text), never by start time.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::grammar::format_time;
use crate::types::Seconds;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Minimum volume percentage.
pub const MIN_VOLUME: u8 = 0;

/// Maximum volume percentage.
pub const MAX_VOLUME: u8 = 100;

/// Minimum playback rate.
pub const MIN_RATE: f64 = 0.25;

/// Maximum playback rate.
pub const MAX_RATE: f64 = 2.0;

/// Namespace for content-derived annotation ids (UUID v5).
const ANNOTATION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a7e_4b3d_4e8f_9a10_c2d4_5e6f_7a8b);

// ---------------------------------------------------------------------------
// Playback mode
// ---------------------------------------------------------------------------

/// What the engine does when an annotation's window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Restore the default volume/rate and carry on.
    Natural,
    /// Seek straight to the next annotation in document order (`->`).
    Jump,
    /// Pause the player, resume after `seconds` (`|n`).
    Pause { seconds: u32 },
}

impl PlaybackMode {
    /// Database label for the mode (`natural`, `jump`, `pause`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Natural => "natural",
            Self::Jump => "jump",
            Self::Pause { .. } => "pause",
        }
    }

    /// Rebuild a mode from its label and optional pause duration.
    pub fn from_parts(label: &str, pause_seconds: Option<u32>) -> Result<Self, CoreError> {
        match (label, pause_seconds) {
            ("natural", _) => Ok(Self::Natural),
            ("jump", _) => Ok(Self::Jump),
            ("pause", Some(seconds)) if seconds > 0 => Ok(Self::Pause { seconds }),
            ("pause", _) => Err(CoreError::Validation(
                "pause mode requires a positive duration".to_string(),
            )),
            _ => Err(CoreError::Validation(format!(
                "Invalid playback mode '{label}'. Must be one of: natural, jump, pause"
            ))),
        }
    }

    /// Grammar suffix for the mode, including the leading comma.
    fn suffix(&self) -> String {
        match self {
            Self::Natural => String::new(),
            Self::Jump => ",->".to_string(),
            Self::Pause { seconds } => format!(",|{seconds}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// A validated, positioned annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Content-derived id, stable while the annotation text and position
    /// in the document are unchanged.
    pub id: Uuid,
    /// Document priority: 0 for the leftmost annotation in the text.
    pub document_index: u32,
    /// Character offset of the opening `[` in the source text.
    pub source_offset: usize,
    pub start_time: Seconds,
    pub end_time: Seconds,
    pub volume: u8,
    pub rate: f64,
    pub mode: PlaybackMode,
}

impl Annotation {
    /// Whether `time` falls inside the closed window `[start, end]`.
    pub fn contains(&self, time: Seconds) -> bool {
        self.start_time <= time && time <= self.end_time
    }

    /// Canonical grammar text, e.g. `[00:00:05.000-00:00:10.000,50%,1.00x,->]`.
    pub fn to_grammar(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}-{},{}%,{:.2}x{}]",
            format_time(self.start_time),
            format_time(self.end_time),
            self.volume,
            self.rate,
            self.mode.suffix()
        )
    }
}

// ---------------------------------------------------------------------------
// AnnotationSpec (unpositioned builder)
// ---------------------------------------------------------------------------

/// The action part of an annotation before it is given a document position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationSpec {
    pub start_time: Seconds,
    pub end_time: Seconds,
    pub volume: u8,
    pub rate: f64,
    pub mode: PlaybackMode,
}

impl AnnotationSpec {
    /// Validate the spec and place it at `document_index`.
    ///
    /// Times are snapped to milliseconds and the rate to hundredths before
    /// validation so the result always renders canonically.
    pub fn build(self, document_index: u32, source_offset: usize) -> Result<Annotation, CoreError> {
        let start_time = round_millis(self.start_time);
        let end_time = round_millis(self.end_time);
        let rate = round_rate(self.rate);

        validate_window(start_time, end_time)?;
        validate_volume(self.volume)?;
        validate_rate(rate)?;
        if let PlaybackMode::Pause { seconds: 0 } = self.mode {
            return Err(CoreError::Validation(
                "pause duration must be at least 1 second".to_string(),
            ));
        }

        let mut annotation = Annotation {
            id: Uuid::nil(),
            document_index,
            source_offset,
            start_time,
            end_time,
            volume: self.volume,
            rate,
            mode: self.mode,
        };
        annotation.id = derive_id(document_index, &annotation.to_grammar());
        Ok(annotation)
    }
}

/// Deterministic id for the annotation at `document_index` with the given
/// canonical text.
pub fn derive_id(document_index: u32, canonical: &str) -> Uuid {
    Uuid::new_v5(
        &ANNOTATION_NAMESPACE,
        format!("{document_index}:{canonical}").as_bytes(),
    )
}

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate that a window is finite, non-negative and `start < end`.
pub fn validate_window(start: Seconds, end: Seconds) -> Result<(), CoreError> {
    if !start.is_finite() || !end.is_finite() {
        return Err(CoreError::Validation(
            "window bounds must be finite numbers".to_string(),
        ));
    }
    if start < 0.0 {
        return Err(CoreError::Validation(format!(
            "window start must not be negative, got {start}"
        )));
    }
    if start >= end {
        return Err(CoreError::Validation(format!(
            "window start ({start}) must be before end ({end})"
        )));
    }
    Ok(())
}

/// Validate that a volume percentage is within [`MIN_VOLUME`]..=[`MAX_VOLUME`].
pub fn validate_volume(volume: u8) -> Result<(), CoreError> {
    if !(MIN_VOLUME..=MAX_VOLUME).contains(&volume) {
        return Err(CoreError::Validation(format!(
            "volume must be between {MIN_VOLUME} and {MAX_VOLUME}, got {volume}"
        )));
    }
    Ok(())
}

/// Validate that a playback rate is within [`MIN_RATE`]..=[`MAX_RATE`].
pub fn validate_rate(rate: f64) -> Result<(), CoreError> {
    if rate.is_nan() || rate.is_infinite() {
        return Err(CoreError::Validation(
            "rate must be a finite number".to_string(),
        ));
    }
    if !(MIN_RATE..=MAX_RATE).contains(&rate) {
        return Err(CoreError::Validation(format!(
            "rate must be between {MIN_RATE} and {MAX_RATE}, got {rate}"
        )));
    }
    Ok(())
}

/// Round seconds to whole milliseconds.
pub fn round_millis(seconds: Seconds) -> Seconds {
    (seconds * 1000.0).round() / 1000.0
}

/// Round a playback rate to hundredths.
pub fn round_rate(rate: f64) -> f64 {
    (rate * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
