//! Annotation grammar: parsing notes text into [`Annotation`]s.
//!
//! ```text
//! annotation := "[" time "-" time "," volume "%" "," rate "x" ["," mode] "]"
//! time       := HH ":" MM ":" SS["." mmm]
//! mode       := "->" | "|" integer
//! ```
//!
//! Candidates that match the pattern but fail range validation are dropped
//! without error. Parsing is pure: the same text always yields the same list.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::annotation::{Annotation, AnnotationSpec, PlaybackMode};
use crate::types::Seconds;

/// Regex matching one annotation candidate.
const ANNOTATION_PATTERN: &str = r"\[(\d{2}:\d{2}:\d{2}(?:\.\d{1,3})?)-(\d{2}:\d{2}:\d{2}(?:\.\d{1,3})?),(\d+)%,(\d+\.\d+)x(?:,(->|\|\d+))?\]";

/// Regex matching a timestamp on its own.
const TIME_PATTERN: &str = r"^(\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,3}))?$";

static ANNOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ANNOTATION_PATTERN).expect("valid regex"));

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(TIME_PATTERN).expect("valid regex"));

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Extract every valid annotation from `text`, in left-to-right order.
///
/// Document indexes are assigned densely over the accepted annotations, so a
/// dropped candidate does not leave a gap in the priority sequence.
pub fn parse(text: &str) -> Vec<Annotation> {
    let mut annotations = Vec::new();

    for caps in ANNOTATION_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(spec) = parse_candidate(&caps) else {
            continue;
        };

        // Byte offset -> character offset.
        let source_offset = text[..whole.start()].chars().count();
        let document_index = annotations.len() as u32;

        if let Ok(annotation) = spec.build(document_index, source_offset) {
            annotations.push(annotation);
        }
    }

    annotations
}

/// Turn one regex match into an unvalidated spec. `None` when a numeric
/// field does not fit its type.
fn parse_candidate(caps: &Captures<'_>) -> Option<AnnotationSpec> {
    let start_time = parse_time(caps.get(1)?.as_str())?;
    let end_time = parse_time(caps.get(2)?.as_str())?;
    let volume: u8 = caps.get(3)?.as_str().parse().ok()?;
    let rate: f64 = caps.get(4)?.as_str().parse().ok()?;

    let mode = match caps.get(5).map(|m| m.as_str()) {
        None => PlaybackMode::Natural,
        Some("->") => PlaybackMode::Jump,
        Some(pause) => PlaybackMode::Pause {
            seconds: pause.strip_prefix('|')?.parse().ok()?,
        },
    };

    Some(AnnotationSpec {
        start_time,
        end_time,
        volume,
        rate,
        mode,
    })
}

// ---------------------------------------------------------------------------
// Time codes
// ---------------------------------------------------------------------------

/// Parse `HH:MM:SS[.mmm]` into seconds.
///
/// Minutes and seconds must be below 60. A fractional part of fewer than
/// three digits is a decimal fraction (`.5` is 500 ms).
pub fn parse_time(s: &str) -> Option<Seconds> {
    let caps = TIME_RE.captures(s)?;

    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: u64 = caps[3].parse().ok()?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    let millis: u64 = match caps.get(4) {
        Some(frac) => {
            let digits = frac.as_str();
            let value: u64 = digits.parse().ok()?;
            value * 10u64.pow(3 - digits.len() as u32)
        }
        None => 0,
    };

    let total_ms = ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis;
    Some(total_ms as f64 / 1000.0)
}

/// Format seconds as `HH:MM:SS.mmm`. Negative input clamps to zero.
pub fn format_time(seconds: Seconds) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let millis = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        millis
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
