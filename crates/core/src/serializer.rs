//! Convert a [`RecordingSession`] back into annotation grammar text.
//!
//! Every event opens a window that the next event closes; the last window
//! runs for [`TRAILING_WINDOW_SECS`]. Volume and speed changes update the
//! running levels, a seek marks the preceding window as a jump (`->`) and a
//! pause marks it as pause-resume (`|n`).

use crate::annotation::{
    round_rate, AnnotationSpec, PlaybackMode, MAX_RATE, MAX_VOLUME, MIN_RATE, MIN_VOLUME,
};
use crate::recording::{RawEventKind, RecordingSession};
use crate::types::Seconds;

/// Length of the window opened by the final event.
pub const TRAILING_WINDOW_SECS: Seconds = 3.0;

/// Gap between consecutive events that starts a new block.
pub const BLOCK_GAP_SECS: Seconds = 30.0;

/// Events closer than this share one line.
const COALESCE_EPSILON: Seconds = 0.001;

/// One output line before end times are known.
#[derive(Debug, Clone)]
struct PendingLine {
    /// Media time of the event that opened the line.
    anchor: Seconds,
    start: Seconds,
    volume: u8,
    rate: f64,
    mode: PlaybackMode,
}

/// Render the session as annotation text, one annotation per line, blocks
/// separated by a blank line.
pub fn serialize_session(session: &RecordingSession) -> String {
    let lines = collect_lines(session);
    let mut blocks: Vec<Vec<String>> = Vec::new();
    let mut previous_anchor: Option<Seconds> = None;

    for (i, line) in lines.iter().enumerate() {
        let end = match lines.get(i + 1) {
            Some(next) if next.anchor > line.start + COALESCE_EPSILON => next.anchor,
            _ => line.start + TRAILING_WINDOW_SECS,
        };

        let spec = AnnotationSpec {
            start_time: line.start,
            end_time: end,
            volume: line.volume,
            rate: line.rate,
            mode: line.mode,
        };
        let Ok(annotation) = spec.build(i as u32, 0) else {
            continue;
        };

        let new_block = match previous_anchor {
            None => true,
            Some(prev) => (line.anchor - prev).abs() > BLOCK_GAP_SECS,
        };
        if new_block {
            blocks.push(Vec::new());
        }
        if let Some(block) = blocks.last_mut() {
            block.push(annotation.to_grammar());
        }
        previous_anchor = Some(line.anchor);
    }

    blocks
        .iter()
        .map(|b| b.join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Walk the events, tracking the running volume and rate.
fn collect_lines(session: &RecordingSession) -> Vec<PendingLine> {
    let mut volume = clamp_volume(session.initial_volume as f64);
    let mut rate = clamp_rate(session.initial_rate);
    let mut lines: Vec<PendingLine> = Vec::new();

    for event in &session.raw_events {
        match event.kind {
            RawEventKind::Volume => volume = clamp_volume(event.value),
            RawEventKind::Speed => rate = clamp_rate(event.value),
            RawEventKind::Seek => {
                if let Some(prev) = lines.last_mut() {
                    prev.mode = PlaybackMode::Jump;
                }
            }
            RawEventKind::Pause => {
                if let Some(prev) = lines.last_mut() {
                    let seconds = event.value.round().max(1.0) as u32;
                    prev.mode = PlaybackMode::Pause { seconds };
                }
            }
            RawEventKind::Manual => {}
        }

        let start = event.resume_position();

        // Level changes landing on the same instant (e.g. volume and speed
        // sampled in one tick) collapse into the line already open there.
        let is_level_change = matches!(
            event.kind,
            RawEventKind::Volume | RawEventKind::Speed | RawEventKind::Manual
        );
        if let Some(prev) = lines.last_mut() {
            if is_level_change
                && prev.mode == PlaybackMode::Natural
                && (prev.anchor - event.time).abs() < COALESCE_EPSILON
                && (prev.start - start).abs() < COALESCE_EPSILON
            {
                prev.volume = volume;
                prev.rate = rate;
                continue;
            }
        }

        lines.push(PendingLine {
            anchor: event.time,
            start,
            volume,
            rate,
            mode: PlaybackMode::Natural,
        });
    }

    lines
}

fn clamp_volume(value: f64) -> u8 {
    value.round().clamp(MIN_VOLUME as f64, MAX_VOLUME as f64) as u8
}

fn clamp_rate(value: f64) -> f64 {
    round_rate(value).clamp(MIN_RATE, MAX_RATE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::parse;
    use crate::recording::RawEvent;
    use chrono::Utc;
    use uuid::Uuid;

    fn session(events: Vec<(RawEventKind, f64, f64)>) -> RecordingSession {
        let now = Utc::now();
        RecordingSession {
            id: Uuid::new_v4(),
            document_id: 1,
            title: None,
            total_duration: 600.0,
            initial_volume: 100,
            initial_rate: 1.0,
            created_at: now,
            updated_at: now,
            raw_events: events
                .into_iter()
                .map(|(kind, time, value)| RawEvent::new(kind, time, value, 0.0, now))
                .collect(),
        }
    }

    // -- windows -------------------------------------------------------------

    #[test]
    fn next_event_closes_previous_window() {
        let s = session(vec![
            (RawEventKind::Volume, 5.0, 50.0),
            (RawEventKind::Speed, 12.0, 1.5),
        ]);
        assert_eq!(
            serialize_session(&s),
            "[00:00:05.000-00:00:12.000,50%,1.00x]\n[00:00:12.000-00:00:15.000,50%,1.50x]"
        );
    }

    #[test]
    fn empty_session_serializes_to_empty_text() {
        assert_eq!(serialize_session(&session(vec![])), "");
    }

    #[test]
    fn simultaneous_level_changes_coalesce() {
        let s = session(vec![
            (RawEventKind::Volume, 5.0, 40.0),
            (RawEventKind::Speed, 5.0, 0.75),
        ]);
        assert_eq!(serialize_session(&s), "[00:00:05.000-00:00:08.000,40%,0.75x]");
    }

    #[test]
    fn seek_marks_previous_line_as_jump() {
        let s = session(vec![
            (RawEventKind::Volume, 5.0, 80.0),
            (RawEventKind::Seek, 9.0, 20.0),
        ]);
        assert_eq!(
            serialize_session(&s),
            "[00:00:05.000-00:00:09.000,80%,1.00x,->]\n[00:00:20.000-00:00:23.000,80%,1.00x]"
        );
    }

    #[test]
    fn pause_marks_previous_line_with_duration() {
        let s = session(vec![
            (RawEventKind::Speed, 2.0, 1.25),
            (RawEventKind::Pause, 6.0, 4.4),
        ]);
        assert_eq!(
            serialize_session(&s),
            "[00:00:02.000-00:00:06.000,100%,1.25x,|4]\n[00:00:06.000-00:00:09.000,100%,1.25x]"
        );
    }

    #[test]
    fn out_of_range_levels_are_clamped() {
        let s = session(vec![(RawEventKind::Speed, 1.0, 4.0)]);
        assert_eq!(serialize_session(&s), "[00:00:01.000-00:00:04.000,100%,2.00x]");
    }

    // -- blocks --------------------------------------------------------------

    #[test]
    fn long_gap_starts_new_block() {
        let s = session(vec![
            (RawEventKind::Manual, 1.0, 0.0),
            (RawEventKind::Manual, 10.0, 0.0),
            (RawEventKind::Manual, 45.0, 0.0),
        ]);
        let text = serialize_session(&s);
        let blocks: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].lines().count(), 2);
        assert_eq!(blocks[1].lines().count(), 1);
    }

    #[test]
    fn blocks_do_not_change_parsed_annotations() {
        let s = session(vec![
            (RawEventKind::Volume, 1.0, 60.0),
            (RawEventKind::Speed, 50.0, 1.5),
            (RawEventKind::Volume, 120.0, 30.0),
        ]);
        let text = serialize_session(&s);
        let flat = text.replace("\n\n", "\n");
        let a: Vec<_> = parse(&text).into_iter().map(|a| a.to_grammar()).collect();
        let b: Vec<_> = parse(&flat).into_iter().map(|a| a.to_grammar()).collect();
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn serialized_text_parses_back_line_for_line() {
        let s = session(vec![
            (RawEventKind::Volume, 3.0, 70.0),
            (RawEventKind::Seek, 8.0, 30.0),
            (RawEventKind::Speed, 33.0, 0.5),
            (RawEventKind::Pause, 40.0, 2.0),
        ]);
        let text = serialize_session(&s);
        let parsed = parse(&text);
        assert_eq!(parsed.len(), text.lines().filter(|l| !l.is_empty()).count());
        let rendered: Vec<String> = parsed.iter().map(|a| a.to_grammar()).collect();
        assert_eq!(rendered.join("\n"), text.replace("\n\n", "\n"));
    }
}
