//! Execution resolver: decides which annotation is active at each poll.
//!
//! [`ExecutionResolver::tick`] is a synchronous state machine. It takes a
//! fresh [`PlayerSnapshot`] and returns the [`Directive`]s the runtime must
//! apply to the player. Because every decision is re-derived from live
//! player time, a failed command or a late timer only costs one tick.
//!
//! Invariants:
//! - at most one annotation is active at any time;
//! - with no seeks, the executed set only grows during a playback pass;
//! - priority is [`Annotation::document_index`], never start time.

use std::collections::HashSet;
use std::time::Duration;

use cuemark_core::types::Seconds;
use cuemark_core::{Annotation, PlaybackMode};
use uuid::Uuid;

use crate::config::ResolverConfig;
use crate::player::{PlayerSnapshot, PlayerState};

// ---------------------------------------------------------------------------
// Directives
// ---------------------------------------------------------------------------

/// Who asked for a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Issued by the resolver itself (jump mode). Exempt from user-seek
    /// detection on the following ticks.
    Engine,
    /// Requested by the user through the session handle.
    User,
}

/// An instruction for the runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Directive {
    SetVolume(u8),
    SetRate(f64),
    SeekTo { seconds: Seconds, origin: SeekOrigin },
    Pause,
    Play,
    /// Arm the one-shot resume timer; when it fires the runtime calls
    /// [`ExecutionResolver::resume_due`].
    ScheduleResume { after: Duration },
}

// ---------------------------------------------------------------------------
// ExecutionState
// ---------------------------------------------------------------------------

/// Per-session execution bookkeeping. Never shared between sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionState {
    pub active_annotation_id: Option<Uuid>,
    pub executed_annotation_ids: HashSet<Uuid>,
    pub last_known_time: Seconds,
    /// Volume last observed outside any annotation.
    pub default_volume: u8,
    /// Rate last observed outside any annotation.
    pub default_rate: f64,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self {
            active_annotation_id: None,
            executed_annotation_ids: HashSet::new(),
            last_known_time: 0.0,
            default_volume: 100,
            default_rate: 1.0,
        }
    }
}

/// Coarse resolver phase, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
    /// Active on a jump target whose seek has not landed yet.
    Chaining,
    /// Paused by a pause-mode annotation, waiting for the resume timer.
    Paused,
}

/// Engine-issued seek that has not been observed yet.
#[derive(Debug, Clone, Copy)]
struct PendingSeek {
    origin: Seconds,
    target: Seconds,
    ticks_waited: u32,
}

// ---------------------------------------------------------------------------
// ExecutionResolver
// ---------------------------------------------------------------------------

pub struct ExecutionResolver {
    config: ResolverConfig,
    /// Sorted by document index.
    annotations: Vec<Annotation>,
    state: ExecutionState,
    pending_seek: Option<PendingSeek>,
    awaiting_resume: bool,
    /// Defaults sent to the player but not yet observed back.
    restore_pending: Option<(u8, f64)>,
}

impl ExecutionResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            annotations: Vec::new(),
            state: ExecutionState::default(),
            pending_seek: None,
            awaiting_resume: false,
            restore_pending: None,
        }
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn active(&self) -> Option<&Annotation> {
        self.state
            .active_annotation_id
            .and_then(|id| self.find(id))
    }

    pub fn phase(&self) -> Phase {
        if self.awaiting_resume {
            Phase::Paused
        } else if self.state.active_annotation_id.is_some() && self.pending_seek.is_some() {
            Phase::Chaining
        } else if self.state.active_annotation_id.is_some() {
            Phase::Active
        } else {
            Phase::Idle
        }
    }

    /// Swap in a freshly reconciled annotation list.
    ///
    /// Executed ids that still exist are kept (ids are content-derived, so
    /// untouched annotations survive an edit). If the active annotation is
    /// gone, defaults are restored and the resolver goes idle.
    pub fn load_annotations(&mut self, mut annotations: Vec<Annotation>) -> Vec<Directive> {
        annotations.sort_by_key(|a| a.document_index);
        let ids: HashSet<Uuid> = annotations.iter().map(|a| a.id).collect();

        self.state.executed_annotation_ids.retain(|id| ids.contains(id));

        let mut out = Vec::new();
        if let Some(active) = self.state.active_annotation_id {
            if !ids.contains(&active) {
                tracing::info!(annotation_id = %active, "Active annotation removed by edit");
                self.state.active_annotation_id = None;
                self.pending_seek = None;
                self.restore_defaults(&mut out);
            }
        }

        self.annotations = annotations;
        out
    }

    /// Forget everything about the current pass (document or video change).
    pub fn reset(&mut self) -> Vec<Directive> {
        let mut out = Vec::new();
        self.clear(&mut out);
        self.state.last_known_time = 0.0;
        out
    }

    /// The player reported end of media.
    pub fn end_of_media(&mut self) -> Vec<Directive> {
        tracing::info!("End of media, execution state cleared");
        self.reset()
    }

    /// The pause-mode resume timer fired.
    ///
    /// Returns `Play` only if the resolver is still waiting; a reset in the
    /// meantime (seek to start, end of media, video change) swallows it.
    pub fn resume_due(&mut self) -> Vec<Directive> {
        if std::mem::take(&mut self.awaiting_resume) {
            tracing::info!("Resuming playback after pause annotation");
            vec![Directive::Play]
        } else {
            Vec::new()
        }
    }

    /// A seek requested through the engine on the user's behalf.
    ///
    /// Applies the same reset as a detected user seek without waiting for
    /// the jump to exceed the detection threshold.
    pub fn user_seek(&mut self, target: Seconds) -> Vec<Directive> {
        let target = target.max(0.0);
        let mut out = vec![Directive::SeekTo {
            seconds: target,
            origin: SeekOrigin::User,
        }];
        self.pending_seek = None;
        self.apply_user_seek(target, &mut out);
        out
    }

    /// Evaluate one poll.
    pub fn tick(&mut self, snapshot: &PlayerSnapshot) -> Vec<Directive> {
        let mut out = Vec::new();
        let now = snapshot.current_time;

        if snapshot.state == PlayerState::Ended {
            if self.state.active_annotation_id.is_some()
                || !self.state.executed_annotation_ids.is_empty()
            {
                return self.end_of_media();
            }
            self.state.last_known_time = now;
            return out;
        }

        if let Some(mut pending) = self.pending_seek.take() {
            let from_target = (now - pending.target).abs();
            let from_origin = (now - pending.origin).abs();
            let near_target = from_target <= self.config.seek_threshold;
            let near_origin = from_origin <= self.config.seek_threshold;

            if near_target && (!near_origin || from_target < from_origin) {
                tracing::debug!(current_time = now, "Engine seek landed");
                self.state.last_known_time = now;
            } else if near_origin && pending.ticks_waited < self.config.max_seek_settle_ticks {
                pending.ticks_waited += 1;
                self.pending_seek = Some(pending);
                return out;
            } else {
                tracing::debug!(current_time = now, "Engine seek tag expired");
            }
        }

        let last = self.state.last_known_time;
        if now <= self.config.restart_window && last - now > self.config.seek_threshold {
            tracing::info!(current_time = now, last_known_time = last, "Playback restarted");
            self.clear(&mut out);
        } else if (now - last).abs() > self.config.seek_threshold {
            tracing::info!(current_time = now, last_known_time = last, "User seek detected");
            self.apply_user_seek(now, &mut out);
        }

        if let Some(active_id) = self.state.active_annotation_id {
            match self.find(active_id).cloned() {
                Some(active) if self.in_window(&active, now) => {
                    self.reapply_on_drift(&active, snapshot, &mut out);
                    self.state.last_known_time = now;
                    return out;
                }
                Some(active) => {
                    if !self.expire(&active, now, &mut out) {
                        return out;
                    }
                }
                None => {
                    self.state.active_annotation_id = None;
                    self.restore_defaults(&mut out);
                }
            }
        }

        // Idle. The live levels become the defaults only once an earlier
        // restore has been observed on the player.
        if out.is_empty() {
            self.track_defaults(snapshot, &mut out);
        }
        // Media time is frozen during a pause wait; nothing may start
        // before the resume.
        if !self.awaiting_resume {
            self.activate_if_due(now, &mut out);
        }
        self.state.last_known_time = now;
        out
    }

    // -- transitions ---------------------------------------------------------

    /// Leave `active` after its window ended. Returns `true` when the tick
    /// should go on to evaluate idle activation.
    fn expire(&mut self, active: &Annotation, now: Seconds, out: &mut Vec<Directive>) -> bool {
        self.state.executed_annotation_ids.insert(active.id);
        self.state.active_annotation_id = None;

        match active.mode {
            PlaybackMode::Natural => {
                tracing::info!(annotation_id = %active.id, current_time = now, "Annotation finished");
                self.restore_defaults(out);
                true
            }
            // The successor's levels replace the defaults directly, so no
            // restore is sent in between.
            PlaybackMode::Jump => match self.next_in_document(active).cloned() {
                Some(next) => {
                    self.chain_to(active, &next, now, out);
                    false
                }
                None => {
                    tracing::info!(annotation_id = %active.id, "Jump annotation has no successor");
                    self.restore_defaults(out);
                    true
                }
            },
            PlaybackMode::Pause { seconds } => {
                tracing::info!(
                    annotation_id = %active.id,
                    pause_seconds = seconds,
                    "Pausing for annotation"
                );
                self.restore_defaults(out);
                out.push(Directive::Pause);
                out.push(Directive::ScheduleResume {
                    after: Duration::from_secs(u64::from(seconds)),
                });
                self.awaiting_resume = true;
                self.state.last_known_time = now;
                false
            }
        }
    }

    /// Jump from `from` straight onto `next` with no idle gap.
    fn chain_to(&mut self, from: &Annotation, next: &Annotation, now: Seconds, out: &mut Vec<Directive>) {
        self.restore_pending = None;
        out.push(Directive::SetVolume(next.volume));
        out.push(Directive::SetRate(next.rate));
        out.push(Directive::SeekTo {
            seconds: next.start_time,
            origin: SeekOrigin::Engine,
        });

        // A forward jump skips part of the timeline; whatever starts in the
        // skipped span must not fire later.
        if next.start_time > from.end_time {
            for a in &self.annotations {
                if a.id != next.id && a.start_time > from.end_time && a.start_time < next.start_time {
                    self.state.executed_annotation_ids.insert(a.id);
                }
            }
        }

        tracing::info!(
            from = %from.id,
            to = %next.id,
            target_time = next.start_time,
            "Chaining to next annotation"
        );

        self.state.active_annotation_id = Some(next.id);
        self.state.last_known_time = next.start_time;
        self.pending_seek = Some(PendingSeek {
            origin: now,
            target: next.start_time,
            ticks_waited: 0,
        });
    }

    /// Idle rule: activate the highest-priority unexecuted annotation whose
    /// window contains `now` and whose start was reached recently enough.
    fn activate_if_due(&mut self, now: Seconds, out: &mut Vec<Directive>) {
        let executed = &self.state.executed_annotation_ids;
        let tolerance = self.config.activation_tolerance;
        let Some(candidate) = self
            .annotations
            .iter()
            .filter(|a| {
                a.contains(now) && !executed.contains(&a.id) && now - a.start_time <= tolerance
            })
            .min_by_key(|a| a.document_index)
            .cloned()
        else {
            return;
        };

        // Higher-priority annotations that playback already moved past are
        // retired so they can never fire out of order.
        for a in &self.annotations {
            if a.document_index < candidate.document_index && a.start_time < now {
                self.state.executed_annotation_ids.insert(a.id);
            }
        }

        tracing::info!(
            annotation_id = %candidate.id,
            document_index = candidate.document_index,
            current_time = now,
            volume = candidate.volume,
            rate = candidate.rate,
            "Annotation activated"
        );

        self.state.active_annotation_id = Some(candidate.id);
        self.restore_pending = None;
        out.push(Directive::SetVolume(candidate.volume));
        out.push(Directive::SetRate(candidate.rate));
    }

    fn reapply_on_drift(&self, active: &Annotation, snapshot: &PlayerSnapshot, out: &mut Vec<Directive>) {
        if snapshot.volume.abs_diff(active.volume) > self.config.volume_tolerance {
            out.push(Directive::SetVolume(active.volume));
        }
        if (snapshot.rate - active.rate).abs() > self.config.rate_tolerance {
            out.push(Directive::SetRate(active.rate));
        }
    }

    /// Recompute the executed set for a position the user moved to.
    fn apply_user_seek(&mut self, now: Seconds, out: &mut Vec<Directive>) {
        if self.state.active_annotation_id.take().is_some() {
            self.restore_defaults(out);
        }
        self.state.executed_annotation_ids = self
            .annotations
            .iter()
            .filter(|a| a.start_time < now && !a.contains(now))
            .map(|a| a.id)
            .collect();
        self.state.last_known_time = now;
    }

    fn clear(&mut self, out: &mut Vec<Directive>) {
        if self.state.active_annotation_id.take().is_some() {
            self.restore_defaults(out);
        }
        self.state.executed_annotation_ids.clear();
        self.pending_seek = None;
        self.awaiting_resume = false;
    }

    fn restore_defaults(&mut self, out: &mut Vec<Directive>) {
        let (volume, rate) = (self.state.default_volume, self.state.default_rate);
        out.push(Directive::SetVolume(volume));
        out.push(Directive::SetRate(rate));
        self.restore_pending = Some((volume, rate));
    }

    /// Re-send an unconfirmed restore, or adopt the player's levels as the
    /// new defaults once nothing is outstanding.
    fn track_defaults(&mut self, snapshot: &PlayerSnapshot, out: &mut Vec<Directive>) {
        if let Some((volume, rate)) = self.restore_pending {
            let volume_off = snapshot.volume.abs_diff(volume) > self.config.volume_tolerance;
            let rate_off = (snapshot.rate - rate).abs() > self.config.rate_tolerance;
            if volume_off || rate_off {
                tracing::debug!(
                    volume = snapshot.volume,
                    rate = snapshot.rate,
                    "Restore not observed, re-sending defaults"
                );
                if volume_off {
                    out.push(Directive::SetVolume(volume));
                }
                if rate_off {
                    out.push(Directive::SetRate(rate));
                }
                return;
            }
            self.restore_pending = None;
        }
        self.state.default_volume = snapshot.volume;
        self.state.default_rate = snapshot.rate;
    }

    // -- lookups -------------------------------------------------------------

    fn find(&self, id: Uuid) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    fn in_window(&self, a: &Annotation, now: Seconds) -> bool {
        now <= a.end_time && now >= a.start_time - self.config.activation_tolerance
    }

    /// Next unexecuted annotation after `a` in document order.
    fn next_in_document(&self, a: &Annotation) -> Option<&Annotation> {
        self.annotations.iter().find(|c| {
            c.document_index > a.document_index
                && !self.state.executed_annotation_ids.contains(&c.id)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cuemark_core::parse;

    /// Minimal player model: applies directives instantly.
    struct FakePlayer {
        time: Seconds,
        volume: u8,
        rate: f64,
        state: PlayerState,
    }

    impl FakePlayer {
        fn new() -> Self {
            Self {
                time: 0.0,
                volume: 100,
                rate: 1.0,
                state: PlayerState::Playing,
            }
        }

        fn snapshot(&self) -> PlayerSnapshot {
            PlayerSnapshot {
                current_time: self.time,
                volume: self.volume,
                rate: self.rate,
                state: self.state,
            }
        }

        fn apply(&mut self, directives: &[Directive]) {
            for d in directives {
                match *d {
                    Directive::SetVolume(v) => self.volume = v,
                    Directive::SetRate(r) => self.rate = r,
                    Directive::SeekTo { seconds, .. } => self.time = seconds,
                    Directive::Pause => self.state = PlayerState::Paused,
                    Directive::Play => self.state = PlayerState::Playing,
                    Directive::ScheduleResume { .. } => {}
                }
            }
        }
    }

    fn resolver(text: &str) -> ExecutionResolver {
        let mut r = ExecutionResolver::new(ResolverConfig::default());
        let _ = r.load_annotations(parse(text));
        r
    }

    /// Tick at `time` and apply the result to `player`.
    fn step(r: &mut ExecutionResolver, player: &mut FakePlayer, time: Seconds) -> Vec<Directive> {
        player.time = time;
        let out = r.tick(&player.snapshot());
        player.apply(&out);
        out
    }

    /// Advance in 100 ms steps from `from` to `to` inclusive.
    fn play(r: &mut ExecutionResolver, player: &mut FakePlayer, from: Seconds, to: Seconds) {
        let mut t = from;
        while t <= to + 1e-9 {
            step(r, player, (t * 1000.0).round() / 1000.0);
            t += 0.1;
        }
    }

    const ABC: &str = "[00:00:00.000-00:00:05.000,50%,1.00x] \
                       [00:00:10.000-00:00:15.000,60%,1.25x] \
                       [00:00:20.000-00:00:25.000,70%,1.50x]";

    // -- activation ----------------------------------------------------------

    #[test]
    fn activates_at_window_start_and_restores_after() {
        let mut r = resolver("[00:00:05.000-00:00:10.000,40%,0.75x]");
        let mut p = FakePlayer::new();

        play(&mut r, &mut p, 0.0, 4.9);
        assert_eq!(r.phase(), Phase::Idle);

        let out = step(&mut r, &mut p, 5.0);
        assert_eq!(out, vec![Directive::SetVolume(40), Directive::SetRate(0.75)]);
        assert_eq!(r.phase(), Phase::Active);

        play(&mut r, &mut p, 5.1, 10.0);
        let out = step(&mut r, &mut p, 10.1);
        assert_eq!(out, vec![Directive::SetVolume(100), Directive::SetRate(1.0)]);
        assert_eq!(r.phase(), Phase::Idle);
        assert_eq!(r.state().executed_annotation_ids.len(), 1);
    }

    #[test]
    fn defaults_track_levels_seen_while_idle() {
        let mut r = resolver("[00:00:05.000-00:00:10.000,40%,0.75x]");
        let mut p = FakePlayer::new();
        p.volume = 65;
        p.rate = 1.1;

        play(&mut r, &mut p, 0.0, 10.0);
        let out = step(&mut r, &mut p, 10.1);
        assert_eq!(out, vec![Directive::SetVolume(65), Directive::SetRate(1.1)]);
    }

    #[test]
    fn late_tick_beyond_tolerance_does_not_activate() {
        let mut r = resolver("[00:00:05.000-00:00:10.000,40%,0.75x]");
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 3.0, 4.5);
        let out = step(&mut r, &mut p, 5.8);
        assert!(out.is_empty());
        assert_eq!(r.phase(), Phase::Idle);
    }

    #[test]
    fn no_redundant_calls_while_levels_hold() {
        let mut r = resolver("[00:00:01.000-00:00:09.000,40%,0.75x]");
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.0, 1.0);
        assert_eq!(r.phase(), Phase::Active);

        for t in [1.1, 1.2, 1.3] {
            assert!(step(&mut r, &mut p, t).is_empty());
        }
    }

    #[test]
    fn drifted_levels_are_reapplied() {
        let mut r = resolver("[00:00:01.000-00:00:09.000,40%,0.75x]");
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.0, 1.0);

        p.volume = 90;
        assert_eq!(step(&mut r, &mut p, 1.1), vec![Directive::SetVolume(40)]);

        p.volume = 41;
        p.rate = 0.755;
        assert!(step(&mut r, &mut p, 1.2).is_empty());

        p.rate = 1.0;
        assert_eq!(step(&mut r, &mut p, 1.3), vec![Directive::SetRate(0.75)]);
    }

    // -- restore confirmation ------------------------------------------------

    #[test]
    fn dropped_restore_is_resent_until_observed() {
        let mut r = resolver("[00:00:05.000-00:00:10.000,40%,0.75x]");
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 4.0, 10.0);
        assert_eq!(p.volume, 40);

        // The restore never reaches the player.
        let restore = vec![Directive::SetVolume(100), Directive::SetRate(1.0)];
        let mut t = 10.1;
        while t <= 15.0 {
            let out = r.tick(&PlayerSnapshot {
                current_time: t,
                ..p.snapshot()
            });
            assert_eq!(out, restore);
            assert_eq!(r.state().default_volume, 100);
            assert_eq!(r.state().default_rate, 1.0);
            t += 0.1;
        }

        assert_eq!(step(&mut r, &mut p, 15.1), restore);
        assert!(step(&mut r, &mut p, 15.2).is_empty());
        assert_eq!(r.state().default_volume, 100);
    }

    #[test]
    fn partially_applied_restore_resends_missing_level() {
        let mut r = resolver("[00:00:05.000-00:00:10.000,40%,0.75x]");
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 4.0, 10.0);

        p.time = 10.1;
        let out = r.tick(&p.snapshot());
        assert_eq!(out, vec![Directive::SetVolume(100), Directive::SetRate(1.0)]);
        p.volume = 100;

        assert_eq!(step(&mut r, &mut p, 10.2), vec![Directive::SetRate(1.0)]);
        assert!(step(&mut r, &mut p, 10.3).is_empty());
        assert_eq!(p.rate, 1.0);
    }

    #[test]
    fn idle_level_changes_after_confirmed_restore_become_defaults() {
        let mut r = resolver(
            "[00:00:05.000-00:00:10.000,40%,0.75x] [00:00:20.000-00:00:25.000,60%,1.00x]",
        );
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 4.0, 10.5);
        assert_eq!(p.volume, 100);

        p.volume = 80;
        assert!(step(&mut r, &mut p, 10.6).is_empty());
        assert_eq!(r.state().default_volume, 80);

        play(&mut r, &mut p, 19.5, 25.1);
        assert_eq!(p.volume, 80);
    }

    // -- priority & exclusivity ---------------------------------------------

    #[test]
    fn document_order_wins_over_start_time() {
        // Both windows start at 5; the second in the text must lose.
        let mut r = resolver(
            "[00:00:05.000-00:00:08.000,20%,1.00x] [00:00:05.000-00:00:12.000,90%,1.00x]",
        );
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 4.0, 5.0);
        assert_eq!(r.active().unwrap().document_index, 0);
        assert_eq!(p.volume, 20);
    }

    #[test]
    fn overlapping_window_never_double_fires() {
        let mut r = resolver(
            "[00:00:05.000-00:00:15.000,20%,1.00x] [00:00:08.000-00:00:12.000,90%,1.00x]",
        );
        let mut p = FakePlayer::new();
        let second = r.annotations()[1].id;

        let mut t = 4.0;
        while t <= 20.0 {
            step(&mut r, &mut p, t);
            assert_ne!(r.state().active_annotation_id, Some(second));
            t += 0.1;
        }
        assert_eq!(p.volume, 100);
    }

    #[test]
    fn activation_retires_passed_higher_priority_annotations() {
        // Index 0 starts at 5 but is not reached in time; index 1 fires at 6.
        let mut r = resolver(
            "[00:00:05.000-00:00:07.000,20%,1.00x] [00:00:06.000-00:00:08.000,90%,1.00x]",
        );
        let mut p = FakePlayer::new();
        step(&mut r, &mut p, 4.0);
        step(&mut r, &mut p, 5.8);
        assert_eq!(r.phase(), Phase::Idle);

        step(&mut r, &mut p, 6.1);
        let first = r.annotations()[0].id;
        assert_eq!(r.active().unwrap().document_index, 1);
        assert!(r.state().executed_annotation_ids.contains(&first));
    }

    #[test]
    fn executed_set_only_grows_without_seeks() {
        let mut r = resolver(ABC);
        let mut p = FakePlayer::new();
        let mut previous: HashSet<Uuid> = HashSet::new();

        let mut t = 0.0;
        while t <= 30.0 {
            step(&mut r, &mut p, t);
            let current = r.state().executed_annotation_ids.clone();
            assert!(previous.is_subset(&current));
            previous = current;
            t += 0.1;
        }
        assert_eq!(previous.len(), 3);
    }

    // -- seeks ---------------------------------------------------------------

    #[test]
    fn seek_back_to_two_seconds_resets_executed_set() {
        let mut r = resolver(ABC);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.0, 26.0);
        assert_eq!(r.state().executed_annotation_ids.len(), 3);

        step(&mut r, &mut p, 2.0);
        assert!(r.state().executed_annotation_ids.is_empty());
        assert_eq!(r.phase(), Phase::Idle);
    }

    #[test]
    fn forward_seek_retires_skipped_annotations() {
        let mut r = resolver(ABC);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 6.0, 7.0);

        step(&mut r, &mut p, 21.0);
        let ids = &r.state().executed_annotation_ids;
        assert!(ids.contains(&r.annotations()[0].id));
        assert!(ids.contains(&r.annotations()[1].id));
        assert!(!ids.contains(&r.annotations()[2].id));
    }

    #[test]
    fn user_seek_out_of_active_window_restores_defaults() {
        let mut r = resolver(ABC);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 9.5, 11.0);
        assert_eq!(p.volume, 60);

        let out = step(&mut r, &mut p, 40.0);
        assert_eq!(out, vec![Directive::SetVolume(100), Directive::SetRate(1.0)]);
        assert_eq!(r.phase(), Phase::Idle);
    }

    #[test]
    fn seek_onto_a_window_start_activates_it() {
        let mut r = resolver(ABC);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 30.0, 31.0);
        step(&mut r, &mut p, 10.0);
        assert_eq!(r.active().unwrap().document_index, 1);
    }

    #[test]
    fn requested_user_seek_applies_without_threshold() {
        let mut r = resolver(ABC);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 9.5, 11.0);

        let out = r.user_seek(11.5);
        assert_eq!(
            out[0],
            Directive::SeekTo {
                seconds: 11.5,
                origin: SeekOrigin::User
            }
        );
        assert_eq!(r.phase(), Phase::Idle);
    }

    // -- jump chaining -------------------------------------------------------

    const CHAIN: &str = "[00:00:05.000-00:00:10.000,50%,1.00x] ... \
                         [00:00:15.000-00:00:20.000,100%,1.50x,->] ... \
                         [00:00:25.000-00:00:30.000,80%,1.00x]";

    #[test]
    fn jump_preapplies_levels_then_seeks_to_next() {
        let mut r = resolver(CHAIN);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 14.0, 20.0);
        assert_eq!(r.active().unwrap().document_index, 1);

        let out = r.tick(&PlayerSnapshot {
            current_time: 20.1,
            ..p.snapshot()
        });
        assert_eq!(
            out,
            vec![
                Directive::SetVolume(80),
                Directive::SetRate(1.0),
                Directive::SeekTo {
                    seconds: 25.0,
                    origin: SeekOrigin::Engine
                },
            ]
        );
        let second = r.annotations()[1].id;
        let third = r.annotations()[2].id;
        assert!(r.state().executed_annotation_ids.contains(&second));
        assert_eq!(r.state().active_annotation_id, Some(third));
        assert_eq!(r.phase(), Phase::Chaining);
    }

    #[test]
    fn landed_jump_is_not_mistaken_for_user_seek() {
        let mut r = resolver(CHAIN);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 14.0, 20.0);
        step(&mut r, &mut p, 20.1);

        // The player is now at 25.0 after applying the seek.
        let out = step(&mut r, &mut p, 25.05);
        assert!(out.is_empty());
        assert_eq!(r.phase(), Phase::Active);
        assert_eq!(r.active().unwrap().document_index, 2);
        assert!(r
            .state()
            .executed_annotation_ids
            .contains(&r.annotations()[1].id));
    }

    #[test]
    fn jump_still_in_flight_is_waited_out() {
        let mut r = resolver(CHAIN);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 14.0, 20.0);
        r.tick(&PlayerSnapshot {
            current_time: 20.1,
            ..p.snapshot()
        });

        // Player has not moved yet.
        let out = r.tick(&PlayerSnapshot {
            current_time: 20.15,
            volume: 80,
            rate: 1.0,
            state: PlayerState::Playing,
        });
        assert!(out.is_empty());
        assert_eq!(r.phase(), Phase::Chaining);

        let out = r.tick(&PlayerSnapshot {
            current_time: 25.0,
            volume: 80,
            rate: 1.0,
            state: PlayerState::Playing,
        });
        assert!(out.is_empty());
        assert_eq!(r.phase(), Phase::Active);
    }

    #[test]
    fn jump_without_successor_restores_defaults() {
        let mut r = resolver("[00:00:01.000-00:00:02.000,30%,1.00x,->]");
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.5, 2.0);
        let out = step(&mut r, &mut p, 2.1);
        assert_eq!(out, vec![Directive::SetVolume(100), Directive::SetRate(1.0)]);
    }

    #[test]
    fn jump_target_follows_document_order_not_time() {
        let mut r = resolver(
            "[00:00:20.000-00:00:22.000,30%,1.00x,->] \
             [00:00:40.000-00:00:42.000,60%,1.00x] \
             [00:00:30.000-00:00:32.000,90%,1.00x]",
        );
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 19.5, 22.0);
        let out = step(&mut r, &mut p, 22.1);
        assert!(out.contains(&Directive::SeekTo {
            seconds: 40.0,
            origin: SeekOrigin::Engine
        }));

        step(&mut r, &mut p, 40.1);
        assert_eq!(r.phase(), Phase::Active);
        assert_eq!(r.active().unwrap().document_index, 1);
        assert_eq!(p.volume, 60);
    }

    #[test]
    fn forward_jump_retires_annotations_in_skipped_span() {
        let mut r = resolver(
            "[00:00:01.000-00:00:02.000,30%,1.00x,->] \
             [00:00:10.000-00:00:12.000,60%,1.00x] \
             [00:00:05.000-00:00:06.000,90%,1.00x]",
        );
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.5, 2.0);
        step(&mut r, &mut p, 2.1);
        assert!(r
            .state()
            .executed_annotation_ids
            .contains(&r.annotations()[2].id));
    }

    // -- pause ---------------------------------------------------------------

    #[test]
    fn pause_mode_pauses_and_schedules_resume() {
        let mut r = resolver("[00:00:01.000-00:00:04.000,30%,1.00x,|3]");
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.5, 4.0);

        let out = step(&mut r, &mut p, 4.1);
        assert_eq!(
            out,
            vec![
                Directive::SetVolume(100),
                Directive::SetRate(1.0),
                Directive::Pause,
                Directive::ScheduleResume {
                    after: Duration::from_secs(3)
                },
            ]
        );
        assert_eq!(r.phase(), Phase::Paused);

        // While paused nothing becomes active.
        assert!(step(&mut r, &mut p, 4.1).is_empty());

        assert_eq!(r.resume_due(), vec![Directive::Play]);
        assert_eq!(r.phase(), Phase::Idle);
        assert!(r.resume_due().is_empty());
    }

    #[test]
    fn annotation_at_pause_point_waits_for_resume() {
        let mut r = resolver(
            "[00:00:01.000-00:00:04.000,30%,1.00x,|3] [00:00:04.000-00:00:06.000,70%,1.50x]",
        );
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.5, 4.0);
        assert_eq!(r.active().unwrap().document_index, 0);

        let out = step(&mut r, &mut p, 4.1);
        assert!(out.contains(&Directive::Pause));
        assert_eq!(r.phase(), Phase::Paused);

        for _ in 0..5 {
            assert!(step(&mut r, &mut p, 4.1).is_empty());
            assert_eq!(r.phase(), Phase::Paused);
            assert_eq!(r.state().active_annotation_id, None);
        }

        let out = r.resume_due();
        p.apply(&out);
        assert_eq!(r.phase(), Phase::Idle);

        let out = step(&mut r, &mut p, 4.2);
        assert_eq!(out, vec![Directive::SetVolume(70), Directive::SetRate(1.5)]);
        assert_eq!(r.active().unwrap().document_index, 1);
    }

    #[test]
    fn reset_swallows_pending_resume() {
        let mut r = resolver("[00:00:01.000-00:00:04.000,30%,1.00x,|3]");
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.5, 4.1);
        assert_eq!(r.phase(), Phase::Paused);

        r.reset();
        assert!(r.resume_due().is_empty());
    }

    // -- end of media / restart ---------------------------------------------

    #[test]
    fn end_of_media_clears_state() {
        let mut r = resolver(ABC);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.0, 22.0);
        assert_eq!(r.phase(), Phase::Active);

        p.state = PlayerState::Ended;
        let out = step(&mut r, &mut p, 22.1);
        assert_eq!(out, vec![Directive::SetVolume(100), Directive::SetRate(1.0)]);
        assert_eq!(r.state().active_annotation_id, None);
        assert!(r.state().executed_annotation_ids.is_empty());
    }

    #[test]
    fn restart_from_zero_replays_like_first_pass() {
        let mut r = resolver(ABC);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.0, 30.0);
        assert_eq!(r.state().executed_annotation_ids.len(), 3);

        step(&mut r, &mut p, 0.1);
        assert_eq!(r.active().unwrap().document_index, 0);
        assert!(r.state().executed_annotation_ids.is_empty());
    }

    // -- reloads -------------------------------------------------------------

    #[test]
    fn reload_keeps_executed_ids_of_unchanged_annotations() {
        let mut r = resolver(ABC);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 0.0, 16.0);
        assert_eq!(r.state().executed_annotation_ids.len(), 2);

        let edited = format!("{ABC} [00:00:40.000-00:00:45.000,10%,1.00x]");
        r.load_annotations(parse(&edited));
        assert_eq!(r.state().executed_annotation_ids.len(), 2);
    }

    #[test]
    fn reload_dropping_active_annotation_restores_defaults() {
        let mut r = resolver(ABC);
        let mut p = FakePlayer::new();
        play(&mut r, &mut p, 9.5, 11.0);
        assert_eq!(r.phase(), Phase::Active);

        let out = r.load_annotations(parse("[00:00:20.000-00:00:25.000,70%,1.50x]"));
        assert_eq!(out, vec![Directive::SetVolume(100), Directive::SetRate(1.0)]);
        assert_eq!(r.phase(), Phase::Idle);
    }
}
