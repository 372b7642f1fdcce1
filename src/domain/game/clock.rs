//! Move clock: remaining thinking time per side.
//!
//! The clock never polls. It stores each side's remaining time as of the
//! last tick (a wall-clock timestamp captured when a move was applied) and
//! derives the live value on demand, so any observer holding the same
//! `(last_tick, remaining_at_last_tick)` pair computes the same answer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::chess::Color;
use crate::domain::foundation::Timestamp;

/// Serializable snapshot of a clock at one instant.
///
/// Carried in `movePlayed` messages and kept per move for takeback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub white_remaining_ms: u64,
    pub black_remaining_ms: u64,
    /// Side whose clock was running at `captured_at`.
    pub running: Option<Color>,
    pub captured_at: Timestamp,
}

impl ClockState {
    fn remaining_ms(&self, color: Color) -> u64 {
        match color {
            Color::White => self.white_remaining_ms,
            Color::Black => self.black_remaining_ms,
        }
    }
}

/// Tracks remaining time for both colors; only the running side decreases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveClock {
    white: Duration,
    black: Duration,
    running: Option<Color>,
    last_tick: Timestamp,
    flagged: Option<Color>,
}

impl MoveClock {
    /// A stopped clock with the same budget on both sides.
    pub fn new(initial: Duration, now: Timestamp) -> Self {
        Self {
            white: initial,
            black: initial,
            running: None,
            last_tick: now,
            flagged: None,
        }
    }

    /// Rebuild a clock from a snapshot, e.g. after reconnecting.
    ///
    /// Remaining time at any later instant is recomputed from the snapshot
    /// alone, so two participants resuming from the same state agree.
    pub fn resume(state: ClockState) -> Self {
        Self {
            white: Duration::from_millis(state.white_remaining_ms),
            black: Duration::from_millis(state.black_remaining_ms),
            running: state.running,
            last_tick: state.captured_at,
            flagged: None,
        }
    }

    /// Start `color`'s clock at `now`, settling whichever side was running.
    pub fn start(&mut self, color: Color, now: Timestamp) {
        self.settle(now);
        self.running = Some(color);
    }

    /// Stop the running clock at `now`. Idempotent.
    pub fn stop(&mut self, now: Timestamp) {
        self.settle(now);
        self.running = None;
    }

    /// Time elapsed from `last_tick` to `now`, never negative.
    pub fn elapsed_since(&self, last_tick: Timestamp, now: Timestamp) -> Duration {
        now.saturating_since(&last_tick)
    }

    /// Remaining time for `color` at `now`, floored at zero.
    pub fn remaining(&self, color: Color, now: Timestamp) -> Duration {
        let stored = self.stored(color);
        if self.running == Some(color) {
            stored.saturating_sub(self.elapsed_since(self.last_tick, now))
        } else {
            stored
        }
    }

    /// Side whose clock is running, if any.
    pub fn running(&self) -> Option<Color> {
        self.running
    }

    /// Instant at which the running side's time runs out.
    pub fn deadline(&self) -> Option<(Color, Timestamp)> {
        self.running
            .map(|color| (color, self.last_tick.plus(self.stored(color))))
    }

    /// Raise the timeout signal if the running side has reached zero.
    ///
    /// Returns the flagged color the first time only; afterwards the clock
    /// is stopped and this always returns `None`.
    pub fn check_timeout(&mut self, now: Timestamp) -> Option<Color> {
        if self.flagged.is_some() {
            return None;
        }
        let color = self.running?;
        if self.remaining(color, now).is_zero() {
            self.stop(now);
            self.flagged = Some(color);
            return Some(color);
        }
        None
    }

    /// Color whose time ran out, once the timeout has been raised.
    pub fn flagged(&self) -> Option<Color> {
        self.flagged
    }

    /// Add time to a side (increment after a move).
    pub fn add(&mut self, color: Color, extra: Duration) {
        match color {
            Color::White => self.white += extra,
            Color::Black => self.black += extra,
        }
    }

    /// Lower a stopped side's remaining time to what `reported` shows for
    /// it at this clock's last tick. Never adds time.
    ///
    /// Returns `true` if the clock changed.
    pub fn reconcile(&mut self, color: Color, reported: ClockState) -> bool {
        if self.running == Some(color) || self.flagged.is_some() {
            return false;
        }
        let theirs = MoveClock::resume(reported).remaining(color, self.last_tick);
        if theirs >= self.stored(color) {
            return false;
        }
        match color {
            Color::White => self.white = theirs,
            Color::Black => self.black = theirs,
        }
        true
    }

    /// Snapshot of the clock as of `now`.
    pub fn state(&self, now: Timestamp) -> ClockState {
        ClockState {
            white_remaining_ms: millis(self.remaining(Color::White, now)),
            black_remaining_ms: millis(self.remaining(Color::Black, now)),
            running: self.running,
            captured_at: now,
        }
    }

    /// Restore remaining times from a snapshot and run `running` from `now`.
    pub fn restore(&mut self, state: &ClockState, running: Option<Color>, now: Timestamp) {
        self.white = Duration::from_millis(state.remaining_ms(Color::White));
        self.black = Duration::from_millis(state.remaining_ms(Color::Black));
        self.running = running;
        self.last_tick = now;
    }

    fn stored(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    fn settle(&mut self, now: Timestamp) {
        if let Some(color) = self.running {
            let left = self.remaining(color, now);
            match color {
                Color::White => self.white = left,
                Color::Black => self.black = left,
            }
        }
        // never move the tick backwards
        self.last_tick = self.last_tick.max(now);
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TEN_MINUTES: Duration = Duration::from_secs(600);

    #[test]
    fn new_clock_is_stopped_with_full_budget() {
        let t0 = Timestamp::now();
        let clock = MoveClock::new(TEN_MINUTES, t0);
        assert_eq!(clock.running(), None);
        assert_eq!(clock.remaining(Color::White, t0.plus_secs(30)), TEN_MINUTES);
        assert_eq!(clock.remaining(Color::Black, t0.plus_secs(30)), TEN_MINUTES);
    }

    #[test]
    fn only_running_side_decrements() {
        let t0 = Timestamp::now();
        let mut clock = MoveClock::new(TEN_MINUTES, t0);
        clock.start(Color::White, t0);

        let t1 = t0.plus_secs(12);
        assert_eq!(clock.remaining(Color::White, t1), Duration::from_secs(588));
        assert_eq!(clock.remaining(Color::Black, t1), TEN_MINUTES);
    }

    #[test]
    fn switching_freezes_previous_side() {
        let t0 = Timestamp::now();
        let mut clock = MoveClock::new(TEN_MINUTES, t0);
        clock.start(Color::White, t0);
        clock.start(Color::Black, t0.plus_secs(5));

        let later = t0.plus_secs(65);
        assert_eq!(clock.remaining(Color::White, later), Duration::from_secs(595));
        assert_eq!(clock.remaining(Color::Black, later), Duration::from_secs(540));
    }

    #[test]
    fn stop_freezes_both_sides() {
        let t0 = Timestamp::now();
        let mut clock = MoveClock::new(TEN_MINUTES, t0);
        clock.start(Color::Black, t0);
        clock.stop(t0.plus_secs(10));
        clock.stop(t0.plus_secs(20));

        let later = t0.plus_secs(500);
        assert_eq!(clock.remaining(Color::Black, later), Duration::from_secs(590));
        assert_eq!(clock.running(), None);
    }

    #[test]
    fn timeout_is_raised_exactly_once() {
        let t0 = Timestamp::now();
        let mut clock = MoveClock::new(Duration::from_secs(3), t0);
        clock.start(Color::White, t0);

        assert_eq!(clock.check_timeout(t0.plus_secs(2)), None);
        assert_eq!(clock.check_timeout(t0.plus_secs(4)), Some(Color::White));
        assert_eq!(clock.check_timeout(t0.plus_secs(5)), None);
        assert_eq!(clock.flagged(), Some(Color::White));
        assert_eq!(clock.remaining(Color::White, t0.plus_secs(60)), Duration::ZERO);
    }

    #[test]
    fn deadline_points_at_exhaustion() {
        let t0 = Timestamp::now();
        let mut clock = MoveClock::new(Duration::from_secs(30), t0);
        assert_eq!(clock.deadline(), None);
        clock.start(Color::Black, t0.plus_secs(10));
        assert_eq!(clock.deadline(), Some((Color::Black, t0.plus_secs(40))));
    }

    #[test]
    fn resume_recomputes_from_snapshot() {
        let t0 = Timestamp::now();
        let mut clock = MoveClock::new(TEN_MINUTES, t0);
        clock.start(Color::White, t0);
        let state = clock.state(t0.plus_secs(100));

        let resumed = MoveClock::resume(state);
        let now = t0.plus_secs(160);
        assert_eq!(
            resumed.remaining(Color::White, now),
            clock.remaining(Color::White, now)
        );
        assert_eq!(resumed.remaining(Color::White, now), Duration::from_secs(440));
    }

    #[test]
    fn reconcile_takes_lower_reported_time_for_stopped_side() {
        let t0 = Timestamp::now();
        let mut clock = MoveClock::new(TEN_MINUTES, t0);
        clock.start(Color::White, t0);
        clock.start(Color::Black, t0.plus_secs(10));

        // the peer charged white 12s for the same move
        let mut peer = MoveClock::new(TEN_MINUTES, t0);
        peer.start(Color::White, t0);
        peer.start(Color::Black, t0.plus_secs(12));
        let reported = peer.state(t0.plus_secs(12));

        assert!(clock.reconcile(Color::White, reported));
        assert_eq!(clock.remaining(Color::White, t0.plus_secs(90)), Duration::from_secs(588));
        assert!(!clock.reconcile(Color::White, reported));
        // black is running and keeps its own accounting
        assert!(!clock.reconcile(Color::Black, reported));
    }

    #[test]
    fn reconcile_ignores_reports_with_more_time() {
        let t0 = Timestamp::now();
        let mut clock = MoveClock::new(TEN_MINUTES, t0);
        clock.start(Color::White, t0);
        clock.start(Color::Black, t0.plus_secs(10));

        let generous = MoveClock::new(TEN_MINUTES, t0).state(t0.plus_secs(10));
        assert!(!clock.reconcile(Color::White, generous));
        assert_eq!(clock.remaining(Color::White, t0.plus_secs(20)), Duration::from_secs(590));
    }

    #[test]
    fn restore_rewinds_to_snapshot() {
        let t0 = Timestamp::now();
        let mut clock = MoveClock::new(TEN_MINUTES, t0);
        clock.start(Color::White, t0);
        let before = clock.state(t0.plus_secs(7));
        clock.start(Color::Black, t0.plus_secs(7));

        let now = t0.plus_secs(30);
        clock.restore(&before, Some(Color::White), now);
        assert_eq!(clock.remaining(Color::White, now), Duration::from_secs(593));
        assert_eq!(clock.remaining(Color::Black, now), TEN_MINUTES);
        assert_eq!(clock.running(), Some(Color::White));
    }

    #[test]
    fn increment_adds_to_side() {
        let t0 = Timestamp::now();
        let mut clock = MoveClock::new(TEN_MINUTES, t0);
        clock.add(Color::Black, Duration::from_secs(2));
        assert_eq!(clock.remaining(Color::Black, t0), Duration::from_secs(602));
    }

    proptest! {
        #[test]
        fn remaining_never_negative(budget_ms in 0u64..10_000, ticks in proptest::collection::vec(0u64..5_000, 1..20)) {
            let t0 = Timestamp::now();
            let mut clock = MoveClock::new(Duration::from_millis(budget_ms), t0);
            let mut now = t0;
            let mut color = Color::White;
            let mut before = clock.remaining(color, now);
            clock.start(color, now);
            for step in ticks {
                now = now.plus_millis(step);
                let left = clock.remaining(color, now);
                prop_assert!(left <= before);
                prop_assert!(left <= Duration::from_millis(budget_ms));
                color = color.opposite();
                before = clock.remaining(color, now);
                clock.start(color, now);
            }
        }
    }
}
