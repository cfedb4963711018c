//! Cycle scheduler (§4.G): decides when an output advances to the next
//! image/shader and dispatches the `next`/`set <idx>` control-plane
//! commands onto the tracked outputs.
//!
//! Grounded on the teacher's `scheduler` crate tick-loop shape (advance a
//! per-target cursor once its dwell time elapses), simplified per the
//! spec: no shuffle mode, just an ordered `current_cycle_index` advance,
//! and two global one-shot request channels (`next`, `set <idx>`) instead
//! of the teacher's per-playlist selection API.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::time::Instant;

/// Upper bound on queued `next` requests, matching §6/§8's saturating
/// clamp ("`next_requested` saturates at 100 if flooded").
pub const MAX_QUEUED_NEXT: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("output '{output}' cannot cycle: only {count} item(s) in its cycle list")]
    CannotCycle { output: String, count: usize },
    #[error("set index {index} out of range for output '{output}' (cycle has {count} item(s))")]
    IndexOutOfRange {
        output: String,
        index: usize,
        count: usize,
    },
}

/// What the scheduler did to one output during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Advanced,
    SetToIndex(usize),
    Unchanged,
}

/// The subset of an output's render state the scheduler needs to decide
/// and act, implemented by `driftwall-render`'s output engine. Kept as a
/// trait so this crate carries no GPU dependency.
pub trait CycleTarget {
    fn output_id(&self) -> &str;
    /// Number of entries in this output's cycle list (0 or 1 means
    /// cycling is effectively disabled).
    fn cycle_count(&self) -> usize;
    fn current_cycle_index(&self) -> usize;
    /// True while cycling is paused (SIGUSR2/CLI `pause`): `next`, `set
    /// <idx>`, and time-based cycling all freeze, but rendering itself
    /// must not (§4.G/§6 — a paused shader keeps animating).
    fn is_paused(&self) -> bool;
    /// True iff cycling is enabled, a positive duration has elapsed since
    /// the last cycle, and the output isn't mid-transition (§4.E).
    fn should_cycle(&self, now: Instant) -> bool;
    /// Advances to the next item in order (wrapping), restarting the
    /// cycle timer.
    fn advance_cycle(&mut self, now: Instant);
    /// Jumps directly to `index`, restarting the cycle timer. Caller has
    /// already validated `index < cycle_count()`.
    fn set_cycle_index(&mut self, index: usize, now: Instant);
}

/// Global one-shot request state shared between the signalfd/CLI handlers
/// (which write it) and the scheduler tick (which drains it). Atomics per
/// §5's concurrency model: release/acquire on transitions, sequential
/// consistency on the saturating clamp of `next_requested`.
#[derive(Default)]
pub struct CycleRequests {
    next_requested: AtomicU32,
    set_index_requested: AtomicI32,
}

impl CycleRequests {
    pub fn new() -> Self {
        Self {
            next_requested: AtomicU32::new(0),
            set_index_requested: AtomicI32::new(-1),
        }
    }

    /// SIGUSR1 / CLI `next`: queue one more cycle advance, clamped at
    /// [`MAX_QUEUED_NEXT`].
    pub fn request_next(&self) {
        self.next_requested
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_add(1).min(MAX_QUEUED_NEXT))
            })
            .ok();
    }

    /// CLI `set <idx>` (via the set-index file + SIGRTMIN handoff):
    /// records the requested index. A negative value is not
    /// representable; callers must validate their own input range first.
    pub fn request_set_index(&self, index: u32) {
        self.set_index_requested
            .store(index as i32, Ordering::Release);
    }

    pub fn queued_next(&self) -> u32 {
        self.next_requested.load(Ordering::SeqCst)
    }

    pub fn pending_set_index(&self) -> Option<u32> {
        let value = self.set_index_requested.load(Ordering::Acquire);
        if value < 0 {
            None
        } else {
            Some(value as u32)
        }
    }
}

/// Drives one tick of the cycle scheduler across the given set of
/// outputs. Order of precedence per output, matching §4.G: an explicit
/// `set <idx>` request wins, then a queued `next`, then time-based
/// `should_cycle`. At most one advance happens per output per tick (the
/// §8 "one visible switch" invariant).
pub struct CycleScheduler {
    requests: CycleRequests,
}

impl CycleScheduler {
    pub fn new() -> Self {
        Self {
            requests: CycleRequests::new(),
        }
    }

    pub fn requests(&self) -> &CycleRequests {
        &self.requests
    }

    /// Runs one scheduler tick over `outputs`, returning the outcome for
    /// each in the same order. `set_index_requested` is read and cleared
    /// exactly once per tick, regardless of how many outputs it applies
    /// to or whether it was in range for any of them (§4.G: "always clear
    /// the request to -1 afterward").
    pub fn tick<T: CycleTarget>(&self, now: Instant, outputs: &mut [T]) -> Vec<CycleOutcome> {
        let pending_index = self.requests.set_index_requested.swap(-1, Ordering::AcqRel);
        let mut remaining_next = self.requests.next_requested.load(Ordering::SeqCst);
        let mut consumed_next = 0u32;

        let mut outcomes = Vec::with_capacity(outputs.len());
        for output in outputs.iter_mut() {
            if output.is_paused() {
                outcomes.push(CycleOutcome::Unchanged);
                continue;
            }

            if pending_index >= 0 {
                let index = pending_index as usize;
                if index < output.cycle_count() {
                    output.set_cycle_index(index, now);
                    outcomes.push(CycleOutcome::SetToIndex(index));
                    continue;
                }
                tracing::warn!(
                    output = output.output_id(),
                    index,
                    count = output.cycle_count(),
                    "set-index request out of range; ignoring for this output"
                );
            }

            if remaining_next > 0 && output.cycle_count() > 1 {
                output.advance_cycle(now);
                remaining_next -= 1;
                consumed_next += 1;
                outcomes.push(CycleOutcome::Advanced);
                continue;
            }

            if output.should_cycle(now) {
                output.advance_cycle(now);
                outcomes.push(CycleOutcome::Advanced);
            } else {
                outcomes.push(CycleOutcome::Unchanged);
            }
        }

        if consumed_next > 0 {
            self.requests
                .next_requested
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                    Some(v.saturating_sub(consumed_next))
                })
                .ok();
        }

        outcomes
    }
}

impl Default for CycleScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates a CLI-issued `set <idx>` against a known cycle count
/// (typically read from the state file, so the CLI can reject out-of-
/// range requests without waking the daemon; §8 scenario 4).
pub fn validate_set_index(output: &str, index: usize, cycle_count: usize) -> Result<(), CycleError> {
    if cycle_count <= 1 {
        return Err(CycleError::CannotCycle {
            output: output.to_string(),
            count: cycle_count,
        });
    }
    if index >= cycle_count {
        return Err(CycleError::IndexOutOfRange {
            output: output.to_string(),
            index,
            count: cycle_count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct FakeOutput {
        id: String,
        count: usize,
        index: usize,
        last_cycle: Instant,
        duration: Duration,
        mid_transition: bool,
        paused: bool,
    }

    impl CycleTarget for FakeOutput {
        fn output_id(&self) -> &str {
            &self.id
        }
        fn cycle_count(&self) -> usize {
            self.count
        }
        fn current_cycle_index(&self) -> usize {
            self.index
        }
        fn is_paused(&self) -> bool {
            self.paused
        }
        fn should_cycle(&self, now: Instant) -> bool {
            self.count > 1
                && self.duration > Duration::ZERO
                && !self.mid_transition
                && now.duration_since(self.last_cycle) >= self.duration
        }
        fn advance_cycle(&mut self, now: Instant) {
            self.index = (self.index + 1) % self.count;
            self.last_cycle = now;
        }
        fn set_cycle_index(&mut self, index: usize, now: Instant) {
            self.index = index;
            self.last_cycle = now;
        }
    }

    fn fake(count: usize, duration: Duration) -> FakeOutput {
        FakeOutput {
            id: "out0".into(),
            count,
            index: 0,
            last_cycle: Instant::now(),
            duration,
            mid_transition: false,
            paused: false,
        }
    }

    #[test]
    fn time_based_cycle_advances_when_elapsed() {
        let scheduler = CycleScheduler::new();
        let mut outputs = vec![fake(3, Duration::from_millis(10))];
        let start = outputs[0].last_cycle;
        let outcomes = scheduler.tick(start + Duration::from_millis(20), &mut outputs);
        assert_eq!(outcomes, vec![CycleOutcome::Advanced]);
        assert_eq!(outputs[0].index, 1);
    }

    #[test]
    fn duration_zero_never_triggers_time_based_cycle() {
        let scheduler = CycleScheduler::new();
        let mut outputs = vec![fake(3, Duration::ZERO)];
        let start = outputs[0].last_cycle;
        let outcomes = scheduler.tick(start + Duration::from_secs(3600), &mut outputs);
        assert_eq!(outcomes, vec![CycleOutcome::Unchanged]);
    }

    #[test]
    fn next_request_advances_regardless_of_timer() {
        let scheduler = CycleScheduler::new();
        scheduler.requests().request_next();
        let mut outputs = vec![fake(3, Duration::from_secs(3600))];
        let now = Instant::now();
        let outcomes = scheduler.tick(now, &mut outputs);
        assert_eq!(outcomes, vec![CycleOutcome::Advanced]);
        assert_eq!(scheduler.requests().queued_next(), 0);
    }

    #[test]
    fn five_next_requests_collapse_to_five_advances_over_five_ticks() {
        let scheduler = CycleScheduler::new();
        for _ in 0..5 {
            scheduler.requests().request_next();
        }
        let mut outputs = vec![fake(3, Duration::from_secs(3600))];
        let now = Instant::now();
        for _ in 0..5 {
            let outcomes = scheduler.tick(now, &mut outputs);
            assert_eq!(outcomes, vec![CycleOutcome::Advanced]);
        }
        assert_eq!(scheduler.requests().queued_next(), 0);
    }

    #[test]
    fn next_requested_saturates_at_max() {
        let scheduler = CycleScheduler::new();
        for _ in 0..(MAX_QUEUED_NEXT + 20) {
            scheduler.requests().request_next();
        }
        assert_eq!(scheduler.requests().queued_next(), MAX_QUEUED_NEXT);
    }

    #[test]
    fn set_index_request_applies_once_then_clears() {
        let scheduler = CycleScheduler::new();
        scheduler.requests().request_set_index(2);
        let mut outputs = vec![fake(5, Duration::ZERO)];
        let now = Instant::now();
        let outcomes = scheduler.tick(now, &mut outputs);
        assert_eq!(outcomes, vec![CycleOutcome::SetToIndex(2)]);
        assert_eq!(outputs[0].index, 2);
        assert!(scheduler.requests().pending_set_index().is_none());

        let outcomes = scheduler.tick(now, &mut outputs);
        assert_eq!(outcomes, vec![CycleOutcome::Unchanged]);
    }

    #[test]
    fn out_of_range_set_index_is_ignored_but_still_cleared() {
        let scheduler = CycleScheduler::new();
        scheduler.requests().request_set_index(9);
        let mut outputs = vec![fake(3, Duration::ZERO)];
        let now = Instant::now();
        let outcomes = scheduler.tick(now, &mut outputs);
        assert_eq!(outcomes, vec![CycleOutcome::Unchanged]);
        assert!(scheduler.requests().pending_set_index().is_none());
    }

    #[test]
    fn paused_output_ignores_next_and_set_and_timer() {
        let scheduler = CycleScheduler::new();
        scheduler.requests().request_next();
        scheduler.requests().request_set_index(2);
        let mut outputs = vec![fake(3, Duration::from_millis(10))];
        outputs[0].paused = true;
        let start = outputs[0].last_cycle;
        let outcomes = scheduler.tick(start + Duration::from_secs(3600), &mut outputs);
        assert_eq!(outcomes, vec![CycleOutcome::Unchanged]);
        assert_eq!(outputs[0].index, 0);
        // The set-index request is still cleared for the tick even though
        // the only output present was paused and didn't apply it.
        assert!(scheduler.requests().pending_set_index().is_none());
        // A queued `next` is left queued since no output consumed it.
        assert_eq!(scheduler.requests().queued_next(), 1);
    }

    #[test]
    fn validate_set_index_rejects_single_item_cycle() {
        assert!(validate_set_index("out0", 0, 1).is_err());
    }

    #[test]
    fn validate_set_index_rejects_out_of_range() {
        assert!(validate_set_index("out0", 7, 5).is_err());
        assert!(validate_set_index("out0", 2, 5).is_ok());
    }
}
