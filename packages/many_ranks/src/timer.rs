//! Timer accounting: the state machine and the per-block accumulators.

use std::num::NonZero;
use std::sync::Mutex;

use new_zealand::nz;

use crate::arena::SlotKey;
use crate::pal::TimeSample;
use crate::timer_kind::TimerKind;

/// Identifies a timer within its [`Session`][crate::Session].
///
/// Ids stay valid until the owning instance is destroyed or the session is
/// finalized; stale ids are rejected, never reused.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TimerId(pub(crate) SlotKey);

/// Where a timer is in its start/stop/pause cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TimerState {
    Stopped,
    Active,
    Paused,
}

/// A state-machine violation observed by a checked build.
///
/// Violations are reported back to the caller so the session can log them on
/// the collector identity; they never abort the operation that noticed them.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StateViolation {
    /// What was done to the timer, as a past-tense verb phrase.
    pub(crate) action: &'static str,
    pub(crate) observed: TimerState,
    pub(crate) required: TimerState,
}

/// One timer as stored in the session's timer arena.
///
/// The descriptive fields never change after creation; the accumulators live
/// behind the timer's own mutex so concurrent call sites stay memory-safe.
#[derive(Debug)]
pub(crate) struct TimerSlot {
    pub(crate) name: String,
    pub(crate) kind: TimerKind,
    pub(crate) context: u32,
    pub(crate) metrics: Mutex<TimerMetrics>,
}

impl TimerSlot {
    pub(crate) fn new(name: String, kind: TimerKind, context: u32) -> Self {
        Self {
            name,
            kind,
            context,
            metrics: Mutex::new(TimerMetrics::new()),
        }
    }
}

/// The mutable accounting state of one timer.
///
/// Wall and processor time are tracked symmetrically: `anchor` holds the
/// clock readings taken when the current segment began, `block_*` accumulate
/// the segments of the block being timed, and the totals fold in one value
/// per completed block. The sampling throttle decides at start time whether
/// the whole block is measured; an ignored block leaves every accumulator
/// untouched, including the last-block values.
#[derive(Debug)]
pub(crate) struct TimerMetrics {
    pub(crate) state: TimerState,
    pub(crate) ignore: bool,

    /// Stops seen so far, measured or not. Drives the sampling throttle.
    pub(crate) samples_seen: u64,

    /// Measure every `stride`-th sample.
    pub(crate) stride: NonZero<u32>,

    /// Stop measuring once this many samples have been seen.
    pub(crate) sample_cap: Option<u32>,

    pub(crate) anchor: TimeSample,
    pub(crate) block_wall: f64,
    pub(crate) block_cpu: f64,

    pub(crate) total_wall: f64,
    pub(crate) total_square_wall: f64,
    pub(crate) total_cpu: f64,
    pub(crate) total_square_cpu: f64,

    /// Completed measured blocks.
    pub(crate) block_count: u64,

    /// Pauses taken during measured blocks.
    pub(crate) pause_count: u64,
}

impl TimerMetrics {
    pub(crate) fn new() -> Self {
        Self {
            state: TimerState::Stopped,
            ignore: false,
            samples_seen: 0,
            stride: nz!(1),
            sample_cap: None,
            anchor: TimeSample { wall: 0.0, cpu: 0.0 },
            block_wall: 0.0,
            block_cpu: 0.0,
            total_wall: 0.0,
            total_square_wall: 0.0,
            total_cpu: 0.0,
            total_square_cpu: 0.0,
            block_count: 0,
            pause_count: 0,
        }
    }

    pub(crate) fn set_sampling(&mut self, stride: NonZero<u32>, sample_cap: Option<u32>) {
        self.stride = stride;
        self.sample_cap = sample_cap;
    }

    /// Begins a block. Decides whether this block is measured, and if so
    /// zeroes the block accumulators and anchors the clocks.
    pub(crate) fn start(&mut self, now: TimeSample) -> Option<StateViolation> {
        let under_cap = self
            .sample_cap
            .is_none_or(|cap| self.samples_seen < u64::from(cap));
        let on_stride = self
            .samples_seen
            .checked_rem(u64::from(self.stride.get()))
            .expect("stride != 0")
            == 0;
        self.ignore = !(under_cap && on_stride);

        if !self.ignore {
            self.block_wall = 0.0;
            self.block_cpu = 0.0;
            self.anchor = now;
        }

        let violation = self.expect_state(TimerState::Stopped, "started");
        self.state = TimerState::Active;
        violation
    }

    /// Ends a block. A measured block is folded into the totals; every stop,
    /// measured or not, advances the sample counter.
    pub(crate) fn stop(&mut self, now: TimeSample) -> Option<StateViolation> {
        if !self.ignore {
            self.block_wall += now.wall - self.anchor.wall;
            self.block_cpu += now.cpu - self.anchor.cpu;

            self.total_wall += self.block_wall;
            self.total_square_wall += self.block_wall * self.block_wall;
            self.total_cpu += self.block_cpu;
            self.total_square_cpu += self.block_cpu * self.block_cpu;

            self.block_count = self
                .block_count
                .checked_add(1)
                .expect("block count fits in u64 for any realistic run");
        }

        self.samples_seen = self
            .samples_seen
            .checked_add(1)
            .expect("sample count fits in u64 for any realistic run");

        let violation = self.expect_state(TimerState::Active, "stopped");
        self.state = TimerState::Stopped;
        violation
    }

    /// Suspends the block, banking the segment timed so far.
    pub(crate) fn pause(&mut self, now: TimeSample) -> Option<StateViolation> {
        if !self.ignore {
            self.block_wall += now.wall - self.anchor.wall;
            self.block_cpu += now.cpu - self.anchor.cpu;

            self.pause_count = self
                .pause_count
                .checked_add(1)
                .expect("pause count fits in u64 for any realistic run");
        }

        let violation = self.expect_state(TimerState::Active, "paused");
        self.state = TimerState::Paused;
        violation
    }

    /// Resumes the block, re-anchoring the clocks so the paused interval is
    /// excluded from the block time.
    pub(crate) fn resume(&mut self, now: TimeSample) -> Option<StateViolation> {
        if !self.ignore {
            self.anchor = now;
        }

        let violation = self.expect_state(TimerState::Paused, "resumed");
        self.state = TimerState::Active;
        violation
    }

    /// Wall-clock seconds since the current segment was anchored.
    pub(crate) fn elapsed_wall(&self, now: TimeSample) -> f64 {
        now.wall - self.anchor.wall
    }

    /// Processor seconds since the current segment was anchored.
    pub(crate) fn elapsed_cpu(&self, now: TimeSample) -> f64 {
        now.cpu - self.anchor.cpu
    }

    /// Checks the state machine, returning the violation to report when this
    /// is a checked build and the timer is somewhere unexpected.
    pub(crate) fn expect_state(
        &self,
        required: TimerState,
        action: &'static str,
    ) -> Option<StateViolation> {
        if cfg!(debug_assertions) && self.state != required {
            Some(StateViolation {
                action,
                observed: self.state,
                required,
            })
        } else {
            None
        }
    }
}
