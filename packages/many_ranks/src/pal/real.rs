//! Real platform implementation backed by the operating system clocks.

use std::sync::LazyLock;
use std::time::Instant;

use cpu_time::ProcessTime;

use crate::pal::abstractions::{Platform, TimeSample};

/// Shared origin for the wall clock so that every reading in the process is
/// comparable.
static WALL_ORIGIN: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Real implementation of the platform abstraction.
///
/// Wall time comes from the monotonic clock, processor time from the
/// process-wide CPU clock.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RealPlatform;

impl RealPlatform {
    /// The singleton instance used outside of tests.
    pub(crate) const fn instance() -> &'static Self {
        &Self
    }
}

impl Platform for RealPlatform {
    fn now(&self) -> TimeSample {
        TimeSample {
            wall: WALL_ORIGIN.elapsed().as_secs_f64(),
            cpu: ProcessTime::now().as_duration().as_secs_f64(),
        }
    }
}
