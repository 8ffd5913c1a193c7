//! Fake platform implementation for testing.

use std::sync::{Arc, Mutex};

use crate::pal::abstractions::{Platform, TimeSample};

/// Internal state for the fake platform that can be shared between clones.
#[derive(Debug)]
struct FakePlatformState {
    wall: f64,
    cpu: f64,
}

/// Fake implementation of the platform abstraction for testing.
///
/// This implementation allows tests to control the clock readings instead of
/// relying on actual system calls. Multiple clones of the same `FakePlatform`
/// share the same underlying state, allowing tests to advance the clocks
/// after platform creation to simulate time progression.
#[derive(Clone, Debug)]
pub(crate) struct FakePlatform {
    state: Arc<Mutex<FakePlatformState>>,
}

impl FakePlatform {
    /// Creates a new fake platform with both clocks at zero.
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakePlatformState {
                wall: 0.0,
                cpu: 0.0,
            })),
        }
    }

    /// Sets both clocks to absolute values, in seconds.
    ///
    /// This affects all clones of this platform.
    pub(crate) fn set(&self, wall: f64, cpu: f64) {
        let mut state = self
            .state
            .lock()
            .expect("FakePlatform state lock should not be poisoned");
        state.wall = wall;
        state.cpu = cpu;
    }

    /// Advances both clocks by the given number of seconds.
    ///
    /// This affects all clones of this platform, allowing tests to simulate
    /// time progression during measurement.
    pub(crate) fn advance(&self, wall: f64, cpu: f64) {
        let mut state = self
            .state
            .lock()
            .expect("FakePlatform state lock should not be poisoned");
        state.wall += wall;
        state.cpu += cpu;
    }
}

impl Platform for FakePlatform {
    fn now(&self) -> TimeSample {
        let state = self
            .state
            .lock()
            .expect("FakePlatform state lock should not be poisoned");
        TimeSample {
            wall: state.wall,
            cpu: state.cpu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_with_zero_clocks() {
        let platform = FakePlatform::new();
        let sample = platform.now();

        assert_eq!(sample.wall, 0.0);
        assert_eq!(sample.cpu, 0.0);
    }

    #[test]
    fn set_overwrites_both_clocks() {
        let platform = FakePlatform::new();
        platform.set(12.5, 3.25);

        let sample = platform.now();
        assert_eq!(sample.wall, 12.5);
        assert_eq!(sample.cpu, 3.25);
    }

    #[test]
    fn advance_accumulates() {
        let platform = FakePlatform::new();
        platform.advance(1.0, 0.5);
        platform.advance(2.0, 0.25);

        let sample = platform.now();
        assert_eq!(sample.wall, 3.0);
        assert_eq!(sample.cpu, 0.75);
    }

    #[test]
    fn shared_state_between_clones() {
        let platform1 = FakePlatform::new();
        let platform2 = platform1.clone();

        // Advancing one clone affects the other.
        platform1.advance(100.0, 10.0);
        assert_eq!(platform2.now().wall, 100.0);

        platform2.set(5.0, 5.0);
        assert_eq!(platform1.now().cpu, 5.0);
    }
}
