//! Platform abstraction trait definitions.

use std::fmt::Debug;

/// A paired reading of the two clocks a timer accumulates, in seconds.
///
/// All timer arithmetic runs on double-precision seconds, matching the field
/// widths of the report file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct TimeSample {
    /// Monotonic wall-clock seconds since an arbitrary process-wide origin.
    pub(crate) wall: f64,

    /// Processor seconds consumed by the process so far.
    pub(crate) cpu: f64,
}

/// Provides clock access for timer accounting.
///
/// This trait abstracts the underlying platform-specific clocks, allowing for
/// both real implementations (using system calls) and fake implementations
/// (for testing).
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Reads both clocks at once.
    ///
    /// Only differences between samples are meaningful; the origin of either
    /// clock is unspecified.
    fn now(&self) -> TimeSample;
}
