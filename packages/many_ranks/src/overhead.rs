//! Calibration of the cost of driving a timer.
//!
//! Runs on the collector right after a header is written, before any
//! user-visible timer exists, and yields the two `Overhead` rows: the
//! per-pair cost of start/stop and of pause/continue, measured by timing
//! large batches of pairs against a scratch timer and dividing down.

use crate::pal::{Platform, PlatformFacade};
use crate::timer::TimerMetrics;

const BLOCKS: u32 = 20;
const PAIRS_PER_BLOCK: u32 = 10_000;

/// One calibration result, ready for the report.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OverheadRow {
    pub(crate) label: &'static str,
    pub(crate) avg: f64,
    pub(crate) std_dev: f64,
}

fn per_pair_stats(wrapper: &TimerMetrics) -> (f64, f64) {
    let blocks = f64::from(BLOCKS);
    let avg = wrapper.total_wall / blocks;
    let std_dev = wrapper.total_square_wall / blocks - avg * avg;

    let pairs = f64::from(PAIRS_PER_BLOCK);
    (avg / pairs, std_dev / pairs)
}

/// Measures both overheads. Rows come back in print order: start-stop,
/// then pause-continue.
pub(crate) fn measure(platform: &PlatformFacade) -> Vec<OverheadRow> {
    let mut scratch = TimerMetrics::new();
    let mut start_stop = TimerMetrics::new();
    let mut pause_resume = TimerMetrics::new();

    for _ in 0..BLOCKS {
        start_stop.start(platform.now());
        for _ in 0..PAIRS_PER_BLOCK {
            scratch.start(platform.now());
            scratch.stop(platform.now());
        }
        start_stop.stop(platform.now());

        scratch.start(platform.now());
        pause_resume.start(platform.now());
        for _ in 0..PAIRS_PER_BLOCK {
            scratch.pause(platform.now());
            scratch.resume(platform.now());
        }
        pause_resume.stop(platform.now());
        scratch.stop(platform.now());
    }

    let (avg, std_dev) = per_pair_stats(&start_stop);
    let start_stop_row = OverheadRow {
        label: "start-stop",
        avg,
        std_dev,
    };

    let (avg, std_dev) = per_pair_stats(&pause_resume);
    let pause_resume_row = OverheadRow {
        label: "pause-continue",
        avg,
        std_dev,
    };

    vec![start_stop_row, pause_resume_row]
}
