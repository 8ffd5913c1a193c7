//! Simplified example demonstrating key `many_ranks` types working together.
//!
//! This example instruments a small serial "solver" with timers and
//! parameters, then prints the report file the session produced:
//! - `Session`: owns the instances, timer groups and timers of this rank
//! - `TimerKind`: selects which merged rows each timer contributes
//! - `OutputPolicy`: throttles repeated parameter values
//!
//! Run with: `cargo run --example many_ranks_basic`.
#![expect(
    clippy::arithmetic_side_effects,
    clippy::unseparated_literal_suffix,
    reason = "this is example code that does not need production-level safety"
)]

use std::fs;
use std::hint::black_box;

use many_ranks::{OutputPolicy, Session, TimerKind};

/// Burns a little processor time so the timers have something to see.
fn simulate_work(scale: u64) {
    let mut sum = 0u64;
    for i in 0..scale * 200_000 {
        sum = sum.wrapping_mul(1103515245).wrapping_add(i);
    }
    black_box(sum);
}

fn main() {
    println!("=== Serial Timing Report Example ===");
    println!();

    let base = std::env::temp_dir()
        .join("many_ranks_basic")
        .to_str()
        .expect("temp dir path is valid text")
        .to_string();

    let session = Session::builder("heat_solver")
        .file_name(&base)
        .machine("local-workstation")
        .flags("heat_solver -grid 512 -steps 4")
        .init()
        .expect("a serial session starts without a transport to fail");
    println!("✓ Created session with report target {base}*.pmtm");

    let instance = session.default_instance();
    let solve_group = session.default_group(instance).unwrap();
    let io_group = session.create_group(instance, "io").unwrap();

    let step = session
        .create_timer(solve_group, "step", TimerKind::ALL)
        .unwrap();
    let checkpoint = session
        .create_timer(io_group, "checkpoint", TimerKind::MMA)
        .unwrap();

    session
        .record_parameter(instance, "Cells", 262144_i64, OutputPolicy::Once)
        .unwrap();
    session
        .record_parameter(instance, "Dt", 0.05, OutputPolicy::OnChange)
        .unwrap();

    for iteration in 0..4 {
        session.start(step).unwrap();
        simulate_work(2);

        // Time spent writing checkpoints is kept out of the step timer.
        session.pause(step).unwrap();
        session.start(checkpoint).unwrap();
        simulate_work(1);
        session.stop(checkpoint).unwrap();
        session.resume(step).unwrap();

        simulate_work(1);
        session.stop(step).unwrap();

        session
            .record_parameter(
                instance,
                "Residual",
                1.0 / f64::from(iteration + 1),
                OutputPolicy::Always,
            )
            .unwrap();
    }

    // Unchanged value, so the policy suppresses the repeat.
    session
        .record_parameter(instance, "Dt", 0.05, OutputPolicy::OnChange)
        .unwrap();

    let report_path = session
        .file_name(instance)
        .unwrap()
        .expect("the collector of a serial run writes a file");
    session.finalize().expect("the report seals cleanly");
    println!("✓ Report sealed");
    println!();

    println!("=== {report_path} ===");
    println!(
        "{}",
        fs::read_to_string(&report_path).expect("the sealed report is readable")
    );
}
