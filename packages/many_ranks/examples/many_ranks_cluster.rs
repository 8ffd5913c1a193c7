//! Demonstrating cross-rank aggregation with an in-process cluster.
//!
//! Three threads play the ranks of a message-passing run, linked by
//! [`many_ranks::channel_cluster`]. Each rank times its own share of the
//! work; rank 0 collects everything and writes the one report file, which
//! this example prints at the end.
//!
//! Run with: `cargo run --example many_ranks_cluster`.
#![expect(
    clippy::arithmetic_side_effects,
    clippy::unseparated_literal_suffix,
    reason = "this is example code that does not need production-level safety"
)]

use std::fs;
use std::hint::black_box;
use std::thread;

use many_ranks::{Communicator, OutputPolicy, Session, TimerKind, channel_cluster};

/// Burns processor time proportional to the scale.
fn simulate_work(scale: u64) {
    let mut sum = 0u64;
    for i in 0..scale * 200_000 {
        sum = sum.wrapping_mul(1103515245).wrapping_add(i);
    }
    black_box(sum);
}

fn main() {
    println!("=== Cross-Rank Aggregation Example ===");
    println!();

    let base = std::env::temp_dir()
        .join("many_ranks_cluster")
        .to_str()
        .expect("temp dir path is valid text")
        .to_string();

    let handles: Vec<_> = channel_cluster(3)
        .into_iter()
        .map(|transport| {
            let base = base.clone();
            thread::spawn(move || rank_main(transport, &base))
        })
        .collect();

    let mut report_path = None;
    for handle in handles {
        if let Some(path) = handle.join().expect("rank threads complete") {
            report_path = Some(path);
        }
    }

    let report_path = report_path.expect("rank 0 wrote a report");
    println!("✓ All ranks finalized");
    println!();

    println!("=== {report_path} ===");
    println!(
        "{}",
        fs::read_to_string(&report_path).expect("the sealed report is readable")
    );
}

/// One rank's whole life: time the work, describe it, say goodbye.
///
/// Returns the report path on the collector rank and `None` elsewhere.
fn rank_main(transport: many_ranks::ChannelTransport, base: &str) -> Option<String> {
    let rank = transport.rank();
    println!("rank {rank} starting");

    let session = Session::builder("wave_sim")
        .file_name(base)
        .communicator(transport)
        .init()
        .expect("every rank joins construction");

    let instance = session.default_instance();
    let group = session.default_group(instance).unwrap();

    let advance = session
        .create_timer(group, "advance", TimerKind::ALL)
        .unwrap();
    let exchange = session
        .create_timer(group, "halo_exchange", TimerKind::MMA)
        .unwrap();

    // Ranks get deliberately uneven work so the Maximum and Minimum rows
    // have something to disagree about.
    for _ in 0..3 {
        session.start(advance).unwrap();
        simulate_work(u64::from(rank) + 1);
        session.stop(advance).unwrap();

        session.start(exchange).unwrap();
        simulate_work(1);
        session.stop(exchange).unwrap();
    }

    // One row per rank, labelled with the contributing rank.
    session
        .record_parameter_for_all_ranks(
            instance,
            "ChunkRows",
            i64::from(rank + 1) * 170,
            OutputPolicy::Once,
        )
        .unwrap();

    let report_path = session.file_name(instance).unwrap();
    session.finalize().expect("every rank joins the farewell pass");

    println!("rank {rank} done");
    report_path
}
