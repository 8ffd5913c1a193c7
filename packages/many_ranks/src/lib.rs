//! Performance timing for programs that span many ranks.
//!
//! This package instruments a distributed application with named timers and
//! merges their statistics across every rank of the run into one structured
//! report file, ready for downstream performance analysis.
//!
//! The core functionality includes:
//! - [`Session`] - One rank's timing state: its instances, timer groups and timers
//! - [`SessionBuilder`] - Configures a session before the run's first collective
//! - [`TimerKind`] - Selects which merged rows a timer contributes to the report
//! - [`OutputPolicy`] - Decides when repeated parameter values are written
//! - [`Communicator`] - The seam where a message-passing runtime plugs in
//!
//! Timing converges on one rank, the collector, which writes a `.pmtm` text
//! file on behalf of the whole run: a header describing the run, calibration
//! rows for the cost of the timers themselves, and one row set per timer
//! with per-rank and cross-rank statistics.
//!
//! # Simple Usage
//!
//! A single-process run needs no communicator; timers measure wall-clock and
//! processor time per start/stop cycle:
//!
//! ```
//! use many_ranks::{Session, TimerKind};
//!
//! let session = Session::builder("simulation").init()?;
//!
//! let group = session.default_group(session.default_instance())?;
//! let step = session.create_timer(group, "step", TimerKind::AVG)?;
//!
//! for _ in 0..3 {
//!     session.start(step)?;
//!     // ... the work being measured ...
//!     session.stop(step)?;
//! }
//!
//! session.finalize()?;
//! # Ok::<(), many_ranks::Error>(())
//! ```
//!
//! Give the builder a file name and the collector writes the report there,
//! with a numeric suffix picking the first name not already taken.
//!
//! # Running Across Ranks
//!
//! Every rank builds a session over its endpoint of the run's communicator
//! and drives the collective operations in the same order. The bundled
//! [`channel_cluster`] links threads of one process the way a real
//! message-passing runtime links processes:
//!
//! ```
//! use std::thread;
//!
//! use many_ranks::{Session, TimerKind, channel_cluster};
//!
//! let handles: Vec<_> = channel_cluster(2)
//!     .into_iter()
//!     .map(|transport| {
//!         thread::spawn(move || {
//!             let session = Session::builder("simulation")
//!                 .communicator(transport)
//!                 .init()
//!                 .unwrap();
//!
//!             let group = session.default_group(session.default_instance()).unwrap();
//!             let step = session.create_timer(group, "step", TimerKind::ALL).unwrap();
//!
//!             session.start(step).unwrap();
//!             session.stop(step).unwrap();
//!
//!             session.finalize().unwrap();
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! ```
//!
//! # Recording Parameters
//!
//! Runs are described as well as timed: parameter values land in the report
//! next to the timings, under a policy that keeps repeated values from
//! flooding the file:
//!
//! ```
//! use many_ranks::{OutputPolicy, Session};
//!
//! let session = Session::builder("simulation").init()?;
//! let instance = session.default_instance();
//!
//! session.record_parameter(instance, "Cells", 1024_i64, OutputPolicy::Once)?;
//! session.record_parameter(instance, "Dt", 0.125, OutputPolicy::OnChange)?;
//!
//! session.finalize()?;
//! # Ok::<(), many_ranks::Error>(())
//! ```
//!
//! # Threading
//!
//! A session is shared by reference across the threads of its rank. Timer
//! operations and parameter recording are safe to call concurrently; timers
//! created for distinct contexts keep concurrent callers' measurements
//! apart. The collective operations are the exception: each rank must drive
//! those from one thread, in the same order as every other rank.
//!
//! # Session Management
//!
//! A session usually lives for the whole run and ends with
//! [`Session::finalize`], which writes the final statistics and seals the
//! report. Further instances created through
//! [`Session::create_instance`] write to report targets of their own.

mod arena;
mod builder;
mod collector;
mod env;
mod error;
mod instance;
mod output;
mod overhead;
mod pal;
mod parameter;
mod report;
mod session;
mod sink;
mod timer;
mod timer_group;
mod timer_kind;
mod transport;
mod wire;

pub use builder::SessionBuilder;
pub use error::Error;
pub use instance::InstanceId;
pub use parameter::{OutputPolicy, Value};
pub use session::{Session, SessionOption};
pub use timer::TimerId;
pub use timer_group::GroupId;
pub use timer_kind::TimerKind;
pub use transport::{
    COLLECTOR_RANK, ChannelTransport, Communicator, SingleProcess, channel_cluster,
};

const ERR_POISONED_LOCK: &str = "encountered poisoned lock - program validity cannot be guaranteed";
