//! How the ranks of a run reach each other.
//!
//! Timing data converges on one rank, the collector, which writes the
//! report file on behalf of the whole run. The [`Communicator`] trait is
//! the seam where a real message-passing runtime plugs in; the bundled
//! implementations cover serial runs and in-process clusters.

use std::fmt::Debug;
use std::sync::Mutex;
use std::sync::mpsc;

use crate::ERR_POISONED_LOCK;
use crate::error::{Error, Result};

/// The rank that collects timing data and writes the report file.
pub const COLLECTOR_RANK: u32 = 0;

/// Links the ranks of a run together.
///
/// Every method here is collective: all ranks must call the same method in
/// the same order, and a call completes only once every rank has joined in.
/// The library issues collectives during session startup, report output and
/// shutdown, so a rank that skips one of those leaves the others waiting.
///
/// Implement this to plug in a real message-passing runtime. The bundled
/// [`SingleProcess`] and [`channel_cluster`] implementations cover serial
/// runs and in-process testing.
pub trait Communicator: Debug + Send + Sync + 'static {
    /// This rank's position within the run.
    fn rank(&self) -> u32;

    /// How many ranks the run spans.
    fn size(&self) -> u32;

    /// Short name of the transport, written into the report header.
    fn description(&self) -> &str;

    /// Collects every rank's payload size.
    ///
    /// Returns the sizes indexed by rank on the collector and an empty
    /// vector everywhere else.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportFailed`] when a rank cannot be reached.
    fn gather_sizes(&self, len: u32) -> Result<Vec<u32>>;

    /// Collects every rank's payload.
    ///
    /// Returns the rank-ascending concatenation of all payloads on the
    /// collector and an empty vector everywhere else; the sizes gathered
    /// beforehand tell the collector where each rank's bytes end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportFailed`] when a rank cannot be reached.
    fn gather_payload(&self, payload: &[u8]) -> Result<Vec<u8>>;

    /// Whether any rank reports failure. Every rank receives the verdict.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportFailed`] when a rank cannot be reached.
    fn any_failed(&self, failed: bool) -> Result<bool>;

    /// Settles on one status code for the whole run.
    ///
    /// Every rank receives the smallest code contributed, so any rank's
    /// error outranks success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportFailed`] when a rank cannot be reached.
    fn agree_code(&self, code: i32) -> Result<i32>;

    /// Whether this rank writes the report file.
    fn is_collector(&self) -> bool {
        self.rank() == COLLECTOR_RANK
    }
}

/// The [`Communicator`] of a run that spans a single process.
///
/// Collectives complete immediately with this rank's own contribution.
///
/// # Example
///
/// ```
/// use many_ranks::{Communicator, SingleProcess};
///
/// let transport = SingleProcess::new();
/// assert_eq!(transport.rank(), 0);
/// assert_eq!(transport.size(), 1);
/// assert!(transport.is_collector());
/// ```
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl SingleProcess {
    /// Creates the transport of a single-process run.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Communicator for SingleProcess {
    fn rank(&self) -> u32 {
        COLLECTOR_RANK
    }

    fn size(&self) -> u32 {
        1
    }

    fn description(&self) -> &str {
        "Serial"
    }

    fn gather_sizes(&self, len: u32) -> Result<Vec<u32>> {
        Ok(vec![len])
    }

    fn gather_payload(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(payload.to_vec())
    }

    fn any_failed(&self, failed: bool) -> Result<bool> {
        Ok(failed)
    }

    fn agree_code(&self, code: i32) -> Result<i32> {
        Ok(code)
    }
}

/// Settles a fallible local step across the run.
///
/// When every rank's step succeeded, each keeps its own value. When any
/// rank failed, every rank receives the same error, built from the smallest
/// status code any failing rank contributed.
pub(crate) fn consensus<T>(communicator: &dyn Communicator, result: Result<T>) -> Result<T> {
    let failed = result.is_err();
    if communicator.any_failed(failed)? {
        let code = match &result {
            Ok(_) => 0,
            Err(error) => error.code(),
        };
        let agreed = communicator.agree_code(code)?;
        return Err(Error::from_code(agreed));
    }
    result
}

#[derive(Debug)]
enum Message {
    Size(u32),
    Payload(Vec<u8>),
    Flag(bool),
    Code(i32),
}

/// Star topology: the collector keeps one link pair per other rank, every
/// other rank keeps one pair back to the collector.
#[derive(Debug)]
enum Links {
    Collector {
        to_members: Vec<Mutex<mpsc::Sender<Message>>>,
        from_members: Vec<Mutex<mpsc::Receiver<Message>>>,
    },
    Member {
        to_collector: Mutex<mpsc::Sender<Message>>,
        from_collector: Mutex<mpsc::Receiver<Message>>,
    },
}

fn send(link: &Mutex<mpsc::Sender<Message>>, message: Message) -> Result<()> {
    link.lock()
        .expect(ERR_POISONED_LOCK)
        .send(message)
        .map_err(|_| Error::TransportFailed)
}

fn receive(link: &Mutex<mpsc::Receiver<Message>>) -> Result<Message> {
    link.lock()
        .expect(ERR_POISONED_LOCK)
        .recv()
        .map_err(|_| Error::TransportFailed)
}

/// One rank's endpoint in a [`channel_cluster`].
#[derive(Debug)]
pub struct ChannelTransport {
    rank: u32,
    size: u32,
    links: Links,
}

impl Communicator for ChannelTransport {
    fn rank(&self) -> u32 {
        self.rank
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn description(&self) -> &str {
        "Channels"
    }

    fn gather_sizes(&self, len: u32) -> Result<Vec<u32>> {
        match &self.links {
            Links::Collector { from_members, .. } => {
                let mut sizes = vec![len];
                for link in from_members {
                    match receive(link)? {
                        Message::Size(size) => sizes.push(size),
                        _ => return Err(Error::TransportFailed),
                    }
                }
                Ok(sizes)
            }
            Links::Member { to_collector, .. } => {
                send(to_collector, Message::Size(len))?;
                Ok(Vec::new())
            }
        }
    }

    fn gather_payload(&self, payload: &[u8]) -> Result<Vec<u8>> {
        match &self.links {
            Links::Collector { from_members, .. } => {
                let mut gathered = payload.to_vec();
                for link in from_members {
                    match receive(link)? {
                        Message::Payload(bytes) => gathered.extend_from_slice(&bytes),
                        _ => return Err(Error::TransportFailed),
                    }
                }
                Ok(gathered)
            }
            Links::Member { to_collector, .. } => {
                send(to_collector, Message::Payload(payload.to_vec()))?;
                Ok(Vec::new())
            }
        }
    }

    fn any_failed(&self, failed: bool) -> Result<bool> {
        match &self.links {
            Links::Collector {
                to_members,
                from_members,
            } => {
                let mut any = failed;
                for link in from_members {
                    match receive(link)? {
                        Message::Flag(flag) => any |= flag,
                        _ => return Err(Error::TransportFailed),
                    }
                }
                for link in to_members {
                    send(link, Message::Flag(any))?;
                }
                Ok(any)
            }
            Links::Member {
                to_collector,
                from_collector,
            } => {
                send(to_collector, Message::Flag(failed))?;
                match receive(from_collector)? {
                    Message::Flag(flag) => Ok(flag),
                    _ => Err(Error::TransportFailed),
                }
            }
        }
    }

    fn agree_code(&self, code: i32) -> Result<i32> {
        match &self.links {
            Links::Collector {
                to_members,
                from_members,
            } => {
                let mut agreed = code;
                for link in from_members {
                    match receive(link)? {
                        Message::Code(code) => agreed = agreed.min(code),
                        _ => return Err(Error::TransportFailed),
                    }
                }
                for link in to_members {
                    send(link, Message::Code(agreed))?;
                }
                Ok(agreed)
            }
            Links::Member {
                to_collector,
                from_collector,
            } => {
                send(to_collector, Message::Code(code))?;
                match receive(from_collector)? {
                    Message::Code(code) => Ok(code),
                    _ => Err(Error::TransportFailed),
                }
            }
        }
    }
}

/// Builds an in-process cluster of `size` ranks linked by channels.
///
/// Returns one transport per rank, in rank order. Hand each to its own
/// thread and the collectives behave like a real message-passing run, with
/// rank 0 collecting. Dropping a transport before the others finish makes
/// their collectives fail with [`Error::TransportFailed`].
///
/// # Example
///
/// ```
/// use std::thread;
///
/// use many_ranks::{Communicator, channel_cluster};
///
/// let handles: Vec<_> = channel_cluster(2)
///     .into_iter()
///     .map(|transport| {
///         thread::spawn(move || transport.agree_code(0).unwrap())
///     })
///     .collect();
///
/// for handle in handles {
///     assert_eq!(handle.join().unwrap(), 0);
/// }
/// ```
///
/// # Panics
///
/// Panics when `size` is zero.
#[must_use]
pub fn channel_cluster(size: u32) -> Vec<ChannelTransport> {
    assert!(size > 0, "a cluster needs at least one rank");

    let mut to_members = Vec::new();
    let mut from_members = Vec::new();
    let mut members = Vec::new();

    for rank in 1..size {
        let (to_member, from_collector) = mpsc::channel();
        let (to_collector, from_member) = mpsc::channel();

        to_members.push(Mutex::new(to_member));
        from_members.push(Mutex::new(from_member));
        members.push(ChannelTransport {
            rank,
            size,
            links: Links::Member {
                to_collector: Mutex::new(to_collector),
                from_collector: Mutex::new(from_collector),
            },
        });
    }

    let mut transports = vec![ChannelTransport {
        rank: COLLECTOR_RANK,
        size,
        links: Links::Collector {
            to_members,
            from_members,
        },
    }];
    transports.extend(members);
    transports
}

#[cfg(test)]
mod tests {
    #![allow(clippy::indexing_slicing, reason = "panic is fine in tests")]

    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SingleProcess: Send, Sync);
    assert_impl_all!(ChannelTransport: Send, Sync);

    #[test]
    fn single_process_collects_itself() {
        let transport = SingleProcess::new();

        assert_eq!(transport.rank(), 0);
        assert_eq!(transport.size(), 1);
        assert!(transport.is_collector());
        assert_eq!(transport.description(), "Serial");
        assert_eq!(transport.gather_sizes(7).unwrap(), vec![7]);
        assert_eq!(transport.gather_payload(b"abc").unwrap(), b"abc".to_vec());
        assert!(!transport.any_failed(false).unwrap());
        assert!(transport.any_failed(true).unwrap());
        assert_eq!(transport.agree_code(-9).unwrap(), -9);
    }

    #[test]
    fn cluster_of_one_is_just_the_collector() {
        let mut transports = channel_cluster(1);
        let transport = transports.remove(0);

        assert!(transport.is_collector());
        assert_eq!(transport.gather_sizes(3).unwrap(), vec![3]);
        assert_eq!(transport.agree_code(0).unwrap(), 0);
    }

    #[test]
    fn cluster_gathers_on_the_collector() {
        let handles: Vec<_> = channel_cluster(3)
            .into_iter()
            .map(|transport| {
                thread::spawn(move || {
                    let rank = transport.rank();
                    let payload =
                        vec![u8::try_from(rank).unwrap(); usize::try_from(rank).unwrap()];
                    let sizes = transport
                        .gather_sizes(u32::try_from(payload.len()).unwrap())
                        .unwrap();
                    let gathered = transport.gather_payload(&payload).unwrap();
                    (rank, sizes, gathered)
                })
            })
            .collect();

        for handle in handles {
            let (rank, sizes, gathered) = handle.join().unwrap();
            if rank == COLLECTOR_RANK {
                assert_eq!(sizes, vec![0, 1, 2]);
                assert_eq!(gathered, vec![1, 2, 2]);
            } else {
                assert!(sizes.is_empty());
                assert!(gathered.is_empty());
            }
        }
    }

    #[test]
    fn failure_flag_reaches_every_rank() {
        let handles: Vec<_> = channel_cluster(3)
            .into_iter()
            .map(|transport| {
                thread::spawn(move || {
                    // Only rank 1 fails; everyone must hear about it.
                    let verdict = transport.any_failed(transport.rank() == 1).unwrap();
                    let all_well = transport.any_failed(false).unwrap();
                    (verdict, all_well)
                })
            })
            .collect();

        for handle in handles {
            let (verdict, all_well) = handle.join().unwrap();
            assert!(verdict);
            assert!(!all_well);
        }
    }

    #[test]
    fn agreed_code_is_the_smallest_contribution() {
        let codes = [0, -9, -2];

        let handles: Vec<_> = channel_cluster(3)
            .into_iter()
            .map(|transport| {
                let code = codes[usize::try_from(transport.rank()).unwrap()];
                thread::spawn(move || transport.agree_code(code).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), -9);
        }
    }

    #[test]
    fn dropped_rank_fails_the_collective() {
        let mut transports = channel_cluster(2);
        let member = transports.pop().unwrap();
        let collector = transports.remove(0);
        drop(member);

        assert_eq!(collector.gather_sizes(0), Err(Error::TransportFailed));
    }

    #[test]
    fn consensus_spreads_one_ranks_error_to_all() {
        let handles: Vec<_> = channel_cluster(3)
            .into_iter()
            .map(|transport| {
                thread::spawn(move || {
                    let local: Result<()> = if transport.rank() == 2 {
                        Err(Error::Sink)
                    } else {
                        Ok(())
                    };
                    consensus(&transport, local)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Err(Error::Sink));
        }
    }

    #[test]
    fn consensus_passes_values_through_when_all_succeed() {
        let transport = SingleProcess::new();

        assert_eq!(consensus(&transport, Ok(5)), Ok(5));
        assert_eq!(
            consensus(&transport, Err::<(), _>(Error::Sink)),
            Err(Error::Sink)
        );
    }
}
