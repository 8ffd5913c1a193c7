//! Merging gathered payloads into per-timer row sets on the collector rank.
//!
//! Timers are joined across ranks by group and timer name. The join table
//! is a fixed-width hash table with sorted chains, so lookups stay cheap
//! even when thousands of timers arrive, while the merged list preserves
//! the order in which timers were first discovered. That discovery order
//! is what the report file prints.

use crate::error::{Error, Result};
use crate::timer_kind::TimerKind;
use crate::wire::{self, TimerRecord};

const BUCKET_COUNT: usize = 1024;
const BUCKET_MASK: usize = BUCKET_COUNT - 1;

/// djb2 over the group name, a zero byte, then the timer name.
fn bucket_of(group: &str, name: &str) -> usize {
    let mut hash: usize = 5381;
    for byte in group
        .bytes()
        .chain(std::iter::once(0))
        .chain(name.bytes())
    {
        hash = hash.wrapping_mul(33).wrapping_add(usize::from(byte));
    }
    hash & BUCKET_MASK
}

/// One timer joined across every rank and context that reported it.
#[derive(Clone, Debug)]
pub(crate) struct MergedTimer {
    pub(crate) group: String,
    pub(crate) name: String,
    /// Kind claimed by the first record to arrive. Later records cannot
    /// reclassify a timer.
    pub(crate) kind: TimerKind,
    /// One record per (rank, context) pair, in arrival order. A rank that
    /// reports the same pair twice overwrites its earlier record in place.
    pub(crate) records: Vec<TimerRecord>,
}

/// Join table keyed by (group, timer) name pairs.
#[derive(Debug)]
pub(crate) struct JoinTable {
    /// Discovery order; the chains index into this.
    entries: Vec<MergedTimer>,
    buckets: Vec<Vec<usize>>,
}

impl JoinTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            buckets: vec![Vec::new(); BUCKET_COUNT],
        }
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "bucket index is masked into range and chains index live entries"
    )]
    pub(crate) fn insert(&mut self, group: &str, name: &str, record: TimerRecord) {
        let bucket = bucket_of(group, name);

        let chain = &self.buckets[bucket];
        let position = chain
            .iter()
            .position(|&index| {
                let entry = &self.entries[index];
                (entry.group.as_str(), entry.name.as_str()) >= (group, name)
            })
            .unwrap_or(chain.len());
        let found = chain.get(position).copied().filter(|&index| {
            let entry = &self.entries[index];
            (entry.group.as_str(), entry.name.as_str()) == (group, name)
        });

        match found {
            Some(index) => {
                let entry = &mut self.entries[index];
                let cell = entry
                    .records
                    .iter_mut()
                    .find(|cell| cell.rank == record.rank && cell.context == record.context);
                match cell {
                    Some(cell) => *cell = record,
                    None => entry.records.push(record),
                }
            }
            None => {
                let index = self.entries.len();
                self.entries.push(MergedTimer {
                    group: group.to_string(),
                    name: name.to_string(),
                    kind: TimerKind::from_bits(record.kind_bits),
                    records: vec![record],
                });
                self.buckets[bucket].insert(position, index);
            }
        }
    }

    /// The merged timers, in the order they were first discovered.
    pub(crate) fn into_merged(self) -> Vec<MergedTimer> {
        self.entries
    }
}

/// Slices one gathered buffer back into per-rank payloads.
///
/// The buffer is the rank-ascending concatenation the transport delivered;
/// `sizes` are the per-rank byte counts gathered beforehand. A mismatch
/// between the two is a transport error.
pub(crate) fn split_by_sizes<'a>(bytes: &'a [u8], sizes: &[u32]) -> Result<Vec<&'a [u8]>> {
    let mut payloads = Vec::with_capacity(sizes.len());
    let mut offset = 0_usize;

    for &size in sizes {
        let len = usize::try_from(size).map_err(|_| Error::TransportFailed)?;
        let end = offset.checked_add(len).ok_or(Error::TransportFailed)?;
        payloads.push(bytes.get(offset..end).ok_or(Error::TransportFailed)?);
        offset = end;
    }

    if offset == bytes.len() {
        Ok(payloads)
    } else {
        Err(Error::TransportFailed)
    }
}

/// Decodes every rank's payload and joins the timers across ranks.
///
/// Payloads are processed in rank order and each rank's regions in the
/// order it encoded them, so records line up by ascending rank and the
/// merged list follows rank 0's declaration order for shared timers.
pub(crate) fn merge_rank_payloads(payloads: &[&[u8]]) -> Result<Vec<MergedTimer>> {
    let mut table = JoinTable::new();
    for payload in payloads {
        for region in wire::decode(payload)? {
            for entry in region.names {
                for record in entry.records {
                    table.insert(&region.group, &entry.name, record);
                }
            }
        }
    }
    Ok(table.into_merged())
}
