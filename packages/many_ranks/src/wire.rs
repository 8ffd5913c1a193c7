//! Binary payloads exchanged between ranks during an aggregation pass.
//!
//! Each rank serialises its timing data as a sequence of regions, one per
//! timer group. A region opens with its name-slot count and group name,
//! then carries each timer name followed by that name's per-context
//! records. Integers and doubles are little-endian; names carry a `u32`
//! length prefix and no terminator. Fields a given build never touches
//! still travel, so payloads from mixed builds line up.

use crate::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::timer::{StateViolation, TimerSlot, TimerState};

/// Serialised size of one [`TimerRecord`].
pub(crate) const RECORD_LEN: usize = 60;

/// The fixed-size portion of one timer's wire entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct TimerRecord {
    pub(crate) kind_bits: u32,
    pub(crate) rank: u32,
    pub(crate) context: u32,
    pub(crate) block_count: u64,
    pub(crate) pause_count: u64,
    pub(crate) total_wall: f64,
    pub(crate) total_square_wall: f64,
    pub(crate) total_cpu: f64,
    pub(crate) total_square_cpu: f64,
}

impl TimerRecord {
    /// Snapshots a timer's accumulators for transmission, stamping the
    /// sending rank.
    ///
    /// Also reports whether the timer was still running at capture time;
    /// the caller decides whether that is worth a warning.
    pub(crate) fn capture(slot: &TimerSlot, rank: u32) -> (Self, Option<StateViolation>) {
        let metrics = slot.metrics.lock().expect(ERR_POISONED_LOCK);
        let violation = metrics.expect_state(TimerState::Stopped, "reported");

        (
            Self {
                kind_bits: slot.kind.bits(),
                rank,
                context: slot.context,
                block_count: metrics.block_count,
                pause_count: metrics.pause_count,
                total_wall: metrics.total_wall,
                total_square_wall: metrics.total_square_wall,
                total_cpu: metrics.total_cpu,
                total_square_cpu: metrics.total_square_cpu,
            },
            violation,
        )
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "offsets are constants within the fixed record length"
    )]
    pub(crate) fn to_bytes(self) -> [u8; RECORD_LEN] {
        let mut bytes = [0_u8; RECORD_LEN];
        bytes[0..4].copy_from_slice(&self.kind_bits.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.rank.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.context.to_le_bytes());
        bytes[12..20].copy_from_slice(&self.block_count.to_le_bytes());
        bytes[20..28].copy_from_slice(&self.pause_count.to_le_bytes());
        bytes[28..36].copy_from_slice(&self.total_wall.to_le_bytes());
        bytes[36..44].copy_from_slice(&self.total_square_wall.to_le_bytes());
        bytes[44..52].copy_from_slice(&self.total_cpu.to_le_bytes());
        bytes[52..60].copy_from_slice(&self.total_square_cpu.to_le_bytes());
        bytes
    }

    #[expect(
        clippy::indexing_slicing,
        clippy::arithmetic_side_effects,
        reason = "offsets are constants within the fixed record length"
    )]
    pub(crate) fn from_bytes(bytes: &[u8; RECORD_LEN]) -> Self {
        let u32_at = |offset: usize| {
            u32::from_le_bytes(
                bytes[offset..offset + 4]
                    .try_into()
                    .expect("slice is exactly four bytes"),
            )
        };
        let u64_at = |offset: usize| {
            u64::from_le_bytes(
                bytes[offset..offset + 8]
                    .try_into()
                    .expect("slice is exactly eight bytes"),
            )
        };
        let f64_at = |offset: usize| f64::from_bits(u64_at(offset));

        Self {
            kind_bits: u32_at(0),
            rank: u32_at(4),
            context: u32_at(8),
            block_count: u64_at(12),
            pause_count: u64_at(20),
            total_wall: f64_at(28),
            total_square_wall: f64_at(36),
            total_cpu: f64_at(44),
            total_square_cpu: f64_at(52),
        }
    }
}

/// One timer name and its per-context records, in context order.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct NameEntry {
    pub(crate) name: String,
    pub(crate) records: Vec<TimerRecord>,
}

/// One timer group's slice of a rank's payload.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Region {
    pub(crate) group: String,
    pub(crate) names: Vec<NameEntry>,
}

fn push_string(payload: &mut Vec<u8>, text: &str) -> Result<()> {
    let len = u32::try_from(text.len())?;
    payload.extend_from_slice(&len.to_le_bytes());
    payload.extend_from_slice(text.as_bytes());
    Ok(())
}

fn push_count(payload: &mut Vec<u8>, count: usize) -> Result<()> {
    let count = u32::try_from(count)?;
    payload.extend_from_slice(&count.to_le_bytes());
    Ok(())
}

/// Serialises a rank's regions into one contiguous payload.
///
/// # Errors
///
/// Returns [`Error::FailedAllocation`] when a name or count exceeds the
/// format's `u32` framing.
pub(crate) fn encode(regions: &[Region]) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    for region in regions {
        push_count(&mut payload, region.names.len())?;
        push_string(&mut payload, &region.group)?;

        for entry in &region.names {
            push_string(&mut payload, &entry.name)?;
            push_count(&mut payload, entry.records.len())?;
            for record in &entry.records {
                payload.extend_from_slice(&record.to_bytes());
            }
        }
    }
    Ok(payload)
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn is_empty(&self) -> bool {
        self.offset == self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).ok_or(Error::TransportFailed)?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(Error::TransportFailed)?;
        self.offset = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(
            bytes.try_into().expect("take returned exactly four bytes"),
        ))
    }

    fn string(&mut self) -> Result<String> {
        let len = usize::try_from(self.u32()?).map_err(|_| Error::TransportFailed)?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::TransportFailed)
    }

    fn record(&mut self) -> Result<TimerRecord> {
        let bytes = self.take(RECORD_LEN)?;
        Ok(TimerRecord::from_bytes(
            bytes
                .try_into()
                .expect("take returned exactly a record's worth of bytes"),
        ))
    }
}

/// Parses one rank's payload back into regions.
///
/// Walks the whole payload; trailing garbage or a truncated region is a
/// transport error, never silently dropped.
pub(crate) fn decode(payload: &[u8]) -> Result<Vec<Region>> {
    let mut reader = Reader::new(payload);
    let mut regions = Vec::new();

    while !reader.is_empty() {
        let name_count = reader.u32()?;
        let group = reader.string()?;

        // Capacity comes from parsed entries, not the claimed counts, so a
        // corrupt count cannot trigger a huge allocation.
        let mut names = Vec::new();
        for _ in 0..name_count {
            let name = reader.string()?;
            let record_count = reader.u32()?;

            let mut records = Vec::new();
            for _ in 0..record_count {
                records.push(reader.record()?);
            }
            names.push(NameEntry { name, records });
        }

        regions.push(Region { group, names });
    }

    Ok(regions)
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::indexing_slicing,
        clippy::arithmetic_side_effects,
        reason = "panic is fine in tests"
    )]

    use super::*;
    use crate::pal::TimeSample;
    use crate::timer_kind::TimerKind;

    fn record(rank: u32) -> TimerRecord {
        TimerRecord {
            kind_bits: TimerKind::ALL.bits(),
            rank,
            context: 2,
            block_count: 17,
            pause_count: 3,
            total_wall: 1.25,
            total_square_wall: 1.5625,
            total_cpu: 0.5,
            total_square_cpu: 0.25,
        }
    }

    fn entry(name: &str, records: Vec<TimerRecord>) -> NameEntry {
        NameEntry {
            name: name.to_string(),
            records,
        }
    }

    #[test]
    fn record_bytes_round_trip() {
        let original = record(4);
        let decoded = TimerRecord::from_bytes(&original.to_bytes());
        assert_eq!(decoded, original);
    }

    #[test]
    fn record_layout_is_little_endian() {
        let bytes = record(4).to_bytes();
        assert_eq!(bytes.len(), RECORD_LEN);
        assert_eq!(&bytes[0..4], &TimerKind::ALL.bits().to_le_bytes());
        assert_eq!(&bytes[4..8], &4_u32.to_le_bytes());
        assert_eq!(&bytes[28..36], &1.25_f64.to_le_bytes());
    }

    #[test]
    fn region_opens_with_count_then_group_name() {
        let regions = vec![Region {
            group: "Default".to_string(),
            names: vec![entry("step", vec![record(0)])],
        }];

        let payload = encode(&regions).unwrap();
        assert_eq!(&payload[0..4], &1_u32.to_le_bytes());
        assert_eq!(&payload[4..8], &7_u32.to_le_bytes());
        assert_eq!(&payload[8..15], b"Default");
    }

    #[test]
    fn regions_round_trip() {
        let regions = vec![
            Region {
                group: "Default".to_string(),
                names: vec![
                    entry("step", vec![record(0)]),
                    entry("io", vec![record(0), record(0)]),
                ],
            },
            Region {
                group: "physics".to_string(),
                names: vec![entry("advect", vec![record(0)])],
            },
        ];

        let decoded = decode(&encode(&regions).unwrap()).unwrap();
        assert_eq!(decoded, regions);
    }

    #[test]
    fn group_without_timers_round_trips() {
        let regions = vec![Region {
            group: "empty".to_string(),
            names: Vec::new(),
        }];

        let decoded = decode(&encode(&regions).unwrap()).unwrap();
        assert_eq!(decoded, regions);
    }

    #[test]
    fn empty_payload_decodes_to_no_regions() {
        assert_eq!(decode(&[]).unwrap(), Vec::new());
    }

    #[test]
    fn truncated_payload_is_a_transport_error() {
        let regions = vec![Region {
            group: "Default".to_string(),
            names: vec![entry("step", vec![record(0)])],
        }];
        let payload = encode(&regions).unwrap();

        for len in [1, 5, payload.len() - 1] {
            assert_eq!(decode(&payload[..len]), Err(Error::TransportFailed));
        }
    }

    #[test]
    fn oversized_length_prefix_is_a_transport_error() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1_u32.to_le_bytes());
        payload.extend_from_slice(&u32::MAX.to_le_bytes());
        payload.extend_from_slice(b"De");

        assert_eq!(decode(&payload), Err(Error::TransportFailed));
    }

    #[test]
    fn non_utf8_name_is_a_transport_error() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1_u32.to_le_bytes());
        payload.extend_from_slice(&2_u32.to_le_bytes());
        payload.extend_from_slice(&[0xFF, 0xFE]);

        assert_eq!(decode(&payload), Err(Error::TransportFailed));
    }

    #[test]
    fn capture_snapshots_a_stopped_timer() {
        let slot = TimerSlot::new("step".to_string(), TimerKind::ALL, 1);
        {
            let mut metrics = slot.metrics.lock().unwrap();
            metrics.start(TimeSample { wall: 1.0, cpu: 0.5 });
            metrics.stop(TimeSample { wall: 3.0, cpu: 1.0 });
        }

        let (record, violation) = TimerRecord::capture(&slot, 6);
        assert!(violation.is_none());
        assert_eq!(record.rank, 6);
        assert_eq!(record.context, 1);
        assert_eq!(record.block_count, 1);
        assert_eq!(record.total_wall, 2.0);
        assert_eq!(record.total_cpu, 0.5);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn capture_reports_a_running_timer() {
        let slot = TimerSlot::new("step".to_string(), TimerKind::ALL, 0);
        slot.metrics
            .lock()
            .unwrap()
            .start(TimeSample { wall: 1.0, cpu: 0.5 });

        let (_, violation) = TimerRecord::capture(&slot, 0);
        let violation = violation.unwrap();
        assert_eq!(violation.observed, TimerState::Active);
        assert_eq!(violation.required, TimerState::Stopped);
    }

    #[test]
    fn unstarted_timer_captures_as_zeroes() {
        let slot = TimerSlot::new("idle".to_string(), TimerKind::NONE, 0);

        let (record, violation) = TimerRecord::capture(&slot, 0);
        assert!(violation.is_none());
        assert_eq!(record.block_count, 0);
        assert_eq!(record.pause_count, 0);
        assert_eq!(record.total_wall, 0.0);
        assert_eq!(record.total_square_wall, 0.0);
    }
}
