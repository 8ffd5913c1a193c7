use std::ops::BitOr;

/// Selects which rows a timer contributes to the report file.
///
/// Kinds are a small bitmask. The base bits request aggregate rows on top of
/// the per-rank rows; two composite kinds change the row set wholesale:
///
/// * [`TimerKind::NONE`] prints the per-rank rows only.
/// * [`TimerKind::MAX`] / [`TimerKind::MIN`] / [`TimerKind::AVG`] each add
///   one cross-rank aggregate row.
/// * [`TimerKind::ALL`] is all three aggregate bits at once.
/// * [`TimerKind::MMA`] prints the three aggregate rows and suppresses the
///   per-rank rows.
/// * [`TimerKind::AVO`] prints only the cross-rank average row.
/// * [`TimerKind::INT`] prints nothing at all; the timer still participates
///   in collection so that aggregation framing stays intact.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TimerKind(u32);

impl TimerKind {
    /// Per-rank rows only, no aggregates.
    pub const NONE: Self = Self(0);

    /// Adds the cross-rank maximum row.
    pub const MAX: Self = Self(1);

    /// Adds the cross-rank minimum row.
    pub const MIN: Self = Self(2);

    /// Adds the cross-rank average row.
    pub const AVG: Self = Self(4);

    /// All three aggregate rows on top of the per-rank rows.
    pub const ALL: Self = Self(7);

    /// The three aggregate rows with the per-rank rows suppressed.
    pub const MMA: Self = Self(15);

    /// Collected but never printed.
    pub const INT: Self = Self(16);

    /// Only the cross-rank average row.
    pub const AVO: Self = Self(32);

    /// The raw bit pattern, as carried in aggregation payloads.
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Reconstructs a kind from a raw bit pattern.
    ///
    /// Unrecognised patterns are preserved; they behave like
    /// [`TimerKind::NONE`] plus whichever aggregate bits are set.
    pub(crate) fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Whether the timer emits no rows at all.
    pub(crate) fn suppresses_all_rows(self) -> bool {
        self == Self::INT
    }

    /// Whether the per-rank rows are withheld in favour of aggregates.
    pub(crate) fn suppresses_rank_rows(self) -> bool {
        self == Self::MMA || self == Self::AVO
    }

    /// Whether the cross-rank average row is emitted.
    pub(crate) fn wants_average_row(self) -> bool {
        self.0 & Self::AVG.0 != 0 || self == Self::AVO
    }

    /// Whether the cross-rank maximum row is emitted.
    pub(crate) fn wants_maximum_row(self) -> bool {
        self.0 & Self::MAX.0 != 0
    }

    /// Whether the cross-rank minimum row is emitted.
    pub(crate) fn wants_minimum_row(self) -> bool {
        self.0 & Self::MIN.0 != 0
    }
}

impl BitOr for TimerKind {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
