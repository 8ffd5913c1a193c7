//! Typed output parameters and the policies that throttle their emission.

use std::fmt::{self, Display};

use crate::report::format_value;

/// A value attached to a run as an output parameter.
///
/// Values render into the report with a fixed format per kind; floating
/// point values share the scientific format used by timer rows.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// A signed integer, rendered in plain decimal.
    Int(i64),

    /// A double-precision float, rendered like timer values.
    Float(f64),

    /// Free text, rendered as-is (commas are stripped on output).
    Text(String),
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{}", format_value(*value)),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// When a parameter row is written, relative to earlier rows with the same
/// parameter name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum OutputPolicy {
    /// Every call emits a row.
    Always,

    /// Only the first call for the name emits a row.
    Once,

    /// A call emits a row when the name is new or the value differs from
    /// the stored one.
    OnChange,
}

#[derive(Debug)]
struct ParameterRecord {
    name: String,
    value: String,
    count: u32,
}

/// The per-instance record of parameters seen so far.
///
/// Records are keyed by name alone and scanned linearly; an instance carries
/// few enough parameters that anything cleverer would not pay for itself.
#[derive(Debug, Default)]
pub(crate) struct ParameterStore {
    records: Vec<ParameterRecord>,
}

impl ParameterStore {
    /// Applies the policy for one parameter call.
    ///
    /// `value` must already be normalized for the report format. Returns the
    /// occurrence count to emit under when the row should be written, or
    /// `None` when the policy suppresses it. An emitting call also stores
    /// the value.
    pub(crate) fn check(&mut self, name: &str, value: &str, policy: OutputPolicy) -> Option<u32> {
        let existing = self.records.iter_mut().find(|record| record.name == name);

        let emit = match policy {
            OutputPolicy::Always => true,
            OutputPolicy::Once => existing.is_none(),
            OutputPolicy::OnChange => existing
                .as_ref()
                .is_none_or(|record| record.value != value),
        };
        if !emit {
            return None;
        }

        match existing {
            Some(record) => {
                record.value = value.to_string();
                record.count = record
                    .count
                    .checked_add(1)
                    .expect("parameter repeat count fits in u32 for any realistic run");
                Some(record.count)
            }
            None => {
                self.records.push(ParameterRecord {
                    name: name.to_string(),
                    value: value.to_string(),
                    count: 1,
                });
                Some(1)
            }
        }
    }
}

/// The name a parameter row is emitted under: repeats get the occurrence
/// count appended.
pub(crate) fn display_name(name: &str, count: u32) -> String {
    if count > 1 {
        format!("{name}{count}")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_emits_only_the_first_call() {
        let mut store = ParameterStore::default();

        assert_eq!(store.check("Cells", "100", OutputPolicy::Once), Some(1));
        assert_eq!(store.check("Cells", "200", OutputPolicy::Once), None);
    }

    #[test]
    fn on_change_emits_when_the_value_differs() {
        let mut store = ParameterStore::default();

        assert_eq!(store.check("Step", "1", OutputPolicy::OnChange), Some(1));
        assert_eq!(store.check("Step", "1", OutputPolicy::OnChange), None);
        assert_eq!(store.check("Step", "2", OutputPolicy::OnChange), Some(2));
        assert_eq!(store.check("Step", "2", OutputPolicy::OnChange), None);
    }

    #[test]
    fn always_emits_with_rising_counts() {
        let mut store = ParameterStore::default();

        assert_eq!(store.check("Loop", "a", OutputPolicy::Always), Some(1));
        assert_eq!(store.check("Loop", "b", OutputPolicy::Always), Some(2));
        assert_eq!(store.check("Loop", "b", OutputPolicy::Always), Some(3));
    }

    #[test]
    fn names_are_tracked_independently() {
        let mut store = ParameterStore::default();

        assert_eq!(store.check("A", "1", OutputPolicy::Once), Some(1));
        assert_eq!(store.check("B", "1", OutputPolicy::Once), Some(1));
    }

    #[test]
    fn display_names_suffix_repeats() {
        assert_eq!(display_name("Cells", 1), "Cells");
        assert_eq!(display_name("Cells", 2), "Cells2");
        assert_eq!(display_name("Cells", 10), "Cells10");
    }

    #[test]
    fn values_render_per_kind() {
        assert_eq!(Value::from(42_i64).to_string(), "42");
        assert_eq!(Value::from(-7_i64).to_string(), "-7");
        assert_eq!(Value::from("free text").to_string(), "free text");
        assert_eq!(Value::from(1.5_f64).to_string(), "1.500000E+00");
    }
}
