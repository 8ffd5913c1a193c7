//! Report-file formatting: the header, the comma-delimited rows and the
//! numeric rendering they share.
//!
//! The format is consumed by downstream tooling, so every line shape here is
//! load-bearing, down to the spacing around the commas.

use std::io::{self, Write};

use crate::timer_kind::TimerKind;
use crate::wire::TimerRecord;

/// First line of every report file.
pub(crate) const REPORT_BANNER: &str = "Performance Modelling Timing File";

/// Column header closing the report header block.
pub(crate) const COLUMN_HEADER: &str = "#Type, , MPI Rank, , Name, , Value, (, StDev, ), , Count";

/// Written when a sink closes: a blank line, then the end marker.
pub(crate) const REPORT_FOOTER: &str = "\nEnd of File\n";

/// Version of the report format, written into the header.
pub(crate) const FORMAT_VERSION: (u32, u32, u32) = (2, 6, 0);

/// Renders a value the way every numeric report field is rendered: scientific
/// notation, six fraction digits, upper-case `E`, sign-carrying two-digit
/// exponent, right-aligned to twelve characters.
pub(crate) fn format_value(value: f64) -> String {
    if !value.is_finite() {
        let text = if value.is_nan() {
            "NAN"
        } else if value > 0.0 {
            "INF"
        } else {
            "-INF"
        };
        return format!("{text:>12}");
    }

    let formatted = format!("{value:.6e}");
    let (mantissa, exponent) = formatted
        .split_once('e')
        .expect("scientific formatting always yields an exponent");
    let exponent: i32 = exponent
        .parse()
        .expect("exponent of a finite double is a small integer");
    let sign = if exponent < 0 { '-' } else { '+' };
    let rendered = format!("{mantissa}E{sign}{:02}", exponent.abs());
    format!("{rendered:>12}")
}

/// Replaces commas with spaces so a value cannot break the report framing.
///
/// Returns the cleaned string and whether anything was replaced; the caller
/// owes the user one warning per modified string.
pub(crate) fn sanitize_for_report(text: &str) -> (String, bool) {
    if text.contains(',') {
        (text.replace(',', " "), true)
    } else {
        (text.to_string(), false)
    }
}

/// Everything the header needs beyond what the clock provides.
///
/// All strings must already be sanitized.
#[derive(Debug)]
pub(crate) struct HeaderContext<'a> {
    pub(crate) application_name: &'a str,
    pub(crate) nranks: u32,
    pub(crate) max_contexts: u32,
    pub(crate) machine: &'a str,
    pub(crate) processor: &'a str,
    pub(crate) os: &'a str,
    pub(crate) compiler: &'a str,
    pub(crate) transport: &'a str,
    pub(crate) tag: Option<&'a str>,
    pub(crate) flags: &'a [String],
    pub(crate) specific: &'a [(String, String)],
    pub(crate) environ: Option<&'a [String]>,
}

/// Writes the fixed header block, ending with the column header line.
pub(crate) fn write_header(w: &mut dyn Write, header: &HeaderContext<'_>) -> io::Result<()> {
    writeln!(w, "{REPORT_BANNER}\n")?;

    let (major, minor, build) = FORMAT_VERSION;
    if cfg!(debug_assertions) {
        writeln!(w, "PMTM Version, =, {major}.{minor}.{build}, (debug)")?;
    } else {
        writeln!(w, "PMTM Version, =, {major}.{minor}.{build}")?;
    }
    writeln!(w, "Application, =, {}", header.application_name)?;

    let now = chrono::Local::now();
    writeln!(w, "Date, =, {}", now.format("%d-%m-%Y"))?;
    writeln!(w, "Time, =, {}", now.format("%H:%M"))?;
    writeln!(
        w,
        "Run ID, =, {}-{:010}",
        now.format("%Y%m%d-%H%M%S"),
        std::process::id()
    )?;
    writeln!(w, "NProcs, =, {}", header.nranks)?;
    writeln!(w, "Max OpenMP Threads, =, {}", header.max_contexts)?;
    writeln!(w, "Machine, =, {}", header.machine)?;
    writeln!(w, "Processor, =, {}", header.processor)?;
    writeln!(w, "OS, =, {}", header.os)?;
    writeln!(w, "Compiler, =, {}", header.compiler)?;
    writeln!(w, "MPI, =, {}", header.transport)?;

    if let Some(tag) = header.tag {
        writeln!(w, "Tag, =, {tag}")?;
    }

    if !header.flags.is_empty() {
        write!(w, "Flags, =,")?;
        for flag in header.flags {
            write!(w, " {flag},")?;
        }
        writeln!(w)?;
    }

    for (name, value) in header.specific {
        write_specific_row(w, name, value)?;
    }

    if let Some(environ) = header.environ {
        for entry in environ {
            writeln!(w, "Environ, =, {entry}")?;
        }
    }

    writeln!(w, "{COLUMN_HEADER}")
}

/// The left-hand label of a timer row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RowLabel {
    /// A per-participant row: `rank.context`.
    RankContext { rank: u32, context: u32 },
    Average,
    Maximum,
    Minimum,
}

impl RowLabel {
    fn text(self) -> String {
        match self {
            Self::RankContext { rank, context } => format!("{rank}.{context}"),
            Self::Average => "Rank Average".to_string(),
            Self::Maximum => "Rank Maximum".to_string(),
            Self::Minimum => "Rank Minimum".to_string(),
        }
    }
}

/// The numbers behind one timer row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RowStats {
    pub(crate) avg: f64,
    pub(crate) std_dev: f64,
    pub(crate) count: u64,
    pub(crate) pause_per_block: u64,
}

impl RowStats {
    /// Derives the printed statistics from a timer's accumulators. A timer
    /// that never completed a measured block prints as all zeroes.
    #[expect(
        clippy::cast_precision_loss,
        reason = "block counts sit far below 2^53 in practice"
    )]
    pub(crate) fn from_totals(
        total_wall: f64,
        total_square_wall: f64,
        block_count: u64,
        pause_count: u64,
    ) -> Self {
        if block_count == 0 {
            return Self {
                avg: 0.0,
                std_dev: 0.0,
                count: 0,
                pause_per_block: 0,
            };
        }

        let count = block_count as f64;
        let avg = total_wall / count;
        Self {
            avg,
            std_dev: total_square_wall / count - avg * avg,
            count: block_count,
            pause_per_block: pause_count
                .checked_div(block_count)
                .expect("block_count != 0"),
        }
    }
}

/// Writes one `Timer` row.
pub(crate) fn write_timer_row(
    w: &mut dyn Write,
    label: RowLabel,
    name: &str,
    stats: &RowStats,
) -> io::Result<()> {
    writeln!(
        w,
        "Timer, : (, {}, ), {}, =, {}, (, {}, ), count, {}, paused, {}",
        label.text(),
        name,
        format_value(stats.avg),
        format_value(stats.std_dev),
        stats.count,
        stats.pause_per_block,
    )
}

/// Writes one `Overhead` calibration row.
pub(crate) fn write_overhead_row(
    w: &mut dyn Write,
    label: &str,
    avg: f64,
    std_dev: f64,
) -> io::Result<()> {
    writeln!(
        w,
        "Overhead, (, 0, ), {}, =, {}, (, {}, )",
        label,
        format_value(avg),
        format_value(std_dev),
    )
}

/// Writes one `Parameter` row.
pub(crate) fn write_parameter_row(
    w: &mut dyn Write,
    rank: u32,
    name: &str,
    value: &str,
) -> io::Result<()> {
    writeln!(w, "Parameter, : (, {rank}, ), {name}, =, {value}")
}

/// Writes one `Specific` row.
pub(crate) fn write_specific_row(w: &mut dyn Write, name: &str, value: &str) -> io::Result<()> {
    writeln!(w, "Specific, {name}, =, {value}")
}

/// The row set for one merged timer, in print order.
///
/// Per-participant rows come first (unless the kind suppresses them), then
/// the aggregates: average, maximum, minimum. The average aggregate sums
/// totals and counts across the rows; maximum and minimum copy the row with
/// the greatest or least total wall time, earliest row winning ties.
pub(crate) fn timer_rows(kind: TimerKind, records: &[TimerRecord]) -> Vec<(RowLabel, RowStats)> {
    let mut rows = Vec::new();
    if kind.suppresses_all_rows() || records.is_empty() {
        return rows;
    }

    if !kind.suppresses_rank_rows() {
        for record in records {
            rows.push((
                RowLabel::RankContext {
                    rank: record.rank,
                    context: record.context,
                },
                RowStats::from_totals(
                    record.total_wall,
                    record.total_square_wall,
                    record.block_count,
                    record.pause_count,
                ),
            ));
        }
    }

    if kind.wants_average_row() {
        let mut total_wall = 0.0;
        let mut total_square_wall = 0.0;
        let mut block_count: u64 = 0;
        for record in records {
            total_wall += record.total_wall;
            total_square_wall += record.total_square_wall;
            block_count = block_count
                .checked_add(record.block_count)
                .expect("combined block count fits in u64 for any realistic run");
        }
        rows.push((
            RowLabel::Average,
            RowStats::from_totals(total_wall, total_square_wall, block_count, 0),
        ));
    }

    if kind.wants_maximum_row() {
        let mut selected = (f64::NEG_INFINITY, 0.0, 0);
        for record in records {
            if record.total_wall > selected.0 {
                selected = (
                    record.total_wall,
                    record.total_square_wall,
                    record.block_count,
                );
            }
        }
        rows.push((
            RowLabel::Maximum,
            RowStats::from_totals(selected.0, selected.1, selected.2, 0),
        ));
    }

    if kind.wants_minimum_row() {
        let mut selected = (f64::INFINITY, 0.0, 0);
        for record in records {
            if record.total_wall < selected.0 {
                selected = (
                    record.total_wall,
                    record.total_square_wall,
                    record.block_count,
                );
            }
        }
        rows.push((
            RowLabel::Minimum,
            RowStats::from_totals(selected.0, selected.1, selected.2, 0),
        ));
    }

    rows
}

#[cfg(test)]
mod tests {
    #![allow(clippy::indexing_slicing, reason = "panic is fine in tests")]

    use super::*;

    fn record(rank: u32, total_wall: f64, block_count: u64) -> TimerRecord {
        TimerRecord {
            kind_bits: TimerKind::NONE.bits(),
            rank,
            context: 0,
            block_count,
            pause_count: 0,
            total_wall,
            total_square_wall: total_wall * total_wall,
            total_cpu: 0.0,
            total_square_cpu: 0.0,
        }
    }

    #[test]
    fn format_value_matches_report_conventions() {
        assert_eq!(format_value(0.0), "0.000000E+00");
        assert_eq!(format_value(1.5), "1.500000E+00");
        assert_eq!(format_value(123.456), "1.234560E+02");
        assert_eq!(format_value(-4.9e-18), "-4.900000E-18");
        assert_eq!(format_value(0.001953), "1.953000E-03");
    }

    #[test]
    fn format_value_is_twelve_wide_for_positives() {
        for value in [0.0, 1.0, 9.99e99, 1.0e-30] {
            assert_eq!(format_value(value).len(), 12, "{value}");
        }
    }

    #[test]
    fn format_value_widens_for_three_digit_exponents() {
        // Twelve is a minimum width; a third exponent digit stretches it.
        assert_eq!(format_value(1.0e-300), "1.000000E-300");
    }

    #[test]
    fn sanitize_replaces_commas() {
        assert_eq!(sanitize_for_report("a,b,c"), ("a b c".to_string(), true));
        assert_eq!(sanitize_for_report("clean"), ("clean".to_string(), false));
    }

    #[test]
    fn zero_blocks_print_as_zeroes() {
        let stats = RowStats::from_totals(0.0, 0.0, 0, 0);
        assert_eq!(stats.avg, 0.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.count, 0);
    }

    #[test]
    fn row_stats_mean_and_variance() {
        // Two blocks of 1s and 3s: mean 2, variance (1 + 9)/2 - 4 = 1.
        let stats = RowStats::from_totals(4.0, 10.0, 2, 3);
        assert_eq!(stats.avg, 2.0);
        assert_eq!(stats.std_dev, 1.0);
        assert_eq!(stats.pause_per_block, 1);
    }

    #[test]
    fn timer_row_line_shape() {
        let mut out = Vec::new();
        let stats = RowStats::from_totals(3.0, 4.5, 2, 0);
        write_timer_row(
            &mut out,
            RowLabel::RankContext {
                rank: 0,
                context: 0,
            },
            "step",
            &stats,
        )
        .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Timer, : (, 0.0, ), step, =, 1.500000E+00, (, 0.000000E+00, ), count, 2, paused, 0\n"
        );
    }

    #[test]
    fn overhead_row_line_shape() {
        let mut out = Vec::new();
        write_overhead_row(&mut out, "start-stop", 0.0, 0.0).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Overhead, (, 0, ), start-stop, =, 0.000000E+00, (, 0.000000E+00, )\n"
        );
    }

    #[test]
    fn parameter_row_line_shape() {
        let mut out = Vec::new();
        write_parameter_row(&mut out, 3, "Cells2", "1024").unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Parameter, : (, 3, ), Cells2, =, 1024\n"
        );
    }

    #[test]
    fn header_lines_in_order() {
        let header = HeaderContext {
            application_name: "app",
            nranks: 4,
            max_contexts: 1,
            machine: "Unknown",
            processor: "Unknown",
            os: "Unknown",
            compiler: "Unknown",
            transport: "Serial",
            tag: Some("nightly"),
            flags: &["-x 1".to_string(), "-y".to_string()],
            specific: &[("HOSTNAME".to_string(), "node01".to_string())],
            environ: None,
        };

        let mut out = Vec::new();
        write_header(&mut out, &header).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Performance Modelling Timing File");
        assert_eq!(lines[1], "");
        assert!(lines[2].starts_with("PMTM Version, =, 2.6.0"));
        assert_eq!(lines[3], "Application, =, app");
        assert!(lines[4].starts_with("Date, =, "));
        assert!(lines[5].starts_with("Time, =, "));
        assert!(lines[6].starts_with("Run ID, =, "));
        assert_eq!(lines[7], "NProcs, =, 4");
        assert_eq!(lines[8], "Max OpenMP Threads, =, 1");
        assert_eq!(lines[12], "Compiler, =, Unknown");
        assert_eq!(lines[13], "MPI, =, Serial");
        assert_eq!(lines[14], "Tag, =, nightly");
        assert_eq!(lines[15], "Flags, =, -x 1, -y,");
        assert_eq!(lines[16], "Specific, HOSTNAME, =, node01");
        assert_eq!(lines.last().copied(), Some(COLUMN_HEADER));
    }

    #[test]
    fn run_id_is_zero_padded() {
        let header = HeaderContext {
            application_name: "app",
            nranks: 1,
            max_contexts: 1,
            machine: "Unknown",
            processor: "Unknown",
            os: "Unknown",
            compiler: "Unknown",
            transport: "Serial",
            tag: None,
            flags: &[],
            specific: &[],
            environ: None,
        };

        let mut out = Vec::new();
        write_header(&mut out, &header).unwrap();
        let text = String::from_utf8(out).unwrap();
        let run_id = text
            .lines()
            .find(|line| line.starts_with("Run ID, =, "))
            .unwrap();

        // YYYYMMDD-HHMMSS-PPPPPPPPPP
        let stamp = run_id.trim_start_matches("Run ID, =, ");
        let parts: Vec<&str> = stamp.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 10);
    }

    #[test]
    fn all_rows_for_the_all_kind() {
        let records = [record(0, 1.0, 1), record(1, 3.0, 1)];
        let rows = timer_rows(TimerKind::ALL, &records);

        let labels: Vec<RowLabel> = rows.iter().map(|(label, _)| *label).collect();
        assert_eq!(
            labels,
            vec![
                RowLabel::RankContext {
                    rank: 0,
                    context: 0
                },
                RowLabel::RankContext {
                    rank: 1,
                    context: 0
                },
                RowLabel::Average,
                RowLabel::Maximum,
                RowLabel::Minimum,
            ]
        );
    }

    #[test]
    fn composite_kinds_suppress_rank_rows() {
        let records = [record(0, 1.0, 1), record(1, 3.0, 1)];

        let mma_labels: Vec<RowLabel> = timer_rows(TimerKind::MMA, &records)
            .iter()
            .map(|(label, _)| *label)
            .collect();
        assert_eq!(
            mma_labels,
            vec![RowLabel::Average, RowLabel::Maximum, RowLabel::Minimum]
        );

        let avo_labels: Vec<RowLabel> = timer_rows(TimerKind::AVO, &records)
            .iter()
            .map(|(label, _)| *label)
            .collect();
        assert_eq!(avo_labels, vec![RowLabel::Average]);
    }

    #[test]
    fn internal_kind_yields_no_rows() {
        let records = [record(0, 1.0, 1)];
        assert!(timer_rows(TimerKind::INT, &records).is_empty());
    }

    #[test]
    fn average_row_sums_across_records() {
        let records = [record(0, 2.0, 2), record(1, 4.0, 2)];
        let rows = timer_rows(TimerKind::AVG, &records);

        let (label, stats) = rows.last().unwrap();
        assert_eq!(*label, RowLabel::Average);
        // (2 + 4) / (2 + 2)
        assert_eq!(stats.avg, 1.5);
        assert_eq!(stats.count, 4);
    }

    #[test]
    fn extremes_copy_the_selected_record() {
        let records = [record(0, 5.0, 7), record(1, 1.0, 3), record(2, 9.0, 2)];

        let max_rows = timer_rows(TimerKind::MAX, &records);
        let (_, max_stats) = max_rows.last().unwrap();
        assert_eq!(max_stats.count, 2);
        assert_eq!(max_stats.avg, 4.5);

        let min_rows = timer_rows(TimerKind::MIN, &records);
        let (_, min_stats) = min_rows.last().unwrap();
        assert_eq!(min_stats.count, 3);
    }

    #[test]
    fn all_zero_totals_still_select_a_row() {
        let records = [record(0, 0.0, 4), record(1, 0.0, 6)];

        let rows = timer_rows(TimerKind::MMA, &records);
        let (_, max_stats) = rows
            .iter()
            .find(|(label, _)| *label == RowLabel::Maximum)
            .unwrap();
        // The earliest record wins the tie and its count is copied.
        assert_eq!(max_stats.count, 4);
    }
}
