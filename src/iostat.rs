// cluster_iostat - Cluster iostat capture, collection & plotting
// Copyright (C) 2024 Laurence Oberman
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

/*!
    # iostat.rs

    Parser for logs written by `iostat -c -d -x -t -m <device> <interval>`.

    The log starts with one system header line, then repeats a 7 line unit
    per sampling interval:

    ```text
    <blank>
    10/15/2026 02:03:04 PM
    avg-cpu:  %user   %nice %system %iowait  %steal   %idle
               1.25    0.00    0.50    0.25    0.00   98.00
    <blank>
    Device:         rrqm/s   wrqm/s ... svctm  %util
    vdb               0.00     0.10 ...  0.80   0.29
    ```

    Logs are usually pulled while iostat is still writing them, so the last
    unit may be cut anywhere. An incomplete trailing unit ends the table;
    a complete line with bad data is an error.
*/

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::ParseError;
use crate::metric::{CPU_FIELDS, DEVICE_FIELDS, METRIC_COUNT, Metric};

/// Timestamp layout printed by `iostat -t` in the C/en_US locale.
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// One sampling interval of iostat output.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    pub timestamp: NaiveDateTime,
    pub cpu: [f64; CPU_FIELDS],
    pub device: [f64; DEVICE_FIELDS],
}

impl SampleBlock {
    pub fn value(&self, metric: Metric) -> f64 {
        let i = metric.index();
        if i < CPU_FIELDS {
            self.cpu[i]
        } else {
            self.device[i - CPU_FIELDS]
        }
    }
}

/// A column of a [`SeriesTable`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Column<'a> {
    Time(&'a [NaiveDateTime]),
    Values(&'a [f64]),
}

/// Average/peak figures for one metric of a table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    pub samples: usize,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    pub mean: f64,
    pub peak: f64,
}

/// Column-aligned time series for one host's log.
///
/// Column 0 holds timestamps and columns 1..=19 hold the metrics in
/// [`Metric::ALL`] order. Rows are only ever appended whole, so every
/// column has the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTable {
    timestamps: Vec<NaiveDateTime>,
    metrics: [Vec<f64>; METRIC_COUNT],
}

impl Default for SeriesTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesTable {
    /// Timestamp column plus one column per metric.
    pub const COLUMNS: usize = METRIC_COUNT + 1;

    pub fn new() -> Self {
        Self {
            timestamps: Vec::new(),
            metrics: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Number of complete samples.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column_count(&self) -> usize {
        Self::COLUMNS
    }

    pub fn push(&mut self, block: SampleBlock) {
        self.timestamps.push(block.timestamp);
        for (column, value) in self
            .metrics
            .iter_mut()
            .zip(block.cpu.iter().chain(block.device.iter()))
        {
            column.push(*value);
        }
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn series(&self, metric: Metric) -> &[f64] {
        &self.metrics[metric.index()]
    }

    /// Column by position, 0 being the timestamps.
    pub fn column(&self, index: usize) -> Option<Column<'_>> {
        if index == 0 {
            return Some(Column::Time(&self.timestamps));
        }
        Metric::from_column(index).map(|m| Column::Values(self.series(m)))
    }

    /// Rebuilds the sample at `row`.
    pub fn row(&self, row: usize) -> Option<SampleBlock> {
        let timestamp = *self.timestamps.get(row)?;
        let cpu = std::array::from_fn(|i| self.metrics[i][row]);
        let device = std::array::from_fn(|i| self.metrics[CPU_FIELDS + i][row]);
        Some(SampleBlock {
            timestamp,
            cpu,
            device,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = SampleBlock> + '_ {
        (0..self.len()).filter_map(|i| self.row(i))
    }

    pub fn summary(&self, metric: Metric) -> Option<SeriesSummary> {
        let values = self.series(metric);
        let first = *self.timestamps.first()?;
        let last = *self.timestamps.last()?;
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let peak = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(SeriesSummary {
            samples: values.len(),
            first,
            last,
            mean,
            peak,
        })
    }
}

/// Reads and parses an iostat log file.
pub fn read_log(path: &Path) -> Result<SeriesTable, ParseError> {
    let file = File::open(path).map_err(|source| ParseError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_log(BufReader::new(file))
}

/// Parses iostat output into a [`SeriesTable`].
///
/// Stops without error at end of input, discarding a partially written
/// final unit. Bad values on a complete line are reported with their
/// 1-based line number.
pub fn parse_log<R: BufRead>(reader: R) -> Result<SeriesTable, ParseError> {
    let mut lines = LineReader::new(reader);
    let mut table = SeriesTable::new();

    // "Linux 5.14.0 (host)  10/15/2026  _x86_64_  (4 CPU)"
    if lines.next_line()?.is_none() {
        return Ok(table);
    }

    loop {
        if lines.next_line()?.is_none() {
            break;
        }
        let Some(timestamp) = lines.content("timestamp", parse_timestamp)? else {
            break;
        };
        if lines.next_line()?.is_none() {
            break;
        }
        let Some(cpu) = lines.content("cpu", parse_cpu)? else {
            break;
        };
        if lines.next_line()?.is_none() || lines.next_line()?.is_none() {
            break;
        }
        let Some(device) = lines.content("device", parse_device)? else {
            break;
        };

        table.push(SampleBlock {
            timestamp,
            cpu,
            device,
        });
    }

    Ok(table)
}

struct Line {
    number: usize,
    text: String,
    /// False only for a final line with no newline, i.e. cut mid-write.
    terminated: bool,
}

struct LineReader<R> {
    inner: R,
    number: usize,
}

impl<R: BufRead> LineReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, number: 0 }
    }

    fn next_line(&mut self) -> Result<Option<Line>, ParseError> {
        let mut text = String::new();
        let read = self
            .inner
            .read_line(&mut text)
            .map_err(|source| ParseError::Read {
                line: self.number + 1,
                source,
            })?;
        if read == 0 {
            return Ok(None);
        }
        self.number += 1;

        let terminated = text.ends_with('\n');
        let trimmed = text.trim_end_matches(['\n', '\r']).len();
        text.truncate(trimmed);
        Ok(Some(Line {
            number: self.number,
            text,
            terminated,
        }))
    }

    /// True when nothing but blank lines remain.
    fn rest_is_blank(&mut self) -> Result<bool, ParseError> {
        while let Some(line) = self.next_line()? {
            if !line.text.trim().is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reads a line that must carry data. `Ok(None)` means the log ends
    /// here: end of input, trailing blank lines, or a cut-off last line.
    fn content<T>(
        &mut self,
        section: &'static str,
        parse: impl FnOnce(&Line) -> Result<T, ParseError>,
    ) -> Result<Option<T>, ParseError> {
        let Some(line) = self.next_line()? else {
            return Ok(None);
        };

        if line.text.trim().is_empty() {
            return if self.rest_is_blank()? {
                Ok(None)
            } else {
                Err(ParseError::MissingRecord {
                    line: line.number,
                    section,
                })
            };
        }

        match parse(&line) {
            Ok(value) => Ok(Some(value)),
            Err(err) if !line.terminated && cut_short(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Errors an unterminated last line can show when iostat was cut off
/// mid-write. A full set of tokens with a bad value is still bad data.
fn cut_short(err: &ParseError) -> bool {
    matches!(
        err,
        ParseError::FieldCount { .. } | ParseError::Timestamp { .. }
    )
}

fn parse_timestamp(line: &Line) -> Result<NaiveDateTime, ParseError> {
    let text = line.text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).map_err(|source| {
        ParseError::Timestamp {
            line: line.number,
            text: text.to_string(),
            source,
        }
    })
}

fn parse_cpu(line: &Line) -> Result<[f64; CPU_FIELDS], ParseError> {
    let tokens: Vec<&str> = line.text.split_whitespace().collect();
    parse_values(&tokens, line.number, "cpu")
}

fn parse_device(line: &Line) -> Result<[f64; DEVICE_FIELDS], ParseError> {
    // First column is the device name.
    let tokens: Vec<&str> = line.text.split_whitespace().skip(1).collect();
    parse_values(&tokens, line.number, "device")
}

fn parse_values<const N: usize>(
    tokens: &[&str],
    line: usize,
    section: &'static str,
) -> Result<[f64; N], ParseError> {
    if tokens.len() != N {
        return Err(ParseError::FieldCount {
            line,
            section,
            expected: N,
            found: tokens.len(),
        });
    }
    let mut values = [0.0; N];
    for (slot, token) in values.iter_mut().zip(tokens) {
        *slot = token.parse().map_err(|source| ParseError::Number {
            line,
            section,
            token: token.to_string(),
            source,
        })?;
    }
    Ok(values)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fmt::Write as _;

    const HEADER: &str =
        "Linux 3.10.0-1160.el7.x86_64 (nodeA) \t10/15/2026 \t_x86_64_\t(4 CPU)\n";
    const CPU_HEADER: &str = "avg-cpu:  %user   %nice %system %iowait  %steal   %idle";
    const DEVICE_HEADER: &str = "Device:         rrqm/s   wrqm/s     r/s     w/s    rMB/s    wMB/s avgrq-sz avgqu-sz   await r_await w_await  svctm  %util";

    pub(crate) fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 15)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    pub(crate) fn block(timestamp: NaiveDateTime, seed: f64) -> SampleBlock {
        SampleBlock {
            timestamp,
            cpu: std::array::from_fn(|i| seed + i as f64 * 0.25),
            device: std::array::from_fn(|i| seed * 10.0 + i as f64 * 1.5),
        }
    }

    /// Renders samples the way iostat lays them out.
    pub(crate) fn render(blocks: &[SampleBlock]) -> String {
        let mut out = String::from(HEADER);
        for b in blocks {
            out.push('\n');
            writeln!(out, "{}", b.timestamp.format(TIMESTAMP_FORMAT)).unwrap();
            writeln!(out, "{CPU_HEADER}").unwrap();
            let cpu: Vec<String> = b.cpu.iter().map(|v| format!("{v:>7}")).collect();
            writeln!(out, "        {}", cpu.join(" ")).unwrap();
            out.push('\n');
            writeln!(out, "{DEVICE_HEADER}").unwrap();
            let dev: Vec<String> = b.device.iter().map(|v| format!("{v:>8}")).collect();
            writeln!(out, "vdb      {}", dev.join(" ")).unwrap();
        }
        out
    }

    fn parse(text: &str) -> Result<SeriesTable, ParseError> {
        parse_log(text.as_bytes())
    }

    fn sample_blocks() -> Vec<SampleBlock> {
        vec![
            block(at(14, 3, 4), 1.0),
            block(at(14, 3, 14), 2.5),
            block(at(14, 3, 24), 0.75),
        ]
    }

    const REAL_LOG: &str = "\
Linux 3.10.0-1160.el7.x86_64 (nodeA) \t10/15/2026 \t_x86_64_\t(4 CPU)

10/15/2026 02:03:04 PM
avg-cpu:  %user   %nice %system %iowait  %steal   %idle
           1.25    0.00    0.50    0.25    0.00   98.00

Device:         rrqm/s   wrqm/s     r/s     w/s    rMB/s    wMB/s avgrq-sz avgqu-sz   await r_await w_await  svctm  %util
vdb               0.00     0.10    0.20    3.40     0.01     0.45   272.00     0.02    5.10    1.00    5.30   0.80   0.29

10/15/2026 02:03:14 PM
avg-cpu:  %user   %nice %system %iowait  %steal   %idle
           3.00    0.00    1.10    7.40    0.10   88.40

Device:         rrqm/s   wrqm/s     r/s     w/s    rMB/s    wMB/s avgrq-sz avgqu-sz   await r_await w_await  svctm  %util
vdb               0.00    12.00    1.00  240.00     0.00    60.25   512.00     4.10   17.00    2.00   17.10   0.40  96.50

";

    #[test]
    fn parses_iostat_output() {
        let table = parse(REAL_LOG).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_count(), 20);
        for c in 0..table.column_count() {
            let len = match table.column(c).unwrap() {
                Column::Time(ts) => ts.len(),
                Column::Values(v) => v.len(),
            };
            assert_eq!(len, 2, "column {c}");
        }
        assert!(table.column(20).is_none());

        assert_eq!(table.timestamps(), &[at(14, 3, 4), at(14, 3, 14)]);
        assert_eq!(table.series(Metric::UserPct), &[1.25, 3.0]);
        assert_eq!(table.series(Metric::IdlePct), &[98.0, 88.4]);
        assert_eq!(table.series(Metric::ReadMergedPerSec), &[0.0, 0.0]);
        assert_eq!(table.series(Metric::WriteMBPerSec), &[0.45, 60.25]);
        assert_eq!(table.series(Metric::UtilPct), &[0.29, 96.5]);
        assert_eq!(table.column(12), Some(Column::Values(&[0.45, 60.25][..])));
    }

    #[test]
    fn empty_input_gives_empty_table() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse(HEADER).unwrap().is_empty());
        assert!(parse(&format!("{HEADER}\n")).unwrap().is_empty());
    }

    #[test]
    fn rendered_blocks_parse_back_exactly() {
        let blocks = sample_blocks();
        let table = parse(&render(&blocks)).unwrap();
        assert_eq!(table.rows().collect::<Vec<_>>(), blocks);
    }

    #[test]
    fn keeps_log_order() {
        let blocks = vec![
            block(at(14, 3, 24), 1.0),
            block(at(14, 3, 4), 2.0),
            block(at(14, 3, 14), 3.0),
        ];
        let table = parse(&render(&blocks)).unwrap();
        assert_eq!(
            table.timestamps(),
            &[at(14, 3, 24), at(14, 3, 4), at(14, 3, 14)]
        );
    }

    #[test]
    fn truncated_final_unit_is_dropped() {
        let complete = render(&sample_blocks());
        let next = render(&[block(at(14, 3, 34), 9.0)]);
        // Strip the header so `next` is just the extra unit.
        let next = &next[HEADER.len()..];
        let next_lines: Vec<&str> = next.split_inclusive('\n').collect();

        // Cut the extra unit after each of its lines.
        for keep in 0..next_lines.len() {
            let text = format!("{complete}{}", next_lines[..keep].concat());
            let table = parse(&text).unwrap();
            assert_eq!(table.len(), 3, "cut after {keep} lines");
        }
    }

    #[test]
    fn empty_device_line_at_end_is_truncation() {
        let complete = render(&sample_blocks());
        let text = format!(
            "{complete}\n10/15/2026 02:03:34 PM\n{CPU_HEADER}\n  1.00 0.00 0.00 0.00 0.00 99.00\n\n{DEVICE_HEADER}\n\n\n"
        );
        assert_eq!(parse(&text).unwrap().len(), 3);
    }

    #[test]
    fn line_cut_mid_write_is_truncation() {
        let complete = render(&sample_blocks());
        let text = format!(
            "{complete}\n10/15/2026 02:03:34 PM\n{CPU_HEADER}\n  1.00 0.00 0.00 0.00 0.00 99.00\n\n{DEVICE_HEADER}\nvdb   0.00   1.2"
        );
        assert_eq!(parse(&text).unwrap().len(), 3);

        let text = format!("{complete}\n10/15/2026 02:0");
        assert_eq!(parse(&text).unwrap().len(), 3);
    }

    #[test]
    fn complete_last_line_without_newline_is_kept() {
        let rendered = render(&sample_blocks());
        let text = rendered.trim_end_matches('\n');
        assert_eq!(parse(text).unwrap().len(), 3);
    }

    #[test]
    fn bad_value_on_unterminated_last_line_is_an_error() {
        let rendered = render(&sample_blocks());
        let text = rendered.trim_end_matches('\n');
        let (head, last) = text.rsplit_once(' ').unwrap();
        let text = format!("{head} x{last}");
        let err = parse(&text).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Number { section: "device", .. }
        ));
    }

    #[test]
    fn non_numeric_value_is_an_error() {
        let text = REAL_LOG.replace("   88.40", "   88,40");
        let err = parse(&text).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Number { line: 12, section: "cpu", ref token, .. } if token == "88,40"
        ));
    }

    #[test]
    fn wrong_device_column_count_is_an_error() {
        let text = REAL_LOG.replace("   0.80   0.29", "   0.29");
        let err = parse(&text).unwrap_err();
        assert!(matches!(
            err,
            ParseError::FieldCount {
                line: 8,
                section: "device",
                expected: 13,
                found: 12
            }
        ));
    }

    #[test]
    fn bad_timestamp_is_an_error() {
        let text = REAL_LOG.replace("10/15/2026 02:03:14 PM", "2026-10-15T14:03:14");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, ParseError::Timestamp { line: 10, .. }));
    }

    #[test]
    fn empty_record_followed_by_data_is_an_error() {
        let text = REAL_LOG.replacen("           1.25    0.00    0.50    0.25    0.00   98.00", "", 1);
        let err = parse(&text).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingRecord {
                line: 5,
                section: "cpu"
            }
        ));
    }

    #[test]
    fn summary_reports_mean_and_peak() {
        let table = parse(REAL_LOG).unwrap();
        let summary = table.summary(Metric::UtilPct).unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.first, at(14, 3, 4));
        assert_eq!(summary.last, at(14, 3, 14));
        assert_eq!(summary.peak, 96.5);
        assert!((summary.mean - 48.395).abs() < 1e-9);
        assert!(SeriesTable::new().summary(Metric::UtilPct).is_none());
    }

    #[test]
    fn read_log_reports_missing_file() {
        let err = read_log(Path::new("/nonexistent/nodeA-vdb-iostat-log.txt")).unwrap_err();
        assert!(matches!(err, ParseError::Open { .. }));
        assert_eq!(err.line(), None);
    }
}
