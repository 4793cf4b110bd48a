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
    # metric.rs

    Named columns of an `iostat -c -d -x -t -m` sample.

    Column 0 of a parsed table is always the timestamp. The 19 metrics
    follow in the order iostat prints them:

    | column | metric        | iostat header |
    |--------|---------------|---------------|
    | 1-6    | CPU           | %user %nice %system %iowait %steal %idle |
    | 7-19   | device        | rrqm/s wrqm/s r/s w/s rMB/s wMB/s avgrq-sz avgqu-sz await r_await w_await svctm %util |
*/

use clap::ValueEnum;

/// Number of values on an `avg-cpu` line.
pub const CPU_FIELDS: usize = 6;
/// Number of values on a device line, device name excluded.
pub const DEVICE_FIELDS: usize = 13;
/// Number of metric columns (timestamp excluded).
pub const METRIC_COUNT: usize = CPU_FIELDS + DEVICE_FIELDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Metric {
    #[value(name = "user")]
    UserPct,
    #[value(name = "nice")]
    NicePct,
    #[value(name = "system")]
    SystemPct,
    #[value(name = "iowait")]
    IowaitPct,
    #[value(name = "steal")]
    StealPct,
    #[value(name = "idle")]
    IdlePct,
    #[value(name = "rrqm")]
    ReadMergedPerSec,
    #[value(name = "wrqm")]
    WriteMergedPerSec,
    #[value(name = "r")]
    ReadsPerSec,
    #[value(name = "w")]
    WritesPerSec,
    #[value(name = "rmb")]
    ReadMBPerSec,
    #[value(name = "wmb")]
    WriteMBPerSec,
    #[value(name = "avgrq-sz")]
    AvgRequestSize,
    #[value(name = "avgqu-sz")]
    AvgQueueSize,
    #[value(name = "await")]
    AwaitMs,
    #[value(name = "r-await")]
    ReadAwaitMs,
    #[value(name = "w-await")]
    WriteAwaitMs,
    #[value(name = "svctm")]
    ServiceTimeMs,
    #[value(name = "util")]
    UtilPct,
}

impl Metric {
    /// Every metric in column order.
    pub const ALL: [Metric; METRIC_COUNT] = [
        Metric::UserPct,
        Metric::NicePct,
        Metric::SystemPct,
        Metric::IowaitPct,
        Metric::StealPct,
        Metric::IdlePct,
        Metric::ReadMergedPerSec,
        Metric::WriteMergedPerSec,
        Metric::ReadsPerSec,
        Metric::WritesPerSec,
        Metric::ReadMBPerSec,
        Metric::WriteMBPerSec,
        Metric::AvgRequestSize,
        Metric::AvgQueueSize,
        Metric::AwaitMs,
        Metric::ReadAwaitMs,
        Metric::WriteAwaitMs,
        Metric::ServiceTimeMs,
        Metric::UtilPct,
    ];

    /// Position among the 19 metrics (0-based).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Column in a full table, where column 0 holds timestamps.
    pub fn column(self) -> usize {
        self.index() + 1
    }

    /// Metric stored at a full-table column, `None` for the timestamp column.
    pub fn from_column(column: usize) -> Option<Metric> {
        column.checked_sub(1).and_then(|i| Metric::ALL.get(i).copied())
    }

    /// Header text iostat prints for this column.
    pub fn label(self) -> &'static str {
        match self {
            Metric::UserPct => "%user",
            Metric::NicePct => "%nice",
            Metric::SystemPct => "%system",
            Metric::IowaitPct => "%iowait",
            Metric::StealPct => "%steal",
            Metric::IdlePct => "%idle",
            Metric::ReadMergedPerSec => "rrqm/s",
            Metric::WriteMergedPerSec => "wrqm/s",
            Metric::ReadsPerSec => "r/s",
            Metric::WritesPerSec => "w/s",
            Metric::ReadMBPerSec => "rMB/s",
            Metric::WriteMBPerSec => "wMB/s",
            Metric::AvgRequestSize => "avgrq-sz",
            Metric::AvgQueueSize => "avgqu-sz",
            Metric::AwaitMs => "await",
            Metric::ReadAwaitMs => "r_await",
            Metric::WriteAwaitMs => "w_await",
            Metric::ServiceTimeMs => "svctm",
            Metric::UtilPct => "%util",
        }
    }

    /// Axis caption used on plots.
    pub fn description(self) -> &'static str {
        match self {
            Metric::UserPct => "CPU user (%)",
            Metric::NicePct => "CPU nice (%)",
            Metric::SystemPct => "CPU system (%)",
            Metric::IowaitPct => "CPU iowait (%)",
            Metric::StealPct => "CPU steal (%)",
            Metric::IdlePct => "CPU idle (%)",
            Metric::ReadMergedPerSec => "Read merges/sec",
            Metric::WriteMergedPerSec => "Write merges/sec",
            Metric::ReadsPerSec => "Reads/sec",
            Metric::WritesPerSec => "Writes/sec",
            Metric::ReadMBPerSec => "Read MB/sec",
            Metric::WriteMBPerSec => "Write MB/sec",
            Metric::AvgRequestSize => "Avg request size (sectors)",
            Metric::AvgQueueSize => "Avg queue length",
            Metric::AwaitMs => "Await (ms)",
            Metric::ReadAwaitMs => "Read await (ms)",
            Metric::WriteAwaitMs => "Write await (ms)",
            Metric::ServiceTimeMs => "Service time (ms)",
            Metric::UtilPct => "Device utilization (%)",
        }
    }
}

impl Default for Metric {
    /// Column 12 of the table: write throughput.
    fn default() -> Self {
        Metric::WriteMBPerSec
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
