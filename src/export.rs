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

//! CSV export of a parsed table, one row per sample, for spreadsheets.

use std::fs::File;
use std::path::Path;

use crate::error::ExportError;
use crate::iostat::{SampleBlock, SeriesTable};
use crate::metric::Metric;

const CSV_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(serde::Serialize)]
struct CsvRow {
    timestamp: String,
    user: f64,
    nice: f64,
    system: f64,
    iowait: f64,
    steal: f64,
    idle: f64,
    rrqm_s: f64,
    wrqm_s: f64,
    r_s: f64,
    w_s: f64,
    rmb_s: f64,
    wmb_s: f64,
    avgrq_sz: f64,
    avgqu_sz: f64,
    r#await: f64,
    r_await: f64,
    w_await: f64,
    svctm: f64,
    util: f64,
}

impl From<&SampleBlock> for CsvRow {
    fn from(b: &SampleBlock) -> Self {
        Self {
            timestamp: b.timestamp.format(CSV_TIME_FORMAT).to_string(),
            user: b.value(Metric::UserPct),
            nice: b.value(Metric::NicePct),
            system: b.value(Metric::SystemPct),
            iowait: b.value(Metric::IowaitPct),
            steal: b.value(Metric::StealPct),
            idle: b.value(Metric::IdlePct),
            rrqm_s: b.value(Metric::ReadMergedPerSec),
            wrqm_s: b.value(Metric::WriteMergedPerSec),
            r_s: b.value(Metric::ReadsPerSec),
            w_s: b.value(Metric::WritesPerSec),
            rmb_s: b.value(Metric::ReadMBPerSec),
            wmb_s: b.value(Metric::WriteMBPerSec),
            avgrq_sz: b.value(Metric::AvgRequestSize),
            avgqu_sz: b.value(Metric::AvgQueueSize),
            r#await: b.value(Metric::AwaitMs),
            r_await: b.value(Metric::ReadAwaitMs),
            w_await: b.value(Metric::WriteAwaitMs),
            svctm: b.value(Metric::ServiceTimeMs),
            util: b.value(Metric::UtilPct),
        }
    }
}

/// Writes `table` to `path`, headed by the iostat column names.
pub fn write_csv(table: &SeriesTable, path: &Path) -> Result<(), ExportError> {
    let csv_err = |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    let mut header = vec!["timestamp"];
    header.extend(Metric::ALL.iter().map(|m| m.label()));
    wtr.write_record(&header).map_err(csv_err)?;

    for row in table.rows() {
        wtr.serialize(CsvRow::from(&row)).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iostat::tests::{at, block};

    #[test]
    fn writes_header_and_rows() {
        let mut table = SeriesTable::new();
        table.push(block(at(14, 3, 4), 1.0));
        table.push(block(at(14, 3, 14), 2.0));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodeA-vdb-iostat-log.csv");
        write_csv(&table, &path).unwrap();

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.len(), 20);
        assert_eq!(&headers[0], "timestamp");
        assert_eq!(&headers[12], "wMB/s");
        assert_eq!(&headers[19], "%util");

        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "2026-10-15 14:03:04");
        assert_eq!(&rows[1][0], "2026-10-15 14:03:14");
        let wmb: f64 = rows[1][12].parse().unwrap();
        assert_eq!(wmb, table.series(Metric::WriteMBPerSec)[1]);
    }

    #[test]
    fn empty_table_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_csv(&SeriesTable::new(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("timestamp,%user,"));
    }
}
