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

//! Host lists and the per-host artifact names derived from them.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::HostListError;

const LOG_SUFFIX: &str = "iostat-log";

/// Reads hostnames from each file in order, one per line.
///
/// Blank lines are skipped and duplicates are kept, though they are
/// warned about since duplicate hosts share a log file name.
pub fn load_hosts<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<String>, HostListError> {
    let mut hosts = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let read_err = |source| HostListError::Read {
            path: path.to_path_buf(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(read_err)?);
        for line in reader.lines() {
            let line = line.map_err(read_err)?;
            let host = line.trim();
            if !host.is_empty() {
                hosts.push(host.to_string());
            }
        }
    }

    if hosts.is_empty() {
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.as_ref().display().to_string())
            .collect();
        return Err(HostListError::Empty(names.join(", ")));
    }

    let mut seen = HashSet::new();
    for host in &hosts {
        if !seen.insert(host.as_str()) {
            warn!(host = %host, "host listed more than once; its log file will be shared");
        }
    }
    Ok(hosts)
}

/// Last path component of a device, `/dev/vdb` -> `vdb`.
pub fn device_basename(device: &str) -> Option<&str> {
    Path::new(device)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
}

/// `{host}-{device basename}-iostat-log.txt`, as written on the host.
pub fn log_file_name(host: &str, device: &str) -> String {
    let dev = device_basename(device).unwrap_or(device);
    format!("{host}-{dev}-{LOG_SUFFIX}.txt")
}

/// Local artifact paths for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub log: PathBuf,
    stem: PathBuf,
}

impl Artifacts {
    pub fn new(dir: &Path, host: &str, device: &str) -> Self {
        let log = dir.join(log_file_name(host, device));
        let stem = log.with_extension("");
        Self { log, stem }
    }

    /// Log path without extension; the plot and CSV share it.
    pub fn stem(&self) -> &Path {
        &self.stem
    }

    pub fn plot(&self, extension: &str) -> PathBuf {
        self.log.with_extension(extension)
    }

    pub fn csv(&self) -> PathBuf {
        self.log.with_extension("csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn host_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn log_names_are_deterministic() {
        assert_eq!(log_file_name("nodeA", "/dev/vdb"), "nodeA-vdb-iostat-log.txt");
        assert_eq!(log_file_name("nodeB", "sdc"), "nodeB-sdc-iostat-log.txt");
        assert_eq!(
            log_file_name("node-7.example.com", "/dev/mapper/data"),
            "node-7.example.com-data-iostat-log.txt"
        );
    }

    #[test]
    fn plot_name_swaps_extension() {
        let artifacts = Artifacts::new(Path::new("."), "nodeA", "/dev/vdb");
        assert_eq!(artifacts.log, Path::new("./nodeA-vdb-iostat-log.txt"));
        assert_eq!(artifacts.plot("svg"), Path::new("./nodeA-vdb-iostat-log.svg"));
        assert_eq!(artifacts.plot("png"), Path::new("./nodeA-vdb-iostat-log.png"));
        assert_eq!(artifacts.csv(), Path::new("./nodeA-vdb-iostat-log.csv"));
        assert_eq!(artifacts.stem(), Path::new("./nodeA-vdb-iostat-log"));
    }

    #[test]
    fn device_basename_strips_directories() {
        assert_eq!(device_basename("/dev/vdb"), Some("vdb"));
        assert_eq!(device_basename("/dev/"), Some("dev"));
        assert_eq!(device_basename("/"), None);
        assert_eq!(device_basename(""), None);
    }

    #[test]
    fn loads_hosts_in_order_skipping_blanks() {
        let file = host_file("nodeA\nnodeB\n");
        assert_eq!(load_hosts(&[file.path()]).unwrap(), vec!["nodeA", "nodeB"]);

        let file = host_file("  nodeA \n\n\nnodeB\r\n\n");
        assert_eq!(load_hosts(&[file.path()]).unwrap(), vec!["nodeA", "nodeB"]);
    }

    #[test]
    fn concatenates_files_and_keeps_duplicates() {
        let first = host_file("nodeA\nnodeB\n");
        let second = host_file("nodeC\nnodeA\n");
        let hosts = load_hosts(&[first.path(), second.path()]).unwrap();
        assert_eq!(hosts, vec!["nodeA", "nodeB", "nodeC", "nodeA"]);
    }

    #[test]
    fn empty_or_missing_lists_are_errors() {
        let file = host_file("\n\n");
        assert!(matches!(
            load_hosts(&[file.path()]),
            Err(HostListError::Empty(_))
        ));
        assert!(matches!(
            load_hosts(&[Path::new("/nonexistent/hosts.txt")]),
            Err(HostListError::Read { .. })
        ));
    }
}
