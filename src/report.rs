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

//! Per-host outcomes and the host loop every phase runs through.

use std::fmt;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::HostError;

/// What a phase did on one host.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Started,
    AlreadyRunning,
    Running,
    NotRunning,
    Stopped,
    Purged { local_files: usize },
    Collected,
    Plotted { samples: usize, plot: PathBuf },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Started => f.write_str("iostat started"),
            Action::AlreadyRunning => f.write_str("iostat already running"),
            Action::Running => f.write_str("iostat running"),
            Action::NotRunning => f.write_str("iostat not running"),
            Action::Stopped => f.write_str("iostat stopped"),
            Action::Purged { local_files } => {
                write!(f, "logs purged ({local_files} local files removed)")
            }
            Action::Collected => f.write_str("log collected"),
            Action::Plotted { samples, plot } => {
                write!(f, "{samples} samples plotted to {}", plot.display())
            }
        }
    }
}

#[derive(Debug)]
pub struct HostReport {
    pub host: String,
    pub result: Result<Action, HostError>,
}

/// Whether one host's failure stops the remaining hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    BestEffort,
    FailFast,
}

/// Outcomes of one phase, in host order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<HostReport>,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &HostReport> {
        self.reports.iter().filter(|r| r.result.is_err())
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn succeeded(&self) -> usize {
        self.reports.len() - self.failed()
    }

    pub fn actions(&self) -> Vec<(&str, &Action)> {
        self.reports
            .iter()
            .filter_map(|r| r.result.as_ref().ok().map(|a| (r.host.as_str(), a)))
            .collect()
    }

    /// One line per phase; the failures themselves were already logged
    /// as they happened.
    pub fn summary_line(&self, phase: &str) -> String {
        let mut line = format!(
            "{phase}: {} hosts ok, {} failed",
            self.succeeded(),
            self.failed()
        );
        if self.failed() > 0 {
            let hosts: Vec<&str> = self.failures().map(|r| r.host.as_str()).collect();
            line.push_str(&format!(" ({})", hosts.join(", ")));
        }
        line
    }

    pub fn log(&self, phase: &str) {
        info!("{}", self.summary_line(phase));
    }
}

/// Applies `step` to each host in order and collects the outcomes.
///
/// Fatal errors (bad invocations) abort immediately and are returned.
/// Other failures are recorded; under [`FailurePolicy::FailFast`] the
/// loop stops after recording the first one.
pub fn run_hosts<F>(
    hosts: &[String],
    policy: FailurePolicy,
    mut step: F,
) -> Result<RunSummary, HostError>
where
    F: FnMut(&str) -> Result<Action, HostError>,
{
    let mut summary = RunSummary::default();
    for host in hosts {
        let result = match step(host) {
            Err(err) if err.is_fatal() => return Err(err),
            result => result,
        };
        match &result {
            Ok(action) => info!("{host}: {action}"),
            Err(err) => warn!("{host}: {err}"),
        }
        let stop = result.is_err() && policy == FailurePolicy::FailFast;
        summary.reports.push(HostReport {
            host: host.clone(),
            result,
        });
        if stop {
            break;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|h| h.to_string()).collect()
    }

    fn down(host: &str) -> HostError {
        HostError::Remote(RemoteError::Unreachable {
            host: host.to_string(),
            stderr: "No route to host".into(),
        })
    }

    #[test]
    fn best_effort_visits_every_host() {
        let mut visited = Vec::new();
        let summary = run_hosts(&hosts(&["a", "b", "c"]), FailurePolicy::BestEffort, |h| {
            visited.push(h.to_string());
            if h == "b" { Err(down(h)) } else { Ok(Action::Stopped) }
        })
        .unwrap();
        assert_eq!(visited, vec!["a", "b", "c"]);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures().next().unwrap().host, "b");
    }

    #[test]
    fn fail_fast_stops_after_first_failure() {
        let summary = run_hosts(&hosts(&["a", "b", "c"]), FailurePolicy::FailFast, |h| {
            if h == "b" { Err(down(h)) } else { Ok(Action::Collected) }
        })
        .unwrap();
        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.failed(), 1);
    }

    #[test]
    fn summary_line_names_failed_hosts_once() {
        let summary = run_hosts(&hosts(&["a", "b", "c"]), FailurePolicy::BestEffort, |h| {
            if h == "a" { Ok(Action::Stopped) } else { Err(down(h)) }
        })
        .unwrap();
        let line = summary.summary_line("stop");
        assert_eq!(line, "stop: 1 hosts ok, 2 failed (b, c)");
        assert!(!line.contains("No route to host"));

        let clean = run_hosts(&hosts(&["a"]), FailurePolicy::BestEffort, |_| Ok(Action::Stopped))
            .unwrap();
        assert_eq!(clean.summary_line("stop"), "stop: 1 hosts ok, 0 failed");
    }

    #[test]
    fn fatal_error_aborts_run() {
        let mut visited = 0;
        let err = run_hosts(&hosts(&["a", "b"]), FailurePolicy::BestEffort, |h| {
            visited += 1;
            Err(HostError::Remote(RemoteError::InvalidInvocation {
                host: h.to_string(),
            }))
        })
        .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(visited, 1);
    }
}
