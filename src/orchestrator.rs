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
    # orchestrator.rs

    Runs one phase of a capture across the host list, one host at a time.

    - Start: make sure iostat is sampling on every host
    - Stop / StopAndPurge: kill the samplers, optionally deleting all logs
    - CollectAndPlot: copy every log down, then chart the ones that arrived
    - Plot: chart logs that were already collected
    - Status: report which hosts are sampling
*/

use std::fmt;

use tracing::{debug, info};

use crate::config::Settings;
use crate::error::HostError;
use crate::export::write_csv;
use crate::hosts::Artifacts;
use crate::iostat::read_log;
use crate::plot::plot;
use crate::remote::RemoteShell;
use crate::report::{Action, FailurePolicy, RunSummary, run_hosts};
use crate::sampler::Sampler;
use crate::transfer::Transfer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Stop,
    StopAndPurge,
    CollectAndPlot,
    Plot,
    Status,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Start => "start",
            Phase::Stop => "stop",
            Phase::StopAndPurge => "stop and purge",
            Phase::CollectAndPlot => "collect and plot",
            Phase::Plot => "plot",
            Phase::Status => "status",
        })
    }
}

/// Outcome of one step of a phase. Only StopAndPurge has two steps.
#[derive(Debug)]
pub struct StepSummary {
    pub step: &'static str,
    pub summary: RunSummary,
}

impl StepSummary {
    fn new(step: &'static str, summary: RunSummary) -> Self {
        summary.log(step);
        Self { step, summary }
    }
}

pub struct Orchestrator<'a, S: RemoteShell> {
    shell: &'a S,
    settings: &'a Settings,
}

impl<'a, S: RemoteShell> Orchestrator<'a, S> {
    pub fn new(shell: &'a S, settings: &'a Settings) -> Self {
        Self { shell, settings }
    }

    fn transfer(&self) -> Transfer<'a, S> {
        Transfer::new(self.shell, &self.settings.device, &self.settings.output_dir)
    }

    /// Runs `phase` over `hosts`. Per-host failures are recorded in the
    /// returned summaries; only fatal errors come back as `Err`.
    pub fn run(&self, phase: Phase, hosts: &[String]) -> Result<Vec<StepSummary>, HostError> {
        info!("{phase}: {} hosts", hosts.len());
        let policy = self.settings.policy;
        let sampler = Sampler::new(self.shell);

        let steps = match phase {
            Phase::Start => {
                let summary = sampler.ensure_running(
                    hosts,
                    &self.settings.device,
                    self.settings.interval_secs,
                    policy,
                )?;
                vec![StepSummary::new("start", summary)]
            }
            Phase::Stop => vec![StepSummary::new("stop", sampler.ensure_stopped(hosts, policy)?)],
            Phase::StopAndPurge => {
                let stopped = StepSummary::new("stop", sampler.ensure_stopped(hosts, policy)?);
                if policy == FailurePolicy::FailFast && stopped.summary.failed() > 0 {
                    info!("purge skipped after stop failure");
                    vec![stopped]
                } else {
                    let purged = StepSummary::new("purge", self.transfer().purge(hosts, policy)?);
                    vec![stopped, purged]
                }
            }
            Phase::CollectAndPlot => {
                let collected =
                    StepSummary::new("collect", self.transfer().collect(hosts, policy)?);
                if policy == FailurePolicy::FailFast && collected.summary.failed() > 0 {
                    info!("plot skipped after collect failure");
                    vec![collected]
                } else {
                    // A host whose copy failed may still have a stale local log.
                    let fetched: Vec<String> = collected
                        .summary
                        .actions()
                        .into_iter()
                        .map(|(host, _)| host.to_string())
                        .collect();
                    let plotted = StepSummary::new("plot", self.plot_hosts(&fetched)?);
                    vec![collected, plotted]
                }
            }
            Phase::Plot => vec![StepSummary::new("plot", self.plot_hosts(hosts)?)],
            Phase::Status => vec![StepSummary::new("status", sampler.status(hosts, policy)?)],
        };
        Ok(steps)
    }

    fn plot_hosts(&self, hosts: &[String]) -> Result<RunSummary, HostError> {
        let transfer = self.transfer();
        run_hosts(hosts, self.settings.policy, |host| {
            self.plot_host(host, &transfer.artifacts(host))
        })
    }

    /// Parses the local copy of one host's log, logs its summary, charts
    /// the selected metric and optionally writes the CSV.
    fn plot_host(&self, host: &str, artifacts: &Artifacts) -> Result<Action, HostError> {
        let log = &artifacts.log;
        info!("{host}: parsing log \"{}\" ...", log.display());
        let table = read_log(log).map_err(|source| {
            if let Some(line) = source.line() {
                debug!(host, line, "log rejected");
            }
            HostError::Parse {
                path: log.clone(),
                source,
            }
        })?;
        debug!(
            host,
            rows = table.len(),
            columns = table.column_count(),
            "parsed log"
        );

        let metric = self.settings.metric;
        if let Some(s) = table.summary(metric) {
            info!(
                "{host}: {} samples {} .. {}, {} mean {:.2} peak {:.2}",
                s.samples,
                s.first.format("%Y-%m-%d %H:%M:%S"),
                s.last.format("%Y-%m-%d %H:%M:%S"),
                metric,
                s.mean,
                s.peak
            );
        }

        info!("{host}: plotting {metric} ...");
        let plot = plot(&table, artifacts.stem(), metric, self.settings.format)?;

        if self.settings.csv {
            let csv = artifacts.csv();
            info!("{host}: writing \"{}\" ...", csv.display());
            write_csv(&table, &csv)?;
        }
        Ok(Action::Plotted {
            samples: table.len(),
            plot,
        })
    }
}
