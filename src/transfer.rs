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
    # transfer.rs

    Moves iostat logs between the hosts and the local output directory.

    - `collect` copies each host's log down, replacing the local copy
    - `purge` removes local logs, plots and CSVs first, then the remote logs
*/

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{HostError, RemoteError};
use crate::hosts::{Artifacts, log_file_name};
use crate::plot::PlotFormat;
use crate::remote::RemoteShell;
use crate::report::{Action, FailurePolicy, HostReport, RunSummary, run_hosts};

pub struct Transfer<'a, S: RemoteShell> {
    shell: &'a S,
    device: &'a str,
    local_dir: &'a Path,
}

impl<'a, S: RemoteShell> Transfer<'a, S> {
    pub fn new(shell: &'a S, device: &'a str, local_dir: &'a Path) -> Self {
        Self {
            shell,
            device,
            local_dir,
        }
    }

    pub fn artifacts(&self, host: &str) -> Artifacts {
        Artifacts::new(self.local_dir, host, self.device)
    }

    /// Copies one host's log into the local directory and returns its path.
    pub fn fetch(&self, host: &str) -> Result<PathBuf, RemoteError> {
        let remote = log_file_name(host, self.device);
        info!("{host}: copying log {remote} ...");
        let output = self.shell.copy_from(host, &remote, self.local_dir)?;
        if output.connection_failed() {
            return Err(RemoteError::Unreachable {
                host: host.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        if !output.success() {
            return Err(RemoteError::CopyFailed {
                host: host.to_string(),
                remote,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(self.artifacts(host).log)
    }

    /// Copies every host's log, one host at a time.
    pub fn collect(&self, hosts: &[String], policy: FailurePolicy) -> Result<RunSummary, HostError> {
        run_hosts(hosts, policy, |host| {
            self.fetch(host)?;
            Ok(Action::Collected)
        })
    }

    /// Removes one host's local artifacts, returning how many existed.
    fn remove_local(&self, host: &str) -> Result<usize, HostError> {
        let artifacts = self.artifacts(host);
        let mut paths = vec![artifacts.log.clone(), artifacts.csv()];
        paths.extend(PlotFormat::ALL.iter().map(|f| artifacts.plot(f.extension())));

        let mut removed = 0;
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!("removing file \"{}\" ...", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "nothing to remove");
                }
                Err(source) => return Err(HostError::Remove { path, source }),
            }
        }
        Ok(removed)
    }

    fn remove_remote(&self, host: &str) -> Result<(), RemoteError> {
        info!("{host}: removing log file ...");
        let command = vec![
            "rm".to_string(),
            "-f".to_string(),
            log_file_name(host, self.device),
        ];
        let output = self.shell.run(host, &command, true)?.unwrap_or_default();
        if output.connection_failed() {
            return Err(RemoteError::Unreachable {
                host: host.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    /// Deletes local logs, plots and CSVs for every host, then the logs on
    /// the hosts. Files that do not exist are skipped.
    pub fn purge(&self, hosts: &[String], policy: FailurePolicy) -> Result<RunSummary, HostError> {
        let mut local = Vec::with_capacity(hosts.len());
        for host in hosts {
            match self.remove_local(host) {
                Err(err) if policy == FailurePolicy::FailFast => {
                    warn!("{host}: {err}");
                    return Ok(RunSummary {
                        reports: vec![HostReport {
                            host: host.clone(),
                            result: Err(err),
                        }],
                    });
                }
                result => local.push(result),
            }
        }

        // A local failure is reported, but the remote log is still removed.
        let mut local = local.into_iter();
        run_hosts(hosts, policy, |host| {
            let local_files = local.next().unwrap_or(Ok(0));
            self.remove_remote(host)?;
            Ok(Action::Purged {
                local_files: local_files?,
            })
        })
    }
}
