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
    # sampler.rs

    Starts, stops and checks the remote iostat sampler.

    Only iostat processes owned by the remote login user are considered,
    so other users' iostat runs on shared nodes are left alone.
*/

use tracing::info;

use crate::error::{HostError, RemoteError};
use crate::hosts::log_file_name;
use crate::remote::{CommandOutput, RemoteShell};
use crate::report::{Action, FailurePolicy, RunSummary, run_hosts};

/// Name of the sampling tool as seen by pgrep/pkill.
pub const SAMPLER: &str = "iostat";

fn words(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// `iostat -c -d -x -t -m <device> <interval> ><log>`.
pub fn start_command(host: &str, device: &str, interval_secs: u64) -> Vec<String> {
    let mut cmd = words(&[SAMPLER, "-c", "-d", "-x", "-t", "-m"]);
    cmd.push(device.to_string());
    cmd.push(interval_secs.to_string());
    cmd.push(format!(">{}", log_file_name(host, device)));
    cmd
}

pub struct Sampler<'a, S: RemoteShell> {
    shell: &'a S,
}

impl<'a, S: RemoteShell> Sampler<'a, S> {
    pub fn new(shell: &'a S) -> Self {
        Self { shell }
    }

    fn query(&self, host: &str, command: &[String]) -> Result<CommandOutput, RemoteError> {
        let output = self
            .shell
            .run(host, command, true)?
            .unwrap_or_default();
        if output.connection_failed() {
            return Err(RemoteError::Unreachable {
                host: host.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// True when an iostat owned by the login user is running on `host`.
    pub fn is_running(&self, host: &str) -> Result<bool, RemoteError> {
        let output = self.query(host, &words(&["pgrep", "-U", "$USER", SAMPLER]))?;
        Ok(!output.stdout.trim().is_empty())
    }

    /// Signals every iostat owned by the login user. pkill's "no process
    /// matched" status is fine; only an unreachable host is an error.
    pub fn stop_all(&self, host: &str) -> Result<(), RemoteError> {
        self.query(host, &words(&["pkill", "-U", "$USER", SAMPLER]))?;
        Ok(())
    }

    /// Starts iostat detached, writing to the host's log file. Does not
    /// check for a running sampler; see [`Sampler::ensure_running`].
    pub fn start(&self, host: &str, device: &str, interval_secs: u64) -> Result<(), RemoteError> {
        self.shell
            .run(host, &start_command(host, device, interval_secs), false)?;
        Ok(())
    }

    fn ensure_running_on(
        &self,
        host: &str,
        device: &str,
        interval_secs: u64,
    ) -> Result<Action, HostError> {
        info!("{host}: checking for a running iostat ...");
        if self.is_running(host)? {
            return Ok(Action::AlreadyRunning);
        }
        info!("{host}: iostat not running, starting ...");
        self.start(host, device, interval_secs)?;
        Ok(Action::Started)
    }

    /// Starts iostat on every host that is not already running one.
    pub fn ensure_running(
        &self,
        hosts: &[String],
        device: &str,
        interval_secs: u64,
        policy: FailurePolicy,
    ) -> Result<RunSummary, HostError> {
        run_hosts(hosts, policy, |host| {
            self.ensure_running_on(host, device, interval_secs)
        })
    }

    /// Stops iostat on every host.
    pub fn ensure_stopped(
        &self,
        hosts: &[String],
        policy: FailurePolicy,
    ) -> Result<RunSummary, HostError> {
        run_hosts(hosts, policy, |host| {
            info!("{host}: killing any running iostats ...");
            self.stop_all(host)?;
            Ok(Action::Stopped)
        })
    }

    /// Reports whether each host has a sampler running.
    pub fn status(&self, hosts: &[String], policy: FailurePolicy) -> Result<RunSummary, HostError> {
        run_hosts(hosts, policy, |host| {
            Ok(if self.is_running(host)? {
                Action::Running
            } else {
                Action::NotRunning
            })
        })
    }
}
