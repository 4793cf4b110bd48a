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
    # remote.rs

    Remote command execution over the system `ssh`/`scp` binaries.

    Using the plain binaries keeps the user's `~/.ssh/config`, agent and
    known_hosts behaviour. Commands run either synchronously, with output
    captured, or detached under `nohup` so they outlive the session.
*/

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{RemoteError, SSH_CONNECTION_FAILURE};

/// Default ssh/scp connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Captured result of a synchronous remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// -1 when the process was killed by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// ssh could not reach the host at all.
    pub fn connection_failed(&self) -> bool {
        self.exit_code == SSH_CONNECTION_FAILURE
    }

    fn from_output(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }
}

/// Runs commands on, and copies files from, named hosts.
pub trait RemoteShell {
    /// Runs `command` on `host`.
    ///
    /// With `wait` the call blocks and returns the captured output. Without
    /// it the command is started detached and `None` is returned at once.
    /// A non-zero remote exit is not an error; callers inspect the output.
    fn run(
        &self,
        host: &str,
        command: &[String],
        wait: bool,
    ) -> Result<Option<CommandOutput>, RemoteError>;

    /// Copies `remote_path` (relative to the remote home) into `local_dir`,
    /// replacing any existing file of the same name.
    fn copy_from(
        &self,
        host: &str,
        remote_path: &str,
        local_dir: &Path,
    ) -> Result<CommandOutput, RemoteError>;
}

/// Rejects invocations that could never be a valid remote command.
pub fn check_invocation(host: &str, command: &[String]) -> Result<(), RemoteError> {
    let host = host.trim();
    if host.is_empty() || host.starts_with('-') || command.iter().all(|t| t.trim().is_empty()) {
        return Err(RemoteError::InvalidInvocation {
            host: host.to_string(),
        });
    }
    Ok(())
}

/// `nohup <command> 2>/dev/null </dev/null &`, the remote shell line for a
/// detached command. stdin and stderr are detached so sshd can close the
/// channel; stdout is left to the command's own redirection.
pub fn detached_command_line(command: &[String]) -> String {
    format!("nohup {} 2>/dev/null </dev/null &", command.join(" "))
}

/// [`RemoteShell`] backed by the `ssh` and `scp` binaries.
#[derive(Debug, Clone)]
pub struct SshShell {
    connect_timeout: Duration,
}

impl Default for SshShell {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
    }
}

impl SshShell {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn add_options(&self, cmd: &mut Command) {
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()));
    }

    fn ssh(&self, host: &str) -> Command {
        let mut cmd = Command::new("ssh");
        self.add_options(&mut cmd);
        cmd.arg("--").arg(host);
        cmd
    }
}

impl RemoteShell for SshShell {
    fn run(
        &self,
        host: &str,
        command: &[String],
        wait: bool,
    ) -> Result<Option<CommandOutput>, RemoteError> {
        check_invocation(host, command)?;
        let spawn_err = |source| RemoteError::Spawn {
            program: "ssh",
            host: host.to_string(),
            source,
        };

        if !wait {
            let line = detached_command_line(command);
            debug!(host = %host, command = %line, "ssh (detached)");
            let mut child = self
                .ssh(host)
                .arg(line)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(spawn_err)?;
            // Reap the ssh client once the remote shell has backgrounded the
            // command, without holding up the caller.
            std::thread::spawn(move || {
                let _ = child.wait();
            });
            return Ok(None);
        }

        debug!(host = %host, command = %command.join(" "), "ssh");
        let start = Instant::now();
        let output = self
            .ssh(host)
            .args(command)
            .stdin(Stdio::null())
            .output()
            .map_err(spawn_err)?;
        let output = CommandOutput::from_output(output);
        debug!(
            host = %host,
            exit_code = output.exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "ssh finished"
        );
        Ok(Some(output))
    }

    fn copy_from(
        &self,
        host: &str,
        remote_path: &str,
        local_dir: &Path,
    ) -> Result<CommandOutput, RemoteError> {
        check_invocation(host, &[remote_path.to_string()])?;
        let source = format!("{host}:{remote_path}");
        debug!(host = %host, source = %source, dest = %local_dir.display(), "scp");

        let mut cmd = Command::new("scp");
        self.add_options(&mut cmd);
        let output = cmd
            .arg("--")
            .arg(&source)
            .arg(local_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RemoteError::Spawn {
                program: "scp",
                host: host.to_string(),
                source,
            })?;
        Ok(CommandOutput::from_output(output))
    }
}
