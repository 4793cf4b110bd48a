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

//! Error types for each stage of a cluster_iostat run.
//!
//! Remote and parse failures are scoped to a single host and end up in the
//! run summary. Host list and settings errors are fatal and stop the run
//! before anything is sent to a host.

use std::path::PathBuf;

use thiserror::Error;

/// ssh/scp exit status for connection-level failures.
pub const SSH_CONNECTION_FAILURE: i32 = 255;

/// Errors raised while talking to a remote host.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// A command was requested without a usable host or without any command
    /// token.
    #[error("need a hostname not starting with '-' and at least one command to run (host: {host:?})")]
    InvalidInvocation { host: String },

    /// The local ssh/scp binary could not be started.
    #[error("failed to launch {program} for {host}: {source}")]
    Spawn {
        program: &'static str,
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// ssh reported that the connection itself failed.
    #[error("{host} is unreachable: {stderr}")]
    Unreachable { host: String, stderr: String },

    /// scp ran but the copy did not succeed.
    #[error("copy of {remote} from {host} failed (exit {exit_code}): {stderr}")]
    CopyFailed {
        host: String,
        remote: String,
        exit_code: i32,
        stderr: String,
    },
}

/// Errors raised while parsing an iostat log.
///
/// Truncated trailing records are not an error; see `iostat::parse_log`.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: read failed: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: bad timestamp {text:?}: {source}")]
    Timestamp {
        line: usize,
        text: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("line {line}: expected {expected} values in {section} record, found {found}")]
    FieldCount {
        line: usize,
        section: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: non-numeric {section} value {token:?}")]
    Number {
        line: usize,
        section: &'static str,
        token: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("line {line}: empty {section} line followed by more data")]
    MissingRecord { line: usize, section: &'static str },
}

impl ParseError {
    /// Line number the error refers to, if it points at one.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Open { .. } => None,
            ParseError::Read { line, .. }
            | ParseError::Timestamp { line, .. }
            | ParseError::FieldCount { line, .. }
            | ParseError::Number { line, .. }
            | ParseError::MissingRecord { line, .. } => Some(*line),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("no samples to plot")]
    NoData,

    #[error("drawing {path} failed: {reason}")]
    Draw { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Host list loading errors. Always fatal.
#[derive(Debug, Error)]
pub enum HostListError {
    #[error("failed to read host list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no hostnames found in {0}")]
    Empty(String),
}

/// Invalid command line or environment settings. Always fatal.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("sampling interval must be at least 1 second")]
    ZeroInterval,

    #[error("device path {0:?} has no basename")]
    BadDevice(String),

    #[error("output directory {path} is not usable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single host did not complete its phase.
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Plot(#[from] PlotError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HostError {
    /// Configuration errors abort the whole run instead of being recorded
    /// against one host.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HostError::Remote(RemoteError::InvalidInvocation { .. }))
    }
}
