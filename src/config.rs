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

//! Run settings shared by every phase.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SettingsError;
use crate::hosts::device_basename;
use crate::metric::Metric;
use crate::plot::PlotFormat;
use crate::remote::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::report::FailurePolicy;

pub const DEFAULT_DEVICE: &str = "/dev/vdb";
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Block device iostat samples, e.g. `/dev/vdb`.
    pub device: String,
    pub interval_secs: u64,
    /// Where logs are copied to and plots/CSVs written.
    pub output_dir: PathBuf,
    pub metric: Metric,
    pub format: PlotFormat,
    pub csv: bool,
    pub policy: FailurePolicy,
    pub connect_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            output_dir: PathBuf::from("."),
            metric: Metric::default(),
            format: PlotFormat::default(),
            csv: false,
            policy: FailurePolicy::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Checks values that would otherwise only fail on the hosts, and
    /// creates the output directory.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.interval_secs == 0 {
            return Err(SettingsError::ZeroInterval);
        }
        if device_basename(&self.device).is_none() {
            return Err(SettingsError::BadDevice(self.device.clone()));
        }
        std::fs::create_dir_all(&self.output_dir).map_err(|source| SettingsError::OutputDir {
            path: self.output_dir.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_setup() {
        let settings = Settings::default();
        assert_eq!(settings.device, "/dev/vdb");
        assert_eq!(settings.interval_secs, 10);
        assert_eq!(settings.metric, Metric::WriteMBPerSec);
        assert_eq!(settings.policy, FailurePolicy::BestEffort);
    }

    #[test]
    fn rejects_bad_values() {
        let settings = Settings {
            interval_secs: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(SettingsError::ZeroInterval)));

        let settings = Settings {
            device: "/".into(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(SettingsError::BadDevice(_))));
    }

    #[test]
    fn creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("plots/today");
        let settings = Settings {
            output_dir: out.clone(),
            ..Settings::default()
        };
        settings.validate().unwrap();
        assert!(out.is_dir());
    }
}
