// cluster_iostat - Cluster iostat capture, collection & plotting (Main Entry)
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
    # main.rs

    Main entry for cluster_iostat:
    - Parses the command line and host list files
    - Supports phases:
      - `start`: start iostat on every host not already sampling
      - `stop [--purge]`: kill iostat, optionally deleting all logs
      - `purge`: same as `stop --purge`
      - `collect`: copy logs down, parse and plot them
      - `plot`: plot logs already collected
      - `status`: show which hosts are sampling
*/

// Increment as tool evolves
const VERSION_NUMBER: &str = "1.0.0";

mod config;
mod error;
mod export;
mod hosts;
mod iostat;
mod logging;
mod metric;
mod orchestrator;
mod plot;
mod remote;
mod report;
mod sampler;
mod transfer;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use crate::config::{DEFAULT_DEVICE, DEFAULT_INTERVAL_SECS, Settings};
use crate::hosts::load_hosts;
use crate::logging::{LogConfig, init_logging};
use crate::metric::Metric;
use crate::orchestrator::{Orchestrator, Phase};
use crate::plot::PlotFormat;
use crate::remote::{DEFAULT_CONNECT_TIMEOUT_SECS, SshShell};
use crate::report::FailurePolicy;

/// Exit status when the run completed but some hosts failed.
const EXIT_HOST_FAILURES: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "cluster_iostat", version = VERSION_NUMBER)]
#[command(
    about = "Capture iostat on a set of hosts, then collect and plot the logs",
    after_help = r#"EXAMPLES:
    # Start sampling /dev/vdb every 10 seconds on every host in hosts.txt
    cluster_iostat start hosts.txt

    # Later, copy the logs down and plot write MB/s
    cluster_iostat collect hosts.txt

    # Plot %util as PNG and also write CSVs
    cluster_iostat collect --metric util --format png --csv hosts.txt

    # Stop sampling and delete every log, local and remote
    cluster_iostat stop --purge hosts.txt

ENVIRONMENT VARIABLES:
    CLUSTER_IOSTAT_DEVICE       Block device to sample (default: /dev/vdb)
    CLUSTER_IOSTAT_INTERVAL     Sampling interval in seconds (default: 10)
    CLUSTER_IOSTAT_SSH_TIMEOUT  ssh/scp connect timeout in seconds (default: 10)
    CLUSTER_IOSTAT_OUTPUT_DIR   Local directory for logs, plots and CSVs (default: .)
    CLUSTER_IOSTAT_LOG_LEVEL    Logging level: trace, debug, info, warn, error, off
    CLUSTER_IOSTAT_LOG_FORMAT   Log format: plain, compact, pretty
    RUST_LOG                    Overrides CLUSTER_IOSTAT_LOG_LEVEL

EXIT STATUS:
    0 every host succeeded, 2 one or more hosts failed, 1 the run could not proceed"#
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start iostat on every host that is not already running it
    Start {
        #[command(flatten)]
        common: CommonArgs,

        /// Seconds between samples
        #[arg(long, short = 'i', default_value_t = DEFAULT_INTERVAL_SECS, env = "CLUSTER_IOSTAT_INTERVAL")]
        interval: u64,
    },

    /// Kill iostat on every host
    Stop {
        #[command(flatten)]
        common: CommonArgs,

        /// Also delete local logs, plots and CSVs, then the remote logs
        #[arg(long)]
        purge: bool,
    },

    /// Stop iostat and delete all logs (same as `stop --purge`)
    Purge {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Copy every host's log down, then parse and plot it
    Collect {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        plot: PlotArgs,
    },

    /// Plot logs already in the output directory
    Plot {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        plot: PlotArgs,
    },

    /// Show which hosts are running iostat
    Status {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Files listing one hostname per line
    #[arg(required = true, value_name = "HOST_FILE")]
    host_files: Vec<PathBuf>,

    /// Block device to sample
    #[arg(long, short = 'd', default_value = DEFAULT_DEVICE, env = "CLUSTER_IOSTAT_DEVICE")]
    device: String,

    /// Local directory for logs, plots and CSVs
    #[arg(long, short = 'o', default_value = ".", env = "CLUSTER_IOSTAT_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// ssh/scp connect timeout in seconds
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, env = "CLUSTER_IOSTAT_SSH_TIMEOUT")]
    ssh_timeout: u64,

    /// Stop at the first host that fails
    #[arg(long)]
    fail_fast: bool,
}

#[derive(Args, Debug)]
struct PlotArgs {
    /// Metric to plot
    #[arg(long, short = 'm', value_enum, default_value_t = Metric::default())]
    metric: Metric,

    /// Plot file format
    #[arg(long, short = 'f', value_enum, default_value_t = PlotFormat::default())]
    format: PlotFormat,

    /// Also write each parsed log as CSV
    #[arg(long)]
    csv: bool,
}

impl Commands {
    /// Phase to run and the settings for it.
    fn into_phase(self) -> (Phase, CommonArgs, Settings) {
        let (phase, common, interval, plot) = match self {
            Commands::Start { common, interval } => (Phase::Start, common, Some(interval), None),
            Commands::Stop { common, purge } => {
                let phase = if purge { Phase::StopAndPurge } else { Phase::Stop };
                (phase, common, None, None)
            }
            Commands::Purge { common } => (Phase::StopAndPurge, common, None, None),
            Commands::Collect { common, plot } => (Phase::CollectAndPlot, common, None, Some(plot)),
            Commands::Plot { common, plot } => (Phase::Plot, common, None, Some(plot)),
            Commands::Status { common } => (Phase::Status, common, None, None),
        };

        let mut settings = Settings {
            device: common.device.clone(),
            output_dir: common.output_dir.clone(),
            connect_timeout: Duration::from_secs(common.ssh_timeout),
            policy: if common.fail_fast {
                FailurePolicy::FailFast
            } else {
                FailurePolicy::BestEffort
            },
            ..Settings::default()
        };
        if let Some(interval) = interval {
            settings.interval_secs = interval;
        }
        if let Some(plot) = plot {
            settings.metric = plot.metric;
            settings.format = plot.format;
            settings.csv = plot.csv;
        }
        (phase, common, settings)
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let (phase, common, settings) = cli.command.into_phase();
    settings.validate()?;

    let hosts = load_hosts(&common.host_files)?;
    info!("cluster_iostat {VERSION_NUMBER}: {phase} on {} hosts", hosts.len());

    let shell = SshShell::new(settings.connect_timeout);
    let steps = Orchestrator::new(&shell, &settings)
        .run(phase, &hosts)
        .with_context(|| format!("{phase} aborted"))?;

    let failed: usize = steps.iter().map(|s| s.summary.failed()).sum();
    if failed > 0 {
        return Ok(ExitCode::from(EXIT_HOST_FAILURES));
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    if let Err(e) = init_logging(&LogConfig::from_env(default_level)) {
        eprintln!("{e:#}");
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
