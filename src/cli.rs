//! Command-line front end.

use crate::config::Config;
use crate::dump::{Command, DumpObserver, ProgressReport};
use crate::error::DumpError;
use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "drndump",
    version,
    about = "Dump a Droonga dataset as Groonga commands",
    long_about = "Requests a dump of DATASET from the cluster and writes the resulting \
                  table_create, column_create and add commands to stdout as JSON."
)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/drndump/config.toml)
    #[arg(long, env = "DRNDUMP_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Host name to be connected
    #[arg(long, env = "DRNDUMP_HOST")]
    pub host: Option<String>,

    /// Port number to be connected
    #[arg(long, env = "DRNDUMP_PORT")]
    pub port: Option<u16>,

    /// Dataset to be dumped
    #[arg(long, env = "DRNDUMP_DATASET")]
    pub dataset: Option<String>,

    /// Requested dump rate (messages per second)
    #[arg(long, env = "DRNDUMP_MESSAGES_PER_SECOND", value_name = "N")]
    pub messages_per_second: Option<u32>,

    /// Show a progress bar on stderr
    #[arg(long)]
    pub progress: bool,

    /// Verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Defaults, then the config file, then flags and environment.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dataset) = &self.dataset {
            config.dataset = dataset.clone();
        }
        if let Some(rate) = self.messages_per_second {
            config.messages_per_second = rate;
        }
        Ok(config)
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "drndump=debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

/// Write one command as pretty-printed JSON followed by a newline.
pub fn write_command<W: Write>(out: &mut W, command: &Command) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, command)?;
    writeln!(out)?;
    Ok(())
}

/// Renders session progress with an indicatif bar.
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new(dataset: &str) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{prefix} [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_prefix(dataset.to_string());
        Self { bar }
    }
}

impl DumpObserver for ProgressBarObserver {
    fn on_progress(&mut self, _message: &Value, progress: &ProgressReport) {
        self.bar.set_length(progress.forecasted);
        self.bar.set_position(progress.received);
        self.bar.set_message(format!(
            "{}% ({} remaining)",
            progress.percent,
            progress.formatted_eta()
        ));
    }

    fn on_finish(&mut self) {
        self.bar.finish_with_message("done");
    }

    fn on_error(&mut self, _error: &DumpError) {
        self.bar.abandon();
    }
}
