use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::{anyhow, Result};

use crate::core::{Engine, OutputMode, TimeWindow};

#[derive(Parser)]
#[command(name = "loghistory")]
#[command(about = "Rebuild visitor navigation trees and folder flows from an access log")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Access log to analyze instead of the configured one
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Directory receiving the output file
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Window start, e.g. 24/12/2026@18:00:00 (defaults to one hour ago)
    #[arg(long, requires = "end", value_name = "DD/MM/YYYY@HH:MM:SS")]
    pub start: Option<String>,

    /// Window end, e.g. 24/12/2026@19:00:00 (defaults to now)
    #[arg(long, requires = "start", value_name = "DD/MM/YYYY@HH:MM:SS")]
    pub end: Option<String>,

    /// View to produce: 0 (tree), 1 (flow) or 2 (stack)
    #[arg(short, long)]
    pub mode: Option<OutputMode>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub async fn execute(self, mut engine: Engine) -> Result<()> {
        if let Some(Commands::Init { path, force }) = self.command {
            return engine.init(path, force).await;
        }

        let mode = self
            .mode
            .ok_or_else(|| anyhow!("an output mode is required: --mode 0 (tree), 1 (flow) or 2 (stack)"))?;

        let window = match (self.start.as_deref(), self.end.as_deref()) {
            (Some(start), Some(end)) => Some(TimeWindow::parse(start, end)?),
            _ => None,
        };

        if let Some(log) = self.log {
            engine = engine.with_log_path(log);
        }
        if let Some(dir) = self.output_dir {
            engine = engine.with_output_dir(dir);
        }

        engine.run(window, mode).await?;
        Ok(())
    }
}
