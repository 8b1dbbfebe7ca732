use crate::cmd::config::plugin::{PluginArgs, PluginConfig};
use crate::config::LayeredArgs;
use clap::{Parser, Subcommand};
use sysexits::ExitCode;

pub mod config;
mod serve;

#[derive(Parser, Debug)]
#[command(name = "docker-xylem")]
#[command(version, about = "Docker volume plugin for GlusterFS volumes managed by xylem", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the Docker volume plugin API on a Unix socket
    Serve(Box<LayeredArgs<PluginArgs>>),
}

pub async fn serve(args: LayeredArgs<PluginArgs>) -> ExitCode {
    let config: PluginConfig = match args.load() {
        Ok(c) => c,
        Err(e) => return e.into(),
    };
    match serve::serve(config).await {
        Ok(()) => ExitCode::Ok,
        Err(e) => e.into(),
    }
}
