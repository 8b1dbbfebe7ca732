use clap::Parser;
use docker_xylem::cmd;
use docker_xylem::cmd::{Cli, Command};
use sysexits::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Serve(args) => cmd::serve(*args).await,
    }
}
