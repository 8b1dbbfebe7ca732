use clap::{Parser, Subcommand};
use plugin::ManifestArgs;

mod plugin;

#[derive(Parser)]
struct Xtask {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate the env section of the managed plugin manifest from clap definitions
    Plugin(ManifestArgs),
}

fn main() -> anyhow::Result<()> {
    let args = Xtask::parse();

    match args.cmd {
        Commands::Plugin(manifest) => manifest.run(),
    }
}
