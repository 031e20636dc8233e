mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "adshade",
    version,
    about = "Hides and resizes ad surfaces in a host application's window tree"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the default configuration files
    Init,
    /// Run the engine in the foreground until Ctrl+C
    Run,
    /// Run one synchronous classify+mutate pass and print the state
    Scan,
    /// Print the target application's window trees as JSON
    Dump,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Run => commands::run::execute(),
        Commands::Scan => commands::scan::execute(),
        Commands::Dump => commands::dump::execute(),
    }
}
