//! Cinder CI CLI entrypoint.

use clap::Parser;

mod commands;
mod handlers;

use commands::Commands;

#[derive(Parser)]
#[command(name = "cinder")]
#[command(author, version, about = "Cinder CI command-line interface", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let success = match cli.command {
        Commands::Validate { path } => handlers::validate(&path)?,
        Commands::Trigger {
            kind,
            git_ref,
            paths,
        } => handlers::trigger(kind, &git_ref, &paths).await?,
        Commands::Run { path, git_ref } => handlers::run(&path, &git_ref).await?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
