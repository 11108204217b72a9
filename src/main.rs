use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley_gateway::history::{ConversationStore, Identity};
use parley_gateway::{Config, Daemon, daemon};

/// Parley - chat-to-LLM relay with per-contact conversation history
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default)
    Serve,
    /// Run one conversation turn and print the reply
    Chat {
        /// Sender address (e.g. 15551234567@c.us)
        #[arg(short, long)]
        from: String,
        /// Message text
        text: String,
    },
    /// Print a contact's stored history
    History {
        /// Sender address (e.g. 15551234567@c.us)
        #[arg(short, long)]
        from: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley_gateway=info",
        1 => "info,parley_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(
                mode = %config.backend.mode,
                port = config.api_server.port,
                "starting parley gateway"
            );
            Daemon::new(config).run().await?;
        }
        Command::Chat { from, text } => {
            let orchestrator = daemon::build_orchestrator(&config)?;
            let reply = orchestrator.handle(&from, &text).await;
            println!("{reply}");
        }
        Command::History { from } => {
            let identity = Identity::from_address(&from)?;
            let store = ConversationStore::new(config.history.dir);
            for turn in store.read_all(&identity).await {
                println!(
                    "[{}] {}: {}",
                    turn.created_at.format("%Y-%m-%d %H:%M:%S"),
                    turn.speaker,
                    turn.text
                );
            }
        }
    }

    Ok(())
}
