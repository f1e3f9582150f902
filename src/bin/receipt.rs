use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use position_receipt::config::Config;
use position_receipt::query::commands::{PositionQuery, cmd_first_seen, cmd_receipt, cmd_transfers};
use position_receipt::query::formatters::OutputFormat;
use position_receipt::receipt::{RECENT_TRANSFER_LIMIT, ReceiptService};
use position_receipt::rpc::RpcClient;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "receipt")]
#[command(about = "Inspect a wallet's position in a token from the command line", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table", global = true)]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Position {
    /// base | solana
    chain: String,
    address: String,
    /// Contract address, mint, or a known ticker such as USDC
    token: String,
    #[arg(long, default_value = "standard")]
    depth: String,
}

impl Position {
    fn parse(&self) -> Result<PositionQuery> {
        PositionQuery::parse(&self.chain, &self.address, &self.token, &self.depth)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Full position receipt
    Receipt(Position),
    /// First-seen estimate only
    FirstSeen(Position),
    /// Recent inbound and outbound transfers
    Transfers {
        #[command(flatten)]
        position: Position,
        #[arg(long, default_value_t = RECENT_TRANSFER_LIMIT)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    let base = RpcClient::new(&config.base_rpc_urls, "base")?;
    let solana = RpcClient::new(&config.solana_rpc_urls, "solana")?;
    let service = ReceiptService::from_clients(base, solana, config.jupiter_api_key.clone());

    match cli.command {
        Commands::Receipt(position) => {
            cmd_receipt(&service, &position.parse()?, format).await?;
        }
        Commands::FirstSeen(position) => {
            cmd_first_seen(&service, &position.parse()?, format).await?;
        }
        Commands::Transfers { position, limit } => {
            cmd_transfers(&service, &position.parse()?, limit, format).await?;
        }
    }

    Ok(())
}
