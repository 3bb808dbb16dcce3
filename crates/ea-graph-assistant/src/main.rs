#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use ea_graph_assistant::{config::Config, run_server};

#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "ea-graph-assistant", version, about = "Natural-language assistant over an enterprise-architecture graph")]
struct Cli {
    /// Overrides API_HOST
    #[arg(long)]
    host: Option<String>,
    /// Overrides API_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::from_env()?;
    if let Some(host) = cli.host {
        cfg.api_host = host;
    }
    if let Some(port) = cli.port {
        cfg.api_port = port;
    }

    run_server(cfg).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
