use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use podium::gateway::GatewayContext;
use podium::server;

#[derive(Debug, Parser)]
#[command(name = "podium", about = "Live polling session server", version)]
struct Cli {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Log filter when RUST_LOG is unset, e.g. "podium=debug".
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .init();

    let addr = SocketAddr::new(cli.host, cli.port);
    server::run(addr, GatewayContext::new()).await
}
