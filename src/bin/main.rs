use clap::{Parser, Subcommand};
use netblast::{Client, Config, Server};
use std::net::Ipv4Addr;

#[derive(Parser)]
#[command(name = "netblast")]
#[command(about = "Network throughput benchmarking with broadcast-based server discovery", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run in server mode: broadcast offers and serve transfers
    Server {
        /// UDP port offers are broadcast to
        #[arg(short, long, default_value = "39457")]
        discovery_port: u16,

        /// Address offers are broadcast to
        #[arg(short, long, default_value = "255.255.255.255")]
        broadcast: Ipv4Addr,
    },

    /// Run in client mode: discover a server and measure transfer speed
    Client {
        /// Transfer size in bytes requested by each session
        #[arg(short, long)]
        size: u64,

        /// Number of parallel TCP sessions
        #[arg(short, long, default_value = "1")]
        tcp: usize,

        /// Number of parallel UDP sessions
        #[arg(short, long, default_value = "1")]
        udp: usize,

        /// UDP port to listen on for offers
        #[arg(short, long, default_value = "39457")]
        discovery_port: u16,

        /// Output session reports as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            discovery_port,
            broadcast,
        } => {
            let config = Config::server()
                .with_discovery_port(discovery_port)
                .with_broadcast_addr(broadcast);

            let server = Server::bind(config).await?;
            server.run().await?;
        }

        Commands::Client {
            size,
            tcp,
            udp,
            discovery_port,
            json,
        } => {
            let config = Config::client(size, tcp, udp)
                .with_discovery_port(discovery_port)
                .with_json(json);

            let client = Client::new(config)?;
            client.run().await?;
        }
    }

    Ok(())
}
