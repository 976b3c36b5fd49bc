use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use shared::{Framing, DEFAULT_BUFFER_SIZE, DEFAULT_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Chat name shown in the welcome prompt
    #[clap(short, long, default_value = "LofiChat")]
    chat_name: String,
    /// Strikes before an address is banned
    #[clap(long, default_value = "10")]
    strike_limit: u32,
    /// Minimum time between messages, in milliseconds
    #[clap(long, default_value = "1000")]
    min_interval_ms: u64,
    /// Handshake read timeout, in seconds
    #[clap(long, default_value = "60")]
    handshake_timeout: u64,
    /// Longest a write to one client may stall, in seconds
    #[clap(long, default_value = "10")]
    write_timeout: u64,
    /// Per-connection read buffer size, in bytes
    #[clap(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
    /// Tick interval, in milliseconds
    #[clap(short, long, default_value = "10")]
    tick_ms: u64,
    /// Lines buffered per client before broadcasts to it are dropped
    #[clap(long, default_value = "256")]
    outbound_capacity: usize,
    /// Message framing: lines (newline-terminated) or chunks (one read per message)
    #[clap(short, long, default_value = "lines")]
    framing: Framing,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind_addr: args.host,
            port: args.port,
            chat_name: args.chat_name,
            strike_limit: args.strike_limit,
            min_message_interval: Duration::from_millis(args.min_interval_ms),
            handshake_timeout: Duration::from_secs(args.handshake_timeout),
            write_timeout: Duration::from_secs(args.write_timeout.max(1)),
            buffer_size: args.buffer_size,
            tick_interval: Duration::from_millis(args.tick_ms.max(1)),
            outbound_capacity: args.outbound_capacity.max(1),
            framing: args.framing,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = ServerConfig::from(args);
    info!(
        "Starting {} on {} ({} framing, {:?} tick)",
        config.chat_name,
        config.bind_address(),
        config.framing,
        config.tick_interval
    );

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    // Ctrl-C stops the loop instead of killing the process
    let handle = server.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                handle.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await?;
    Ok(())
}
