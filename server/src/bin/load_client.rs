//! Drives a batch of bot connections against a running chat server.

use clap::Parser;
use log::{error, info, warn};
use rand::Rng;
use shared::{handshake_request, is_server_notice, HandshakeRejection, DEFAULT_PORT};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,
    /// Number of bots to connect
    #[clap(short, long, default_value = "5")]
    bots: usize,
    /// Messages each bot sends before leaving
    #[clap(short, long, default_value = "10")]
    messages: usize,
    /// Mean time between a bot's messages, in milliseconds
    #[clap(short, long, default_value = "1500")]
    interval_ms: u64,
}

#[derive(Debug, Default)]
struct BotStats {
    sent: usize,
    received: usize,
    throttled: usize,
}

// Spacing around the mean, never below a quarter of it
fn jittered(mean: Duration) -> Duration {
    let mean_ms = mean.as_millis() as u64;
    if mean_ms == 0 {
        return Duration::ZERO;
    }
    let spread = mean_ms / 2;
    let ms = rand::thread_rng().gen_range(mean_ms.saturating_sub(spread)..=mean_ms + spread);
    Duration::from_millis(ms.max(mean_ms / 4))
}

async fn run_bot(index: usize, args: Args) -> Result<BotStats, Box<dyn std::error::Error + Send + Sync>> {
    let name = format!("bot-{}", index);
    let stream = TcpStream::connect(&args.server).await?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(handshake_request(&name).as_bytes()).await?;

    let receiver = tokio::spawn({
        let name = name.clone();
        async move {
            let mut stats = BotStats::default();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(rejection) = HandshakeRejection::from_notice(&line) {
                    warn!("{} was rejected: {}", name, rejection);
                    break;
                }
                if is_server_notice(&line) && line.contains("you need to wait") {
                    stats.throttled += 1;
                }
                stats.received += 1;
                info!("{} <- {}", name, line);
            }
            stats
        }
    });

    let mut sent = 0;
    for n in 0..args.messages {
        sleep(jittered(Duration::from_millis(args.interval_ms))).await;
        writer
            .write_all(format!("message {} from {}\n", n, name).as_bytes())
            .await?;
        sent += 1;
    }

    // Give the last broadcast a moment before hanging up
    sleep(Duration::from_millis(200)).await;
    writer.shutdown().await?;

    let mut stats = receiver.await?;
    stats.sent = sent;
    Ok(stats)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    info!(
        "Starting {} bots against {} ({} messages each)",
        args.bots, args.server, args.messages
    );
    let start = Instant::now();

    let mut tasks = Vec::new();
    for index in 1..=args.bots {
        let args = args.clone();
        tasks.push(tokio::spawn(async move { (index, run_bot(index, args).await) }));
    }

    let mut totals = BotStats::default();
    for task in tasks {
        match task.await {
            Ok((_, Ok(stats))) => {
                totals.sent += stats.sent;
                totals.received += stats.received;
                totals.throttled += stats.throttled;
            }
            Ok((index, Err(e))) => error!("bot-{} failed: {}", index, e),
            Err(e) => error!("Bot task panicked: {}", e),
        }
    }

    println!(
        "{} bots finished in {:.2?}: {} sent, {} received, {} throttled",
        args.bots,
        start.elapsed(),
        totals.sent,
        totals.received,
        totals.throttled
    );
    Ok(())
}
