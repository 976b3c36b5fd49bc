use clap::Parser;
use client::input::prompt_name;
use client::network::{ChatClient, SessionEnd};
use log::info;
use shared::DEFAULT_PORT;
use tokio::io::{stdin, stdout, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Display name; asked for interactively when omitted
    #[arg(short = 'n', long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut input = BufReader::new(stdin());
    let mut output = stdout();

    let name = match args.name.filter(|name| !name.trim().is_empty()) {
        Some(name) => name,
        None => match prompt_name(&mut input, &mut output).await? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let client = ChatClient::connect(&args.server, &name).await?;
    info!("Connected to {} as {}", args.server, client.name());
    println!("Type a message and press enter. 'quit' or 'exit' leaves the chat.");

    let end = client.run(input, output).await?;
    info!("Session ended: {:?}", end);

    // The stdin reader sits on a blocking thread that would hold the runtime open
    std::process::exit(match end {
        SessionEnd::Rejected(_) => 1,
        SessionEnd::UserQuit | SessionEnd::ServerClosed => 0,
    });
}
