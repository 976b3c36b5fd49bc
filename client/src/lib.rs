//! # Chat Client Library
//!
//! A thin terminal client for the chat relay. It connects over TCP, sends
//! the `name:<name>` handshake, prints every line the server sends and
//! forwards whatever the user types.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Interprets typed lines (`quit`/`exit`, blank lines, chat text) and
//! prompts for a display name.
//!
//! ### Network Module (`network`)
//! The connection itself and the session loop, which is generic over its
//! input and output so it can be driven without a terminal.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::ChatClient;
//! use tokio::io::{stdin, stdout, BufReader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ChatClient::connect("127.0.0.1:6969", "alice").await?;
//!     let end = client.run(BufReader::new(stdin()), stdout()).await?;
//!     println!("session ended: {:?}", end);
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod network;
