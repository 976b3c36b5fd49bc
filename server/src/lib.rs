//! # Chat Relay Server Library
//!
//! This library provides the server side of a multi-client text chat relay.
//! Clients connect over TCP, identify themselves with a unique display name,
//! and every line they send is relayed to everyone currently in the chat.
//!
//! ## Core Responsibilities
//!
//! ### Connection Lifecycle
//! Handles every stage of a client connection:
//! - Accepting sockets and refusing banned addresses up front
//! - Negotiating a unique display name before admission
//! - Detecting closed or failed sockets and evicting their clients
//! - Announcing joins and leaves to the rest of the chat
//!
//! ### Message Relay
//! Framed inbound lines are checked against the abuse limiter, formatted as
//! `name: text` and appended to the relay queue. Once per tick the queue is
//! flushed to every registered client in admission order.
//!
//! ### Abuse Prevention
//! Messages arriving faster than the configured interval cost the sender's
//! address a strike. Well-spaced messages earn strikes back. An address that
//! reaches the strike limit is banned for the life of the process.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! All chat state lives in one [`relay::Relay`] value owned by the server
//! loop. Socket tasks never touch it; they send events over channels and the
//! loop applies them. Evictions are therefore atomic with respect to ingestion
//! and broadcast, without any locks.
//!
//! ### Per-Connection Tasks
//! Each negotiating connection runs its handshake on its own task, so a slow
//! client never stalls the loop. Each admitted client gets a reader task,
//! which frames inbound bytes, and a writer task fed by a bounded queue. A
//! client that stops reading only loses its own lines.
//!
//! ### Tick Phases
//! Every tick runs the same three phases in order:
//! 1. **Reap**: evict clients whose sockets reported closure
//! 2. **Ingest**: rate-check pending messages and queue chat lines
//! 3. **Broadcast**: drain the queue to every registered client
//!
//! Everything ingested in a tick is broadcast in that tick.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! Client IDs, connection handles and the name-unique client registry.
//!
//! ### Limiter Module (`limiter`)
//! The strike table, the ban rule and the injectable clock.
//!
//! ### Handshake Module (`handshake`)
//! The per-connection name negotiation and the admission seam.
//!
//! ### Relay Modules (`relay`, `reaper`, `ingest`, `broadcast`)
//! The owned chat state and its tick phases.
//!
//! ### Network Module (`network`)
//! The TCP listener, connection I/O tasks, the control loop and the
//! lifecycle handle.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!
//!     // Stop the loop on Ctrl-C; queued lines are flushed before exit
//!     let handle = server.handle();
//!     tokio::spawn(async move {
//!         if tokio::signal::ctrl_c().await.is_ok() {
//!             handle.shutdown();
//!         }
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod handshake;
pub mod ingest;
pub mod limiter;
pub mod network;
pub mod reaper;
pub mod registry;
pub mod relay;
