//! The relay core: every piece of shared chat state, owned in one place.
//!
//! `Relay` is driven by the server loop. Socket tasks never touch it
//! directly; they report through events and the loop applies them here.
//! Because a single owner does all the mutation, eviction is atomic with
//! respect to ingestion and broadcast without any locking.
//!
//! The per-tick phases live in their own modules: `reaper`, `ingest` and
//! `broadcast`.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use log::info;
use shared::{join_notice, leave_notice, throttle_notice};

use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::limiter::{AbuseLimiter, Clock};
use crate::registry::{ClientId, ClientRegistry, Connection};

/// What one tick did, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub reaped: usize,
    pub relayed: usize,
    pub deliveries: usize,
}

pub struct Relay {
    pub(crate) registry: ClientRegistry,
    pub(crate) limiter: AbuseLimiter,
    pub(crate) queue: VecDeque<String>,
    /// Framed messages received since the last ingest, per client.
    pub(crate) inbox: HashMap<ClientId, Vec<String>>,
    /// Clients whose socket reported end-of-stream or an error.
    pub(crate) closed: HashMap<ClientId, String>,
    pub(crate) throttle_notice: String,
}

impl Relay {
    pub fn new(config: &ServerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: ClientRegistry::new(),
            limiter: AbuseLimiter::new(config.strike_limit, config.min_message_interval, clock),
            queue: VecDeque::new(),
            inbox: HashMap::new(),
            closed: HashMap::new(),
            throttle_notice: throttle_notice(config.min_message_interval),
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn limiter(&self) -> &AbuseLimiter {
        &self.limiter
    }

    pub fn allocate_id(&mut self) -> ClientId {
        self.registry.allocate_id()
    }

    /// Registers a client that completed its handshake and announces it.
    pub fn admit(
        &mut self,
        id: ClientId,
        name: String,
        addr: SocketAddr,
        connection: Connection,
    ) -> Result<(), RelayError> {
        let notice = join_notice(&name);
        self.registry.admit(id, name, addr, connection)?;
        self.queue.push_back(notice);
        Ok(())
    }

    /// Records framed messages from a client for the next ingest.
    ///
    /// Messages from clients that are no longer registered are discarded.
    pub fn receive(&mut self, id: ClientId, messages: Vec<String>) {
        if messages.is_empty() || self.registry.get(id).is_none() {
            return;
        }
        self.inbox.entry(id).or_default().extend(messages);
    }

    pub fn enqueue(&mut self, entry: String) {
        self.queue.push_back(entry);
    }

    /// Entries waiting for the next broadcast, oldest first.
    pub fn queued(&self) -> impl Iterator<Item = &str> + '_ {
        self.queue.iter().map(String::as_str)
    }

    /// Removes a client from every map in one step and closes its socket.
    ///
    /// Remaining clients are told on the next broadcast. Returns the
    /// evicted name, or None if the client was already gone.
    pub fn evict(&mut self, id: ClientId, reason: &str) -> Option<String> {
        let client = self.registry.remove(id)?;
        self.limiter.forget(id);
        self.inbox.remove(&id);
        self.closed.remove(&id);

        info!("{} has left ({})", client.name, reason);
        self.queue.push_back(leave_notice(&client.name));

        let name = client.name.clone();
        drop(client);
        Some(name)
    }

    /// One round of maintenance: reap, then ingest, then broadcast.
    ///
    /// Everything ingested in a tick is broadcast in that same tick.
    pub fn tick(&mut self) -> TickReport {
        let reaped = self.reap();
        let relayed = self.ingest();
        let deliveries = self.broadcast();
        TickReport {
            reaped,
            relayed,
            deliveries,
        }
    }

    /// Flushes whatever is queued, then closes every remaining client.
    pub fn shutdown(&mut self) -> usize {
        self.broadcast();
        let clients = self.registry.drain();
        for client in &clients {
            self.limiter.forget(client.id);
        }
        self.inbox.clear();
        self.closed.clear();
        clients.len()
    }
}
