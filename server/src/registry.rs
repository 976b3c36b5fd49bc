//! Registry of admitted chat clients
//!
//! This module owns the authoritative view of who is in the chat:
//! - Connection handles for every admitted client
//! - The name of each client, kept unique across the whole registry
//! - Admission order, which is the order broadcasts are written in
//!
//! A client only enters the registry after a successful handshake and leaves
//! it exactly once, through `ClientRegistry::remove`.

use log::info;
use shared::HandshakeRejection;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;

use crate::error::RelayError;

/// Identifies a connection for its whole registered lifetime.
///
/// IDs are never reused, so a late event from an evicted connection cannot be
/// mistaken for a newer client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// The server's side of an open socket.
///
/// Outbound lines go through a bounded channel to the connection's writer
/// task. The reader task is aborted when the handle is dropped; with the
/// sender gone too, the writer flushes what it has and releases its half of
/// the socket.
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::Sender<String>,
    reader: Option<AbortHandle>,
}

impl Connection {
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        Self {
            outbound,
            reader: None,
        }
    }

    pub fn with_reader(mut self, reader: AbortHandle) -> Self {
        self.reader = Some(reader);
        self
    }

    /// True once the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// A connection bound to a display name
#[derive(Debug)]
pub struct Client {
    /// Unique identifier assigned by the server
    pub id: ClientId,
    /// Display name, unique among registered clients
    pub name: String,
    /// Remote address, used for strike accounting
    pub addr: SocketAddr,
    connection: Connection,
}

impl Client {
    pub fn new(id: ClientId, name: String, addr: SocketAddr, connection: Connection) -> Self {
        Self {
            id,
            name,
            addr,
            connection,
        }
    }

    /// Queues a line for this client without waiting.
    ///
    /// A full queue means the client is not keeping up; the line is dropped
    /// for this client alone.
    pub fn send(&self, line: String) -> Result<(), RelayError> {
        self.connection
            .outbound
            .try_send(line)
            .map_err(|e| RelayError::Undeliverable {
                client: self.id,
                reason: match e {
                    TrySendError::Full(_) => "outbound queue full",
                    TrySendError::Closed(_) => "connection closed",
                },
            })
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}

/// Authoritative set of active clients
///
/// The map from ID to client and the map from name to ID are kept in step,
/// so every name belongs to exactly one client and vice versa.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    /// Registered clients indexed by ID
    clients: HashMap<ClientId, Client>,
    /// Name index, used for the uniqueness check
    names: HashMap<String, ClientId>,
    /// Admission order for broadcast iteration
    order: Vec<ClientId>,
    /// Next ID to hand out
    next_id: u64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a fresh client ID
    ///
    /// IDs are allocated before admission so the connection's I/O tasks
    /// can tag their events from the start.
    pub fn allocate_id(&mut self) -> ClientId {
        self.next_id += 1;
        ClientId(self.next_id)
    }

    /// Returns true if some registered client already uses `name`
    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Admits a client under `name`
    ///
    /// Fails with `NameTaken` if the name is already registered. On failure
    /// the connection handle is dropped, which closes it.
    pub fn admit(
        &mut self,
        id: ClientId,
        name: String,
        addr: SocketAddr,
        connection: Connection,
    ) -> Result<(), HandshakeRejection> {
        if self.names.contains_key(&name) || self.clients.contains_key(&id) {
            return Err(HandshakeRejection::NameTaken);
        }

        info!("{} from {} registered as {}", id, addr, name);
        self.names.insert(name.clone(), id);
        self.order.push(id);
        self.clients
            .insert(id, Client::new(id, name, addr, connection));
        Ok(())
    }

    /// Removes a client from every index at once
    ///
    /// Returns the client so the caller decides when its connection closes.
    /// Returns None if the client was already gone.
    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        self.names.remove(&client.name);
        self.order.retain(|other| *other != id);
        Some(client)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn name_of(&self, id: ClientId) -> Option<&str> {
        self.clients.get(&id).map(|client| client.name.as_str())
    }

    pub fn find_by_name(&self, name: &str) -> Option<ClientId> {
        self.names.get(name).copied()
    }

    /// IDs in admission order
    pub fn ids(&self) -> Vec<ClientId> {
        self.order.clone()
    }

    /// Clients in admission order
    pub fn iter(&self) -> impl Iterator<Item = &Client> + '_ {
        self.order.iter().filter_map(|id| self.clients.get(id))
    }

    /// Empties the registry, returning clients in admission order
    pub fn drain(&mut self) -> Vec<Client> {
        self.names.clear();
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|id| self.clients.remove(&id))
            .collect()
    }

    /// Returns the number of registered clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if nobody is registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn connection() -> (Connection, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(4);
        (Connection::new(tx), rx)
    }

    #[test]
    fn test_registry_creation() {
        let registry = ClientRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_allocate_ids_are_unique() {
        let mut registry = ClientRegistry::new();
        let first = registry.allocate_id();
        let second = registry.allocate_id();
        assert_ne!(first, second);
        assert_eq!(first.to_string(), "client#1");
    }

    #[test]
    fn test_admit_client() {
        let mut registry = ClientRegistry::new();
        let id = registry.allocate_id();
        let (conn, _rx) = connection();

        registry.admit(id, "alice".into(), test_addr(), conn).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains_name("alice"));
        assert_eq!(registry.name_of(id), Some("alice"));
        assert_eq!(registry.find_by_name("alice"), Some(id));
    }

    #[test]
    fn test_admit_duplicate_name_rejected() {
        let mut registry = ClientRegistry::new();
        let first = registry.allocate_id();
        let second = registry.allocate_id();
        let (conn1, _rx1) = connection();
        let (conn2, _rx2) = connection();

        registry.admit(first, "alice".into(), test_addr(), conn1).unwrap();
        let result = registry.admit(second, "alice".into(), test_addr2(), conn2);

        assert_eq!(result, Err(HandshakeRejection::NameTaken));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_by_name("alice"), Some(first));
    }

    #[test]
    fn test_rejected_connection_is_closed() {
        let mut registry = ClientRegistry::new();
        let first = registry.allocate_id();
        let second = registry.allocate_id();
        let (conn1, _rx1) = connection();
        let (conn2, mut rx2) = connection();

        registry.admit(first, "alice".into(), test_addr(), conn1).unwrap();
        let _ = registry.admit(second, "alice".into(), test_addr2(), conn2);

        assert!(matches!(rx2.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_remove_frees_name() {
        let mut registry = ClientRegistry::new();
        let id = registry.allocate_id();
        let (conn, _rx) = connection();
        registry.admit(id, "alice".into(), test_addr(), conn).unwrap();

        let removed = registry.remove(id).unwrap();
        assert_eq!(removed.name, "alice");
        assert!(registry.is_empty());
        assert!(!registry.contains_name("alice"));
        assert!(registry.ids().is_empty());

        let again = registry.allocate_id();
        let (conn, _rx) = connection();
        assert!(registry.admit(again, "alice".into(), test_addr(), conn).is_ok());
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut registry = ClientRegistry::new();
        assert!(registry.remove(ClientId::new(999)).is_none());
    }

    #[test]
    fn test_iteration_follows_admission_order() {
        let mut registry = ClientRegistry::new();
        let mut receivers = Vec::new();
        for name in ["carol", "alice", "bob"] {
            let id = registry.allocate_id();
            let (conn, rx) = connection();
            receivers.push(rx);
            registry.admit(id, name.into(), test_addr(), conn).unwrap();
        }

        let names: Vec<&str> = registry.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);

        let drained: Vec<String> = registry.drain().into_iter().map(|c| c.name).collect();
        assert_eq!(drained, vec!["carol", "alice", "bob"]);
        assert!(registry.is_empty());
        assert!(!registry.contains_name("bob"));
    }

    #[test]
    fn test_send_reports_full_and_closed_queues() {
        let (tx, mut rx) = mpsc::channel(1);
        let client = Client::new(ClientId::new(1), "alice".into(), test_addr(), Connection::new(tx));

        assert!(client.send("one\n".into()).is_ok());
        assert!(matches!(
            client.send("two\n".into()),
            Err(RelayError::Undeliverable { reason: "outbound queue full", .. })
        ));

        assert_eq!(rx.try_recv().unwrap(), "one\n");
        drop(rx);
        assert!(client.is_closed());
        assert!(matches!(
            client.send("three\n".into()),
            Err(RelayError::Undeliverable { reason: "connection closed", .. })
        ));
    }
}
