//! Server network layer: TCP accept, per-connection I/O tasks and the
//! fixed-tick control loop.

use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::handshake::{AdmitOutcome, Admission, Handoff, HandshakeValidator};
use crate::limiter::{Clock, SystemClock};
use crate::registry::{ClientId, Connection};
use crate::relay::Relay;
use log::{debug, error, info, warn};
use shared::Framer;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Messages sent from connection tasks to the server loop
#[derive(Debug)]
pub enum LoopEvent {
    /// A handshake produced a name and asks to be registered
    Join {
        addr: SocketAddr,
        handoff: Handoff,
        stream: TcpStream,
        reply: oneshot::Sender<AdmitOutcome<TcpStream>>,
    },
    Inbound {
        id: ClientId,
        messages: Vec<String>,
    },
    Closed {
        id: ClientId,
        reason: String,
    },
}

/// Admission backed by the server loop, used by handshake tasks
struct LoopAdmission {
    events: mpsc::UnboundedSender<LoopEvent>,
    addr: SocketAddr,
}

impl Admission<TcpStream> for LoopAdmission {
    async fn admit(&mut self, handoff: Handoff, stream: TcpStream) -> AdmitOutcome<TcpStream> {
        let (reply, response) = oneshot::channel();
        let event = LoopEvent::Join {
            addr: self.addr,
            handoff,
            stream,
            reply,
        };
        if self.events.send(event).is_err() {
            return AdmitOutcome::Unavailable;
        }
        response.await.unwrap_or(AdmitOutcome::Unavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Running,
    Stopping,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServerState::Running,
            2 => ServerState::Stopping,
            _ => ServerState::Stopped,
        }
    }
}

/// Cloneable view of a server's lifecycle, and the way to stop it.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    state: Arc<AtomicU8>,
    shutdown: Arc<AtomicBool>,
}

impl ServerHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ServerState::Stopped as u8)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Asks the loop to stop. It notices at the start of its next tick.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            ServerState::Running as u8,
            ServerState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Main server coordinating connections and the relay
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    relay: Relay,
    validator: HandshakeValidator,
    handle: ServerHandle,

    // Connection tasks that outlive a single event
    handshakes: JoinSet<()>,
    writers: JoinSet<()>,

    // Communication channels
    events_tx: mpsc::UnboundedSender<LoopEvent>,
    events_rx: mpsc::UnboundedReceiver<LoopEvent>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, RelayError> {
        Self::bind_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Binds with a custom clock for rate decisions.
    pub async fn bind_with_clock(
        config: ServerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RelayError> {
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on {}", addr);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            relay: Relay::new(&config, clock),
            validator: HandshakeValidator::new(&config),
            handle: ServerHandle::new(),
            handshakes: JoinSet::new(),
            writers: JoinSet::new(),
            config,
            listener,
            events_tx,
            events_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Refuses banned addresses, otherwise starts a handshake task
    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.relay.limiter().is_banned(addr.ip()) {
            warn!("Refusing connection from banned address {}", addr.ip());
            return;
        }

        info!("New connection from {}", addr);
        let validator = self.validator.clone();
        let mut admission = LoopAdmission {
            events: self.events_tx.clone(),
            addr,
        };

        self.handshakes.spawn(async move {
            match validator.negotiate(stream, &mut admission).await {
                Ok(name) => debug!("{} completed handshake as {}", addr, name),
                Err(e) => info!("Handshake with {} ended: {}", addr, e),
            }
        });
    }

    fn handle_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Join {
                addr,
                handoff,
                stream,
                reply,
            } => {
                let outcome = self.register(addr, handoff, stream);
                if reply.send(outcome).is_err() {
                    debug!("Handshake task for {} went away before admission", addr);
                }
            }
            LoopEvent::Inbound { id, messages } => self.relay.receive(id, messages),
            LoopEvent::Closed { id, reason } => self.relay.mark_closed(id, reason),
        }
    }

    /// Registers a negotiated connection and starts its I/O tasks.
    ///
    /// The name check and the registration happen here, on the loop, so two
    /// handshakes racing for one name cannot both win.
    fn register(
        &mut self,
        addr: SocketAddr,
        handoff: Handoff,
        stream: TcpStream,
    ) -> AdmitOutcome<TcpStream> {
        if self.relay.limiter().is_banned(addr.ip()) {
            warn!("Dropping {} from banned address {}", handoff.name, addr.ip());
            return AdmitOutcome::Unavailable;
        }
        if self.relay.registry().contains_name(&handoff.name) {
            return AdmitOutcome::NameTaken(stream);
        }

        let Handoff {
            name,
            framer,
            backlog,
        } = handoff;
        let id = self.relay.allocate_id();
        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity);

        self.writers.spawn(write_loop(
            id,
            writer,
            outbound_rx,
            self.config.write_timeout,
            self.events_tx.clone(),
        ));
        let read_task = tokio::spawn(read_loop(
            id,
            reader,
            framer,
            self.config.buffer_size,
            self.events_tx.clone(),
        ));

        let connection = Connection::new(outbound_tx).with_reader(read_task.abort_handle());
        match self.relay.admit(id, name, addr, connection) {
            Ok(()) => {
                self.relay.receive(id, backlog);
                AdmitOutcome::Admitted
            }
            Err(e) => {
                warn!("Failed to register {}: {}", addr, e);
                AdmitOutcome::Unavailable
            }
        }
    }

    /// Main server loop.
    ///
    /// Accepts and connection events are handled as they arrive; the relay
    /// itself advances once per tick. Returns after a shutdown request, once
    /// pending handshakes are cancelled and every client has been flushed
    /// and closed.
    pub async fn run(mut self) -> Result<(), RelayError> {
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;

        self.handle.set_state(ServerState::Running);
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                },

                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                },

                Some(finished) = self.handshakes.join_next(), if !self.handshakes.is_empty() => {
                    if let Err(e) = finished {
                        error!("Handshake task failed: {}", e);
                    }
                },

                Some(finished) = self.writers.join_next(), if !self.writers.is_empty() => {
                    if let Err(e) = finished {
                        error!("Writer task failed: {}", e);
                    }
                },

                _ = ticker.tick() => {
                    if self.handle.shutdown_requested() {
                        break;
                    }

                    let report = self.relay.tick();
                    ticks += 1;

                    if report.reaped > 0 || report.relayed > 0 {
                        debug!("Tick {}: {:?}", ticks, report);
                    }
                    // Periodic monitoring
                    if ticks % 1000 == 0 && !self.relay.registry().is_empty() {
                        debug!("Tick {}: {} clients connected", ticks, self.relay.registry().len());
                    }
                },
            }
        }

        self.handle.set_state(ServerState::Stopping);
        info!("Server shutting down");
        drop(self.listener);

        // Unfinished handshakes are dropped along with their sockets
        self.handshakes.abort_all();
        while self.handshakes.join_next().await.is_some() {}

        let closed = self.relay.shutdown();
        info!("Closed {} client connection(s)", closed);

        // Writers exit once their queues are empty
        let writers = &mut self.writers;
        let drained = timeout(self.config.write_timeout, async {
            while writers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} writer(s) still busy after {:?}, aborting",
                self.writers.len(),
                self.config.write_timeout
            );
            self.writers.abort_all();
            while self.writers.join_next().await.is_some() {}
        }

        self.handle.set_state(ServerState::Stopped);
        Ok(())
    }
}

/// Reads from one registered client until the stream ends, forwarding
/// framed messages to the loop.
async fn read_loop(
    id: ClientId,
    mut reader: OwnedReadHalf,
    mut framer: Framer,
    buffer_size: usize,
    events: mpsc::UnboundedSender<LoopEvent>,
) {
    let mut buffer = vec![0u8; buffer_size];

    let reason = loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break "connection closed by peer".to_string(),
            Ok(len) => {
                let messages = framer.push(&buffer[..len]);
                if messages.is_empty() {
                    continue;
                }
                if events.send(LoopEvent::Inbound { id, messages }).is_err() {
                    return;
                }
            }
            Err(e) => break e.to_string(),
        }
    };

    if events.send(LoopEvent::Closed { id, reason }).is_err() {
        debug!("Server loop gone before {} closed", id);
    }
}

/// Writes queued lines to one client. Ends when the queue's sender is
/// dropped (eviction) or a write fails or stalls past `write_timeout`.
async fn write_loop(
    id: ClientId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<String>,
    write_timeout: Duration,
    events: mpsc::UnboundedSender<LoopEvent>,
) {
    while let Some(line) = outbound.recv().await {
        let reason = match timeout(write_timeout, writer.write_all(line.as_bytes())).await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("write stalled for {:?}", write_timeout),
        };

        warn!("Write to {} failed: {}", id, reason);
        if events.send(LoopEvent::Closed { id, reason }).is_err() {
            debug!("Server loop gone before {} closed", id);
        }
        return;
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of {} failed: {}", id, e);
    }
}
