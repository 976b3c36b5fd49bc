//! Name negotiation for freshly accepted connections.
//!
//! Each new connection runs its handshake on its own task, so a client that
//! dawdles only holds up itself. The validator reads framed submissions until
//! one parses as `name:<name>` and the server loop agrees the name is free.
//! Every rejection is answered with a specific notice and the client may try
//! again until a read times out.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::time::Duration;

use log::{debug, warn};
use shared::{parse_handshake, welcome_notice, Framer, HandshakeRejection};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::config::ServerConfig;
use crate::error::RelayError;

/// How long a partial handshake line may sit before it is read as complete.
/// Clients that never send a line terminator are admitted this way.
pub const UNTERMINATED_GRACE: Duration = Duration::from_millis(500);

/// State carried from a finished handshake into the registered session.
///
/// A client may pipeline chat lines right behind its name; those lines and
/// any partial line are handed over so they are not lost.
#[derive(Debug, Clone)]
pub struct Handoff {
    pub name: String,
    pub framer: Framer,
    pub backlog: Vec<String>,
}

#[derive(Debug)]
pub enum AdmitOutcome<S> {
    Admitted,
    /// The stream is handed back so negotiation can continue.
    NameTaken(S),
    /// The connection cannot be admitted at all: its address was banned
    /// while it negotiated, or the server is shutting down.
    Unavailable,
}

/// Whoever decides admission. In the server this is the main loop, which
/// owns the registry; tests substitute a plain set of names.
pub trait Admission<S> {
    fn admit(&mut self, handoff: Handoff, stream: S)
        -> impl Future<Output = AdmitOutcome<S>> + Send;
}

#[derive(Debug, Clone)]
pub struct HandshakeValidator {
    chat_name: String,
    read_timeout: Duration,
    buffer_size: usize,
    framer: Framer,
}

impl HandshakeValidator {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            chat_name: config.chat_name.clone(),
            read_timeout: config.handshake_timeout,
            buffer_size: config.buffer_size,
            framer: Framer::new(config.framing, config.buffer_size),
        }
    }

    /// Runs the handshake to completion.
    ///
    /// Returns the admitted name, or the error that ended negotiation
    /// (timeout, socket failure, end of stream). On error the stream is
    /// dropped, which closes it.
    pub async fn negotiate<S, A>(&self, mut stream: S, admission: &mut A) -> Result<String, RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
        A: Admission<S> + Send,
    {
        stream
            .write_all(welcome_notice(&self.chat_name).as_bytes())
            .await?;

        let mut framer = self.framer.clone();
        let mut submissions: VecDeque<String> = VecDeque::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let Some(submission) = submissions.pop_front() else {
                // An unterminated tail that stays idle is taken as the submission
                let holding_tail = framer.pending_len() > 0;
                let wait = if holding_tail {
                    UNTERMINATED_GRACE.min(self.read_timeout)
                } else {
                    self.read_timeout
                };
                let read = match timeout(wait, stream.read(&mut buffer)).await {
                    Ok(read) => read?,
                    Err(_) if holding_tail => {
                        submissions.extend(framer.take_pending());
                        continue;
                    }
                    Err(_) => return Err(RelayError::HandshakeTimeout(self.read_timeout)),
                };
                if read == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed the connection during handshake",
                    )
                    .into());
                }
                submissions.extend(framer.push(&buffer[..read]));
                continue;
            };

            let name = match parse_handshake(&submission) {
                Ok(name) => name,
                Err(rejection) => {
                    debug!("Handshake submission rejected: {}", rejection);
                    stream.write_all(rejection.notice().as_bytes()).await?;
                    continue;
                }
            };

            let handoff = Handoff {
                name: name.clone(),
                framer: framer.clone(),
                backlog: submissions.iter().cloned().collect(),
            };

            match admission.admit(handoff, stream).await {
                AdmitOutcome::Admitted => return Ok(name),
                AdmitOutcome::NameTaken(returned) => {
                    warn!("Name '{}' is already taken", name);
                    stream = returned;
                    stream
                        .write_all(HandshakeRejection::NameTaken.notice().as_bytes())
                        .await?;
                }
                AdmitOutcome::Unavailable => return Err(RelayError::AdmissionRefused),
            }
        }
    }
}
