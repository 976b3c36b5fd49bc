use crate::input::{parse_input, UserCommand};
use log::{debug, info};
use shared::{handshake_request, join_notice, HandshakeRejection};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// How a chat session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed quit/exit or closed their input
    UserQuit,
    ServerClosed,
    /// The server refused the name before we were admitted
    Rejected(HandshakeRejection),
}

pub const DISCONNECTED_MESSAGE: &str = "Server has disconnected us";

pub struct ChatClient {
    stream: TcpStream,
    name: String,
}

impl ChatClient {
    pub async fn connect(server: &str, name: &str) -> io::Result<Self> {
        info!("Connecting to {}", server);
        let stream = TcpStream::connect(server).await?;
        Ok(Self {
            stream,
            name: name.trim().to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends the handshake, then relays between the server and the user
    /// until one side ends the session.
    ///
    /// Every line from the server is written to `output`. Lines from `input`
    /// are forwarded unless blank; `quit` or `exit` closes the connection.
    pub async fn run<I, O>(self, input: I, mut output: O) -> io::Result<SessionEnd>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let (reader, mut writer) = self.stream.into_split();
        let mut server_lines = BufReader::new(reader).lines();
        let mut input_lines = input.lines();

        writer
            .write_all(handshake_request(&self.name).as_bytes())
            .await?;

        let own_join = join_notice(&self.name);
        let mut joined = false;

        loop {
            tokio::select! {
                line = server_lines.next_line() => {
                    let Some(line) = line? else {
                        output.write_all(format!("{DISCONNECTED_MESSAGE}\n").as_bytes()).await?;
                        output.flush().await?;
                        return Ok(SessionEnd::ServerClosed);
                    };

                    output.write_all(format!("{line}\n").as_bytes()).await?;
                    output.flush().await?;

                    if !joined {
                        if let Some(rejection) = HandshakeRejection::from_notice(&line) {
                            info!("Server refused name '{}': {}", self.name, rejection);
                            return Ok(SessionEnd::Rejected(rejection));
                        }
                        if line == own_join {
                            debug!("Joined as {}", self.name);
                            joined = true;
                        }
                    }
                },

                line = input_lines.next_line() => {
                    let command = match line? {
                        Some(line) => parse_input(&line),
                        None => UserCommand::Quit,
                    };
                    match command {
                        UserCommand::Quit => {
                            writer.shutdown().await?;
                            return Ok(SessionEnd::UserQuit);
                        }
                        UserCommand::Send(text) => {
                            writer.write_all(format!("{text}\n").as_bytes()).await?;
                        }
                        UserCommand::Skip => {}
                    }
                },
            }
        }
    }
}
