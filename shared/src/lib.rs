use std::time::Duration;
use thiserror::Error;

pub mod framing;

pub use framing::{Framer, Framing};

pub const DEFAULT_PORT: u16 = 6969;
pub const DEFAULT_BUFFER_SIZE: usize = 2 * 1024;
pub const NAME_PREFIX: &str = "name:";
pub const SERVER_TAG: &str = "[SERVER]";

/// Why a handshake submission was refused. The server answers each of these
/// with a notice and keeps the connection open for another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandshakeRejection {
    #[error("received empty message")]
    Empty,
    #[error("wrong message format")]
    WrongFormat,
    #[error("connection refused due to missing name parameter")]
    MissingName,
    #[error("name is already taken")]
    NameTaken,
}

impl HandshakeRejection {
    const ALL: [HandshakeRejection; 4] = [
        HandshakeRejection::Empty,
        HandshakeRejection::WrongFormat,
        HandshakeRejection::MissingName,
        HandshakeRejection::NameTaken,
    ];

    /// The exact line sent back to the offending connection.
    pub fn notice(&self) -> String {
        format!("{SERVER_TAG} Error: {self}\n")
    }

    /// Recognises a rejection notice received from the server.
    pub fn from_notice(line: &str) -> Option<Self> {
        let line = strip_line_endings(line);
        Self::ALL
            .into_iter()
            .find(|rejection| rejection.notice().trim_end() == line)
    }
}

/// Validates a handshake submission and extracts the requested display name.
///
/// Name-uniqueness is not checked here; that needs the server's registry.
pub fn parse_handshake(submission: &str) -> Result<String, HandshakeRejection> {
    let submission = strip_line_endings(submission);
    if submission.is_empty() {
        return Err(HandshakeRejection::Empty);
    }

    let name = submission
        .strip_prefix(NAME_PREFIX)
        .ok_or(HandshakeRejection::WrongFormat)?
        .trim();

    if name.is_empty() {
        return Err(HandshakeRejection::MissingName);
    }

    Ok(name.to_string())
}

pub fn handshake_request(name: &str) -> String {
    format!("{NAME_PREFIX}{name}\n")
}

// Removes every CR and LF, wherever they sit in the text
pub fn strip_line_endings(text: &str) -> String {
    text.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

pub fn format_chat_line(name: &str, text: &str) -> String {
    format!("{}: {}", name, strip_line_endings(text))
}

pub fn server_notice(text: &str) -> String {
    format!("{SERVER_TAG} {text}\n")
}

pub fn welcome_notice(chat_name: &str) -> String {
    server_notice(&format!(
        "Welcome to {chat_name}, please identify yourself in the format: {NAME_PREFIX}<yourName>"
    ))
}

// Relay-queue entries carry no trailing newline; the broadcaster adds it
pub fn join_notice(name: &str) -> String {
    format!("{SERVER_TAG} {name} has joined the chat!")
}

pub fn leave_notice(name: &str) -> String {
    format!("{SERVER_TAG} {name} has left the chat.")
}

pub fn throttle_notice(min_interval: Duration) -> String {
    let wait = match min_interval.as_millis() {
        1000 => "1 second".to_string(),
        ms if ms % 1000 == 0 => format!("{} seconds", ms / 1000),
        ms => format!("{ms} milliseconds"),
    };
    server_notice(&format!("you need to wait {wait} between messages"))
}

pub fn is_server_notice(line: &str) -> bool {
    line.starts_with(SERVER_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_name() {
        assert_eq!(parse_handshake("name:alice"), Ok("alice".to_string()));
        assert_eq!(parse_handshake("name:alice\r\n"), Ok("alice".to_string()));
        assert_eq!(parse_handshake("name:  bob smith "), Ok("bob smith".to_string()));
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(parse_handshake(""), Err(HandshakeRejection::Empty));
        assert_eq!(parse_handshake("\r\n"), Err(HandshakeRejection::Empty));
        assert_eq!(parse_handshake("alice"), Err(HandshakeRejection::WrongFormat));
        assert_eq!(parse_handshake("Name:alice"), Err(HandshakeRejection::WrongFormat));
        assert_eq!(parse_handshake("name:"), Err(HandshakeRejection::MissingName));
        assert_eq!(parse_handshake("name:   \n"), Err(HandshakeRejection::MissingName));
    }

    #[test]
    fn test_rejection_notices_match_wire_text() {
        assert_eq!(
            HandshakeRejection::Empty.notice(),
            "[SERVER] Error: received empty message\n"
        );
        assert_eq!(
            HandshakeRejection::WrongFormat.notice(),
            "[SERVER] Error: wrong message format\n"
        );
        assert_eq!(
            HandshakeRejection::MissingName.notice(),
            "[SERVER] Error: connection refused due to missing name parameter\n"
        );
        assert_eq!(
            HandshakeRejection::NameTaken.notice(),
            "[SERVER] Error: name is already taken\n"
        );
    }

    #[test]
    fn test_rejection_from_notice() {
        assert_eq!(
            HandshakeRejection::from_notice("[SERVER] Error: name is already taken\n"),
            Some(HandshakeRejection::NameTaken)
        );
        assert_eq!(HandshakeRejection::from_notice("[SERVER] bob has joined the chat!"), None);
    }

    #[test]
    fn test_chat_line_strips_control_characters() {
        assert_eq!(format_chat_line("alice", "hi there\r\n"), "alice: hi there");
        assert_eq!(format_chat_line("alice", "a\rb\nc"), "alice: abc");
    }

    #[test]
    fn test_notices() {
        assert_eq!(join_notice("A"), "[SERVER] A has joined the chat!");
        assert_eq!(leave_notice("A"), "[SERVER] A has left the chat.");
        assert_eq!(
            throttle_notice(Duration::from_secs(1)),
            "[SERVER] you need to wait 1 second between messages\n"
        );
        assert_eq!(
            throttle_notice(Duration::from_secs(3)),
            "[SERVER] you need to wait 3 seconds between messages\n"
        );
        assert_eq!(
            throttle_notice(Duration::from_millis(250)),
            "[SERVER] you need to wait 250 milliseconds between messages\n"
        );
        assert!(is_server_notice(&welcome_notice("LofiChat")));
        assert!(!is_server_notice("alice: [SERVER] spoof"));
    }
}
