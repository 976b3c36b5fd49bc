//! Turns raw socket reads into chat messages.
//!
//! TCP gives no message boundaries: one read may hold several lines, or half
//! of one. `Framing::Lines` reassembles newline-terminated messages across
//! reads. `Framing::Chunks` keeps the legacy behaviour where every read is a
//! single message, for clients that never send a line terminator.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    #[default]
    Lines,
    Chunks,
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lines" => Ok(Framing::Lines),
            "chunks" => Ok(Framing::Chunks),
            other => Err(format!("unknown framing mode '{other}' (expected lines or chunks)")),
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Lines => write!(f, "lines"),
            Framing::Chunks => write!(f, "chunks"),
        }
    }
}

/// Per-connection framing state.
///
/// In line mode an unterminated tail is held until the next read. Once the
/// tail reaches `max_len` bytes it is released as a message of its own so a
/// client can't grow the buffer without bound.
#[derive(Debug, Clone)]
pub struct Framer {
    mode: Framing,
    pending: Vec<u8>,
    max_len: usize,
}

impl Framer {
    pub fn new(mode: Framing, max_len: usize) -> Self {
        Self {
            mode,
            pending: Vec::new(),
            max_len: max_len.max(1),
        }
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feeds one read's worth of bytes, returning every message it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        match self.mode {
            Framing::Chunks => {
                if bytes.is_empty() {
                    Vec::new()
                } else {
                    vec![String::from_utf8_lossy(bytes).into_owned()]
                }
            }
            Framing::Lines => self.push_lines(bytes),
        }
    }

    /// Releases the unterminated tail, if any, as a message of its own.
    pub fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&tail).into_owned())
    }

    fn push_lines(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut messages = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let mut line = &line[..line.len() - 1];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            messages.push(String::from_utf8_lossy(line).into_owned());
        }

        if self.pending.len() >= self.max_len {
            let overflow = std::mem::take(&mut self.pending);
            messages.push(String::from_utf8_lossy(&overflow).into_owned());
        }

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_multiple_messages_in_one_read() {
        let mut framer = Framer::new(Framing::Lines, 2048);
        let messages = framer.push(b"hello\r\nworld\n");
        assert_eq!(messages, vec!["hello", "world"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_lines_reassemble_partial_message() {
        let mut framer = Framer::new(Framing::Lines, 2048);
        assert!(framer.push(b"hel").is_empty());
        assert_eq!(framer.pending_len(), 3);
        assert_eq!(framer.push(b"lo\nwor"), vec!["hello"]);
        assert_eq!(framer.push(b"ld\n"), vec!["world"]);
    }

    #[test]
    fn test_take_pending_releases_tail_once() {
        let mut framer = Framer::new(Framing::Lines, 2048);
        assert_eq!(framer.push(b"one\nname:ali"), vec!["one"]);
        assert_eq!(framer.take_pending().as_deref(), Some("name:ali"));
        assert_eq!(framer.pending_len(), 0);
        assert_eq!(framer.take_pending(), None);
    }

    #[test]
    fn test_lines_keep_empty_lines() {
        let mut framer = Framer::new(Framing::Lines, 2048);
        assert_eq!(framer.push(b"\n\r\n"), vec!["", ""]);
    }

    #[test]
    fn test_lines_flush_oversized_tail() {
        let mut framer = Framer::new(Framing::Lines, 4);
        assert!(framer.push(b"abc").is_empty());
        assert_eq!(framer.push(b"def"), vec!["abcdef"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_lines_do_not_split_multibyte_characters() {
        let mut framer = Framer::new(Framing::Lines, 2048);
        let text = "héllo\n".as_bytes();
        assert!(framer.push(&text[..2]).is_empty());
        assert_eq!(framer.push(&text[2..]), vec!["héllo"]);
    }

    #[test]
    fn test_chunks_return_each_read_whole() {
        let mut framer = Framer::new(Framing::Chunks, 2048);
        assert_eq!(framer.push(b"one\ntwo\n"), vec!["one\ntwo\n"]);
        assert_eq!(framer.push(b"name:bob"), vec!["name:bob"]);
        assert!(framer.push(b"").is_empty());
    }

    #[test]
    fn test_framing_from_str() {
        assert_eq!("lines".parse::<Framing>(), Ok(Framing::Lines));
        assert_eq!("CHUNKS".parse::<Framing>(), Ok(Framing::Chunks));
        assert!("frames".parse::<Framing>().is_err());
        assert_eq!(Framing::default().to_string(), "lines");
    }
}
