//! Terminal input handling for the chat client

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// What a line typed by the user asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// `quit` or `exit`, in any case
    Quit,
    Send(String),
    /// Blank line, nothing to send
    Skip,
}

/// Interprets one line of user input.
pub fn parse_input(line: &str) -> UserCommand {
    let text = line.trim_end_matches(['\r', '\n']);
    let command = text.trim();

    if command.is_empty() {
        UserCommand::Skip
    } else if command.eq_ignore_ascii_case("quit") || command.eq_ignore_ascii_case("exit") {
        UserCommand::Quit
    } else {
        UserCommand::Send(text.to_string())
    }
}

/// Asks for a display name until a non-empty one is entered.
///
/// Returns None if input ends first.
pub async fn prompt_name<I, O>(input: &mut I, output: &mut O) -> std::io::Result<Option<String>>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        output.write_all(b"Enter your name: ").await?;
        output.flush().await?;

        line.clear();
        if input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        let name = line.trim();
        if !name.is_empty() {
            return Ok(Some(name.to_string()));
        }
    }
}
