//! Frame commands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A STOMP frame command.
///
/// The set is closed: every command has an entry in [`Command::ALL`] and an
/// exhaustive mapping in [`Command::as_str`], so the parser and formatter
/// cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Send,
    Message,
    Error,
    Connect,
    Connected,
    Disconnect,
    Receipt,
    Subscribe,
    Unsubscribe,
}

impl Command {
    /// Every command, in wire-token matching order.
    pub const ALL: [Command; 9] = [
        Command::Send,
        Command::Message,
        Command::Error,
        Command::Connect,
        Command::Connected,
        Command::Disconnect,
        Command::Receipt,
        Command::Subscribe,
        Command::Unsubscribe,
    ];

    /// Returns the wire token for this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Error => "ERROR",
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Disconnect => "DISCONNECT",
            Command::Receipt => "RECEIPT",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
        }
    }

    /// Looks up a command by its exact wire token.
    pub fn from_token(token: &[u8]) -> Option<Command> {
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.as_str().as_bytes() == token)
    }

    /// Returns whether frames with this command may carry a body.
    pub fn allows_body(&self) -> bool {
        matches!(self, Command::Send | Command::Message | Command::Error)
    }

    /// Returns whether `bytes` could still grow into `<TOKEN><EOL>` for some command.
    pub(crate) fn is_token_prefix(bytes: &[u8]) -> bool {
        Self::ALL.iter().any(|cmd| {
            let token = cmd.as_str().as_bytes();
            if bytes.len() <= token.len() {
                token.starts_with(bytes)
            } else {
                // Token already complete; only a CR may follow before the LF.
                bytes.starts_with(token) && &bytes[token.len()..] == b"\r"
            }
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
