//! Player count snapshot

use std::fmt;

/// Connected player count as reported by the server.
///
/// Never cached: every decision queries a fresh snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCount {
    /// The query failed or the reply could not be parsed
    Unknown,
    /// Number of players currently connected
    Known(u32),
}

impl PlayerCount {
    /// Parse the reply to the `players` command.
    ///
    /// The server answers `Players connected (N): ...`. A reply without that
    /// header but mentioning no players counts as zero; anything else is
    /// unknown.
    pub fn parse(reply: &str) -> Self {
        const HEADER: &str = "Players connected (";

        if let Some(start) = reply.find(HEADER) {
            let rest = &reply[start + HEADER.len()..];
            return rest
                .split(')')
                .next()
                .and_then(|n| n.trim().parse().ok())
                .map(PlayerCount::Known)
                .unwrap_or(PlayerCount::Unknown);
        }

        if reply.to_ascii_lowercase().contains("no players") {
            PlayerCount::Known(0)
        } else {
            PlayerCount::Unknown
        }
    }
}

impl fmt::Display for PlayerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerCount::Unknown => write!(f, "unknown"),
            PlayerCount::Known(n) => write!(f, "{}", n),
        }
    }
}
