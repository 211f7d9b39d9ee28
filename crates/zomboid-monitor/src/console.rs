//! Remote console trait
//!
//! The detector and scheduler talk to the server through this trait so they
//! can be exercised without a live admin listener.

use async_trait::async_trait;
use tracing::{info, warn};
use zomboid_core::{PlayerCount, Result};
use zomboid_rcon::RconClient;

/// Server command asking the server to evaluate its workshop mods
pub const CHECK_MODS_COMMAND: &str = "checkModsNeedUpdate";

/// Commands the monitor sends to the game server
#[async_trait]
pub trait RemoteConsole: Send + Sync + 'static {
    /// Execute one command and return its reply
    async fn send_command(&self, command: &str) -> Result<String>;

    /// Release the connection, if any
    async fn close(&self) {}

    /// Confirm the server is reachable and accepts our credentials
    async fn verify(&self) -> Result<()> {
        self.send_command("players").await.map(|_| ())
    }

    /// Connected player count. Failures map to [`PlayerCount::Unknown`].
    async fn player_count(&self) -> PlayerCount {
        match self.send_command("players").await {
            Ok(reply) => {
                let count = PlayerCount::parse(&reply);
                if count == PlayerCount::Unknown {
                    warn!("Unrecognized players reply: {:?}", reply);
                }
                count
            }
            Err(e) => {
                warn!("Player count query failed: {}", e);
                PlayerCount::Unknown
            }
        }
    }

    /// Broadcast a chat message to every connected player
    async fn broadcast(&self, message: &str) -> Result<()> {
        self.send_command(&servermsg_command(message)).await?;
        info!("Sent message: {}", message);
        Ok(())
    }

    /// Persist the world
    async fn save(&self) -> Result<()> {
        self.send_command("save").await.map(|_| ())
    }

    /// Ask the server to check its workshop mods. The verdict lands in the
    /// server log, not in the reply.
    async fn request_mod_check(&self) -> Result<()> {
        self.send_command(CHECK_MODS_COMMAND).await.map(|_| ())
    }
}

/// Build a `servermsg` command with the message quoted
pub fn servermsg_command(message: &str) -> String {
    format!("servermsg \"{}\"", message.replace('"', "\\\""))
}

#[async_trait]
impl RemoteConsole for RconClient {
    async fn send_command(&self, command: &str) -> Result<String> {
        RconClient::send_command(self, command).await
    }

    async fn close(&self) {
        RconClient::close(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConsole;

    #[test]
    fn test_servermsg_escapes_quotes() {
        assert_eq!(
            servermsg_command(r#"Restart in "5" minutes"#),
            r#"servermsg "Restart in \"5\" minutes""#
        );
    }

    #[tokio::test]
    async fn test_player_count_sentinel_on_failure() {
        let console = FakeConsole::with_players(None);
        assert_eq!(console.player_count().await, PlayerCount::Unknown);

        let console = FakeConsole::with_players(Some(4));
        assert_eq!(console.player_count().await, PlayerCount::Known(4));
    }
}
