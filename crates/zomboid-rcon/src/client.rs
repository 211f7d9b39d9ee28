//! RCON client for the Project Zomboid dedicated server
//!
//! One client owns at most one socket. The socket and the request id
//! counter live behind a single async mutex so the poll loop and deferred
//! restart tasks can share the client without interleaving exchanges.

use crate::fragments::{DEFAULT_MAX_FRAGMENTS, Fragment, FragmentAccumulator, Step};
use crate::packet::{FrameDecoder, Packet, PacketType};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};
use zomboid_core::{MonitorError, Result};

/// Connection parameters and read policy
#[derive(Debug, Clone)]
pub struct RconConfig {
    /// `host:port` of the admin listener
    pub address: String,
    /// Shared secret (RCONPassword)
    pub password: String,
    /// Bound on TCP connect and on each write
    pub connect_timeout: Duration,
    /// Wait for the first packet of a reply
    pub first_read_timeout: Duration,
    /// Wait for each continuation packet
    pub fragment_timeout: Duration,
    /// Cap on packets joined into one reply
    pub max_fragments: usize,
}

impl RconConfig {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            connect_timeout: Duration::from_secs(10),
            first_read_timeout: Duration::from_secs(10),
            fragment_timeout: Duration::from_millis(500),
            max_fragments: DEFAULT_MAX_FRAGMENTS,
        }
    }
}

/// Lifecycle of the single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Socket open, password not yet accepted
    Connected,
    Authenticated,
}

struct Connection {
    stream: Option<TcpStream>,
    decoder: FrameDecoder,
    /// Next request id. Restarts at 0 for every new socket.
    next_id: i32,
    state: ConnectionState,
}

impl Connection {
    fn new() -> Self {
        Self {
            stream: None,
            decoder: FrameDecoder::new(),
            next_id: 0,
            state: ConnectionState::Disconnected,
        }
    }

    fn take_id(&mut self) -> i32 {
        let id = self.next_id;
        // Never hand out negative ids; -1 is the auth failure sentinel
        self.next_id = if id == i32::MAX { 0 } else { id + 1 };
        id
    }

    fn teardown(&mut self) {
        self.stream = None;
        self.decoder.clear();
        self.next_id = 0;
        self.state = ConnectionState::Disconnected;
    }

    async fn write_packet(&mut self, packet: &Packet, wait: Duration) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MonitorError::Connection("RCON not connected".to_string()))?;

        let bytes = packet.encode();
        timeout(wait, async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| MonitorError::Connection("RCON send timed out".to_string()))?
        .map_err(|e| MonitorError::Connection(format!("RCON send failed: {}", e)))
    }

    /// Read the next packet, or `None` if `deadline` passes first.
    async fn read_packet(&mut self, deadline: Instant) -> Result<Option<Packet>> {
        let mut chunk = [0u8; 4096];

        loop {
            if let Some(packet) = self.decoder.next_packet()? {
                return Ok(Some(packet));
            }

            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| MonitorError::Connection("RCON not connected".to_string()))?;

            let read = timeout_at(deadline, stream.read(&mut chunk)).await;
            match read {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    return Err(MonitorError::Connection(
                        "RCON connection closed by server".to_string(),
                    ));
                }
                Ok(Ok(n)) => self.decoder.extend(&chunk[..n]),
                Ok(Err(e)) => {
                    return Err(MonitorError::Connection(format!("RCON recv failed: {}", e)));
                }
            }
        }
    }
}

/// RCON client for the dedicated server admin listener
pub struct RconClient {
    config: RconConfig,
    conn: Mutex<Connection>,
}

impl RconClient {
    /// Create a new client. No connection is made until first use.
    pub fn new(config: RconConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(Connection::new()),
        }
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.conn.lock().await.state
    }

    /// Check if connected and authenticated
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Authenticated
    }

    /// Connect and authenticate, replacing any existing connection.
    ///
    /// No retry is performed. On failure the client is left disconnected.
    pub async fn connect(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        self.connect_locked(&mut conn).await
    }

    async fn connect_locked(&self, conn: &mut Connection) -> Result<()> {
        conn.teardown();
        info!("Connecting to RCON at {}", self.config.address);

        let stream = timeout(
            self.config.connect_timeout,
            TcpStream::connect(&self.config.address),
        )
        .await
        .map_err(|_| {
            MonitorError::Connection(format!("RCON connect to {} timed out", self.config.address))
        })?
        .map_err(|e| MonitorError::Connection(format!("RCON connect failed: {}", e)))?;

        stream
            .set_nodelay(true)
            .map_err(|e| MonitorError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

        conn.stream = Some(stream);
        conn.state = ConnectionState::Connected;

        let result = self.authenticate(conn).await;
        if result.is_err() {
            conn.teardown();
        }
        result
    }

    async fn authenticate(&self, conn: &mut Connection) -> Result<()> {
        let auth_id = conn.take_id();
        let auth_packet = Packet::new(auth_id, PacketType::Auth, &self.config.password);
        conn.write_packet(&auth_packet, self.config.connect_timeout).await?;

        let response = conn
            .read_packet(Instant::now() + self.config.first_read_timeout)
            .await?
            .ok_or_else(|| {
                MonitorError::Connection("timed out waiting for RCON auth response".to_string())
            })?;

        if response.is_auth_failure() {
            warn!("RCON authentication rejected by {}", self.config.address);
            return Err(MonitorError::Authentication);
        }

        if response.id != auth_id {
            warn!(
                "RCON auth response ID mismatch: expected {}, got {}",
                auth_id, response.id
            );
        }

        conn.state = ConnectionState::Authenticated;
        info!("RCON authenticated successfully");
        Ok(())
    }

    /// Execute a command and return the joined reply.
    ///
    /// Connects first if needed. Any socket or framing error tears the
    /// connection down before it is returned, so the next call reconnects.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        let mut conn = self.conn.lock().await;

        if conn.state != ConnectionState::Authenticated {
            self.connect_locked(&mut conn).await?;
        }

        let result = self.exchange(&mut conn, command).await;
        if let Err(e) = &result {
            if e.forces_reconnect() {
                warn!("RCON connection dropped: {}", e);
                conn.teardown();
            }
        }
        result
    }

    async fn exchange(&self, conn: &mut Connection, command: &str) -> Result<String> {
        let cmd_id = conn.take_id();
        let packet = Packet::new(cmd_id, PacketType::ExecCommand, command);

        debug!("RCON exec: {}", command);
        conn.write_packet(&packet, self.config.connect_timeout).await?;

        let mut acc = FragmentAccumulator::new(self.config.max_fragments);
        let mut deadline = Instant::now() + self.config.first_read_timeout;
        loop {
            let fragment = match conn.read_packet(deadline).await? {
                // Late fragment of an earlier reply
                Some(packet) if packet.id != cmd_id => {
                    debug!(
                        "Dropping stale RCON packet: expected id {}, got {}",
                        cmd_id, packet.id
                    );
                    continue;
                }
                Some(packet) => Fragment::Packet(packet),
                None => Fragment::Timeout,
            };

            if acc.push(fragment)? == Step::Done {
                break;
            }
            deadline = Instant::now() + self.config.fragment_timeout;
        }

        let packets = acc.packets();
        let response = acc.finish();
        debug!(
            "RCON response ({} packets): {}",
            packets,
            response.chars().take(100).collect::<String>()
        );
        Ok(response)
    }

    /// Disconnect from the server. Safe to call repeatedly.
    pub async fn close(&self) {
        let mut conn = self.conn.lock().await;
        if let Some(mut stream) = conn.stream.take() {
            let _ = stream.shutdown().await;
            info!("RCON disconnected");
        }
        conn.teardown();
    }
}
