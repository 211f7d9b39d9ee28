//! RCON packet framing
//!
//! Implements the Valve Source RCON framing used by the Project Zomboid
//! dedicated server. Protocol reference:
//! https://developer.valvesoftware.com/wiki/Source_RCON_Protocol
//!
//! Wire layout, little-endian:
//!
//! ```text
//! size: i32 | id: i32 | type: i32 | body: [u8] | 0x00 0x00
//! ```
//!
//! `size` counts everything after itself, so `size == 8 + body.len() + 2`.

use zomboid_core::{MonitorError, Result};

/// RCON packet type constants
pub mod packet_type {
    /// Command reply body
    pub const RESPONSE_VALUE: i32 = 0;
    /// Execute command
    pub const EXEC_COMMAND: i32 = 2;
    /// Authentication result. Shares its value with `EXEC_COMMAND`.
    pub const AUTH_RESPONSE: i32 = 2;
    /// Authenticate with password
    pub const AUTH: i32 = 3;
}

/// Request id the server uses to signal a rejected password
pub const AUTH_FAILED_ID: i32 = -1;

/// Largest accepted frame, measured like the `size` field
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Smallest legal `size`: id + type + two terminator bytes
const MIN_FRAME_SIZE: usize = 4 + 4 + 2;

/// RCON packet types for creating packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Execute a command
    ExecCommand,
    /// Authenticate with password
    Auth,
}

impl PacketType {
    /// Get the wire protocol value
    pub fn as_i32(self) -> i32 {
        match self {
            PacketType::ExecCommand => packet_type::EXEC_COMMAND,
            PacketType::Auth => packet_type::AUTH,
        }
    }
}

/// A single RCON packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub packet_type: i32,
    pub body: String,
}

impl Packet {
    /// Create a new outgoing packet
    pub fn new(id: i32, packet_type: PacketType, body: impl Into<String>) -> Self {
        Self {
            id,
            packet_type: packet_type.as_i32(),
            body: body.into(),
        }
    }

    /// Whether this is the server's password rejection
    pub fn is_auth_failure(&self) -> bool {
        self.id == AUTH_FAILED_ID
    }

    /// Serialize packet to bytes, size prefix included
    pub fn encode(&self) -> Vec<u8> {
        let body_bytes = self.body.as_bytes();
        let size = 4 + 4 + body_bytes.len() + 2;

        let mut buf = Vec::with_capacity(4 + size);
        buf.extend_from_slice(&(size as i32).to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.packet_type.to_le_bytes());
        buf.extend_from_slice(body_bytes);
        buf.push(0); // Body terminator
        buf.push(0); // Packet terminator

        buf
    }

    /// Parse one frame, excluding the size prefix
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < MIN_FRAME_SIZE {
            return Err(MonitorError::Protocol(format!(
                "RCON frame too short: {} bytes",
                frame.len()
            )));
        }

        let (body, terminator) = frame[8..].split_at(frame.len() - MIN_FRAME_SIZE);
        if terminator != [0, 0] {
            return Err(MonitorError::Protocol(
                "RCON frame missing null terminator".to_string(),
            ));
        }

        let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let packet_type = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);

        Ok(Self {
            id,
            packet_type,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

/// Incremental decoder turning a byte stream into typed packets.
///
/// Bytes are appended as they arrive; complete frames are popped in order.
/// Partial frames stay buffered across reads, so a read that times out
/// halfway through a frame does not desynchronize the stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered bytes
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Pop the next complete packet, if one is buffered
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let size = i32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if size < MIN_FRAME_SIZE as i32 || size as usize > MAX_FRAME_SIZE {
            return Err(MonitorError::Protocol(format!(
                "RCON frame size out of range: {}",
                size
            )));
        }

        let size = size as usize;
        if self.buf.len() < 4 + size {
            return Ok(None);
        }

        let packet = Packet::decode(&self.buf[4..4 + size]);
        self.buf.drain(..4 + size);
        packet.map(Some)
    }
}
