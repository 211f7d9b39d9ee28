//! Source RCON client for the Project Zomboid admin listener
//!
//! - **Framing**: [`Packet`] encoding and the incremental [`FrameDecoder`]
//! - **Fragments**: the [`FragmentAccumulator`] policy that joins a reply
//!   split across several packets
//! - **Client**: [`RconClient`], an authenticated connection with lazy
//!   reconnect, shared between the poll loop and deferred restart tasks

mod client;
mod fragments;
mod packet;

pub use client::{ConnectionState, RconClient, RconConfig};
pub use fragments::{Fragment, FragmentAccumulator, Step, accumulate_fragments};
pub use packet::{FrameDecoder, MAX_FRAME_SIZE, Packet, PacketType, packet_type};
