//! Multi-packet reply accumulation
//!
//! The server may split one logical reply across several packets and gives
//! no explicit length for the whole. The reply is considered complete when:
//! - a packet with an empty body arrives (explicit end marker), or
//! - a continuation read times out (no more fragments), or
//! - the fragment cap is reached.
//!
//! A timeout before the first packet is a failure, not an empty reply.

use crate::packet::Packet;
use zomboid_core::{MonitorError, Result};

/// Default cap on packets joined into one reply
pub const DEFAULT_MAX_FRAGMENTS: usize = 10;

/// Outcome of one read attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Packet(Packet),
    Timeout,
}

/// Whether the reader should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

/// Stateful form of the accumulation policy, fed one read at a time
#[derive(Debug)]
pub struct FragmentAccumulator {
    text: String,
    packets: usize,
    max_fragments: usize,
}

impl FragmentAccumulator {
    pub fn new(max_fragments: usize) -> Self {
        Self {
            text: String::new(),
            packets: 0,
            max_fragments: max_fragments.max(1),
        }
    }

    /// Packets consumed so far
    pub fn packets(&self) -> usize {
        self.packets
    }

    /// Whether the next read is the first of this reply
    pub fn awaiting_first(&self) -> bool {
        self.packets == 0
    }

    /// Feed one read outcome
    pub fn push(&mut self, fragment: Fragment) -> Result<Step> {
        match fragment {
            Fragment::Timeout if self.packets == 0 => Err(MonitorError::Connection(
                "timed out waiting for RCON response".to_string(),
            )),
            Fragment::Timeout => Ok(Step::Done),
            Fragment::Packet(packet) => {
                self.packets += 1;
                if packet.body.is_empty() {
                    return Ok(Step::Done);
                }
                self.text.push_str(&packet.body);
                if self.packets >= self.max_fragments {
                    Ok(Step::Done)
                } else {
                    Ok(Step::Continue)
                }
            }
        }
    }

    /// The joined reply
    pub fn finish(self) -> String {
        self.text
    }
}

/// Apply the accumulation policy to a recorded sequence of reads.
///
/// Reads after the point where the policy stops are ignored.
pub fn accumulate_fragments(
    fragments: impl IntoIterator<Item = Fragment>,
    max_fragments: usize,
) -> Result<String> {
    let mut acc = FragmentAccumulator::new(max_fragments);
    for fragment in fragments {
        if acc.push(fragment)? == Step::Done {
            break;
        }
    }
    Ok(acc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::packet_type;

    fn body(text: &str) -> Fragment {
        Fragment::Packet(Packet {
            id: 1,
            packet_type: packet_type::RESPONSE_VALUE,
            body: text.to_string(),
        })
    }

    #[test]
    fn test_joins_fragments_until_empty_marker() {
        let text = accumulate_fragments(
            vec![body("List of server commands:\n"), body("* save\n"), body(""), body("late")],
            DEFAULT_MAX_FRAGMENTS,
        )
        .unwrap();
        assert_eq!(text, "List of server commands:\n* save\n");
    }

    #[test]
    fn test_continuation_timeout_ends_reply() {
        let text = accumulate_fragments(
            vec![body("Players connected (2): "), Fragment::Timeout, body("stray")],
            DEFAULT_MAX_FRAGMENTS,
        )
        .unwrap();
        assert_eq!(text, "Players connected (2): ");
    }

    #[test]
    fn test_first_timeout_is_error() {
        let result = accumulate_fragments(vec![Fragment::Timeout], DEFAULT_MAX_FRAGMENTS);
        assert!(matches!(result, Err(MonitorError::Connection(_))));
    }

    #[test]
    fn test_fragment_cap() {
        let reads = (0..15).map(|i| body(&i.to_string()));
        let text = accumulate_fragments(reads, DEFAULT_MAX_FRAGMENTS).unwrap();
        assert_eq!(text, "0123456789");
    }

    #[test]
    fn test_empty_first_packet_is_empty_reply() {
        let mut acc = FragmentAccumulator::new(DEFAULT_MAX_FRAGMENTS);
        assert!(acc.awaiting_first());
        assert_eq!(acc.push(body("")).unwrap(), Step::Done);
        assert_eq!(acc.packets(), 1);
        assert_eq!(acc.finish(), "");
    }
}
