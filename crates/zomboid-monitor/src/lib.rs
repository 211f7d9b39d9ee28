//! Update monitor for Project Zomboid dedicated servers
//!
//! This crate provides:
//! - A persistent version store recording the last observed build per item
//! - Version sources (Steam) and server log evidence for update detection
//! - A restart scheduler that coordinates with connected players
//! - The monitor loop tying detection and scheduling together

pub mod console;
pub mod detector;
pub mod evidence;
pub mod monitor;
pub mod restart;
pub mod scheduler;
pub mod source;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use console::RemoteConsole;
pub use detector::{ModCheck, ModMarker, UpdateDetector, evaluate_mod_check};
pub use evidence::{EvidenceSink, ServerLogSink};
pub use monitor::{CycleReport, Monitor};
pub use restart::{ServiceRestarter, SystemctlRestarter};
pub use scheduler::{ActionKind, Decision, Phase, RestartScheduler};
pub use source::{SteamSource, VersionSource};
pub use store::VersionStore;
