//! # zomboid-core
//!
//! Core types shared by the Project Zomboid update monitor crates.
//!
//! This crate provides:
//! - The error taxonomy and its recoverable/fatal classification
//! - The settings model consumed by the monitor and its loader
//! - Version record types persisted by the version store
//! - The player count snapshot returned by the remote console

pub mod error;
pub mod player;
pub mod settings;
pub mod version;

pub use error::{MonitorError, Result};
pub use player::PlayerCount;
pub use settings::{
    LogSettings, MonitorSettings, RestartSettings, ServerSettings, Settings, SteamSettings,
};
pub use version::{VersionKind, VersionRecord};
