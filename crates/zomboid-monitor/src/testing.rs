//! In-memory collaborators for unit tests

use crate::console::RemoteConsole;
use crate::evidence::EvidenceSink;
use crate::restart::ServiceRestarter;
use crate::source::VersionSource;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use zomboid_core::{MonitorError, Result};

/// Console that records every command and answers from a script
pub struct FakeConsole {
    players: Mutex<Option<u32>>,
    unreachable: AtomicBool,
    pub commands: Mutex<Vec<String>>,
}

impl FakeConsole {
    pub fn with_players(players: Option<u32>) -> Self {
        Self {
            players: Mutex::new(players),
            unreachable: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn set_players(&self, players: Option<u32>) {
        *self.players.lock().unwrap() = players;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Messages sent with `servermsg`
    pub fn broadcasts(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with("servermsg"))
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| *c == command).count()
    }
}

#[async_trait]
impl RemoteConsole for FakeConsole {
    async fn send_command(&self, command: &str) -> Result<String> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MonitorError::Connection("connection refused".into()));
        }
        self.commands.lock().unwrap().push(command.to_string());
        match command {
            "players" => match *self.players.lock().unwrap() {
                Some(n) => Ok(format!("Players connected ({}): ", n)),
                None => Err(MonitorError::Connection("reset by peer".into())),
            },
            "save" => Ok("Saving...".into()),
            _ => Ok(String::new()),
        }
    }
}

/// Version source answering from fixed tables
#[derive(Default)]
pub struct FakeSource {
    pub builds: Mutex<HashMap<String, String>>,
    pub workshop: Mutex<HashMap<String, i64>>,
    store_failure: AtomicBool,
    build_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_build(app_id: &str, build: &str) -> Self {
        let source = Self::default();
        source.set_build(app_id, build);
        source
    }

    pub fn set_build(&self, app_id: &str, build: &str) {
        self.builds
            .lock()
            .unwrap()
            .insert(app_id.to_string(), build.to_string());
    }

    /// Fail build lookups with a non-recoverable error
    pub fn set_store_failure(&self, fail: bool) {
        self.store_failure.store(fail, Ordering::SeqCst);
    }

    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }

    pub fn set_workshop(&self, item_id: &str, updated: i64) {
        self.workshop
            .lock()
            .unwrap()
            .insert(item_id.to_string(), updated);
    }
}

#[async_trait]
impl VersionSource for FakeSource {
    async fn game_build(&self, app_id: &str, _branch: &str) -> Result<String> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        if self.store_failure.load(Ordering::SeqCst) {
            return Err(MonitorError::Store("database is locked".into()));
        }
        self.builds
            .lock()
            .unwrap()
            .get(app_id)
            .cloned()
            .ok_or_else(|| MonitorError::RemoteSource(format!("no build for {}", app_id)))
    }

    async fn workshop_updated(&self, item_id: &str) -> Result<i64> {
        self.workshop
            .lock()
            .unwrap()
            .get(item_id)
            .copied()
            .ok_or_else(|| MonitorError::RemoteSource(format!("no item {}", item_id)))
    }
}

/// Log sink returning scripted snapshots in order, repeating the last one
pub struct FakeSink {
    snapshots: Mutex<VecDeque<Option<String>>>,
    pub reads: AtomicUsize,
}

impl FakeSink {
    pub fn new(snapshots: Vec<Option<&str>>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into_iter().map(|s| s.map(String::from)).collect()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceSink for FakeSink {
    async fn recent_text(&self) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut snapshots = self.snapshots.lock().unwrap();
        let current = if snapshots.len() > 1 {
            snapshots.pop_front().flatten()
        } else {
            snapshots.front().cloned().flatten()
        };
        current.ok_or_else(|| MonitorError::RemoteSource("no server log found".into()))
    }
}

/// Restarter counting invocations
#[derive(Default)]
pub struct FakeRestarter {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeRestarter {
    pub fn failing() -> Self {
        let restarter = Self::default();
        restarter.fail.store(true, Ordering::SeqCst);
        restarter
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceRestarter for FakeRestarter {
    async fn restart(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(MonitorError::Execution("systemctl exited with status 1".into()))
        } else {
            Ok(())
        }
    }
}
