//! Player-aware restart scheduling
//!
//! States: `Idle -> Armed -> Executing -> Idle`, or `Idle -> Executing` when
//! nobody is online.
//!
//! The phase is the single coordination point between the poll loop and the
//! deferred timer tasks. It is set to `Armed` before any timer is spawned and
//! only the execution path returns it to `Idle`, so overlapping detections
//! cannot arm a second countdown or trigger a second restart.

use crate::console::RemoteConsole;
use crate::restart::ServiceRestarter;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{error, info, warn};
use zomboid_core::{PlayerCount, RestartSettings, Result};

const RESTART_NOW_MESSAGE: &str = "Server restarting now for updates...";

/// Scheduler phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Countdown running, warnings pending
    Armed,
    /// Save and restart in progress
    Executing,
}

/// Deferred action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Short-lead warning broadcast
    FinalWarning,
    /// Final notice, save, restart
    Restart,
}

/// What an update signal led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Player count unknown; nothing done
    Aborted,
    /// Nobody online; restart ran in this call
    RestartedNow,
    /// Countdown started
    Armed,
    /// A countdown or restart was already in progress
    AlreadyArmed,
}

struct ScheduledAction {
    kind: ActionKind,
    fire_at: Instant,
    handle: AbortHandle,
}

struct ScheduleState {
    phase: Phase,
    armed_at: Option<Instant>,
    actions: Vec<ScheduledAction>,
}

struct Inner {
    console: Arc<dyn RemoteConsole>,
    restarter: Arc<dyn ServiceRestarter>,
    settings: RestartSettings,
    state: Mutex<ScheduleState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ScheduleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `from -> to` atomically. False if the phase was not `from`.
    fn transition(&self, from: Phase, to: Phase) -> bool {
        let mut state = self.state();
        if state.phase != from {
            return false;
        }
        state.phase = to;
        if to == Phase::Armed {
            state.armed_at = Some(Instant::now());
        }
        true
    }

    fn on_execution_complete(&self) {
        let mut state = self.state();
        for action in state.actions.drain(..) {
            // The restart action is the task running this code
            if action.kind != ActionKind::Restart {
                action.handle.abort();
            }
        }
        state.phase = Phase::Idle;
        state.armed_at = None;
    }

    /// Run the restart sequence and return to `Idle` whatever the outcome
    async fn execute(&self) {
        if let Err(e) = self.restart_sequence().await {
            error!("Error restarting server: {}", e);
        }
        self.on_execution_complete();
    }

    async fn restart_sequence(&self) -> Result<()> {
        if let Err(e) = self.console.broadcast(RESTART_NOW_MESSAGE).await {
            warn!("Could not send restart notice: {}", e);
        }
        sleep(self.settings.notice_pause()).await;

        if let Err(e) = self.console.save().await {
            warn!("World save failed, restarting anyway: {}", e);
        }
        sleep(self.settings.save_settle()).await;

        self.console.close().await;
        self.restarter.restart().await
    }

    fn initial_message(&self) -> String {
        format!(
            "SERVER UPDATE AVAILABLE! Server will restart in {}. Please finish your current activities.",
            minutes(self.settings.lead_minutes)
        )
    }

    fn final_warning_message(&self) -> String {
        format!(
            "SERVER RESTART IN {}! Please save your progress and find a safe location!",
            minutes(self.settings.final_warning_minutes).to_uppercase()
        )
    }
}

fn minutes(n: u64) -> String {
    if n == 1 {
        "1 minute".to_string()
    } else {
        format!("{} minutes", n)
    }
}

/// Owns the restart countdown. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RestartScheduler {
    inner: Arc<Inner>,
}

impl RestartScheduler {
    pub fn new(
        console: Arc<dyn RemoteConsole>,
        restarter: Arc<dyn ServiceRestarter>,
        settings: RestartSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                console,
                restarter,
                settings,
                state: Mutex::new(ScheduleState {
                    phase: Phase::Idle,
                    armed_at: None,
                    actions: Vec::new(),
                }),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.state().phase
    }

    pub fn armed_at(&self) -> Option<Instant> {
        self.inner.state().armed_at
    }

    /// Deferred actions not yet fired, in firing order
    pub fn pending(&self) -> Vec<(ActionKind, Instant)> {
        let state = self.inner.state();
        let mut pending: Vec<_> = state
            .actions
            .iter()
            .filter(|a| !a.handle.is_finished())
            .map(|a| (a.kind, a.fire_at))
            .collect();
        pending.sort_by_key(|(_, at)| *at);
        pending
    }

    /// Arm the countdown. False if already armed or executing.
    pub fn try_arm(&self) -> bool {
        self.inner.transition(Phase::Idle, Phase::Armed)
    }

    /// Return to `Idle` after a restart attempt, successful or not
    pub fn on_execution_complete(&self) {
        self.inner.on_execution_complete();
    }

    /// Decide what to do about a detected update.
    ///
    /// Queries a fresh player count: unknown aborts, zero restarts now,
    /// anything else arms a countdown with warnings.
    pub async fn handle_update(&self) -> Decision {
        match self.inner.console.player_count().await {
            PlayerCount::Unknown => {
                error!("Could not determine player count, skipping restart");
                Decision::Aborted
            }
            PlayerCount::Known(0) => {
                if !self.inner.transition(Phase::Idle, Phase::Executing) {
                    info!("Restart already in progress, skipping...");
                    return Decision::AlreadyArmed;
                }
                info!("No players connected, restarting server immediately");
                self.inner.execute().await;
                Decision::RestartedNow
            }
            PlayerCount::Known(players) => {
                if !self.try_arm() {
                    info!("Restart already scheduled, skipping...");
                    return Decision::AlreadyArmed;
                }
                info!(
                    "{} players connected, scheduling restart with warnings",
                    players
                );
                self.arm_countdown().await;
                Decision::Armed
            }
        }
    }

    async fn arm_countdown(&self) {
        let settings = &self.inner.settings;
        let armed_at = self.armed_at().unwrap_or_else(Instant::now);

        if let Err(e) = self.inner.console.broadcast(&self.inner.initial_message()).await {
            warn!("Could not send restart warning: {}", e);
        }

        let warning = self.spawn_action(
            ActionKind::FinalWarning,
            armed_at + settings.final_warning_at(),
        );
        let restart = self.spawn_action(ActionKind::Restart, armed_at + settings.lead());
        self.inner.state().actions.extend([warning, restart]);

        info!(
            "Scheduled restart in {} with warnings",
            minutes(settings.lead_minutes)
        );
    }

    fn spawn_action(&self, kind: ActionKind, fire_at: Instant) -> ScheduledAction {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            sleep_until(fire_at).await;
            match kind {
                ActionKind::FinalWarning => {
                    let message = inner.final_warning_message();
                    if let Err(e) = inner.console.broadcast(&message).await {
                        warn!("Could not send final warning: {}", e);
                    }
                }
                ActionKind::Restart => {
                    if inner.transition(Phase::Armed, Phase::Executing) {
                        inner.execute().await;
                    } else {
                        warn!("Restart timer fired while not armed, ignoring");
                    }
                }
            }
        });

        ScheduledAction {
            kind,
            fire_at,
            handle: task.abort_handle(),
        }
    }

    /// Abort an armed countdown. Has no effect once execution has begun.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state();
        if state.phase != Phase::Armed {
            return false;
        }
        for action in state.actions.drain(..) {
            action.handle.abort();
        }
        state.phase = Phase::Idle;
        state.armed_at = None;
        info!("Pending restart cancelled");
        true
    }
}
