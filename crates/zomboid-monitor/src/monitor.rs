//! Monitor loop
//!
//! Runs detection on a fixed interval and hands detected updates to the
//! restart scheduler. The loop's cadence is the only retry mechanism:
//! recoverable failures turn into "no signal" for the cycle, anything else
//! fails the cycle and the next one waits the interval plus a cooldown.

use crate::console::RemoteConsole;
use crate::detector::UpdateDetector;
use crate::scheduler::{Decision, Phase, RestartScheduler};
use std::future::Future;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span, warn};
use zomboid_core::{MonitorSettings, Result};

/// What one cycle observed and decided
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub game_updated: bool,
    pub mods_updated: bool,
    /// Set when an update was handed to the scheduler
    pub decision: Option<Decision>,
}

impl CycleReport {
    pub fn update_detected(&self) -> bool {
        self.game_updated || self.mods_updated
    }
}

/// Convert a recoverable detection failure into "no update"
fn absorb(step: &str, result: Result<bool>) -> Result<bool> {
    match result {
        Ok(updated) => Ok(updated),
        Err(e) if e.is_recoverable() => {
            warn!("{} failed: {}", step, e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

pub struct Monitor {
    detector: UpdateDetector,
    scheduler: RestartScheduler,
    console: Arc<dyn RemoteConsole>,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(
        detector: UpdateDetector,
        scheduler: RestartScheduler,
        console: Arc<dyn RemoteConsole>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            detector,
            scheduler,
            console,
            settings,
        }
    }

    pub fn scheduler(&self) -> &RestartScheduler {
        &self.scheduler
    }

    pub fn detector(&self) -> &UpdateDetector {
        &self.detector
    }

    /// Run every enabled check once and act on the result
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        if self.settings.check_game {
            report.game_updated =
                absorb("Game build check", self.detector.check_game_build().await)?;
        }
        if self.detector.has_workshop_items() {
            report.mods_updated |=
                absorb("Workshop check", self.detector.check_workshop_items().await)?;
        }
        if self.settings.check_mods {
            report.mods_updated |= absorb("Server mod check", self.detector.check_mods().await)?;
        }

        if report.update_detected() {
            info!("Update detected!");
            report.decision = Some(self.scheduler.handle_update().await);
        }

        Ok(report)
    }

    /// Run until `shutdown` resolves.
    ///
    /// Fails without running any cycle if the server cannot be reached at
    /// startup.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Starting Project Zomboid update monitor...");

        if let Err(e) = self.console.verify().await {
            error!("Server not reachable, monitor not started: {}", e);
            return Err(e);
        }
        info!("Server reachable, checking every {:?}", self.settings.check_interval());

        tokio::pin!(shutdown);
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            let span = info_span!("cycle", n = cycle);

            let pause = match self.run_cycle().instrument(span).await {
                Ok(report) => {
                    debug!(?report, "Cycle {} complete", cycle);
                    self.settings.check_interval()
                }
                Err(e) => {
                    error!("Error in monitor loop (cycle {}): {}", cycle, e);
                    self.settings.retry_delay()
                }
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Monitor stopped");
                    break;
                }
                _ = sleep(pause) => {}
            }
        }

        if self.scheduler.phase() == Phase::Armed {
            warn!("Stopping with a restart countdown armed");
            self.scheduler.cancel();
        }
        self.console.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::CHECK_MODS_COMMAND;
    use crate::store::VersionStore;
    use crate::testing::{FakeConsole, FakeRestarter, FakeSink, FakeSource};
    use std::time::Duration;
    use tokio_test::assert_ok;
    use zomboid_core::{MonitorError, RestartSettings, SteamSettings, VersionKind};

    const APP: &str = "108600";

    struct Harness {
        console: Arc<FakeConsole>,
        source: Arc<FakeSource>,
        restarter: Arc<FakeRestarter>,
        monitor: Monitor,
    }

    fn harness(players: Option<u32>, sink: FakeSink, settings: MonitorSettings) -> Harness {
        let console = Arc::new(FakeConsole::with_players(players));
        let source = Arc::new(FakeSource::default());
        let restarter = Arc::new(FakeRestarter::default());

        let detector = UpdateDetector::new(
            VersionStore::open_in_memory().unwrap(),
            source.clone(),
            console.clone(),
            Arc::new(sink),
            SteamSettings::default(),
            Duration::from_secs(8),
        );
        let scheduler =
            RestartScheduler::new(console.clone(), restarter.clone(), RestartSettings::default());
        let monitor = Monitor::new(detector, scheduler, console.clone(), settings);

        Harness {
            console,
            source,
            restarter,
            monitor,
        }
    }

    fn game_only() -> MonitorSettings {
        MonitorSettings {
            check_mods: false,
            ..MonitorSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_change_restarts_empty_server() {
        let mut h = harness(Some(0), FakeSink::new(vec![None]), game_only());
        h.monitor
            .detector()
            .store()
            .upsert(VersionKind::Game, APP, "100")
            .unwrap();
        h.source.set_build(APP, "101");

        let report = h.monitor.run_cycle().await.unwrap();

        assert!(report.game_updated);
        assert_eq!(report.decision, Some(Decision::RestartedNow));
        assert_eq!(h.restarter.calls(), 1);
        let record = h
            .monitor
            .detector()
            .store()
            .get(VersionKind::Game, APP)
            .unwrap()
            .unwrap();
        assert_eq!(record.build_id, "101");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_players_aborts_restart() {
        let mut h = harness(None, FakeSink::new(vec![None]), game_only());
        h.monitor
            .detector()
            .store()
            .upsert(VersionKind::Game, APP, "100")
            .unwrap();
        h.source.set_build(APP, "101");

        let report = h.monitor.run_cycle().await.unwrap();

        assert_eq!(report.decision, Some(Decision::Aborted));
        assert_eq!(h.monitor.scheduler().phase(), Phase::Idle);
        assert!(h.monitor.scheduler().pending().is_empty());
        assert_eq!(h.restarter.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mod_check_up_to_date_is_quiet() {
        let mut h = harness(
            Some(2),
            FakeSink::new(vec![Some(
                "LOG  : General     , 1714553601000> CheckModsNeedUpdate: Mods updated.\n",
            )]),
            MonitorSettings {
                check_game: false,
                ..MonitorSettings::default()
            },
        );

        let report = h.monitor.run_cycle().await.unwrap();
        assert_eq!(report, CycleReport::default());
        assert_eq!(h.console.count(CHECK_MODS_COMMAND), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_outage_is_not_a_cycle_failure() {
        let mut h = harness(Some(0), FakeSink::new(vec![None]), game_only());

        let report = h.monitor.run_cycle().await.unwrap();
        assert!(!report.update_detected());
        assert_eq!(report.decision, None);
    }

    #[test]
    fn test_absorb_classification() {
        assert!(!absorb("x", Err(MonitorError::Connection("eof".into()))).unwrap());
        assert!(absorb("x", Ok(true)).unwrap());
        assert!(matches!(
            absorb("x", Err(MonitorError::Store("disk full".into()))),
            Err(MonitorError::Store(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_server_does_not_start() {
        let h = harness(Some(0), FakeSink::new(vec![None]), MonitorSettings::default());
        h.console.set_unreachable(true);

        let result = h.monitor.run(std::future::pending()).await;
        assert!(matches!(result, Err(MonitorError::Connection(_))));
        assert!(h.console.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_on_interval_until_stopped() {
        let h = harness(Some(0), FakeSink::new(vec![None]), MonitorSettings::default());
        let console = h.console.clone();

        // Cycles start at 0s, 308s and 616s (each mod check settles for 8s)
        assert_ok!(h.monitor.run(sleep(Duration::from_secs(650))).await);

        assert_eq!(console.count(CHECK_MODS_COMMAND), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_waits_longer_than_interval() {
        let h = harness(Some(0), FakeSink::new(vec![None]), game_only());
        h.source.set_store_failure(true);
        let source = h.source.clone();

        // Failed cycles start at 0s and 360s; a 300s cadence would reach a third
        assert_ok!(h.monitor.run(sleep(Duration::from_secs(650))).await);

        assert_eq!(source.build_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_fails_cycle() {
        let mut h = harness(Some(0), FakeSink::new(vec![None]), game_only());
        h.source.set_store_failure(true);

        let result = h.monitor.run_cycle().await;
        assert!(matches!(result, Err(MonitorError::Store(_))));
        assert_eq!(h.restarter.calls(), 0);
    }
}
