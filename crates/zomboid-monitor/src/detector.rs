//! Update detection
//!
//! Three independent checks:
//! - **Game build**: compare the published build id with the stored one
//! - **Workshop items**: compare each item's update time with the stored one
//! - **Server mod check**: ask the server to evaluate its mods and read the
//!   verdict back from the server log
//!
//! For the stored comparisons, the first observation of an item is recorded
//! and reported as "no update" so a fresh database never triggers a restart.

use crate::console::RemoteConsole;
use crate::evidence::EvidenceSink;
use crate::source::VersionSource;
use crate::store::VersionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use zomboid_core::{Result, SteamSettings, VersionKind};

/// Log prefix of the server's mod check verdict lines
const MOD_CHECK_PREFIX: &str = "CheckModsNeedUpdate:";

/// Extra scans allowed while the server reports it is still checking
const STILL_CHECKING_RETRIES: usize = 1;

/// Verdict carried by a `CheckModsNeedUpdate:` log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModMarker {
    StillChecking,
    UpToDate,
    NeedsUpdate,
}

impl ModMarker {
    fn classify(line: &str) -> Option<Self> {
        let start = line.find(MOD_CHECK_PREFIX)? + MOD_CHECK_PREFIX.len();
        let verdict = line[start..].trim().to_ascii_lowercase();

        if verdict.contains("checking") {
            Some(ModMarker::StillChecking)
        } else if verdict.starts_with("mods updated") {
            Some(ModMarker::UpToDate)
        } else if verdict.contains("need update") || verdict.contains("needs update") {
            Some(ModMarker::NeedsUpdate)
        } else {
            None
        }
    }
}

/// Result of scanning a log window for mod check evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModCheck {
    /// Chronologically last verdict line in the window
    pub marker: Option<ModMarker>,
    /// Some line reports a specific workshop item needing an update
    pub item_needs_update: bool,
}

impl ModCheck {
    pub fn needs_update(&self) -> bool {
        self.item_needs_update || self.marker == Some(ModMarker::NeedsUpdate)
    }
}

fn is_item_needs_update(line: &str) -> bool {
    let line = line.to_ascii_lowercase();
    line.contains("needs update") || line.contains("needsupdate")
}

/// Scan log text for mod check evidence.
///
/// The window can span several check attempts, so only the last verdict
/// line counts. Any item-level "needs update" line forces an update.
pub fn evaluate_mod_check(text: &str) -> ModCheck {
    let mut check = ModCheck::default();
    for line in text.lines() {
        if let Some(marker) = ModMarker::classify(line) {
            check.marker = Some(marker);
        }
        if is_item_needs_update(line) {
            check.item_needs_update = true;
        }
    }
    check
}

/// Compares published versions against the store and reads server evidence
pub struct UpdateDetector {
    store: VersionStore,
    source: Arc<dyn VersionSource>,
    console: Arc<dyn RemoteConsole>,
    sink: Arc<dyn EvidenceSink>,
    steam: SteamSettings,
    settle: Duration,
}

impl UpdateDetector {
    pub fn new(
        store: VersionStore,
        source: Arc<dyn VersionSource>,
        console: Arc<dyn RemoteConsole>,
        sink: Arc<dyn EvidenceSink>,
        steam: SteamSettings,
        settle: Duration,
    ) -> Self {
        Self {
            store,
            source,
            console,
            sink,
            steam,
            settle,
        }
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    pub fn has_workshop_items(&self) -> bool {
        self.workshop_items().next().is_some()
    }

    fn workshop_items(&self) -> impl Iterator<Item = &str> {
        self.steam
            .workshop_items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Whether the published server build differs from the stored one
    pub async fn check_game_build(&self) -> Result<bool> {
        let app_id = self.steam.app_id.as_str();
        let build = self.source.game_build(app_id, &self.steam.branch).await?;

        match self.store.get(VersionKind::Game, app_id)? {
            None => {
                info!("Recording initial build {} for app {}", build, app_id);
                self.store.upsert(VersionKind::Game, app_id, &build)?;
                Ok(false)
            }
            Some(record) if record.build_id != build => {
                info!("Game update detected! Build {} -> {}", record.build_id, build);
                self.store.upsert(VersionKind::Game, app_id, &build)?;
                Ok(true)
            }
            Some(_) => {
                debug!("Build {} unchanged", build);
                self.store.touch(VersionKind::Game, app_id)?;
                Ok(false)
            }
        }
    }

    /// Whether any tracked workshop item was updated since last seen.
    ///
    /// Every item is checked and recorded; one unreachable item does not
    /// hide updates to the others.
    pub async fn check_workshop_items(&self) -> Result<bool> {
        let mut updated = false;

        for item_id in self.workshop_items() {
            let stamp = match self.source.workshop_updated(item_id).await {
                Ok(stamp) => stamp,
                Err(e) if e.is_recoverable() => {
                    warn!("Workshop item {} lookup failed: {}", item_id, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.store.get(VersionKind::Mod, item_id)? {
                None => {
                    info!("Tracking workshop item {} (updated {})", item_id, stamp);
                    self.store
                        .upsert(VersionKind::Mod, item_id, &stamp.to_string())?;
                }
                Some(record) => {
                    let previous = record.build_id.parse::<i64>().ok();
                    if previous.is_none_or(|p| stamp > p) {
                        info!("Mod update detected! Item ID: {}", item_id);
                        self.store
                            .upsert(VersionKind::Mod, item_id, &stamp.to_string())?;
                        updated = true;
                    } else {
                        self.store.touch(VersionKind::Mod, item_id)?;
                    }
                }
            }
        }

        Ok(updated)
    }

    /// Ask the server whether its mods are current and read the verdict
    /// from its log.
    ///
    /// An unavailable log degrades to "no update" with a warning.
    pub async fn check_mods(&self) -> Result<bool> {
        self.console.request_mod_check().await?;

        for attempt in 0..=STILL_CHECKING_RETRIES {
            sleep(self.settle).await;

            let text = match self.sink.recent_text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Server log unavailable, skipping mod check: {}", e);
                    return Ok(false);
                }
            };

            let check = evaluate_mod_check(&text);
            if check.item_needs_update {
                info!("Server log reports a workshop item needing update");
                return Ok(true);
            }

            match check.marker {
                Some(ModMarker::NeedsUpdate) => {
                    info!("Server reports mods need update");
                    return Ok(true);
                }
                Some(ModMarker::UpToDate) => {
                    debug!("Server reports mods up to date");
                    return Ok(false);
                }
                Some(ModMarker::StillChecking) if attempt < STILL_CHECKING_RETRIES => {
                    debug!("Server still checking mods, waiting {:?}", self.settle);
                }
                _ => {
                    info!("Mod check inconclusive, assuming no update");
                    return Ok(false);
                }
            }
        }

        Ok(false)
    }
}
