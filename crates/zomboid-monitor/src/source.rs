//! Remote version sources
//!
//! The server build is read from the public SteamCMD info mirror, keyed by
//! app id. Workshop items are read from the Steam Web API.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use zomboid_core::{MonitorError, Result};

const STEAMCMD_INFO_URL: &str = "https://api.steamcmd.net/v1/info";
const WORKSHOP_DETAILS_URL: &str =
    "https://api.steampowered.com/ISteamRemoteStorage/GetPublishedFileDetails/v1/";

/// Where current versions are published
#[async_trait]
pub trait VersionSource: Send + Sync + 'static {
    /// Current build id of `app_id` on `branch`
    async fn game_build(&self, app_id: &str, branch: &str) -> Result<String>;

    /// Unix seconds of the last update to a workshop item
    async fn workshop_updated(&self, item_id: &str) -> Result<i64>;
}

fn source_err(err: reqwest::Error) -> MonitorError {
    MonitorError::RemoteSource(err.to_string())
}

/// Steam-backed version source
pub struct SteamSource {
    http: reqwest::Client,
    info_url: String,
    workshop_url: String,
}

impl SteamSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_endpoints(timeout, STEAMCMD_INFO_URL, WORKSHOP_DETAILS_URL)
    }

    /// Use alternative endpoints, e.g. a caching proxy
    pub fn with_endpoints(
        timeout: Duration,
        info_url: impl Into<String>,
        workshop_url: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pz-update-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(source_err)?;
        Ok(Self {
            http,
            info_url: info_url.into(),
            workshop_url: workshop_url.into(),
        })
    }
}

#[async_trait]
impl VersionSource for SteamSource {
    async fn game_build(&self, app_id: &str, branch: &str) -> Result<String> {
        let url = format!("{}/{}", self.info_url, app_id);
        debug!("Fetching build info from {}", url);

        let doc: Value = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(source_err)?
            .json()
            .await
            .map_err(source_err)?;

        parse_build_id(&doc, app_id, branch)
    }

    async fn workshop_updated(&self, item_id: &str) -> Result<i64> {
        let form = [("itemcount", "1"), ("publishedfileids[0]", item_id)];

        let doc: Value = self
            .http
            .post(&self.workshop_url)
            .form(&form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(source_err)?
            .json()
            .await
            .map_err(source_err)?;

        parse_time_updated(&doc)
    }
}

/// Extract `data.<app_id>.depots.branches.<branch>.buildid`
pub fn parse_build_id(doc: &Value, app_id: &str, branch: &str) -> Result<String> {
    let pointer = format!("/data/{}/depots/branches/{}/buildid", app_id, branch);
    match doc.pointer(&pointer) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(MonitorError::RemoteSource(format!(
            "build id missing at {}",
            pointer
        ))),
    }
}

/// Extract `response.publishedfiledetails[0].time_updated`
pub fn parse_time_updated(doc: &Value) -> Result<i64> {
    doc.pointer("/response/publishedfiledetails/0/time_updated")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            MonitorError::RemoteSource("workshop item has no time_updated".to_string())
        })
}
