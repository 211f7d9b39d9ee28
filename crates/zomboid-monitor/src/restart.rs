//! Service restart action

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;
use zomboid_core::{MonitorError, Result, ServerSettings};

/// Restarts the game server process
#[async_trait]
pub trait ServiceRestarter: Send + Sync + 'static {
    async fn restart(&self) -> Result<()>;
}

/// Restarts a systemd unit with `systemctl restart`
#[derive(Debug, Clone)]
pub struct SystemctlRestarter {
    service_name: String,
    use_sudo: bool,
    timeout: Duration,
}

impl SystemctlRestarter {
    pub fn new(service_name: impl Into<String>, use_sudo: bool) -> Self {
        Self {
            service_name: service_name.into(),
            use_sudo,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_settings(server: &ServerSettings) -> Self {
        Self::new(&server.service_name, server.use_sudo)
    }

    /// Program and arguments that will be run
    pub fn command_line(&self) -> Vec<String> {
        let mut argv = Vec::new();
        if self.use_sudo {
            argv.push("sudo".to_string());
            argv.push("-n".to_string());
        }
        argv.extend(["systemctl", "restart"].map(String::from));
        argv.push(self.service_name.clone());
        argv
    }
}

#[async_trait]
impl ServiceRestarter for SystemctlRestarter {
    async fn restart(&self) -> Result<()> {
        let argv = self.command_line();
        info!("Restarting Project Zomboid server: {}", argv.join(" "));

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&argv[0])
                .args(&argv[1..])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| MonitorError::Execution(format!("{} timed out", argv.join(" "))))?
        .map_err(|e| MonitorError::Execution(format!("failed to run {}: {}", argv[0], e)))?;

        if !output.status.success() {
            return Err(MonitorError::Execution(format!(
                "{} exited with {}: {}",
                argv.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!("Server restarted successfully");
        Ok(())
    }
}
