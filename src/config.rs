use crate::engine::{Executor, HttpBackend, SimulatorConfig};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Selects how runs are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExecutionMode {
    /// Backend when a URL is configured, simulator otherwise.
    #[default]
    Auto,
    Simulated,
    Backend,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub backend_url: Option<Url>,
    pub mode: ExecutionMode,
    pub timeout: Duration,
    pub simulator: SimulatorConfig,
    pub history_path: PathBuf,
    pub user_agent: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            mode: ExecutionMode::Auto,
            timeout: crate::orchestrator::DEFAULT_RUN_TIMEOUT,
            simulator: SimulatorConfig::default(),
            history_path: default_history_path(),
            user_agent: format!("agent-run/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            bail!("timeout must be greater than zero");
        }
        let rate = self.simulator.fault_rate;
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            bail!("fault rate must be within [0, 1] (got {rate})");
        }
        if self.simulator.min_delay > self.simulator.max_delay {
            bail!(
                "min delay ({}) exceeds max delay ({})",
                humantime::format_duration(self.simulator.min_delay),
                humantime::format_duration(self.simulator.max_delay)
            );
        }
        Ok(())
    }

    /// Resolve the executor for this configuration.
    ///
    /// Backend mode without a URL resolves to [`Executor::Unconfigured`], which fails
    /// runs with `BACKEND_NOT_CONFIGURED` and never touches the network.
    pub fn executor(&self) -> Result<Executor> {
        let use_backend = match self.mode {
            ExecutionMode::Simulated => false,
            ExecutionMode::Backend => true,
            ExecutionMode::Auto => self.backend_url.is_some(),
        };
        if !use_backend {
            return Ok(Executor::Simulated(self.simulator.clone()));
        }
        match self.backend_url.as_ref() {
            Some(url) => {
                let backend = HttpBackend::new(url, &self.user_agent)?;
                Ok(Executor::Delegated(Arc::new(backend)))
            }
            None => Ok(Executor::Unconfigured),
        }
    }
}

/// `<data dir>/agent-run/history.json`, falling back to the home directory.
pub fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agent-run")
        .join("history.json")
}
