//! How the gateway turns a start request into a running session. The
//! trait keeps the transport testable without a browser; the engine
//! implementation wires a Chromium driver, the configured oracle and the
//! shared history store into one agent per session.

use std::sync::Arc;

use async_trait::async_trait;
use ferret_engine::agent::{Agent, CancelHandle};
use ferret_engine::backend::DriverError;
use ferret_engine::config::FerretConfig;
use ferret_engine::executor::Executor;
use ferret_engine::history::{HistoryError, HistoryStore};
use ferret_engine::observer::Observer;
use ferret_engine::oracle::OracleError;
use ferret_h::{CdpDriver, LaunchOptions};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("oracle setup failed: {0}")]
    Oracle(#[from] OracleError),
    #[error("driver launch failed: {0}")]
    Driver(#[from] DriverError),
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Start one session reporting through `observer`; returns once the
    /// loop is running, with a handle that can stop it between cycles.
    async fn launch(
        &self,
        goal: &str,
        url: &str,
        observer: Arc<dyn Observer>,
    ) -> Result<CancelHandle, LaunchError>;
}

/// Production launcher. Sessions run concurrently, one driver each; the
/// durable history store is the only thing they share.
pub struct EngineLauncher {
    config: FerretConfig,
    history: Arc<HistoryStore>,
}

impl EngineLauncher {
    pub fn new(config: FerretConfig) -> Result<Self, HistoryError> {
        let history = Arc::new(config.history.open_store()?);
        Ok(EngineLauncher { config, history })
    }
}

#[async_trait]
impl SessionLauncher for EngineLauncher {
    async fn launch(
        &self,
        goal: &str,
        url: &str,
        observer: Arc<dyn Observer>,
    ) -> Result<CancelHandle, LaunchError> {
        let oracle = self.config.oracle.build_oracle()?;
        let driver = CdpDriver::launch(LaunchOptions {
            visible: !self.config.driver.headless,
            chrome_bin: self.config.driver.chrome_bin.clone(),
            user_data_dir: self.config.driver.user_data_dir.clone(),
        })
        .await?;

        let executor = Executor::new(
            self.config.executor.to_executor_config(),
            Arc::clone(&self.history),
        );
        let (agent, cancel) = Agent::new(
            self.config.agent.to_agent_config(),
            executor,
            Box::new(oracle),
            observer,
        );

        let goal = goal.to_string();
        let url = url.to_string();
        tokio::spawn(async move {
            let outcome = agent.run(Box::new(driver), &goal, &url).await;
            info!(
                "session finished: {} after {} cycles ({})",
                outcome.status, outcome.cycles, outcome.message
            );
        });
        Ok(cancel)
    }
}
