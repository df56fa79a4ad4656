//! YAML configuration. Every field is optional; a missing file or a
//! partial one falls back to the defaults below.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::executor::ExecutorConfig;
use crate::history::{HistoryError, HistoryStore};
use crate::oracle::groq::{self, GroqOracle};
use crate::oracle::OracleError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FerretConfig {
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub driver: DriverSection,
    #[serde(default)]
    pub history: HistorySection,
}

/// The API key itself never lives in the file, only the name of the
/// environment variable holding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSection {
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            model: default_oracle_model(),
            base_url: default_oracle_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl OracleSection {
    pub fn build_oracle(&self) -> Result<GroqOracle, OracleError> {
        Ok(GroqOracle::from_env(&self.api_key_env)?
            .with_model(&self.model)
            .with_base_url(&self.base_url))
    }
}

fn default_oracle_model() -> String {
    groq::DEFAULT_MODEL.to_string()
}

fn default_oracle_base_url() -> String {
    groq::DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    groq::DEFAULT_API_KEY_ENV.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
    #[serde(default = "default_failure_ceiling")]
    pub failure_ceiling: u32,
    #[serde(default = "default_oracle_backoff_secs")]
    pub oracle_backoff_secs: u64,
    #[serde(default = "default_node_budget")]
    pub node_budget: usize,
    #[serde(default)]
    pub screenshots: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            failure_ceiling: default_failure_ceiling(),
            oracle_backoff_secs: default_oracle_backoff_secs(),
            node_budget: default_node_budget(),
            screenshots: false,
        }
    }
}

impl AgentSection {
    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_cycles: self.max_cycles,
            failure_ceiling: self.failure_ceiling,
            oracle_backoff: Duration::from_secs(self.oracle_backoff_secs),
            oracle_node_budget: self.node_budget,
            screenshots: self.screenshots,
            ..AgentConfig::default()
        }
    }
}

fn default_max_cycles() -> u32 {
    crate::agent::MAX_CYCLES
}

fn default_failure_ceiling() -> u32 {
    crate::agent::FAILURE_CEILING
}

fn default_oracle_backoff_secs() -> u64 {
    crate::agent::ORACLE_BACKOFF.as_secs()
}

fn default_node_budget() -> usize {
    crate::agent::ORACLE_NODE_BUDGET
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
    #[serde(default = "default_navigate_timeout_ms")]
    pub navigate_timeout_ms: u64,
    #[serde(default = "default_wait_pause_ms")]
    pub wait_pause_ms: u64,
    #[serde(default = "default_candidate_cap")]
    pub candidate_cap: usize,
    #[serde(default = "default_scroll_amount")]
    pub scroll_amount: i64,
    #[serde(default)]
    pub highlight: bool,
    /// Failure screenshots land here; unset means the system temp dir.
    #[serde(default)]
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            action_timeout_ms: default_action_timeout_ms(),
            navigate_timeout_ms: default_navigate_timeout_ms(),
            wait_pause_ms: default_wait_pause_ms(),
            candidate_cap: default_candidate_cap(),
            scroll_amount: default_scroll_amount(),
            highlight: false,
            diagnostics_dir: None,
        }
    }
}

impl ExecutorSection {
    pub fn to_executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            action_timeout: Duration::from_millis(self.action_timeout_ms),
            navigate_timeout: Duration::from_millis(self.navigate_timeout_ms),
            wait_pause: Duration::from_millis(self.wait_pause_ms),
            candidate_cap: self.candidate_cap,
            scroll_amount: self.scroll_amount,
            highlight: self.highlight,
            diagnostics_dir: self
                .diagnostics_dir
                .clone()
                .or_else(|| Some(std::env::temp_dir())),
        }
    }
}

fn default_action_timeout_ms() -> u64 {
    2000
}

fn default_navigate_timeout_ms() -> u64 {
    30000
}

fn default_wait_pause_ms() -> u64 {
    1000
}

fn default_candidate_cap() -> usize {
    3
}

fn default_scroll_amount() -> i64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSection {
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Overrides browser discovery; the CHROME_BIN environment variable
    /// takes effect when this is unset.
    #[serde(default)]
    pub chrome_bin: Option<String>,
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            chrome_bin: None,
            user_data_dir: None,
        }
    }
}

fn default_headless() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistorySection {
    /// Unset means `~/.ferret/history.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl HistorySection {
    pub fn open_store(&self) -> Result<HistoryStore, HistoryError> {
        let path = self
            .path
            .clone()
            .unwrap_or_else(HistoryStore::default_path);
        HistoryStore::open(path)
    }
}
