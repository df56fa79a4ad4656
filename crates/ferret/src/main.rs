use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ferret_engine::agent::Agent;
use ferret_engine::config::{ConfigLoader, FerretConfig};
use ferret_engine::executor::Executor;
use ferret_engine::observer::{ChannelObserver, SessionStatus};
use ferret_h::{CdpDriver, LaunchOptions};
use ferret_s::{EngineLauncher, Gateway};
use url::Url;

#[derive(Parser)]
#[command(name = "ferret", version, about = "Ferret semantic web automation")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Config file; defaults to ./ferret.yaml then ~/.ferret/config.yaml
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Mode {
    /// Drive one automation session to completion
    Run {
        /// Page to start on
        #[arg(long)]
        url: String,

        /// What the session should accomplish
        #[arg(long)]
        goal: String,

        /// Launch the browser in visible mode (not headless)
        #[arg(long)]
        visible: bool,

        /// Override the configured cycle cap
        #[arg(long)]
        max_cycles: Option<u32>,
    },
    /// Start the WebSocket session gateway
    Serve {
        #[arg(long, default_value_t = 9001)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries progress lines.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config: FerretConfig = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };

    match args.mode {
        Mode::Run {
            url,
            goal,
            visible,
            max_cycles,
        } => run_session(config, &url, &goal, visible, max_cycles).await,
        Mode::Serve { port } => serve(config, port).await,
    }
}

async fn run_session(
    config: FerretConfig,
    url: &str,
    goal: &str,
    visible: bool,
    max_cycles: Option<u32>,
) -> anyhow::Result<()> {
    Url::parse(url).with_context(|| format!("invalid url: {url}"))?;

    let oracle = config
        .oracle
        .build_oracle()
        .with_context(|| format!("set {} to your API key", config.oracle.api_key_env))?;
    let history = Arc::new(config.history.open_store()?);
    let executor = Executor::new(config.executor.to_executor_config(), history);

    let mut agent_config = config.agent.to_agent_config();
    if let Some(cap) = max_cycles {
        agent_config.max_cycles = cap;
    }

    let driver = CdpDriver::launch(LaunchOptions {
        visible: visible || !config.driver.headless,
        chrome_bin: config.driver.chrome_bin.clone(),
        user_data_dir: config.driver.user_data_dir.clone(),
    })
    .await
    .context("launching browser")?;

    let (observer, mut events) = ChannelObserver::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("[{}] {}", event.status, event.message);
            if event.status == SessionStatus::Completed {
                break;
            }
        }
    });

    let (agent, _cancel) = Agent::new(agent_config, executor, Box::new(oracle), Arc::new(observer));
    let outcome = agent.run(Box::new(driver), goal, url).await;
    let _ = printer.await;

    anyhow::ensure!(
        outcome.status == SessionStatus::Done,
        "session ended {}: {}",
        outcome.status,
        outcome.message
    );
    Ok(())
}

async fn serve(config: FerretConfig, port: u16) -> anyhow::Result<()> {
    let launcher = Arc::new(EngineLauncher::new(config)?);
    let gateway = Arc::new(Gateway::new(launcher));
    let handle = gateway.serve(port).await.context("binding gateway")?;
    println!("Session gateway listening on ws://{}", handle.addr);
    handle.wait().await;
    Ok(())
}
