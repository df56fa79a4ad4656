use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser as ClapParser;
use ferret_engine::config::{ConfigLoader, FerretConfig};
use ferret_s::{EngineLauncher, Gateway};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 9001)]
    port: u16,

    /// Config file; defaults to ./ferret.yaml then ~/.ferret/config.yaml
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config: FerretConfig = match &args.config {
        Some(path) => ConfigLoader::load_from(path).await?,
        None => ConfigLoader::load_default().await?,
    };

    println!("Starting Ferret session gateway on port {}...", args.port);
    println!("Connect clients to ws://localhost:{}", args.port);

    let launcher = Arc::new(EngineLauncher::new(config)?);
    let gateway = Arc::new(Gateway::new(launcher));
    let handle = gateway.serve(args.port).await?;
    handle.wait().await;
    Ok(())
}
