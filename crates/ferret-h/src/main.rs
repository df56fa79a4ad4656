//! Standalone probe: open a page and print its snapshot. Useful for
//! checking what the extractor sees on a site without running a session.

use clap::Parser;
use ferret_engine::backend::Driver;
use ferret_engine::snapshot;
use ferret_h::{CdpDriver, LaunchOptions};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL to open
    #[arg(long)]
    url: String,

    /// Walk the whole document instead of just the viewport
    #[arg(long)]
    full: bool,

    /// Run the browser headed
    #[arg(long)]
    visible: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut driver = CdpDriver::launch(LaunchOptions {
        visible: args.visible,
        ..Default::default()
    })
    .await?;

    let outcome = probe(&mut driver, &args.url, args.full).await;
    driver.close().await?;
    outcome
}

async fn probe(
    driver: &mut CdpDriver,
    url: &str,
    full: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let nav = driver.navigate(url).await?;
    eprintln!("Opened {} ({})", nav.url, nav.title);

    let snap = if full {
        snapshot::capture_full(driver).await?
    } else {
        snapshot::capture(driver).await?
    };
    eprintln!(
        "{} nodes, fingerprint {}",
        snap.nodes.len(),
        snap.fingerprint
    );
    println!("{}", serde_json::to_string_pretty(&snap.nodes)?);
    Ok(())
}
