use ferret_engine::backend::Driver;
use ferret_engine::snapshot;
use ferret_h::{CdpDriver, LaunchOptions};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn headless_lifecycle_and_snapshot() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .ok();

    let mut driver = match CdpDriver::launch(LaunchOptions::default()).await {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("Failed to launch browser (is Chromium installed?): {}", e);
            return;
        }
    };

    let html = "<html><head><title>Test Page</title></head><body>\
                <h1 id='h1'>Hello World</h1>\
                <button id='btn' onclick=\"this.textContent='Clicked'\">Click Me</button>\
                <input id='q' name='q' placeholder='Search'>\
                </body></html>";
    let url = format!("data:text/html,{}", html);

    let nav = driver.navigate(&url).await.expect("Navigation failed");
    assert_eq!(nav.title, "Test Page");

    let snap = snapshot::capture(&mut driver).await.expect("Scan failed");
    assert!(!snap.fingerprint.is_empty());
    assert!(
        snap.nodes.iter().any(|n| n.tag == "button"),
        "button missing from snapshot: {:?}",
        snap.nodes.iter().map(|n| &n.tag).collect::<Vec<_>>()
    );

    driver.click("#btn").await.expect("Click failed");
    let text = driver
        .eval("document.getElementById('btn').textContent")
        .await
        .expect("Eval failed");
    assert_eq!(text.as_str(), Some("Clicked"));

    driver.fill("#q", "rust crates").await.expect("Fill failed");
    let value = driver
        .eval("document.getElementById('q').value")
        .await
        .expect("Eval failed");
    assert_eq!(value.as_str(), Some("rust crates"));

    driver.close().await.expect("Close failed");
    // Idempotent close; later calls report Closed.
    driver.close().await.expect("Second close failed");
    assert!(driver.current_url().await.is_err());
}
