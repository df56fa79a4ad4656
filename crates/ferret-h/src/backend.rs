use async_trait::async_trait;
use chromiumoxide::element::Element;
use ferret_engine::backend::{Driver, DriverError, NavigationResult};
use tracing::{debug, info};

use crate::cdp::{CdpClient, LaunchOptions};
use crate::inject;

/// Chromium-backed page handle. One instance per session; `close` is
/// idempotent and every method after it reports `DriverError::Closed`.
pub struct CdpDriver {
    client: Option<CdpClient>,
}

impl CdpDriver {
    pub async fn launch(options: LaunchOptions) -> Result<Self, DriverError> {
        info!("Launching Chromium driver...");
        let client = CdpClient::launch(options)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        Ok(CdpDriver {
            client: Some(client),
        })
    }

    fn client(&self) -> Result<&CdpClient, DriverError> {
        self.client.as_ref().ok_or(DriverError::Closed)
    }

    /// Resolve a CSS or XPath expression to a live element handle.
    async fn resolve(&self, selector: &str) -> Result<Element, DriverError> {
        let client = self.client()?;
        let found = if selector.starts_with('/') || selector.starts_with('(') {
            client.page.find_xpath(selector).await
        } else {
            client.page.find_element(selector).await
        };
        found.map_err(|e| DriverError::NoElement(format!("{selector}: {e}")))
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, DriverError> {
        let client = self.client()?;
        info!("Navigating to: {}", url);
        client
            .page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;

        let title = client
            .page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = client
            .page
            .url()
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult { url, title })
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        let client = self.client()?;
        Ok(client
            .page
            .url()
            .await
            .map_err(|e| DriverError::Eval(e.to_string()))?
            .unwrap_or_default())
    }

    async fn eval(&mut self, script: &str) -> Result<serde_json::Value, DriverError> {
        let client = self.client()?;
        inject::eval(&client.page, script)
            .await
            .map_err(|e| DriverError::Eval(e.to_string()))
    }

    async fn click(&mut self, selector: &str) -> Result<(), DriverError> {
        let element = self.resolve(selector).await?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| DriverError::Eval(format!("scroll_into_view failed: {e}")))?;
        element
            .click()
            .await
            .map_err(|e| DriverError::Eval(format!("click failed: {e}")))?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<(), DriverError> {
        let element = self.resolve(selector).await?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| DriverError::Eval(format!("scroll_into_view failed: {e}")))?;
        element
            .focus()
            .await
            .map_err(|e| DriverError::Eval(format!("focus failed: {e}")))?;
        // Clear any existing content before typing the replacement.
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(|e| DriverError::Eval(format!("clear failed: {e}")))?;
        element
            .type_str(text)
            .await
            .map_err(|e| DriverError::Eval(format!("type failed: {e}")))?;
        Ok(())
    }

    async fn press(&mut self, selector: &str, key: &str) -> Result<(), DriverError> {
        let element = self.resolve(selector).await?;
        element
            .focus()
            .await
            .map_err(|e| DriverError::Eval(format!("focus failed: {e}")))?;
        element
            .press_key(key)
            .await
            .map_err(|e| DriverError::Eval(format!("press_key failed: {e}")))?;
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        let client = self.client()?;
        client
            .page
            .screenshot(chromiumoxide::page::ScreenshotParams::builder().build())
            .await
            .map_err(|e| DriverError::Screenshot(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if let Some(client) = self.client.take() {
            // Best-effort release: a browser that already died is fine.
            if let Err(e) = client.close().await {
                debug!("browser close failed: {e}");
            }
        }
        Ok(())
    }
}
