use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use appmodeler_core::{Error, Result, UiCapability};

use crate::client::WebDriverClient;

/// Synchronous capability adapter over the async WebDriver client.
///
/// Loaded view scripts run on a blocking thread; each primitive re-enters
/// the runtime through the captured handle. Must never be called from a
/// runtime worker thread.
pub struct DriverUi {
    client: Arc<WebDriverClient>,
    handle: Handle,
}

impl DriverUi {
    pub fn new(client: Arc<WebDriverClient>, handle: Handle) -> Self {
        Self { client, handle }
    }
}

impl UiCapability for DriverUi {
    fn click(&self, strategy: &str, value: &str) -> Result<()> {
        self.handle.block_on(async {
            let id = self.client.find_element(strategy, value).await?;
            self.client.click(&id).await
        })
    }

    fn enter_text(&self, strategy: &str, value: &str, text: &str) -> Result<()> {
        self.handle.block_on(async {
            let id = self.client.find_element(strategy, value).await?;
            self.client.send_keys(&id, text).await
        })
    }

    fn get_text(&self, strategy: &str, value: &str) -> Result<String> {
        self.handle.block_on(async {
            let id = self.client.find_element(strategy, value).await?;
            self.client.element_text(&id).await
        })
    }

    fn is_displayed(&self, strategy: &str, value: &str) -> Result<bool> {
        self.handle.block_on(async {
            let id = self.client.find_element(strategy, value).await?;
            self.client.element_displayed(&id).await
        })
    }

    fn swipe(
        &self,
        start_x: i64,
        start_y: i64,
        end_x: i64,
        end_y: i64,
        duration_ms: i64,
    ) -> Result<()> {
        self.handle.block_on(async {
            self.client
                .execute_script(
                    "mobile: swipe",
                    json!([{
                        "startX": start_x,
                        "startY": start_y,
                        "endX": end_x,
                        "endY": end_y,
                        "duration": duration_ms,
                    }]),
                )
                .await?;
            Ok(())
        })
    }

    fn scroll_to(&self, strategy: &str, value: &str) -> Result<()> {
        self.handle.block_on(async {
            let id = self.client.find_element(strategy, value).await?;
            self.client
                .execute_script(
                    "arguments[0].scrollIntoView(true);",
                    json!([WebDriverClient::element_ref(&id)]),
                )
                .await?;
            Ok(())
        })
    }

    fn wait_for_element(&self, strategy: &str, value: &str, timeout_secs: i64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(timeout_secs.max(0) as u64);
        self.handle.block_on(async {
            loop {
                match self.client.find_element(strategy, value).await {
                    Ok(id) => {
                        if self.client.element_displayed(&id).await.unwrap_or(false) {
                            return Ok(());
                        }
                    }
                    Err(e) if e.is_connection_lost() => return Err(e),
                    Err(_) => {}
                }
                if Instant::now() >= deadline {
                    return Err(Error::Execution(format!(
                        "timed out after {}s waiting for {} {}",
                        timeout_secs, strategy, value
                    )));
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
    }
}
