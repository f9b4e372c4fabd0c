pub mod client;
pub mod element_type;
pub mod inspector;
pub mod ui;

use std::sync::Arc;

use async_trait::async_trait;
use appmodeler_core::config::DriverConfig;
use appmodeler_core::{ElementSnapshot, Result, UiCapability};

pub use client::WebDriverClient;
pub use inspector::ElementInspector;
pub use ui::DriverUi;

/// One live automation session. Owned exclusively by the session engine and
/// only touched from within the single in-flight background operation.
#[async_trait]
pub trait DriverSession: Send + Sync {
    /// Raw PNG bytes of the current screen.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Ordered structural snapshot of the interactive elements on screen.
    /// Zero usable elements is a `Error::Discovery`.
    async fn elements(&self) -> Result<ElementSnapshot>;

    /// Tear the session down. Idempotent; an already-invalid remote session
    /// is treated as closed, not as a new error.
    async fn close(&self) -> Result<()>;

    /// Capability handle handed to loaded view scripts.
    fn ui(&self) -> Arc<dyn UiCapability>;
}

/// Opens driver sessions. The engine holds a connector rather than a
/// concrete client so tests can substitute a scripted double.
#[async_trait]
pub trait DriverConnector: Send + Sync {
    async fn open(&self, config: &DriverConfig) -> Result<Box<dyn DriverSession>>;
}

/// Production session: a W3C WebDriver client plus the inspector rules for
/// the configured platform.
pub struct WebDriverSession {
    client: Arc<WebDriverClient>,
    platform: String,
}

#[async_trait]
impl DriverSession for WebDriverSession {
    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.client.screenshot().await
    }

    async fn elements(&self) -> Result<ElementSnapshot> {
        ElementInspector::new(&self.client, &self.platform)?.scan().await
    }

    async fn close(&self) -> Result<()> {
        match self.client.delete_session().await {
            Ok(()) => Ok(()),
            // The remote already dropped the session; nothing left to close.
            Err(e) if e.is_connection_lost() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn ui(&self) -> Arc<dyn UiCapability> {
        Arc::new(DriverUi::new(self.client.clone(), tokio::runtime::Handle::current()))
    }
}

/// Connector for a real WebDriver/Appium server.
pub struct WebDriverConnector;

#[async_trait]
impl DriverConnector for WebDriverConnector {
    async fn open(&self, config: &DriverConfig) -> Result<Box<dyn DriverSession>> {
        let client = WebDriverClient::open(&config.server_url, &config.capabilities).await?;
        Ok(Box::new(WebDriverSession {
            client: Arc::new(client),
            platform: config.platform.clone(),
        }))
    }
}
