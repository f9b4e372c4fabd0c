use tracing::{debug, warn};

use appmodeler_core::{ElementDescriptor, ElementSnapshot, Error, Result};

use crate::client::WebDriverClient;
use crate::element_type::{kind_for, SUPPORTED_PLATFORMS};

/// Scans the current screen and turns the raw element tree into an ordered
/// `ElementSnapshot`. Elements that are unknown, disabled, hidden or stale
/// are skipped with a warning; a screen with zero usable elements fails the
/// whole pass with `Error::Discovery`.
pub struct ElementInspector<'a> {
    client: &'a WebDriverClient,
    platform: &'a str,
}

impl<'a> ElementInspector<'a> {
    pub fn new(client: &'a WebDriverClient, platform: &'a str) -> Result<Self> {
        if !SUPPORTED_PLATFORMS.contains(&platform) {
            return Err(Error::Config(format!("unknown platform: {}", platform)));
        }
        Ok(Self { client, platform })
    }

    pub async fn scan(&self) -> Result<ElementSnapshot> {
        let ids = self.client.find_elements("xpath", "//*").await?;
        debug!(count = ids.len(), "Scanning view elements");

        let mut elements = Vec::new();
        for id in &ids {
            match self.describe(id).await {
                Ok(Some(descriptor)) => elements.push(descriptor),
                Ok(None) => {}
                // Session loss aborts the scan; anything element-local
                // (stale reference, missing attribute) just skips it.
                Err(e) if e.is_connection_lost() => return Err(e),
                Err(e) => warn!(element = %id, error = %e, "Error detecting element, skipping"),
            }
        }

        if elements.is_empty() {
            return Err(Error::Discovery("no elements found in the view".to_string()));
        }
        Ok(ElementSnapshot::new(elements))
    }

    /// Attribute rules from the original modeler: the element must map to a
    /// known kind, carry a tag or resource id, and be displayed + enabled.
    async fn describe(&self, id: &str) -> Result<Option<ElementDescriptor>> {
        let class_name = self
            .client
            .element_attribute(id, "class")
            .await?
            .unwrap_or_default();
        let Some(kind) = kind_for(self.platform, &class_name) else {
            return Ok(None);
        };

        let tag = self.client.element_name(id).await?;
        let resource_id = self
            .client
            .element_attribute(id, "resource-id")
            .await?
            .unwrap_or_default();
        if tag.is_empty() && resource_id.is_empty() {
            return Ok(None);
        }

        let enabled = self
            .client
            .element_attribute(id, "enabled")
            .await?
            .as_deref()
            == Some("true");
        if !enabled || !self.client.element_displayed(id).await? {
            return Ok(None);
        }

        let clickable = self
            .client
            .element_attribute(id, "clickable")
            .await?
            .as_deref()
            == Some("true");
        let text = self.client.element_text(id).await?;
        let (x, y) = self.client.element_rect(id).await?;

        Ok(Some(ElementDescriptor {
            text,
            x,
            y,
            kind: kind.to_string(),
            tag,
            resource_id,
            clickable,
            visible: true,
        }))
    }
}
