use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use appmodeler_core::{Error, Result};

/// W3C element identifier key in wire responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Wire error codes that mean the remote session no longer exists.
const SESSION_LOST_CODES: &[&str] = &[
    "invalid session id",
    "no such driver",
    "session not created",
];

/// Minimal W3C WebDriver client, speaking the subset of the protocol the
/// modeler needs: session lifecycle, screenshots, element discovery and the
/// interaction primitives behind the capability interface.
pub struct WebDriverClient {
    http: Client,
    base: String,
    session_id: String,
}

impl WebDriverClient {
    /// Create a remote session. `capabilities` is sent verbatim under
    /// `alwaysMatch`, exactly as configured.
    pub async fn open(server_url: &str, capabilities: &Value) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Connection(format!("failed to build HTTP client: {}", e)))?;

        let base = server_url.trim_end_matches('/').to_string();
        let body = json!({ "capabilities": { "alwaysMatch": capabilities } });

        debug!(url = %base, "Creating driver session");
        let resp = http
            .post(format!("{}/session", base))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Connection(format!("driver unreachable: {}", e)))?;

        let status = resp.status();
        let value: Value = resp
            .json()
            .await
            .map_err(|e| Error::Connection(format!("invalid driver response: {}", e)))?;
        if !status.is_success() {
            return Err(wire_error(status, &value));
        }

        let session_id = value["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| Error::Connection("driver response missing sessionId".to_string()))?
            .to_string();
        debug!(session_id = %session_id, "Driver session created");

        Ok(Self { http, base, session_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}/session/{}{}", self.base, self.session_id, path);
        let mut req = self.http.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Connection(format!("driver request failed: {}", e)))?;

        let status = resp.status();
        let value: Value = resp
            .json()
            .await
            .map_err(|e| Error::Connection(format!("invalid driver response: {}", e)))?;
        if !status.is_success() {
            return Err(wire_error(status, &value));
        }
        Ok(value["value"].clone())
    }

    /// PNG screenshot of the current screen.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let value = self.request(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| Error::Connection("screenshot response is not a string".to_string()))?;
        general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Connection(format!("screenshot is not valid base64: {}", e)))
    }

    /// All elements matching the locator, as wire element ids.
    pub async fn find_elements(&self, strategy: &str, value: &str) -> Result<Vec<String>> {
        let body = json!({ "using": strategy, "value": value });
        let result = self.request(Method::POST, "/elements", Some(body)).await?;
        let items = result
            .as_array()
            .ok_or_else(|| Error::Connection("elements response is not an array".to_string()))?;
        Ok(items
            .iter()
            .filter_map(|item| item[ELEMENT_KEY].as_str().map(str::to_string))
            .collect())
    }

    /// First element matching the locator. "no such element" surfaces as
    /// `Error::Execution`, which dispatch records on the action.
    pub async fn find_element(&self, strategy: &str, value: &str) -> Result<String> {
        let body = json!({ "using": strategy, "value": value });
        let result = self.request(Method::POST, "/element", Some(body)).await?;
        result[ELEMENT_KEY]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Execution(format!("element not found: {} {}", strategy, value)))
    }

    pub async fn element_text(&self, id: &str) -> Result<String> {
        let value = self
            .request(Method::GET, &format!("/element/{}/text", id), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// DOM attribute, None when the driver reports null.
    pub async fn element_attribute(&self, id: &str, name: &str) -> Result<Option<String>> {
        let value = self
            .request(Method::GET, &format!("/element/{}/attribute/{}", id, name), None)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    pub async fn element_rect(&self, id: &str) -> Result<(i64, i64)> {
        let value = self
            .request(Method::GET, &format!("/element/{}/rect", id), None)
            .await?;
        let x = value["x"].as_f64().unwrap_or(0.0) as i64;
        let y = value["y"].as_f64().unwrap_or(0.0) as i64;
        Ok((x, y))
    }

    pub async fn element_displayed(&self, id: &str) -> Result<bool> {
        let value = self
            .request(Method::GET, &format!("/element/{}/displayed", id), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn element_name(&self, id: &str) -> Result<String> {
        let value = self
            .request(Method::GET, &format!("/element/{}/name", id), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn click(&self, id: &str) -> Result<()> {
        self.request(Method::POST, &format!("/element/{}/click", id), Some(json!({})))
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, id: &str, text: &str) -> Result<()> {
        let body = json!({ "text": text });
        self.request(Method::POST, &format!("/element/{}/value", id), Some(body))
            .await?;
        Ok(())
    }

    pub async fn execute_script(&self, script: &str, args: Value) -> Result<Value> {
        let body = json!({ "script": script, "args": args });
        self.request(Method::POST, "/execute/sync", Some(body)).await
    }

    /// Wire reference for passing an element as a script argument.
    pub fn element_ref(id: &str) -> Value {
        json!({ ELEMENT_KEY: id })
    }

    pub async fn delete_session(&self) -> Result<()> {
        let url = format!("{}/session/{}", self.base, self.session_id);
        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::Connection(format!("driver request failed: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            let value: Value = resp.json().await.unwrap_or(Value::Null);
            return Err(wire_error(status, &value));
        }
        Ok(())
    }
}

/// Map a WebDriver error payload onto the engine taxonomy: session-lost
/// codes become `Connection` (they force Disconnected), everything else is
/// an `Execution` failure on the specific command.
fn wire_error(status: StatusCode, value: &Value) -> Error {
    let code = value["value"]["error"].as_str().unwrap_or("");
    let message = value["value"]["message"]
        .as_str()
        .unwrap_or("no error message");
    if SESSION_LOST_CODES.contains(&code) || status == StatusCode::NOT_FOUND && code.is_empty() {
        Error::Connection(format!("{}: {}", if code.is_empty() { "session gone" } else { code }, message))
    } else {
        Error::Execution(format!("{} ({}): {}", code, status, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_error_invalid_session_is_connection() {
        let body = json!({ "value": { "error": "invalid session id", "message": "gone" } });
        let err = wire_error(StatusCode::NOT_FOUND, &body);
        assert!(err.is_connection_lost());
    }

    #[test]
    fn test_wire_error_no_such_element_is_execution() {
        let body = json!({ "value": { "error": "no such element", "message": "nope" } });
        let err = wire_error(StatusCode::NOT_FOUND, &body);
        assert!(matches!(err, Error::Execution(_)));
    }

    #[test]
    fn test_element_ref_shape() {
        let r = WebDriverClient::element_ref("abc");
        assert_eq!(r[ELEMENT_KEY], "abc");
    }
}
