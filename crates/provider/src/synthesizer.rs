use serde_json::{json, Value};
use tracing::debug;

use appmodeler_core::{ActionRecord, ElementSnapshot, Error, Result};

use crate::Assistant;

/// Generates the interaction script for one screen from its element
/// snapshot. Only runs on a view-cache miss; a revisited screen reuses the
/// cached source.
pub struct ViewSynthesizer<'a> {
    assistant: &'a dyn Assistant,
    prompt_template: &'a str,
}

impl<'a> ViewSynthesizer<'a> {
    pub fn new(assistant: &'a dyn Assistant, prompt_template: &'a str) -> Self {
        Self { assistant, prompt_template }
    }

    pub async fn generate(&self, class_name: &str, elements: &ElementSnapshot) -> Result<String> {
        let prompt = self
            .prompt_template
            .replace("{class_name}", class_name)
            .replace("{elements_json}", &elements.to_json_pretty());

        let schema = json!({
            "type": "object",
            "properties": {
                "implementation": { "type": "string" }
            },
            "required": ["implementation"],
            "additionalProperties": false,
        });

        let value = self.assistant.ask(&prompt, "view_implementation", schema).await?;
        let source = value["implementation"]
            .as_str()
            .ok_or_else(|| Error::Generation("response missing implementation".to_string()))?;
        debug!(view = class_name, bytes = source.len(), "View source generated");
        Ok(source.to_string())
    }
}

/// Asks for the most plausible next user actions given the current view's
/// API and the call history so far. Runs on every analyse pass, cache hit
/// or miss, because the history context changes between passes.
pub struct ActionAdvisor<'a> {
    assistant: &'a dyn Assistant,
    prompt_template: &'a str,
}

impl<'a> ActionAdvisor<'a> {
    pub fn new(assistant: &'a dyn Assistant, prompt_template: &'a str) -> Self {
        Self { assistant, prompt_template }
    }

    pub async fn suggest(
        &self,
        class_api: &Value,
        history: &[ActionRecord],
    ) -> Result<Vec<ActionRecord>> {
        let previous_steps: Vec<String> = history.iter().map(|call| call.call_string()).collect();
        let prompt = self
            .prompt_template
            .replace("{class_api}", &class_api.to_string())
            .replace("{previous_steps}", &serde_json::to_string(&previous_steps)?);

        let schema = json!({
            "type": "object",
            "properties": {
                "candidates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "view": { "type": "string" },
                            "action": { "type": "string" },
                            "args": { "type": "string" },
                            "kwargs": { "type": "string" }
                        },
                        "required": ["view", "action", "args", "kwargs"],
                        "additionalProperties": false,
                    }
                }
            },
            "required": ["candidates"],
            "additionalProperties": false,
        });

        let value = self.assistant.ask(&prompt, "next_actions", schema).await?;
        let candidates: Vec<ActionRecord> = serde_json::from_value(value["candidates"].clone())
            .map_err(|e| Error::Generation(format!("malformed candidates: {}", e)))?;
        debug!(count = candidates.len(), "Next action candidates received");
        Ok(candidates)
    }
}
