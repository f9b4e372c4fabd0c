pub mod openai;
pub mod synthesizer;

use async_trait::async_trait;
use serde_json::Value;

use appmodeler_core::Result;

pub use openai::OpenAiAssistant;
pub use synthesizer::{ActionAdvisor, ViewSynthesizer};

/// Structured-output text-generation collaborator.
///
/// `ask` returns a value conforming to the supplied JSON schema; a backend
/// refusal surfaces as the distinguishable `Error::Generation`.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn ask(&self, prompt: &str, schema_name: &str, schema: Value) -> Result<Value>;

    /// Cumulative consumed tokens across all calls so far.
    fn used_tokens(&self) -> u64;
}
