use crate::error::ProviderError;
use crate::provider::GenerationRequest;
use async_trait::async_trait;
use serde_json::Value;

/// A generative-model backend reduced to "prompt in, raw text out".
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn backend_name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

/// Decides whether a line opens a new section of a document.
pub trait HeadingClassifier: Send + Sync {
    fn is_heading(&self, line: &str) -> bool;

    /// Lines that make a clean cut point when splitting by line count.
    fn is_cut_point(&self, line: &str) -> bool {
        self.is_heading(line) || line.trim_end().ends_with(':')
    }
}

/// Best-effort structured decoding of free-form model replies.
pub trait JsonDecoder: Send + Sync {
    fn decode(&self, raw: &str) -> Result<Value, ProviderError>;
}
