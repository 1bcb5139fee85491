//! Uniform text-generation contract over the supported model backends.
//!
//! Two request/response envelopes are spoken: the chat-completion shape
//! (bearer auth, `choices[0].message.content`) and the generate-content shape
//! (key in the query string, `candidates[0].content.parts[0].text`). Both are
//! normalized to trimmed raw text.

pub mod chat;
pub mod generate_content;
pub mod json;

pub use chat::ChatCompletionClient;
pub use generate_content::GenerateContentClient;
pub use json::{extract_json, TieredJsonDecoder};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::traits::TextGenerator;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPayload {
    pub system: Option<String>,
    pub user: String,
}

impl PromptPayload {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            system: None,
            user: text.into(),
        }
    }

    pub fn with_system(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            user: user.into(),
        }
    }

    /// Single-message rendering for backends without a separate instruction slot.
    pub fn flattened(&self) -> String {
        match &self.system {
            Some(system) if !system.trim().is_empty() => format!("{system}\n\n{}", self.user),
            _ => self.user.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: PromptPayload,
    pub max_output_tokens: Option<u32>,
    pub temperature: f32,
    /// Lets the backend consult web search while answering. Only the generate-content shape supports it.
    pub search_grounding: bool,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: PromptPayload) -> Self {
        Self {
            model: model.into(),
            prompt,
            max_output_tokens: None,
            temperature: 0.3,
            search_grounding: false,
        }
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn search_grounding(mut self, enabled: bool) -> Self {
        self.search_grounding = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    ChatCompletion,
    GenerateContent,
}

impl BackendKind {
    pub fn for_model(model: &str) -> Self {
        let lowered = model.to_lowercase();
        if lowered.contains("gemini") || lowered.contains("palm") {
            BackendKind::GenerateContent
        } else {
            BackendKind::ChatCompletion
        }
    }
}

/// Owns the shared HTTP client and hands out per-credential generators.
#[derive(Clone)]
pub struct ProviderAdapter {
    client: Client,
    config: ProviderConfig,
}

impl ProviderAdapter {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn generator(
        &self,
        kind: BackendKind,
        api_key: &str,
    ) -> Result<Arc<dyn TextGenerator>, ProviderError> {
        let generator: Arc<dyn TextGenerator> = match kind {
            BackendKind::ChatCompletion => Arc::new(ChatCompletionClient::new(
                self.client.clone(),
                &self.config,
                api_key,
            )?),
            BackendKind::GenerateContent => Arc::new(GenerateContentClient::new(
                self.client.clone(),
                &self.config,
                api_key,
            )),
        };
        Ok(generator)
    }

    pub fn generator_for_model(
        &self,
        model: &str,
        api_key: &str,
    ) -> Result<Arc<dyn TextGenerator>, ProviderError> {
        self.generator(BackendKind::for_model(model), api_key)
    }

    pub async fn generate(
        &self,
        payload: &PromptPayload,
        model: &str,
        api_key: &str,
        kind: BackendKind,
    ) -> Result<String, ProviderError> {
        let generator = self.generator(kind, api_key)?;
        generator
            .generate(&GenerationRequest::new(model, payload.clone()))
            .await
    }
}

pub(crate) async fn error_for_status(
    backend: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        backend: backend.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::GenerationRequest;
    use crate::error::ProviderError;
    use crate::traits::TextGenerator;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub(crate) enum ScriptedReply {
        Text(String),
        Status(u16),
    }

    /// Replays canned replies in order, then repeats the fallback reply if one is set.
    #[derive(Default)]
    pub(crate) struct ScriptedGenerator {
        replies: Mutex<VecDeque<ScriptedReply>>,
        fallback: Option<ScriptedReply>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        pub(crate) fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                ..Default::default()
            }
        }

        pub(crate) fn texts<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
            Self::new(
                replies
                    .into_iter()
                    .map(|reply| ScriptedReply::Text(reply.to_string())),
            )
        }

        pub(crate) fn repeating(reply: ScriptedReply) -> Self {
            Self {
                fallback: Some(reply),
                ..Default::default()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.requests.lock().map(|requests| requests.len()).unwrap_or_default()
        }

        pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
            self.requests
                .lock()
                .map(|requests| requests.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        fn backend_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            let next = self
                .replies
                .lock()
                .ok()
                .and_then(|mut replies| replies.pop_front())
                .or_else(|| self.fallback.clone());

            match next {
                Some(ScriptedReply::Text(text)) => Ok(text),
                Some(ScriptedReply::Status(status)) => Err(ProviderError::Status {
                    backend: "scripted".to_string(),
                    status,
                    body: "scripted failure".to_string(),
                }),
                None => Err(ProviderError::MalformedResponse(
                    "scripted generator ran out of replies".to_string(),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_is_inferred_from_model_name() {
        assert_eq!(
            BackendKind::for_model("gemini-2.5-pro"),
            BackendKind::GenerateContent
        );
        assert_eq!(BackendKind::for_model("text-palm-2"), BackendKind::GenerateContent);
        assert_eq!(BackendKind::for_model("gpt-4o"), BackendKind::ChatCompletion);
    }

    #[test]
    fn flattened_payload_puts_instructions_first() {
        let payload = PromptPayload::with_system("Organize this.", "body");
        assert_eq!(payload.flattened(), "Organize this.\n\nbody");
        assert_eq!(PromptPayload::user("body").flattened(), "body");
    }
}
