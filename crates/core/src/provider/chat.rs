use super::{error_for_status, GenerationRequest};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::traits::TextGenerator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

const BACKEND: &str = "chat-completion";

pub struct ChatCompletionClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionClient {
    pub fn new(
        client: Client,
        config: &ProviderConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client,
            endpoint: Url::parse(&config.chat_completions_url)?,
            api_key: api_key.into(),
            top_p: config.top_p,
        })
    }

    fn build_body<'a>(&self, request: &'a GenerationRequest) -> ChatRequestBody<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.prompt.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt.user,
        });

        ChatRequestBody {
            model: &request.model,
            messages,
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
            top_p: self.top_p,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

fn reply_text(raw: &str) -> Result<String, ProviderError> {
    let payload: ChatResponseBody = serde_json::from_str(raw).map_err(|error| {
        ProviderError::MalformedResponse(format!("{BACKEND} response is not JSON: {error}"))
    })?;

    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| {
            ProviderError::MalformedResponse(format!(
                "{BACKEND} response has no choices[0].message.content"
            ))
        })
}

#[async_trait]
impl TextGenerator for ChatCompletionClient {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let body = self.build_body(request);
        if request.search_grounding {
            warn!(model = %request.model, "search grounding is not available on {BACKEND}, sending without it");
        }
        debug!(model = %request.model, max_tokens = ?request.max_output_tokens, "sending chat completion");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(BACKEND, response).await?;

        reply_text(&response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::PromptPayload;
    use serde_json::json;

    fn client() -> ChatCompletionClient {
        ChatCompletionClient::new(Client::new(), &ProviderConfig::default(), "sk-test")
            .expect("default endpoint parses")
    }

    #[test]
    fn body_carries_system_and_user_messages() -> Result<(), serde_json::Error> {
        let request = GenerationRequest::new(
            "gpt-4o",
            PromptPayload::with_system("Organize the text.", "raw text"),
        )
        .max_output_tokens(15_000);

        let client = client();
        let body = serde_json::to_value(client.build_body(&request))?;

        assert_eq!(
            body,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "Organize the text."},
                    {"role": "user", "content": "raw text"}
                ],
                "max_tokens": 15000,
                "temperature": 0.3f32,
                "top_p": 0.95f32,
                "frequency_penalty": 0.0,
                "presence_penalty": 0.0
            })
        );
        Ok(())
    }

    #[test]
    fn reply_text_reads_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"  # Title\n"}}]}"#;
        assert_eq!(reply_text(raw).expect("reply should parse"), "# Title");
    }

    #[test]
    fn reply_without_choices_is_malformed() {
        let error = reply_text(r#"{"choices":[]}"#).expect_err("no choices");
        assert!(matches!(error, ProviderError::MalformedResponse(_)));
        assert!(!error.is_transient());
    }
}
