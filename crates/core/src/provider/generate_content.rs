use super::{error_for_status, GenerationRequest};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::traits::TextGenerator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const BACKEND: &str = "generate-content";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GenerateContentClient {
    client: Client,
    base_url: String,
    api_key: String,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search_retrieval: GoogleSearchRetrieval,
}

#[derive(Debug, Serialize)]
struct GoogleSearchRetrieval {}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    top_p: f32,
    top_k: u32,
    candidate_count: u32,
    stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateContentClient {
    pub fn new(client: Client, config: &ProviderConfig, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: config.generate_content_base_url.clone(),
            api_key: api_key.into(),
            top_p: config.top_p,
            top_k: config.top_k,
        }
    }

    fn endpoint(&self, model: &str) -> Result<Url, ProviderError> {
        let base = self.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{model}:generateContent"))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn build_body(&self, request: &GenerationRequest) -> GenerateContentBody {
        GenerateContentBody {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(request.prompt.flattened()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
                top_p: self.top_p,
                top_k: self.top_k,
                candidate_count: 1,
                stop_sequences: Vec::new(),
            },
            safety_settings: SAFETY_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
            tools: if request.search_grounding {
                vec![Tool {
                    google_search_retrieval: GoogleSearchRetrieval {},
                }]
            } else {
                Vec::new()
            },
        }
    }
}

fn reply_text(raw: &str) -> Result<String, ProviderError> {
    let payload: GenerateContentResponse = serde_json::from_str(raw).map_err(|error| {
        ProviderError::MalformedResponse(format!("{BACKEND} response is not JSON: {error}"))
    })?;

    // grounded replies can put metadata in parts[0]; take the first part carrying text
    payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .find(|text| !text.trim().is_empty())
        })
        .map(|text| text.trim().to_string())
        .ok_or_else(|| {
            ProviderError::MalformedResponse(format!(
                "{BACKEND} response has no candidates[0].content.parts[].text"
            ))
        })
}

#[async_trait]
impl TextGenerator for GenerateContentClient {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let endpoint = self.endpoint(&request.model)?;
        let body = self.build_body(request);
        debug!(model = %request.model, max_tokens = ?request.max_output_tokens, "sending generate-content request");

        let response = self.client.post(endpoint).json(&body).send().await?;
        let response = error_for_status(BACKEND, response).await?;

        reply_text(&response.text().await?)
    }
}
