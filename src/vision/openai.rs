//! OpenAI-compatible chat completions client
//!
//! Images travel inline as base64 data URLs. The agent is built once and
//! shared; it holds no per-request state.

use crate::config::VisionConfig;
use crate::error::PrepError;
use crate::vision::{ImagePayload, Prompt, VisionService};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use ureq::Agent;

/// Instruction sent with every text extraction request
pub const EXTRACTION_INSTRUCTION: &str = "Extract text from this image.";

pub struct OpenAiService {
    agent: Agent,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiService {
    pub fn new(config: &VisionConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(config.request_timeout))
            .http_status_as_error(false)
            .build();

        tracing::info!(
            "Model service: {} (model {}, max_tokens {})",
            config.api_base_url,
            config.model,
            config.max_tokens
        );

        Self {
            agent: Agent::new_with_config(agent_config),
            endpoint: format!("{}/chat/completions", config.api_base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }

    fn chat(&self, messages: Vec<ChatMessage<'_>>) -> Result<String, PrepError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PrepError::Upstream("no API key configured".to_string()))?;

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
        };

        let response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .send_json(&request)
            .map_err(|e| PrepError::Upstream(format!("Request to model service failed: {}", e)))?;

        let status = response.status();
        let body = response.into_body().read_to_string().map_err(|e| {
            PrepError::Upstream(format!("Failed to read model service response: {}", e))
        })?;

        if !status.is_success() {
            return Err(PrepError::Upstream(format!(
                "Model service returned {}: {}",
                status,
                truncate(&body, 300)
            )));
        }

        parse_reply(&body)
    }
}

impl VisionService for OpenAiService {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn extract_text(&self, image: ImagePayload<'_>) -> Result<String, PrepError> {
        let started = std::time::Instant::now();
        let text = self.chat(vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text {
                    text: EXTRACTION_INSTRUCTION,
                },
                image_part(image),
            ],
        }])?;
        tracing::info!(
            "Text extraction completed in {}ms, text length: {}",
            started.elapsed().as_millis(),
            text.len()
        );
        Ok(text)
    }

    fn generate(&self, prompt: Prompt<'_>) -> Result<String, PrepError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = prompt.system {
            messages.push(ChatMessage {
                role: "system",
                content: vec![ContentPart::Text { text: system }],
            });
        }

        let mut content = vec![ContentPart::Text {
            text: prompt.instruction,
        }];
        if let Some(image) = prompt.image {
            content.push(image_part(image));
        }
        messages.push(ChatMessage {
            role: "user",
            content,
        });

        self.chat(messages)
    }
}

fn image_part(image: ImagePayload<'_>) -> ContentPart<'static> {
    ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: data_url(image),
        },
    }
}

pub fn data_url(image: ImagePayload<'_>) -> String {
    format!(
        "data:{};base64,{}",
        image.mime_type,
        BASE64_STANDARD.encode(image.bytes)
    )
}

fn parse_reply(body: &str) -> Result<String, PrepError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| PrepError::Upstream(format!("Malformed model service response: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| PrepError::Upstream("Model service returned no content".to_string()))
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
