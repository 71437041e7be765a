
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::{AttemptError, ResponseGenerator, RetryPolicy, validate_response};
use crate::config::{API_KEY_ENV_VAR, GeminiConfig};

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

const SYSTEM_INSTRUCTION: &str = "You are a precise document assistant. Follow these rules:
1. Answer STRICTLY using the provided context
2. Never invent or hallucinate information
3. If the answer isn't in the context, say \"Not found in documents\"
4. Keep responses concise (50-100 words)
5. Format responses with bullet points when appropriate";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Blocking client for the Gemini `generateContent` API
#[derive(Debug, Clone)]
pub struct GeminiClient {
    endpoint: Url,
    model: String,
    api_key: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
    max_output_tokens: u32,
    temperature: f32,
    max_response_chars: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

impl GeminiClient {
    /// Create a client from `config`. Fails when no API key is available.
    #[inline]
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .with_context(|| format!("{API_KEY_ENV_VAR} is not set"))?;

        let base = Url::parse(&config.api_url)
            .with_context(|| format!("Invalid Gemini API URL: {}", config.api_url))?;
        let endpoint = base
            .join(&format!("/v1beta/models/{}:generateContent", config.model))
            .context("Failed to build Gemini endpoint URL")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            api_key,
            agent,
            retry: RetryPolicy::from_config(config),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            max_response_chars: config.max_response_chars,
        })
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_body(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
                temperature: self.temperature,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        };
        serde_json::to_string(&request).context("Failed to serialize generation request")
    }

    fn attempt(&self, body: &str) -> Result<String, AttemptError> {
        let response_text = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(classify_error)?;

        let response: GenerateResponse = serde_json::from_str(&response_text)
            .context("Failed to parse generation response")
            .map_err(AttemptError::Fatal)?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(AttemptError::Retryable(anyhow::anyhow!(
                "Model returned an empty response"
            )));
        }
        Ok(text)
    }
}

fn classify_error(error: ureq::Error) -> AttemptError {
    match error {
        ureq::Error::StatusCode(status) if status == 429 || status >= 500 => {
            AttemptError::Retryable(anyhow::anyhow!("Server error: HTTP {}", status))
        }
        ureq::Error::StatusCode(status) => {
            warn!("Client error (status {}), not retrying", status);
            AttemptError::Fatal(anyhow::anyhow!("Client error: HTTP {}", status))
        }
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => {
            AttemptError::Retryable(anyhow::anyhow!("Transport error: {}", error))
        }
        other => AttemptError::Fatal(anyhow::anyhow!("Non-retryable error: {}", other)),
    }
}

/// Prompt sent to the model: instructions, then context, then the question
#[inline]
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "SYSTEM INSTRUCTIONS:\n{SYSTEM_INSTRUCTION}\n\nCONTEXT DOCUMENTS:\n{context}\n\nUSER QUESTION:\n{query}\n\nYOUR RESPONSE (STRICTLY based on context):"
    )
}

impl ResponseGenerator for GeminiClient {
    fn generate(&self, query: &str, context: &str) -> Result<String> {
        debug!(
            "Generating response with {} ({} context chars)",
            self.model,
            context.chars().count()
        );

        let body = self.request_body(&build_prompt(query, context))?;
        let started = Instant::now();

        let raw = self
            .retry
            .run(|_| self.attempt(&body))
            .context("Response generation failed")?;

        info!("Generated response in {:.2?}", started.elapsed());
        Ok(validate_response(&raw, query, self.max_response_chars))
    }
}
