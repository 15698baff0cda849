use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http::{build_client, read_body, retry_with_backoff};
use crate::{GenerationOracle, OracleError, Role, TokenUsage, Transcript, Turn};
use config_loader::OracleSettings;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

/// Gemini `generateContent` session.
pub struct GoogleOracle {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: u32,
    debug: bool,
    transcript: Transcript,
    usage: TokenUsage,
}

impl GoogleOracle {
    pub fn new(
        settings: &OracleSettings,
        api_key: String,
        debug: bool,
    ) -> Result<Self, OracleError> {
        Ok(Self {
            client: build_client(settings.timeout)?,
            base_url: settings.google_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.google_model.clone(),
            temperature: settings.temperature,
            max_retries: settings.max_retries,
            debug,
            transcript: Transcript::default(),
            usage: TokenUsage::default(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn send(&self, request: &GenerateRequest) -> Result<GenerateResponse, OracleError> {
        let url = self.endpoint();
        let body = retry_with_backoff(self.max_retries, || {
            let response = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .header("x-goog-api-key", &self.api_key)
                .json(request)
                .send()
                .map_err(|e| OracleError::Http {
                    message: e.to_string(),
                })?;
            read_body(response)
        })?;

        serde_json::from_str(&body)
            .map_err(|e| OracleError::parse(format!("invalid generateContent payload: {e}")))
    }
}

/// Gemini keeps system text out of the turn list, so every system turn in
/// the session is folded into one instruction block.
fn to_request(turns: &[Turn], temperature: f32) -> GenerateRequest {
    let system_text: Vec<&str> = turns
        .iter()
        .filter(|t| t.role == Role::System)
        .map(|t| t.content.as_str())
        .collect();
    let system_instruction = (!system_text.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part {
            text: system_text.join("\n\n"),
        }],
    });

    let contents = turns
        .iter()
        .filter_map(|turn| {
            let role = match turn.role {
                Role::System => return None,
                Role::User => "user",
                Role::Assistant => "model",
            };
            Some(Content {
                role: Some(role.to_string()),
                parts: vec![Part {
                    text: turn.content.clone(),
                }],
            })
        })
        .collect();

    GenerateRequest {
        system_instruction,
        contents,
        generation_config: GenerationConfig { temperature },
    }
}

impl GenerationOracle for GoogleOracle {
    fn generate(&mut self, prompt: &str, system: Option<&str>) -> Result<String, OracleError> {
        let turns = self.transcript.pending(prompt, system);
        if self.debug {
            debug!(model = %self.model, turns = turns.len(), %prompt, "google request");
        }

        let response = self.send(&to_request(&turns, self.temperature))?;
        let content = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)?;

        if let Some(usage) = response.usage_metadata {
            self.usage = TokenUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            };
        }
        info!(
            vendor = "google",
            input_tokens = self.usage.input_tokens,
            output_tokens = self.usage.output_tokens,
            "oracle reply received"
        );
        if self.debug {
            debug!(%content, "google reply");
        }

        self.transcript.commit(turns, &content);
        Ok(content)
    }

    fn reset(&mut self) {
        self.transcript.clear();
    }

    fn usage(&self) -> TokenUsage {
        self.usage
    }
}
