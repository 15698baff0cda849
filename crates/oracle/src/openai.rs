use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http::{build_client, read_body, retry_with_backoff};
use crate::{GenerationOracle, OracleError, Role, TokenUsage, Transcript, Turn};
use config_loader::OracleSettings;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// Chat Completions session.
pub struct OpenAiOracle {
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

impl OpenAiOracle {
    pub fn new(
        settings: &OracleSettings,
        api_key: String,
        debug: bool,
    ) -> Result<Self, OracleError> {
        Ok(Self {
            client: build_client(settings.timeout)?,
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.openai_model.clone(),
            temperature: settings.temperature,
            max_retries: settings.max_retries,
            debug,
            transcript: Transcript::default(),
            usage: TokenUsage::default(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn send(&self, turns: &[Turn]) -> Result<ChatResponse, OracleError> {
        let request = ChatRequest {
            model: &self.model,
            messages: to_messages(turns),
            temperature: self.temperature,
        };
        let url = self.endpoint();

        let body = retry_with_backoff(self.max_retries, || {
            let response = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .map_err(|e| OracleError::Http {
                    message: e.to_string(),
                })?;
            read_body(response)
        })?;

        serde_json::from_str(&body)
            .map_err(|e| OracleError::parse(format!("invalid chat completion payload: {e}")))
    }
}

fn to_messages(turns: &[Turn]) -> Vec<Message> {
    turns
        .iter()
        .map(|turn| Message {
            role: match turn.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            }
            .to_string(),
            content: turn.content.clone(),
        })
        .collect()
}

impl GenerationOracle for OpenAiOracle {
    fn generate(&mut self, prompt: &str, system: Option<&str>) -> Result<String, OracleError> {
        let turns = self.transcript.pending(prompt, system);
        if self.debug {
            debug!(model = %self.model, turns = turns.len(), %prompt, "openai request");
        }

        let response = self.send(&turns)?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)?;

        if let Some(usage) = response.usage {
            self.usage = TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            };
        }
        info!(
            vendor = "openai",
            input_tokens = self.usage.input_tokens,
            output_tokens = self.usage.output_tokens,
            "oracle reply received"
        );
        if self.debug {
            debug!(%content, "openai reply");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_roles_in_order() {
        let mut transcript = Transcript::default();
        let first = transcript.pending("analyze", Some("you analyze"));
        transcript.commit(first, "done");
        let turns = transcript.pending("again", None);

        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: to_messages(&turns),
            temperature: 0.3,
        };
        let value = serde_json::to_value(&request).unwrap();
        let roles: Vec<&str> = value["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(value["model"], "gpt-4o-mini");
    }

    #[test]
    fn response_without_usage_still_parses() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"FROM debian"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.usage.is_none());
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("FROM debian")
        );
    }
}
