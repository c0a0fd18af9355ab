//! Chat completions against any OpenAI-compatible endpoint.

use serde::{Deserialize, Serialize};

use trailsync_core::chat::ChatMessage;

use super::IntegrationError;

const SERVICE: &str = "OpenAI";

pub const DEFAULT_TEMPERATURE: f32 = 0.4;

/// Endpoint, key and model resolved from settings for one call.
#[derive(Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl std::fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"****")
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Sends the conversation and returns the first choice.
    pub async fn complete(
        &self,
        settings: &OpenAiSettings,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<Completion, IntegrationError> {
        let url = format!("{}/chat/completions", settings.base_url.trim_end_matches('/'));
        tracing::debug!(
            model = %settings.model,
            messages = messages.len(),
            "requesting chat completion"
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(&settings.api_key)
            .json(&CompletionRequest {
                model: &settings.model,
                messages,
                temperature,
            })
            .send()
            .await
            .map_err(|e| IntegrationError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error_response(status, &body));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| IntegrationError::Decode(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| IntegrationError::Decode("completion has no content".to_string()))?;

        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion finished"
            );
        }

        Ok(Completion {
            content,
            model: parsed.model.unwrap_or_else(|| settings.model.clone()),
            usage: parsed.usage,
        })
    }
}

/// Prefers the API's own error message over the raw body.
fn parse_error_response(status: reqwest::StatusCode, body: &str) -> IntegrationError {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return IntegrationError::Unauthorized(SERVICE);
    }
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(500).collect());
    IntegrationError::Api {
        service: SERVICE,
        status: status.as_u16(),
        body: message,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings(server: &MockServer) -> OpenAiSettings {
        OpenAiSettings {
            base_url: format!("{}/v1/", server.uri()),
            api_key: "sk-test".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }

    #[tokio::test]
    async fn returns_first_choice_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "how far?" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [
                    { "index": 0, "message": { "role": "assistant", "content": "42 km." }, "finish_reason": "stop" }
                ],
                "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = OpenAiClient::new(reqwest::Client::new())
            .complete(
                &settings(&server),
                &[ChatMessage::system("be brief"), ChatMessage::user("how far?")],
                DEFAULT_TEMPERATURE,
            )
            .await
            .unwrap();

        assert_eq!(completion.content, "42 km.");
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn api_error_message_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "Rate limit reached", "type": "requests" }
            })))
            .mount(&server)
            .await;

        let err = OpenAiClient::new(reqwest::Client::new())
            .complete(&settings(&server), &[ChatMessage::user("hi")], 0.0)
            .await
            .unwrap_err();

        match err {
            IntegrationError::Api { status, body, .. } => {
                assert_eq!(status, 429);
                assert_eq!(body, "Rate limit reached");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_key_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = OpenAiClient::new(reqwest::Client::new())
            .complete(&settings(&server), &[ChatMessage::user("hi")], 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Unauthorized("OpenAI")));
    }

    #[tokio::test]
    async fn empty_choices_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = OpenAiClient::new(reqwest::Client::new())
            .complete(&settings(&server), &[ChatMessage::user("hi")], 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Decode(_)));
    }
}
