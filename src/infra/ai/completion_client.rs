use crate::core::ai::{AiConfig, AiMessage, AiProvider, InferenceError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const FIREWORKS_BASE_URL: &str = "https://api.fireworks.ai/inference/v1";

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint
/// (Fireworks by default).
pub struct CompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CompletionClient {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl AiProvider for CompletionClient {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        config: &AiConfig,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);

        let payload = json!({
            "model": config.model,
            "messages": messages,
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
            "top_p": config.top_p,
            "top_k": config.top_k,
            "presence_penalty": config.presence_penalty,
            "frequency_penalty": config.frequency_penalty,
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => InferenceError::Auth {
                    status: status.as_u16(),
                    body,
                },
                _ => InferenceError::Api {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| InferenceError::MalformedResponse("no message content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> CompletionClient {
        CompletionClient::new("fw-key".to_string(), &server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn sends_decoding_parameters_and_returns_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer fw-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "accounts/fireworks/models/llama-v3-70b-instruct",
                "messages": [{ "role": "user", "content": "hello" }],
                "max_tokens": 500,
                "top_k": 40,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{ "index": 0, "message": { "role": "assistant", "content": "```{\"a\": 1}```" } }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let answer = client_for(&server)
            .chat_complete(
                &[AiMessage::user("hello")],
                &AiConfig::structured_output("accounts/fireworks/models/llama-v3-70b-instruct"),
            )
            .await
            .unwrap();

        assert_eq!(answer, "```{\"a\": 1}```");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_key_is_an_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": "invalid api key"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .chat_complete(&[AiMessage::user("x")], &AiConfig::structured_output("m"))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Auth { status: 401, .. }));
    }

    #[tokio::test]
    async fn missing_choices_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .chat_complete(&[AiMessage::user("x")], &AiConfig::structured_output("m"))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn server_errors_carry_the_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = client_for(&server)
            .chat_complete(&[AiMessage::user("x")], &AiConfig::structured_output("m"))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Api { status: 500, ref body } if body == "overloaded"));
    }
}
