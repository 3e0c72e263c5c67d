use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    pub role: String,
    pub content: String,
}

impl AiMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Fixed decoding parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct AiConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
}

impl AiConfig {
    /// Bounded output and moderate randomness: enough room for a handful of
    /// rows without letting the model ramble.
    pub fn structured_output(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.5,
            max_tokens: Some(500),
            top_p: Some(1.0),
            top_k: Some(40),
            presence_penalty: Some(0.0),
            frequency_penalty: Some(0.0),
        }
    }
}

/// Failures of the hosted model call. None of these are retried.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference request failed: {0}")]
    Transport(String),

    #[error("Inference provider rejected the credentials ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("Inference provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Inference response had an unexpected shape: {0}")]
    MalformedResponse(String),
}
