use super::models::{AiConfig, AiMessage, InferenceError};
use super::prompt::{PromptTemplate, COLUMN_NAMES, FILE_CONTENT, TEXT_CONTENT};
use async_trait::async_trait;

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Sends a chat completion request and returns the generated text.
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        config: &AiConfig,
    ) -> Result<String, InferenceError>;
}

/// Fills the configured prompt template and asks the model for structured
/// output. The raw text comes back untouched; turning it into records is the
/// parser's job.
pub struct InferenceService<P: AiProvider> {
    provider: P,
    template: PromptTemplate,
    config: AiConfig,
}

impl<P: AiProvider> InferenceService<P> {
    pub fn new(provider: P, template: PromptTemplate, config: AiConfig) -> Self {
        Self {
            provider,
            template,
            config,
        }
    }

    #[cfg(test)]
    pub(crate) fn provider(&self) -> &P {
        &self.provider
    }

    /// Sends `template` filled with `values` as a single user turn.
    pub async fn infer(
        &self,
        template: &PromptTemplate,
        values: &[(&str, &str)],
    ) -> Result<String, InferenceError> {
        let prompt = template.fill(values);
        tracing::debug!(
            model = %self.config.model,
            prompt_chars = prompt.chars().count(),
            "Sending inference request"
        );
        let messages = [AiMessage::user(prompt)];
        self.provider.chat_complete(&messages, &self.config).await
    }

    /// Asks for records matching `columns`, built from the message text and
    /// optional document text.
    pub async fn structure(
        &self,
        text: &str,
        file_content: &str,
        columns: &[String],
    ) -> Result<String, InferenceError> {
        let column_names = columns.join(",");
        self.infer(
            &self.template,
            &[
                (TEXT_CONTENT, text),
                (FILE_CONTENT, file_content),
                (COLUMN_NAMES, &column_names),
            ],
        )
        .await
    }
}
