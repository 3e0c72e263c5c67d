pub mod ai_service;
pub mod models;
pub mod prompt;

pub use ai_service::{AiProvider, InferenceService};
pub use models::{AiConfig, AiMessage, InferenceError};
pub use prompt::PromptTemplate;
