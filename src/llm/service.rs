use async_trait::async_trait;
use reqwest::StatusCode;

use crate::llm::types::{GenerationRequest, GenerationResponse};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,
    #[error("Gemini request failed: {0}")]
    Transport(String),
    #[error("Gemini request failed with status {status}: {detail}")]
    Api {
        status: StatusCode,
        message: Option<String>,
        detail: String,
    },
    #[error("Gemini returned a malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Message reported by the service itself, when it sent one.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            ServiceError::Api {
                message: Some(message),
                ..
            } => Some(message.as_str()),
            _ => None,
        }
    }
}

/// The two operations the designer consumes from a generative backend.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    async fn generate_image(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError>;

    async fn generate_text(&self, request: GenerationRequest) -> Result<String, ServiceError>;
}
