//! The generative model seam consumed by the chat session.

use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::{domain::ImageAttachment, error::ModelError};

/// Lazy sequence of incremental text fragments, in arrival order.
pub type DeltaStream = BoxStream<'static, Result<String, ModelError>>;

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Opens a response stream for a single multimodal input made of the
    /// images followed by the prompt text.
    async fn generate_stream(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
    ) -> Result<DeltaStream, ModelError>;

    fn model_name(&self) -> &str;
}

/// Stand-in used when no credentials are configured.
pub struct MissingGenerativeModel;

#[async_trait]
impl GenerativeModel for MissingGenerativeModel {
    async fn generate_stream(
        &self,
        _prompt: &str,
        _images: &[ImageAttachment],
    ) -> Result<DeltaStream, ModelError> {
        Err(ModelError::Configuration(
            "generative model is unavailable: no API key configured".to_string(),
        ))
    }

    fn model_name(&self) -> &str {
        "unavailable"
    }
}
