//! Face-embedding capability consumed by the comparison pipeline.

use crate::types::{DecodedImage, Embedding};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

/// Source of face embeddings for a decoded image.
///
/// Implementations return one embedding per detected face. The sequence may
/// be empty, and its order must be deterministic for identical input and
/// model version; callers use the first entry as the image's representative
/// face. Which face comes first is up to the implementation.
///
/// Implementations are invoked concurrently from independent requests.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(
        &self,
        image: Arc<DecodedImage>,
    ) -> impl Future<Output = Result<Vec<Embedding>, ProviderError>> + Send;
}

impl<P: EmbeddingProvider> EmbeddingProvider for Arc<P> {
    fn embed(
        &self,
        image: Arc<DecodedImage>,
    ) -> impl Future<Output = Result<Vec<Embedding>, ProviderError>> + Send {
        (**self).embed(image)
    }
}
