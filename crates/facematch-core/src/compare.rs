//! Face comparison pipeline.
//!
//! A request moves strictly forward through
//! `validate → decode (source, target) → embed (source, target) → score`;
//! any stage may end it with a [`CompareError`]. There are no retries.

use crate::decoder::{DecodeError, ImageDecoder};
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::scorer::SimilarityScorer;
use crate::types::{DecodedImage, Embedding};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// Tracing target for audit records (request metadata and outcomes).
pub const AUDIT_TARGET: &str = "facematch::audit";

/// Default deadline for a single embedding call.
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound comparison request.
///
/// `document_no` and `datetime` are carried for the audit log only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub source_url: Option<String>,
    pub target_url: Option<String>,
    pub document_no: Option<String>,
    pub datetime: Option<String>,
}

impl ComparisonRequest {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_url: Some(source.into()),
            target_url: Some(target.into()),
            ..Self::default()
        }
    }

    /// Both image payloads, or [`CompareError::MissingField`] if either is absent or empty.
    pub fn payloads(&self) -> Result<(&str, &str), CompareError> {
        fn non_empty(field: &Option<String>) -> Option<&str> {
            field.as_deref().filter(|s| !s.is_empty())
        }
        match (non_empty(&self.source_url), non_empty(&self.target_url)) {
            (Some(source), Some(target)) => Ok((source, target)),
            _ => Err(CompareError::MissingField),
        }
    }
}

/// Successful comparison body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResponse {
    pub selfie_image_score: f64,
}

/// Failed comparison body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&CompareError> for ErrorResponse {
    fn from(err: &CompareError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Which of the two submitted images a failure concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Source,
    Target,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageRole::Source => "source",
            ImageRole::Target => "target",
        })
    }
}

/// Pipeline stage at which a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Decode,
    Embed,
    Score,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Validate => "validate",
            Stage::Decode => "decode",
            Stage::Embed => "embed",
            Stage::Score => "score",
        })
    }
}

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("No images provided")]
    MissingField,
    #[error("invalid request body: {0}")]
    MalformedBody(String),
    #[error("Error loading {role} image: {source}")]
    InvalidImage {
        role: ImageRole,
        #[source]
        source: DecodeError,
    },
    #[error("No face found in {0} image")]
    NoFaceDetected(ImageRole),
    #[error("face embedding failed for {role} image: {source}")]
    Embedding {
        role: ImageRole,
        #[source]
        source: ProviderError,
    },
    #[error("face embedding failed: dimension mismatch (source {source_dim}, target {target_dim})")]
    DimensionMismatch { source_dim: usize, target_dim: usize },
    #[error("face embedding timed out after {timeout:?} for {role} image")]
    Timeout { role: ImageRole, timeout: Duration },
    #[error("image decoding was interrupted: {0}")]
    DecodeTask(#[source] tokio::task::JoinError),
}

impl CompareError {
    /// Stable machine-readable tag for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CompareError::MissingField => "missing_field",
            CompareError::MalformedBody(_) => "malformed_body",
            CompareError::InvalidImage { .. } => "invalid_image",
            CompareError::NoFaceDetected(_) => "no_face_detected",
            CompareError::Embedding { .. } | CompareError::DimensionMismatch { .. } => {
                "embedding_failure"
            }
            CompareError::Timeout { .. } => "timeout",
            CompareError::DecodeTask(_) => "decode_interrupted",
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            CompareError::MissingField | CompareError::MalformedBody(_) => Stage::Validate,
            CompareError::InvalidImage { .. } | CompareError::DecodeTask(_) => Stage::Decode,
            CompareError::NoFaceDetected(_)
            | CompareError::Embedding { .. }
            | CompareError::Timeout { .. } => Stage::Embed,
            CompareError::DimensionMismatch { .. } => Stage::Score,
        }
    }

    /// Log this error as an audit record.
    pub fn audit(&self, request_id: Uuid) {
        tracing::warn!(
            target: AUDIT_TARGET,
            %request_id,
            stage = %self.stage(),
            kind = self.kind(),
            error = %self,
            "comparison failed"
        );
    }
}

/// Runs the comparison pipeline against an injected embedding provider.
pub struct Comparator<P> {
    provider: P,
    decoder: ImageDecoder,
    scorer: SimilarityScorer,
    embed_timeout: Duration,
}

impl<P: EmbeddingProvider> Comparator<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            decoder: ImageDecoder::default(),
            scorer: SimilarityScorer::default(),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }

    pub fn with_decoder(mut self, decoder: ImageDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_scorer(mut self, scorer: SimilarityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_embed_timeout(mut self, embed_timeout: Duration) -> Self {
        self.embed_timeout = embed_timeout;
        self
    }

    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    pub fn embed_timeout(&self) -> Duration {
        self.embed_timeout
    }

    /// Compare the two images in `request`, returning a score in [0, 100].
    ///
    /// Request metadata is written to the audit log whatever the outcome.
    pub async fn compare(&self, request: &ComparisonRequest) -> Result<f64, CompareError> {
        let request_id = Uuid::new_v4();
        let result = self.run(request).await;

        tracing::info!(
            target: AUDIT_TARGET,
            %request_id,
            document_no = ?request.document_no,
            datetime = ?request.datetime,
            "comparison metadata"
        );
        match &result {
            Ok(score) => tracing::info!(
                target: AUDIT_TARGET,
                %request_id,
                score = *score,
                "comparison scored"
            ),
            Err(err) => err.audit(request_id),
        }

        result
    }

    async fn run(&self, request: &ComparisonRequest) -> Result<f64, CompareError> {
        let (source, target) = request.payloads()?;

        let (source_image, target_image) = self.decode_pair(source, target).await?;

        // One deadline covers both embedding calls, including queueing.
        let deadline = Instant::now() + self.embed_timeout;
        let source_embedding = self.embed(ImageRole::Source, source_image, deadline).await?;
        let target_embedding = self.embed(ImageRole::Target, target_image, deadline).await?;

        if source_embedding.dim() != target_embedding.dim() {
            return Err(CompareError::DimensionMismatch {
                source_dim: source_embedding.dim(),
                target_dim: target_embedding.dim(),
            });
        }

        Ok(self.scorer.score(&source_embedding, &target_embedding))
    }

    /// Decode source then target on the blocking pool.
    async fn decode_pair(
        &self,
        source: &str,
        target: &str,
    ) -> Result<(DecodedImage, DecodedImage), CompareError> {
        let decoder = self.decoder;
        let (source, target) = (source.to_owned(), target.to_owned());

        tokio::task::spawn_blocking(move || {
            let decode = |role, payload: &str| {
                decoder
                    .decode(payload)
                    .map_err(|source| CompareError::InvalidImage { role, source })
            };
            Ok::<_, CompareError>((
                decode(ImageRole::Source, &source)?,
                decode(ImageRole::Target, &target)?,
            ))
        })
        .await
        .map_err(CompareError::DecodeTask)?
    }

    /// Embed one image before `deadline` and keep its first face.
    async fn embed(
        &self,
        role: ImageRole,
        image: DecodedImage,
        deadline: Instant,
    ) -> Result<Embedding, CompareError> {
        let embeddings = tokio::time::timeout_at(deadline, self.provider.embed(Arc::new(image)))
            .await
            .map_err(|_| CompareError::Timeout {
                role,
                timeout: self.embed_timeout,
            })?
            .map_err(|source| CompareError::Embedding { role, source })?;

        tracing::debug!(%role, faces = embeddings.len(), "embeddings extracted");

        embeddings
            .into_iter()
            .next()
            .ok_or(CompareError::NoFaceDetected(role))
    }
}
