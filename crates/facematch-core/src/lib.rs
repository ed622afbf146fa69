//! facematch-core: face comparison pipeline.
//!
//! Decodes base64 image payloads, obtains one face embedding per image from
//! an [`EmbeddingProvider`], and converts embedding distance into a 0–100
//! similarity score. The bundled provider backend uses SCRFD for detection
//! and ArcFace for recognition, both running via ONNX Runtime on the CPU.

mod alignment;
pub mod compare;
pub mod decoder;
pub mod detector;
pub mod embedder;
pub mod provider;
pub mod recognizer;
pub mod scorer;
pub mod types;

pub use compare::{
    Comparator, CompareError, ComparisonRequest, ComparisonResponse, ErrorResponse, ImageRole,
    Stage, AUDIT_TARGET, DEFAULT_EMBED_TIMEOUT,
};
pub use decoder::{DecodeError, ImageDecoder, DEFAULT_MAX_DIMENSION};
pub use embedder::{default_model_dir, EmbedderError, FaceEmbedder};
pub use provider::{EmbeddingProvider, ProviderError};
pub use scorer::{ScorerError, SimilarityScorer, DEFAULT_SCORE_THRESHOLD};
pub use types::{BoundingBox, DecodedImage, Embedding};
