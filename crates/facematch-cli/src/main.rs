use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use clap::{Parser, Subcommand};
use facematch_core::{
    Comparator, ComparisonRequest, ComparisonResponse, DecodedImage, Embedding, EmbeddingProvider,
    ErrorResponse, FaceEmbedder, ProviderError, SimilarityScorer, DEFAULT_SCORE_THRESHOLD,
};
use image::ImageFormat;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facematch", about = "Face comparison CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the faces in two image files and print the score as JSON
    Compare {
        /// Reference image (e.g. document photo)
        source: PathBuf,
        /// Image to compare against the reference (e.g. selfie)
        target: PathBuf,
        /// Embedding distance at which the score reaches 0
        #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD)]
        threshold: f64,
        /// Directory containing the ONNX model files
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Deadline in seconds for each embedding call
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
        /// ONNX Runtime intra-op threads
        #[arg(long, default_value_t = 2)]
        intra_threads: usize,
    },
    /// Print an image file as a base64 data URL, ready for a request body
    Encode {
        /// Image file to encode
        path: PathBuf,
    },
}

/// Runs a single in-process embedder off the async runtime.
struct LocalProvider(Arc<Mutex<FaceEmbedder>>);

impl EmbeddingProvider for LocalProvider {
    fn embed(
        &self,
        image: Arc<DecodedImage>,
    ) -> impl Future<Output = Result<Vec<Embedding>, ProviderError>> + Send {
        let embedder = Arc::clone(&self.0);
        async move {
            tokio::task::spawn_blocking(move || {
                let mut embedder = embedder
                    .lock()
                    .map_err(|_| ProviderError::Unavailable("embedder lock poisoned".into()))?;
                embedder
                    .embed(&image)
                    .map_err(|e| ProviderError::Failed(e.to_string()))
            })
            .await
            .map_err(|e| ProviderError::Failed(e.to_string()))?
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compare {
            source,
            target,
            threshold,
            model_dir,
            timeout_secs,
            intra_threads,
        } => {
            let model_dir = model_dir.unwrap_or_else(facematch_core::default_model_dir);
            tracing::debug!(model_dir = %model_dir.display(), "loading models");
            let embedder = FaceEmbedder::load(&model_dir, intra_threads)
                .with_context(|| format!("failed to load models from {}", model_dir.display()))?;

            let comparator = Comparator::new(LocalProvider(Arc::new(Mutex::new(embedder))))
                .with_scorer(SimilarityScorer::new(threshold)?)
                .with_embed_timeout(Duration::from_secs(timeout_secs));

            let request = ComparisonRequest::new(read_payload(&source)?, read_payload(&target)?);
            match comparator.compare(&request).await {
                Ok(selfie_image_score) => {
                    let response = ComparisonResponse { selfie_image_score };
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&err))?);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Encode { path } => {
            let format = ImageFormat::from_path(&path)
                .with_context(|| format!("unrecognised image extension: {}", path.display()))?;
            let bytes =
                std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            println!("{}", data_url(&bytes, format));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Read an image file as a plain base64 payload.
fn read_payload(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(BASE64_STANDARD.encode(bytes))
}

fn data_url(bytes: &[u8], format: ImageFormat) -> String {
    format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        BASE64_STANDARD.encode(bytes)
    )
}
