use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use facematch_core::{
    DecodedImage, EmbedderError, Embedding, EmbeddingProvider, FaceEmbedder, ProviderError,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Queued requests allowed per worker before callers wait for capacity.
const QUEUE_DEPTH_PER_WORKER: usize = 2;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("embedder error: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("failed to spawn engine worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<EngineError> for ProviderError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ChannelClosed | EngineError::Spawn(_) => {
                ProviderError::Unavailable(err.to_string())
            }
            EngineError::Embedder(inner) => ProviderError::Failed(inner.to_string()),
        }
    }
}

type EmbedResult = Result<Vec<Embedding>, EmbedderError>;

/// Message sent from request handlers to the worker pool.
struct EmbedRequest {
    image: Arc<DecodedImage>,
    reply: oneshot::Sender<EmbedResult>,
}

/// Clone-safe handle to the engine worker pool.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EmbedRequest>,
}

impl EngineHandle {
    /// Queue an image for embedding on the next free worker.
    pub async fn extract(&self, image: Arc<DecodedImage>) -> Result<Vec<Embedding>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EmbedRequest {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

impl EmbeddingProvider for EngineHandle {
    fn embed(
        &self,
        image: Arc<DecodedImage>,
    ) -> impl Future<Output = Result<Vec<Embedding>, ProviderError>> + Send {
        let handle = self.clone();
        async move { handle.extract(image).await.map_err(ProviderError::from) }
    }
}

/// Load `workers` isolated model instances and spawn one OS thread per instance.
///
/// Fails fast at startup if any model cannot be loaded.
pub fn spawn_engine(
    model_dir: &Path,
    workers: usize,
    intra_threads: usize,
) -> Result<EngineHandle, EngineError> {
    let mut embedders = Vec::with_capacity(workers);
    for worker in 0..workers {
        let embedder = FaceEmbedder::load(model_dir, intra_threads)?;
        tracing::info!(worker, model_dir = %model_dir.display(), "face embedder loaded");
        embedders.push(embedder);
    }

    spawn_workers(
        embedders
            .into_iter()
            .map(|mut embedder| move |image: &DecodedImage| embedder.embed(image))
            .collect(),
    )
}

/// Spawn one thread per embedding function, all fed from a single bounded queue.
///
/// Each thread owns its function exclusively; no model state is shared.
fn spawn_workers<F>(workers: Vec<F>) -> Result<EngineHandle, EngineError>
where
    F: FnMut(&DecodedImage) -> EmbedResult + Send + 'static,
{
    let capacity = (workers.len() * QUEUE_DEPTH_PER_WORKER).max(1);
    let (tx, rx) = mpsc::channel::<EmbedRequest>(capacity);
    let rx = Arc::new(Mutex::new(rx));

    for (worker, mut embed) in workers.into_iter().enumerate() {
        let rx = Arc::clone(&rx);
        std::thread::Builder::new()
            .name(format!("facematch-engine-{worker}"))
            .spawn(move || {
                tracing::info!(worker, "engine worker started");
                while let Some(req) = next_request(&rx) {
                    if req.reply.is_closed() {
                        tracing::debug!(worker, "skipping embedding, caller gone");
                        continue;
                    }
                    let started = Instant::now();
                    let result = embed(&req.image);
                    tracing::debug!(
                        worker,
                        faces = result.as_ref().map(Vec::len).unwrap_or(0),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "embedding finished"
                    );
                    // The caller may have given up at its deadline.
                    if req.reply.send(result).is_err() {
                        tracing::debug!(worker, "embedding result discarded, caller gone");
                    }
                }
                tracing::info!(worker, "engine worker exiting");
            })?;
    }

    Ok(EngineHandle { tx })
}

/// Take the next request, holding the queue lock only while waiting for it.
fn next_request(rx: &Mutex<mpsc::Receiver<EmbedRequest>>) -> Option<EmbedRequest> {
    let mut guard = match rx.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.blocking_recv()
}
