use std::sync::Arc;

use axum::Router;
use facematch_core::{Comparator, EmbeddingProvider, ImageDecoder, ScorerError, SimilarityScorer};
use tokio::signal;

use crate::config::Config;
use crate::http::{create_router, COMPARE_FACES_PATH};

/// HTTP server wiring a [`Comparator`] to the configured listener.
pub struct Server<P> {
    config: Config,
    comparator: Arc<Comparator<P>>,
}

impl<P: EmbeddingProvider + 'static> Server<P> {
    pub fn new(config: Config, provider: P) -> Result<Self, ScorerError> {
        let comparator = Comparator::new(provider)
            .with_decoder(ImageDecoder::new(config.max_image_dimension))
            .with_scorer(SimilarityScorer::new(config.score_threshold)?)
            .with_embed_timeout(config.embed_timeout());
        Ok(Self {
            config,
            comparator: Arc::new(comparator),
        })
    }

    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.comparator), self.config.body_limit_bytes)
    }

    /// Bind and serve until Ctrl+C or SIGTERM. In-flight requests are drained.
    pub async fn serve(self) -> std::io::Result<()> {
        let addr = self.config.socket_addr();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, path = COMPARE_FACES_PATH, "facematchd listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("facematchd shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use facematch_core::{DecodedImage, Embedding, ProviderError};
    use http_body_util::BodyExt;
    use std::future::Future;
    use tower::ServiceExt;

    struct NoFaces;

    impl EmbeddingProvider for NoFaces {
        fn embed(
            &self,
            _image: Arc<DecodedImage>,
        ) -> impl Future<Output = Result<Vec<Embedding>, ProviderError>> + Send {
            async { Ok(Vec::new()) }
        }
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = Config {
            score_threshold: -1.0,
            ..Config::default()
        };
        assert!(Server::new(config, NoFaces).is_err());
    }

    #[tokio::test]
    async fn test_body_limit_from_config() {
        let config = Config {
            body_limit_bytes: 64,
            ..Config::default()
        };
        let server = Server::new(config, NoFaces).unwrap();

        let body = serde_json::json!({
            "source_url": "a".repeat(256),
            "target_url": "b",
        });
        let request = Request::builder()
            .method("POST")
            .uri(COMPARE_FACES_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid request body"));
    }
}
