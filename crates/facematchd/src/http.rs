//! HTTP surface: `POST /api/compare_faces`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use facematch_core::{
    Comparator, CompareError, ComparisonRequest, ComparisonResponse, EmbeddingProvider,
    ErrorResponse,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

pub const COMPARE_FACES_PATH: &str = "/api/compare_faces";

/// Every comparison failure is reported to the client as 400 with `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(pub CompareError);

impl From<CompareError> for ApiError {
    fn from(err: CompareError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

pub fn create_router<P>(comparator: Arc<Comparator<P>>, body_limit: usize) -> Router
where
    P: EmbeddingProvider + 'static,
{
    Router::new()
        .route(COMPARE_FACES_PATH, post(compare_faces_handler::<P>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(comparator)
}

#[tracing::instrument(skip_all)]
pub async fn compare_faces_handler<P>(
    State(comparator): State<Arc<Comparator<P>>>,
    payload: Result<Json<ComparisonRequest>, JsonRejection>,
) -> Result<Json<ComparisonResponse>, ApiError>
where
    P: EmbeddingProvider + 'static,
{
    let Json(request) = payload.map_err(|rejection| {
        let err = CompareError::MalformedBody(rejection.body_text());
        err.audit(Uuid::new_v4());
        err
    })?;

    let selfie_image_score = comparator.compare(&request).await?;
    Ok(Json(ComparisonResponse { selfie_image_score }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
    use facematch_core::{DecodedImage, Embedding, ProviderError};
    use http_body_util::BodyExt;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::future::Future;
    use std::io::Cursor;
    use tower::ServiceExt;

    /// One face per image, placed on a line by image width; 1px-wide images have no face.
    struct WidthProvider;

    impl EmbeddingProvider for WidthProvider {
        fn embed(
            &self,
            image: Arc<DecodedImage>,
        ) -> impl Future<Output = Result<Vec<Embedding>, ProviderError>> + Send {
            let width = image.width();
            async move {
                if width == 1 {
                    return Ok(Vec::new());
                }
                Ok(vec![Embedding::new(vec![width as f32 / 100.0, 0.0])])
            }
        }
    }

    fn router() -> Router {
        create_router(Arc::new(Comparator::new(WidthProvider)), 1024 * 1024)
    }

    fn png_payload(width: u32) -> String {
        let img = RgbImage::from_pixel(width, 6, Rgb([200, 150, 120]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        BASE64_STANDARD.encode(buf.into_inner())
    }

    async fn post_json(body: String) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(COMPARE_FACES_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_identical_images_score_100() {
        let payload = png_payload(10);
        let body = serde_json::json!({
            "source_url": payload,
            "target_url": format!("data:image/png;base64,{payload}"),
            "document_no": "A-1",
            "datetime": "2024-01-01T00:00:00Z",
        });
        let (status, json) = post_json(body.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "selfie_image_score": 100.0 }));
    }

    #[tokio::test]
    async fn test_distance_maps_to_score() {
        // Widths 10 and 100 sit 0.9 apart.
        let body = serde_json::json!({
            "source_url": png_payload(10),
            "target_url": png_payload(100),
        });
        let (status, json) = post_json(body.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        let score = json["selfie_image_score"].as_f64().unwrap();
        assert!((score - 40.0).abs() < 1e-4, "got {score}");
    }

    #[tokio::test]
    async fn test_missing_target_is_rejected() {
        let body = serde_json::json!({ "source_url": png_payload(10) });
        let (status, json) = post_json(body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, serde_json::json!({ "error": "No images provided" }));
    }

    #[tokio::test]
    async fn test_invalid_base64_is_rejected() {
        let body = serde_json::json!({
            "source_url": "not-base64!!",
            "target_url": png_payload(10),
        });
        let (status, json) = post_json(body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error = json["error"].as_str().unwrap();
        assert!(error.starts_with("Error loading source image"), "{error}");
    }

    #[tokio::test]
    async fn test_no_face_is_rejected() {
        let body = serde_json::json!({
            "source_url": png_payload(10),
            "target_url": png_payload(1),
        });
        let (status, json) = post_json(body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json,
            serde_json::json!({ "error": "No face found in target image" })
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let (status, json) = post_json("{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid request body"));
    }

    #[tokio::test]
    async fn test_other_routes_not_found() {
        let request = Request::builder()
            .method("GET")
            .uri("/api/other")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_on_compare_not_allowed() {
        let request = Request::builder()
            .method("GET")
            .uri(COMPARE_FACES_PATH)
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
