//! HTTP facade for an objst [`Bucket`].
//!
//! | Route | Handler |
//! |---|---|
//! | `POST /objst` | create from a JSON object model |
//! | `POST /objst/upload` | create from a multipart upload |
//! | `POST /objst/query` | point lookup or predicate scan, get or delete |
//! | `GET /objst/{id}` | object model including payload |
//! | `GET /objst/read/{id}` | raw payload |
//! | `DELETE /objst/{id}` | delete |
//! | `GET /health` | liveness, no auth |

pub mod auth;
pub mod error;
pub mod handlers;

use auth::{Authenticator, auth_layer};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use objst::Bucket;
use objst_common::HttpConfig;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
pub struct AppState {
    pub bucket: Arc<Bucket>,
    /// Multipart field carrying the uploaded file
    pub form_key: String,
}

/// Build the router.
pub fn router(bucket: Arc<Bucket>, config: &HttpConfig, auth: Arc<dyn Authenticator>) -> Router {
    let state = Arc::new(AppState {
        bucket,
        form_key: config.form_key.clone(),
    });

    Router::new()
        .route("/health", get(handlers::health))
        .route("/objst", post(handlers::create_object))
        .route("/objst/upload", post(handlers::upload_object))
        .route("/objst/query", post(handlers::query_objects))
        .route(
            "/objst/{id}",
            get(handlers::get_object).delete(handlers::delete_object),
        )
        .route("/objst/read/{id}", get(handlers::read_object))
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        .layer(middleware::from_fn_with_state(auth, auth_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::HeaderAuthenticator;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use objst_common::BucketConfig;
    use serde_json::{Value, json};
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    const OWNER: &str = "x-objst-owner";

    fn app() -> (TempDir, Router) {
        let dir = tempdir().unwrap();
        let mut config = BucketConfig::with_data_dir(dir.path());
        config.maintenance.enabled = false;
        let bucket = Arc::new(Bucket::open(config).unwrap());
        let http = HttpConfig::default();
        let auth = Arc::new(HeaderAuthenticator::new(&http.owner_header).unwrap());
        (dir, router(bucket, &http, auth))
    }

    fn json_request(method: &str, uri: &str, owner: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(OWNER, owner)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str, owner: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(OWNER, owner)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(app: &Router, owner: &str, name: &str, meta: Value) -> String {
        let body = json!({ "name": name, "metadata": meta, "payload": "aGVsbG8=" });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/objst", owner, &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_without_auth() {
        let (_dir, app) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_owner_is_401() {
        let (_dir, app) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/objst/read/00000000-0000-0000-0000-000000000000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["status"], 401);
    }

    #[tokio::test]
    async fn test_create_get_read_delete() {
        let (_dir, app) = app();
        let id = create(&app, "u1", "notes.txt", json!({ "contentType": "text/plain" })).await;

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/objst/{id}"), "u1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let model = body_json(response).await;
        assert_eq!(model["owner"], "u1");
        assert_eq!(model["payload"], "aGVsbG8=");

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/objst/read/{id}"), "u1"))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello");

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/objst/{id}"), "u1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(empty_request("GET", &format!("/objst/{id}"), "u1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (_dir, app) = app();
        let id = create(&app, "u1", "a.txt", json!({ "contentType": "text/plain" })).await;

        // Someone else's object
        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/objst/{id}"), "u2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Duplicate name
        let body = json!({ "name": "a.txt", "metadata": { "contentType": "text/plain" }, "payload": "eA==" });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/objst", "u1", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Missing content type
        let body = json!({ "name": "b.txt", "payload": "eA==" });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/objst", "u1", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Malformed id
        let response = app
            .oneshot(empty_request("GET", "/objst/diasjdkas", "u1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_multipart_upload() {
        let (_dir, app) = app();
        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"contentType\"\r\n\r\n",
            "text/csv\r\n",
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"report.csv\"\r\n",
            "Content-Type: application/octet-stream\r\n\r\n",
            "a,b\n1,2\n\r\n",
            "--XBOUNDARY--\r\n",
        );
        let request = Request::builder()
            .method("POST")
            .uri("/objst/upload")
            .header(OWNER, "u1")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let model = body_json(response).await;
        assert_eq!(model["name"], "report.csv");
        assert_eq!(model["metadata"]["contentType"], "text/csv");
        assert!(model.get("payload").is_none());

        let id = model["id"].as_str().unwrap();
        let response = app
            .oneshot(empty_request("GET", &format!("/objst/read/{id}"), "u1"))
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_upload_without_file_part() {
        let (_dir, app) = app();
        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"contentType\"\r\n\r\n",
            "text/plain\r\n",
            "--XBOUNDARY--\r\n",
        );
        let request = Request::builder()
            .method("POST")
            .uri("/objst/upload")
            .header(OWNER, "u1")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_scoped_to_owner() {
        let (_dir, app) = app();
        create(&app, "u2", "a.txt", json!({ "contentType": "text/plain", "invalid": "true", "foo": "bar" })).await;
        create(&app, "u2", "b.txt", json!({ "contentType": "text/plain", "invalid": "true" })).await;
        create(&app, "u2", "c.txt", json!({ "contentType": "text/plain" })).await;
        create(&app, "u3", "a.txt", json!({ "contentType": "text/plain", "invalid": "true" })).await;

        let query = json!({ "params": { "invalid": "true" } });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/objst/query", "u2", &query))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["objects"].as_array().unwrap().len(), 2);

        // An owner param cannot reach another owner's objects
        let query = json!({ "params": { "invalid": "true", "owner": "u3" } });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/objst/query", "u2", &query))
            .await
            .unwrap();
        let objects = body_json(response).await["objects"].clone();
        assert!(objects.as_array().unwrap().iter().all(|o| o["owner"] == "u2"));

        let query = json!({
            "params": { "invalid": "true", "foo": "bar" },
            "action": "and",
            "operation": "delete"
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/objst/query", "u2", &query))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["deleted"], 1);

        let response = app
            .oneshot(json_request("POST", "/objst/query", "u2", &json!({})))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["objects"].as_array().unwrap().len(), 2);
    }
}
