//! Defines routes for the object gateway.
//!
//! ## Structure
//! - **Uploads**
//!   - `POST   /upload`          — multipart (`file`, `folder`, `name`)
//!   - `POST   /upload-base64`   — JSON (`data`, `filename`, `folder`, `content_type`)
//!   - `POST   /upload-url`      — JSON (`url`, `folder`, `filename`)
//!
//! - **Reads**
//!   - `GET    /signed/{*key}`   — mint a capability URL (`expires_in`)
//!   - `GET    /temp/{*key}`     — capability-gated read (`expires`, `token`)
//!   - `GET    /{*key}`          — direct read (`download`), `If-None-Match` aware
//!
//! - **Mutation**
//!   - `DELETE /{*key}`          — remove an object
//!
//! Every response carries permissive CORS headers and any `OPTIONS` request
//! is answered with an empty 204.

use crate::{
    errors::AppError,
    handlers::{
        health_handlers::{health, readyz},
        object_handlers::{delete_object, get_object, get_signed_url, get_temp_object},
        upload_handlers::{upload_base64, upload_from_url, upload_multipart},
    },
    services::gateway::ObjectGateway,
};
use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the router. `max_upload_bytes` bounds request bodies for the
/// multipart and base64 upload endpoints.
pub fn routes(max_upload_bytes: usize) -> Router<ObjectGateway> {
    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/upload", post(upload_multipart))
        .route("/upload-base64", post(upload_base64))
        .route("/upload-url", post(upload_from_url))
        .route("/signed/{*key}", get(get_signed_url))
        .route("/temp/{*key}", get(get_temp_object))
        .route("/{*key}", get(get_object).delete(delete_object))
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(middleware::from_fn(options_no_content))
        .layer(TraceLayer::new_for_http())
}

/// Sits outside the CORS layer so preflights answered there also leave as an
/// empty 204, keeping the `Access-Control-*` headers CORS attached.
async fn options_no_content(req: Request, next: Next) -> Response {
    let is_options = req.method() == Method::OPTIONS;
    let response = next.run(req).await;
    if !is_options {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    parts.status = StatusCode::NO_CONTENT;
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_TYPE);
    Response::from_parts(parts, Body::empty())
}

async fn fallback() -> impl IntoResponse {
    AppError::new(StatusCode::NOT_FOUND, "Not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::payloads::{DeleteResponse, SignedUrlResponse, UploadResponse},
        services::{
            clock::FixedClock,
            gateway::tests::{NOW, capability_params, test_gateway},
            remote_fetch::tests::{origin_router, spawn_origin},
        },
    };
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    const HOST: &str = "gateway.test";
    const IMMUTABLE: &str = crate::handlers::object_handlers::IMMUTABLE_CACHE_CONTROL;

    fn test_app() -> (Router, Arc<FixedClock>) {
        let (gateway, clock) = test_gateway();
        (routes(1024 * 1024).with_state(gateway), clock)
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_bytes(resp: Response) -> Vec<u8> {
        resp.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(resp: Response) -> T {
        serde_json::from_slice(&body_bytes(resp).await).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).header("host", HOST).body(Body::empty()).unwrap()
    }

    fn json_req(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("host", HOST)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Strip scheme and host so a returned URL can be replayed via `oneshot`.
    fn path_and_query(url: &str) -> String {
        url.strip_prefix(&format!("http://{}", HOST)).unwrap().to_string()
    }

    fn multipart_req(parts: &[(&str, Option<(&str, &str)>, &[u8])]) -> Request<Body> {
        let boundary = "gateway-test-boundary";
        let mut body = Vec::new();
        for (name, file, content) in parts {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            match file {
                Some((filename, content_type)) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            name, filename, content_type
                        )
                        .as_bytes(),
                    );
                }
                None => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        Request::post("/upload")
            .header("host", HOST)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_service() {
        let (app, _) = test_app();
        let resp = send(&app, get_req("/health")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = body_json(resp).await;
        assert_eq!(body, json!({"status": "ok", "service": "object-gateway"}));

        let resp = send(&app, get_req("/readyz")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn multipart_upload_then_serve() {
        let (app, _) = test_app();
        let resp = send(
            &app,
            multipart_req(&[
                ("folder", None, b"art"),
                ("name", None, b"sunset"),
                ("file", Some(("photo.JPG", "image/jpeg")), b"\xff\xd8\xff\xe0jpeg"),
            ]),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = body_json(resp).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["key"], json!("art/sunset.jpg"));
        assert_eq!(body["url"], json!("http://gateway.test/art/sunset.jpg"));
        assert!(body.get("size").is_none());
        assert!(
            body["temp_url"]
                .as_str()
                .unwrap()
                .starts_with("http://gateway.test/temp/art%2Fsunset.jpg?expires=")
        );

        let resp = send(&app, get_req("/art/sunset.jpg")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "8");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], IMMUTABLE);
        assert!(resp.headers().get(header::CONTENT_DISPOSITION).is_none());
        assert_eq!(body_bytes(resp).await, b"\xff\xd8\xff\xe0jpeg");
    }

    #[tokio::test]
    async fn multipart_without_file_is_bad_request() {
        let (app, _) = test_app();
        let resp = send(&app, multipart_req(&[("folder", None, b"art")])).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = body_json(resp).await;
        assert_eq!(body["error"], json!("No file provided"));
    }

    #[tokio::test]
    async fn base64_scenario_signed_and_expired_temp_url() {
        let (app, clock) = test_app();
        let resp = send(
            &app,
            json_req(
                "/upload-base64",
                json!({"data": "data:image/png;base64,AAAA", "folder": "covers"}),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let upload: UploadResponse = body_json(resp).await;
        assert!(upload.key.starts_with("covers/") && upload.key.ends_with(".png"));
        assert_eq!(upload.size, Some(3));

        let resp = send(&app, get_req(&format!("/signed/{}?expires_in=60", upload.key))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let signed: SignedUrlResponse = body_json(resp).await;
        assert_eq!(signed.expires_in, 60);
        assert_eq!(signed.size, 3);
        assert_eq!(signed.content_type, "image/png");
        let (expires, _) = capability_params(&signed.temp_url);
        assert_eq!(expires, (NOW + 60).to_string());

        let temp = path_and_query(&signed.temp_url);
        let resp = send(&app, get_req(&temp)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(body_bytes(resp).await, vec![0, 0, 0]);

        clock.set(NOW + 61);
        let resp = send(&app, get_req(&temp)).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = body_json(resp).await;
        assert_eq!(body["error"], json!("Link expired"));
    }

    #[tokio::test]
    async fn temp_url_rejections_map_to_statuses() {
        let (app, _) = test_app();
        let resp = send(&app, get_req("/temp/covers/a.png")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(&app, get_req("/temp/covers/a.png?expires=tomorrow&token=x")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let future = NOW + 100;
        let resp = send(
            &app,
            get_req(&format!("/temp/covers/a.png?expires={}&token=forged", future)),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = body_json(resp).await;
        assert_eq!(body["error"], json!("Invalid token"));
    }

    #[tokio::test]
    async fn temp_url_for_missing_object_is_not_found() {
        let (app, _) = test_app();
        let resp = send(
            &app,
            json_req("/upload-base64", json!({"data": "AAAA", "filename": "x.png"})),
        )
        .await;
        let upload: UploadResponse = body_json(resp).await;
        let resp = send(
            &app,
            Request::delete(format!("/{}", upload.key))
                .header("host", HOST)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&app, get_req(&path_and_query(&upload.temp_url))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn conditional_get_returns_304() {
        let (app, _) = test_app();
        let resp = send(
            &app,
            json_req(
                "/upload-base64",
                json!({"data": "aGVsbG8=", "filename": "hello.txt", "content_type": "text/plain"}),
            ),
        )
        .await;
        let upload: UploadResponse = body_json(resp).await;
        assert_eq!(upload.key, "uploads/hello.txt");

        let resp = send(&app, get_req("/uploads/hello.txt")).await;
        let etag = resp.headers()[header::ETAG].to_str().unwrap().to_string();
        assert_eq!(etag, format!("\"{:x}\"", md5::compute(b"hello")));

        let resp = send(
            &app,
            Request::get("/uploads/hello.txt")
                .header("host", HOST)
                .header(header::IF_NONE_MATCH, &etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(resp.headers()[header::ETAG], etag.as_str());
        assert!(body_bytes(resp).await.is_empty());

        let resp = send(
            &app,
            Request::get("/uploads/hello.txt")
                .header("host", HOST)
                .header(header::IF_NONE_MATCH, "\"stale\"")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_bytes(resp).await, b"hello");
    }

    #[tokio::test]
    async fn download_flag_sets_attachment() {
        let (app, _) = test_app();
        send(
            &app,
            json_req(
                "/upload-base64",
                json!({"data": "AAAA", "folder": "docs/2024", "filename": "report.pdf"}),
            ),
        )
        .await;

        let resp = send(&app, get_req("/docs/2024/report.pdf?download=true")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"report.pdf\""
        );

        let resp = send(&app, get_req("/docs/2024/report.pdf?download=false")).await;
        assert!(resp.headers().get(header::CONTENT_DISPOSITION).is_none());
    }

    #[tokio::test]
    async fn upload_url_round_trip() {
        let origin = spawn_origin(origin_router()).await;
        let (app, _) = test_app();
        let source = format!("{}/img/photo.jpg", origin);
        let resp = send(
            &app,
            json_req("/upload-url", json!({"url": source, "folder": "mirror"})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let upload: UploadResponse = body_json(resp).await;
        assert!(upload.key.starts_with("mirror/") && upload.key.ends_with(".jpg"));
        assert_eq!(upload.size, Some(10));
        assert_eq!(upload.source.as_deref(), Some(source.as_str()));

        let resp = send(&app, get_req(&format!("/{}", upload.key))).await;
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(body_bytes(resp).await, b"jpeg-bytes");

        let resp = send(
            &app,
            json_req("/upload-url", json!({"url": format!("{}/missing", origin)})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Failed to fetch URL"));
    }

    #[tokio::test]
    async fn delete_then_serve_is_404_twice() {
        let (app, _) = test_app();
        let resp = send(&app, json_req("/upload-base64", json!({"data": "AAAA"}))).await;
        let upload: UploadResponse = body_json(resp).await;

        let delete = || {
            Request::delete(format!("/{}", upload.key))
                .header("host", HOST)
                .body(Body::empty())
                .unwrap()
        };
        let resp = send(&app, delete()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let deleted: DeleteResponse = body_json(resp).await;
        assert!(deleted.success);
        assert_eq!(deleted.deleted, upload.key);

        let resp = send(&app, get_req(&format!("/{}", upload.key))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&app, get_req(&format!("/{}", upload.key))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&app, delete()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signed_for_missing_object_is_404() {
        let (app, _) = test_app();
        let resp = send(&app, get_req("/signed/nowhere/x.png")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = body_json(resp).await;
        assert_eq!(body["error"], json!("Not found"));
        assert_eq!(body["status"], json!(404));
    }

    #[tokio::test]
    async fn invalid_json_body_is_json_error() {
        let (app, _) = test_app();
        let resp = send(
            &app,
            Request::post("/upload-base64")
                .header("host", HOST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert!(resp.status().is_client_error());
        let body: Value = body_json(resp).await;
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn plain_options_is_no_content_with_cors() {
        let (app, _) = test_app();
        let resp = send(
            &app,
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/anything/at/all")
                .header("host", HOST)
                .header(header::ORIGIN, "https://app.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(body_bytes(resp).await.is_empty());
    }

    #[tokio::test]
    async fn error_responses_carry_cors_headers() {
        let (app, _) = test_app();
        let resp = send(
            &app,
            Request::get("/missing.png")
                .header("host", HOST)
                .header(header::ORIGIN, "https://app.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn browser_preflight_is_no_content_with_cors() {
        let (app, _) = test_app();
        let resp = send(
            &app,
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/upload")
                .header("host", HOST)
                .header(header::ORIGIN, "https://app.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(
            resp.headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS)
        );
        assert!(body_bytes(resp).await.is_empty());
    }

    async fn upload_hello(app: &Router) -> UploadResponse {
        let resp = send(
            app,
            json_req(
                "/upload-base64",
                json!({"data": "aGVsbG8=", "filename": "hello.txt", "content_type": "text/plain"}),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp).await
    }

    #[tokio::test]
    async fn head_returns_serve_headers_without_body() {
        let (app, _) = test_app();
        upload_hello(&app).await;

        let resp = send(
            &app,
            Request::head("/uploads/hello.txt")
                .header("host", HOST)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::ETAG],
            format!("\"{:x}\"", md5::compute(b"hello")).as_str()
        );
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "5");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], IMMUTABLE);
        assert!(body_bytes(resp).await.is_empty());

        let resp = send(
            &app,
            Request::head("/uploads/absent.txt")
                .header("host", HOST)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn temp_url_honours_if_none_match_and_download() {
        let (app, _) = test_app();
        let upload = upload_hello(&app).await;
        let temp = path_and_query(&upload.temp_url);
        let etag = format!("\"{:x}\"", md5::compute(b"hello"));

        let resp = send(
            &app,
            Request::get(temp.as_str())
                .header("host", HOST)
                .header(header::IF_NONE_MATCH, etag.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(resp.headers()[header::ETAG], etag.as_str());
        assert!(body_bytes(resp).await.is_empty());

        let resp = send(&app, get_req(&format!("{}&download=true", temp))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"hello.txt\""
        );
        assert_eq!(body_bytes(resp).await, b"hello");
    }

    #[tokio::test]
    async fn multipart_fields_after_file_still_shape_the_key() {
        let (app, _) = test_app();
        let resp = send(
            &app,
            multipart_req(&[
                ("file", Some(("clip.mp4", "video/mp4")), b"mp4-bytes"),
                ("name", None, b"intro"),
                ("folder", None, b"media"),
            ]),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let upload: UploadResponse = body_json(resp).await;
        assert_eq!(upload.key, "media/intro.mp4");

        let resp = send(&app, get_req("/media/intro.mp4")).await;
        assert_eq!(body_bytes(resp).await, b"mp4-bytes");
    }

    #[tokio::test]
    async fn truncated_streamed_file_is_rejected_and_not_stored() {
        let (app, _) = test_app();
        let boundary = "gateway-test-boundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"folder\"\r\n\r\nart\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\ncut\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cut.png\"\r\n\
             Content-Type: image/png\r\n\r\npartial-bytes-with-no-closing-boundary",
            b = boundary
        );
        let resp = send(
            &app,
            Request::post("/upload")
                .header("host", HOST)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(&app, get_req("/art/cut.png")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
