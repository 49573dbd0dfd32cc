use std::time::Duration;

use axum::Router;
use axum::extract::RawQuery;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{any, get, post};
use serde::Deserialize;

use super::*;
use crate::error::{ApiErrorKind, ErrorCode};
use crate::request::{Body, Method};
use crate::test_support::{closed_addr, serve, serve_tls};

#[derive(Debug, Deserialize, PartialEq)]
struct Anime {
    title: String,
}

#[derive(Debug, Deserialize)]
struct Page {
    data: Vec<Anime>,
}

fn app() -> Router {
    Router::new()
        .route(
            "/v4/top/anime",
            get(|| async { axum::Json(serde_json::json!({"data": [{"title": "Frieren"}]})) }),
        )
        .route("/plain", get(|| async { "not json" }))
        .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "not here") }))
        .route("/boom", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "later") }))
        .route("/method", any(|method: axum::http::Method| async move { axum::Json(method.as_str().to_owned()) }))
        .route("/query", get(|RawQuery(query): RawQuery| async move { query.unwrap_or_default() }))
        .route(
            "/echo",
            post(|headers: HeaderMap, body: String| async move {
                let content_type = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                axum::Json(serde_json::json!({"content_type": content_type, "body": body}))
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        )
}

async fn session_and_base() -> (HttpSession, String) {
    let addr = serve(app()).await;
    (HttpSession::new().expect("http session"), format!("http://{addr}"))
}

#[tokio::test]
async fn execute_decodes_json_response() {
    let (session, base) = session_and_base().await;
    let page: Page = session
        .execute(&RequestSpec::get(&base, "/v4/top/anime"))
        .await
        .unwrap();
    assert_eq!(page.data, vec![Anime { title: "Frieren".to_owned() }]);
}

#[tokio::test]
async fn execute_raw_returns_body_unchanged() {
    let (session, base) = session_and_base().await;
    let body = session.execute_raw(&RequestSpec::get(&base, "plain")).await.unwrap();
    assert_eq!(body, b"not json".to_vec());
}

#[tokio::test]
async fn undecodable_success_body_is_parse_error() {
    let (session, base) = session_and_base().await;
    let err = session
        .execute::<Page>(&RequestSpec::get(&base, "/plain"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code, ApiError::PARSE_DATA);
    assert_eq!(err.kind(), ApiErrorKind::Decode);
    assert_eq!(err.url, format!("{base}/plain"));
    assert!(err.message.starts_with("Parse data error"));
}

#[tokio::test]
async fn non_success_status_keeps_status_and_body() {
    let (session, base) = session_and_base().await;
    let err = session
        .execute::<Page>(&RequestSpec::get(&base, "/missing"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code, 404);
    assert_eq!(err.data.as_deref(), Some(&b"not here"[..]));
    assert_eq!(err.message, "Service error");
    assert_eq!(err.error_code(), "E_SERVICE");

    let err = session.execute_raw(&RequestSpec::get(&base, "/boom")).await.unwrap_err();
    assert_eq!(err.status_code, 503);
    assert!(err.retryable());
}

#[tokio::test]
async fn every_method_reaches_the_server_literally() {
    let (session, base) = session_and_base().await;
    for method in Method::ALL {
        let seen: String = session
            .execute(&RequestSpec::new(method, &base, "/method"))
            .await
            .unwrap();
        assert_eq!(seen, method.as_str());
    }
}

#[tokio::test]
async fn double_encoded_query_reaches_server_as_built() {
    let (session, base) = session_and_base().await;

    let encoded = session
        .execute_raw(&RequestSpec::get(&base, "/query").with_parameter("Some", "Parameter space"))
        .await
        .unwrap();
    assert_eq!(String::from_utf8(encoded).unwrap(), "Some=Parameter%2520space");

    let plain = session
        .execute_raw(
            &RequestSpec::get(&base, "/query")
                .with_parameter("Some", "Parameter space")
                .with_encode_url(false),
        )
        .await
        .unwrap();
    assert_eq!(String::from_utf8(plain).unwrap(), "Some=Parameter%20space");
}

#[tokio::test]
async fn structured_body_and_headers_are_sent() {
    #[derive(Deserialize)]
    struct Echo {
        content_type: String,
        body: String,
    }

    let (session, base) = session_and_base().await;
    let spec = RequestSpec::post(&base, "/echo").with_body(Body::structured([("Some", serde_json::json!("Value"))]));
    let echo: Echo = session.execute(&spec).await.unwrap();
    assert_eq!(echo.content_type, "application/json");
    let sent: serde_json::Value = serde_json::from_str(&echo.body).unwrap();
    assert_eq!(sent, serde_json::json!({"Some": "Value"}));
}

#[tokio::test]
async fn timeout_is_transport_failure() {
    let (session, base) = session_and_base().await;
    let err = session
        .execute_raw(&RequestSpec::get(&base, "/slow").with_timeout(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert_eq!(err.status_code, ApiError::UNKNOWN);
    assert_eq!(err.kind(), ApiErrorKind::Transport);
    assert_eq!(err.url, format!("{base}/slow"));
}

#[tokio::test]
async fn connection_refused_is_transport_failure() {
    let addr = closed_addr().await;
    let session = HttpSession::new().unwrap();
    let err = session
        .execute_raw(&RequestSpec::get(format!("http://{addr}"), "/anything"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code, -2);
    assert!(!err.url.is_empty());
}

#[tokio::test]
async fn invalid_spec_falls_through_to_unknown_error() {
    let session = HttpSession::new().unwrap();
    let err = session.execute_raw(&RequestSpec::get("", "/x")).await.unwrap_err();
    assert_eq!(err, ApiError::unknown(""));
}

#[tokio::test]
async fn self_signed_certificate_needs_skip_tls_validation() {
    let addr = serve_tls(app()).await;
    let base = format!("https://{addr}");
    let session = HttpSession::new().unwrap();

    let err = session
        .execute_raw(&RequestSpec::get(&base, "/plain"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code, ApiError::UNKNOWN);
    assert_eq!(err.kind(), ApiErrorKind::Transport);
    assert_eq!(err.url, format!("{base}/plain"));

    let body = session
        .execute_raw(&RequestSpec::get(&base, "/plain").with_skip_tls_validation(true))
        .await
        .unwrap();
    assert_eq!(body, b"not json".to_vec());

    // The override is per call; the shared client still verifies.
    let err = session
        .execute_raw(&RequestSpec::get(&base, "/plain"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code, -2);
}

#[tokio::test]
async fn skip_tls_validation_still_speaks_plain_http() {
    let (session, base) = session_and_base().await;
    let body = session
        .execute_raw(&RequestSpec::get(&base, "/plain").with_skip_tls_validation(true))
        .await
        .unwrap();
    assert_eq!(body, b"not json".to_vec());
}

#[tokio::test]
async fn call_executes_typed_endpoint() {
    struct TopAnime {
        base: String,
    }

    impl Endpoint for TopAnime {
        type Response = Page;

        fn spec(&self) -> RequestSpec {
            RequestSpec::get(&self.base, "v4/top/anime")
        }
    }

    let (session, base) = session_and_base().await;
    let page = session.call(&TopAnime { base }).await.unwrap();
    assert_eq!(page.data.len(), 1);
}

#[tokio::test]
async fn with_client_and_config_sessions_work() {
    let addr = serve(app()).await;
    let base = format!("http://{addr}");

    let injected = HttpSession::with_client(reqwest::Client::new());
    assert!(injected.execute_raw(&RequestSpec::get(&base, "/plain")).await.is_ok());

    let configured = HttpSession::from_config(HttpConfig {
        connect_timeout_secs: 1,
        user_agent: Some("api-request-tests".to_owned()),
    })
    .unwrap();
    assert!(configured.execute_raw(&RequestSpec::get(&base, "/plain")).await.is_ok());
}
