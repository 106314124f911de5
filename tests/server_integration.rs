//! REST API tests against the router, without binding a socket

mod common;

use std::io::Cursor;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use common::{pipeline, ScriptedEngine, SAMPLE_RATE};
use supertonic_tts::server::{create_router, ServerConfig, ServerState};

fn router(engine: Arc<ScriptedEngine>) -> Router {
    let state = ServerState::new(ServerConfig::default(), pipeline(engine));
    create_router(Arc::new(state))
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn get(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn wav_samples(body: &[u8]) -> (hound::WavSpec, usize) {
    let reader = hound::WavReader::new(Cursor::new(body)).unwrap();
    let spec = reader.spec();
    (spec, reader.len() as usize)
}

#[tokio::test]
async fn test_health() {
    let (status, _, body) = get(router(ScriptedEngine::new().shared()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"], "scripted");
    assert_eq!(body["languages"].as_array().unwrap().len(), 5);
    assert_eq!(body["voices"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_get_tts_returns_wav() {
    let engine = ScriptedEngine::new().shared();
    let (status, headers, body) = get(router(engine.clone()), "/api/tts?text=Hello%20there.%20Bye.&voice=F2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "inline; filename=\"tts_output.wav\""
    );
    assert!(headers.contains_key("x-request-id"));

    let (spec, samples) = wav_samples(&body);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(samples, ScriptedEngine::render("Hello there. Bye.").len());
}

#[tokio::test]
async fn test_post_body_overrides_query() {
    let engine = ScriptedEngine::new().shared();
    let router = router(engine.clone());
    let request = Request::post("/api/tts?text=ignored&voice=M2")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"text": "Bonjour.", "language": "fr", "speed": "1.0"}"#))
        .unwrap();

    let (status, _, body) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
    let (_, samples) = wav_samples(&body);
    assert_eq!(samples, ScriptedEngine::render("Bonjour.").len());
    assert_eq!(*engine.texts.lock().unwrap(), vec!["Bonjour.".to_string()]);
}

#[tokio::test]
async fn test_post_empty_body_uses_query() {
    let router = router(ScriptedEngine::new().shared());
    let request = Request::post("/api/tts?text=Hi.").body(Body::empty()).unwrap();
    let (status, _, _) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_post_malformed_body() {
    let router = router(ScriptedEngine::new().shared());
    let request = Request::post("/api/tts").body(Body::from("{not json")).unwrap();
    let (status, _, body) = send(router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["code"], "invalid_parameter");
}

#[tokio::test]
async fn test_missing_text() {
    let (status, _, body) = get(router(ScriptedEngine::new().shared()), "/api/tts").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json(&body);
    assert_eq!(body["error"], "Missing 'text' parameter");
    assert_eq!(body["code"], "invalid_parameter");
}

#[tokio::test]
async fn test_unsupported_voice() {
    let engine = ScriptedEngine::new().shared();
    let (status, _, body) = get(router(engine.clone()), "/api/tts?text=Hi&voice=M9").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json(&body);
    assert_eq!(body["code"], "unsupported_voice");
    assert!(body["error"].as_str().unwrap().contains("M9"));
    assert_eq!(engine.loads(), 0);
}

#[tokio::test]
async fn test_out_of_range_speed() {
    let (status, _, body) = get(router(ScriptedEngine::new().shared()), "/api/tts?text=Hi&speed=2.5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["code"], "invalid_parameter");
}

#[tokio::test]
async fn test_engine_failure_reports_segment() {
    let engine = ScriptedEngine::new().failing_on("Bravo").shared();
    let (status, _, body) = get(router(engine), "/api/tts?text=Alpha.%20Bravo.").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = json(&body);
    assert_eq!(body["error"], "TTS generation failed");
    assert_eq!(body["code"], "engine_error");
    assert_eq!(body["segment"], 1);
}

#[tokio::test]
async fn test_languages_and_voices() {
    let router = router(ScriptedEngine::new().shared());

    let (status, _, body) = get(router.clone(), "/api/languages").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["languages"], serde_json::json!(["en", "fr", "es", "pt", "ko"]));
    assert_eq!(body["default"], "en");

    let (_, _, body) = get(router.clone(), "/api/voices").await;
    let body = json(&body);
    assert_eq!(body["voices"].as_array().unwrap().len(), 10);
    assert_eq!(body["endpoints"].as_array().unwrap().len(), 50);
    assert_eq!(body["note"], "All voices support all languages");

    let (_, _, body) = get(router.clone(), "/api/voices?language=ko").await;
    let body = json(&body);
    assert_eq!(body["language"], "ko");
    let endpoints = body["endpoints"].as_array().unwrap();
    assert_eq!(endpoints.len(), 10);
    assert!(endpoints.iter().all(|e| e.as_str().unwrap().starts_with("ko-")));

    let (status, _, _) = get(router, "/api/voices?language=xx").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_counts_sessions() {
    let state = Arc::new(ServerState::new(
        ServerConfig::default(),
        pipeline(ScriptedEngine::new().shared()),
    ));
    let router = create_router(Arc::clone(&state));

    let (status, _, _) = get(router.clone(), "/api/tts?text=One.%20Two.").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = get(router, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["sessions"]["sessions_completed"], 1);
    assert_eq!(body["sessions"]["segments_delivered"], 2);
    assert_eq!(body["loaded_voices"].as_array().unwrap().len(), 1);

    // Keyed by route template; the stats request itself is still in flight
    assert_eq!(body["http"]["requests"], 1);
    assert_eq!(body["http"]["in_flight"], 1);
    assert_eq!(body["http"]["routes"][0]["route"], "/api/tts");
}
