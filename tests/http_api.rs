//! HTTP API tests: a real server on an ephemeral port, a reqwest client, and
//! stub backends behind the orchestrator.

#![cfg(feature = "server")]

mod common;

use common::*;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tradedoc_verify::server::{app, DEFAULT_BODY_LIMIT};

async fn spawn_server(backend: &Arc<ScriptedBackend>, raster: &Arc<StubRasterizer>) -> SocketAddr {
    let orch = orchestrator(test_config(), backend, raster);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(orch, DEFAULT_BODY_LIMIT))
            .await
            .unwrap();
    });
    addr
}

fn pdf_part(name: &str, body: &str) -> Part {
    Part::bytes(format!("%PDF-1.7\n{body}").into_bytes())
        .file_name(name.to_string())
        .mime_str("application/pdf")
        .unwrap()
}

fn form(files: &[(&str, &str)]) -> Form {
    files
        .iter()
        .fold(Form::new(), |f, (name, body)| f.part("files", pdf_part(name, body)))
}

#[tokio::test]
async fn upload_returns_report_with_cache_headers() {
    let backend = Arc::new(ScriptedBackend::always(Ok(chatty(REPORT))));
    let raster = Arc::new(StubRasterizer::new(2));
    let addr = spawn_server(&backend, &raster).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/validate-trade-finance");

    let resp = client
        .post(&url)
        .multipart(form(&[("lc.pdf", "A"), ("invoice.pdf", "B")]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-cache"], "miss");
    let fingerprint = resp.headers()["x-fingerprint"].to_str().unwrap().to_string();
    assert_eq!(fingerprint.len(), 64 * 2 + 1);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["final_summary"]["overall_risk_rating"],
        "Red (High Risk)"
    );

    // The alias route shares the same cache.
    let resp = client
        .post(format!("http://{addr}/process-pdfs"))
        .multipart(form(&[("lc.pdf", "A"), ("invoice.pdf", "B")]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-cache"], "hit");
    assert_eq!(resp.headers()["x-fingerprint"], fingerprint.as_str());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn too_many_files_is_400_json() {
    let backend = Arc::new(ScriptedBackend::always(Ok(REPORT.into())));
    let raster = Arc::new(StubRasterizer::new(1));
    let addr = spawn_server(&backend, &raster).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/validate-trade-finance"))
        .multipart(form(&[("a.pdf", "A"), ("b.pdf", "B"), ("c.pdf", "C")]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");
    assert!(body["message"].as_str().unwrap().contains("up to 2"));
    assert!(body.get("rawResponse").is_none());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn no_files_is_400() {
    let backend = Arc::new(ScriptedBackend::always(Ok(REPORT.into())));
    let raster = Arc::new(StubRasterizer::new(1));
    let addr = spawn_server(&backend, &raster).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/validate-trade-finance"))
        .multipart(Form::new().text("question", "anything?"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn unparseable_reply_is_500_with_raw_response() {
    let backend = Arc::new(ScriptedBackend::always(Ok("The documents look fine to me.".into())));
    let raster = Arc::new(StubRasterizer::new(1));
    let addr = spawn_server(&backend, &raster).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/validate-trade-finance"))
        .multipart(form(&[("lc.pdf", "A")]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_response_format");
    assert_eq!(body["rawResponse"], "The documents look fine to me.");
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn rasterization_failure_is_422() {
    let backend = Arc::new(ScriptedBackend::always(Ok(REPORT.into())));
    let raster = Arc::new(StubRasterizer::failing());
    let addr = spawn_server(&backend, &raster).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/validate-trade-finance"))
        .multipart(form(&[("lc.pdf", "A")]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "rasterization_error");
}

#[tokio::test]
async fn question_field_reaches_backend() {
    let backend = Arc::new(ScriptedBackend::always(Ok(REPORT.into())));
    let raster = Arc::new(StubRasterizer::new(1));
    let addr = spawn_server(&backend, &raster).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/validate-trade-finance"))
        .multipart(form(&[("lc.pdf", "A")]).text("question", "Who is the drawee?"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(backend.requests()[0].prompt.ends_with("Who is the drawee?"));
}

#[tokio::test]
async fn health_and_docs() {
    let backend = Arc::new(ScriptedBackend::always(Ok(REPORT.into())));
    let raster = Arc::new(StubRasterizer::new(1));
    let addr = spawn_server(&backend, &raster).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["cache_entries"], 0);
    assert_eq!(health["backend"], "scripted");

    let doc: Value = client
        .get(format!("http://{addr}/openapi.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(doc["paths"]["/validate-trade-finance"].is_object());

    let html = client
        .get(format!("http://{addr}/api-docs"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("swagger-ui"));
}

#[tokio::test]
async fn cors_is_permissive() {
    let backend = Arc::new(ScriptedBackend::always(Ok(REPORT.into())));
    let raster = Arc::new(StubRasterizer::new(1));
    let addr = spawn_server(&backend, &raster).await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/health"))
        .header("origin", "https://portal.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}
