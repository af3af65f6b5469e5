use std::sync::Arc;
use std::time::Duration;

use galley::config::{DocsConfig, GenerationConfig, SheetsConfig};
use galley::db;
use galley::docs::DocsClient;
use galley::generate::GenerationClient;
use galley::models::{GenerationRequest, Job, JobParams};
use galley::pipeline::PipelineRunner;
use galley::queue::QueueEngine;
use galley::sheets::SheetsClient;
use galley::store;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/test-model:generateContent";

async fn seeded_pool() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = db::connect(&dir.path().join("galley.db")).await.expect("pool");
    store::set_setting(&pool, store::GOOGLE_ACCESS_TOKEN, "tok-1")
        .await
        .expect("token");
    store::add_api_key(&pool, "key-alpha").await.expect("key");
    (pool, dir)
}

fn runner(pool: &SqlitePool, server: &MockServer, demo: bool) -> PipelineRunner {
    let generation = GenerationClient::new(GenerationConfig {
        endpoint: server.uri(),
        model: "test-model".to_string(),
        ..GenerationConfig::default()
    })
    .expect("generation client");
    let docs = DocsClient::new(&DocsConfig {
        endpoint: server.uri(),
        ..DocsConfig::default()
    })
    .expect("docs client");
    let sheets = SheetsClient::new(&SheetsConfig {
        endpoint: server.uri(),
        ..SheetsConfig::default()
    })
    .expect("sheets client");

    PipelineRunner::new(
        pool.clone(),
        generation,
        docs,
        sheets,
        "sheet-1".to_string(),
        demo,
    )
}

fn generation_job(row_index: u32, keyword: &str) -> Job {
    Job::new(
        row_index,
        keyword,
        JobParams::Generate(GenerationRequest {
            keyword: keyword.to_string(),
            host_niche: "office".to_string(),
            target_url: "https://t.example/guide".to_string(),
            anchor_text: "the guide".to_string(),
            target_niche: "guides".to_string(),
        }),
    )
}

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    }))
}

#[tokio::test]
async fn batch_generates_exports_and_writes_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(completion(
            "# Guide to Widgets\n\nIntro with [the guide](https://t.example/guide).",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "doc-9",
            "webViewLink": "https://docs.google.com/document/d/doc-9/edit"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v4/spreadsheets/sheet-1/values/F2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedCells": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let (pool, _dir) = seeded_pool().await;
    let engine = QueueEngine::new(
        Arc::new(runner(&pool, &server, false)),
        Duration::ZERO,
        CancellationToken::new(),
    );

    engine.enqueue(vec![generation_job(0, "widgets")]).await;
    engine.wait_idle().await;

    let progress = engine.progress();
    assert_eq!(progress.processed, 1);
    assert_eq!(progress.total, 1);

    let articles = store::recent_articles(&pool, 10).await.expect("articles");
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Guide to Widgets");
    assert_eq!(articles[0].status, "exported");
    assert_eq!(
        articles[0].doc_link.as_deref(),
        Some("https://docs.google.com/document/d/doc-9/edit")
    );
}

#[tokio::test]
async fn failed_row_is_logged_and_the_batch_continues() {
    let server = MockServer::start().await;
    for keyword in ["alpha-topic", "gamma-topic"] {
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_string_contains(keyword))
            .respond_with(completion(&format!("# Draft\n\nBody about {keyword}.")))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("beta-topic"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "backend exploded" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "doc-1",
            "webViewLink": "https://docs.google.com/document/d/doc-1/edit"
        })))
        .expect(2)
        .mount(&server)
        .await;
    for range in ["F2", "F4"] {
        Mock::given(method("PUT"))
            .and(path(format!("/v4/spreadsheets/sheet-1/values/{range}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedCells": 1 })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let (pool, _dir) = seeded_pool().await;
    let engine = QueueEngine::new(
        Arc::new(runner(&pool, &server, false)),
        Duration::ZERO,
        CancellationToken::new(),
    );

    engine
        .enqueue(vec![
            generation_job(0, "alpha-topic"),
            generation_job(1, "beta-topic"),
            generation_job(2, "gamma-topic"),
        ])
        .await;
    engine.wait_idle().await;

    let progress = engine.progress();
    assert_eq!(progress.total, 3);
    assert_eq!(progress.processed, 3);
    assert!(
        progress
            .log
            .iter()
            .any(|line| line.contains("error on \"beta-topic\"")),
        "missing failure line: {:#?}",
        progress.log
    );

    let articles = store::recent_articles(&pool, 10).await.expect("articles");
    let mut keywords: Vec<&str> = articles.iter().map(|a| a.keyword.as_str()).collect();
    keywords.sort_unstable();
    assert_eq!(keywords, vec!["alpha-topic", "gamma-topic"]);
}

#[tokio::test]
async fn demo_mode_never_calls_external_services() {
    let server = MockServer::start().await;

    let (pool, _dir) = seeded_pool().await;
    store::set_demo_mode(&pool, true).await.expect("demo");

    let engine = QueueEngine::new(
        Arc::new(runner(&pool, &server, true)),
        Duration::ZERO,
        CancellationToken::new(),
    );

    engine.enqueue(vec![generation_job(0, "widgets")]).await;
    engine.wait_idle().await;

    let progress = engine.progress();
    assert_eq!(progress.processed, 1);
    assert!(
        progress
            .log
            .iter()
            .any(|line| line.contains("demo mode: skipping document export")),
        "missing demo line: {:#?}",
        progress.log
    );

    let articles = store::recent_articles(&pool, 10).await.expect("articles");
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].status, "generated");
    assert_eq!(articles[0].doc_link, None);

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn document_job_adopts_the_linked_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/src-doc/export"))
        .and(query_param("mimeType", "text/html"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<h1>Imported Title</h1><p>Imported body</p>", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "doc-new",
            "webViewLink": "https://docs.google.com/document/d/doc-new/edit"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v4/spreadsheets/sheet-1/values/F4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedCells": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let (pool, _dir) = seeded_pool().await;
    let engine = QueueEngine::new(
        Arc::new(runner(&pool, &server, false)),
        Duration::ZERO,
        CancellationToken::new(),
    );

    let job = Job::new(
        2,
        "imported piece",
        JobParams::Document {
            doc_url: "https://docs.google.com/document/d/src-doc/edit".to_string(),
        },
    );
    engine.enqueue(vec![job]).await;
    engine.wait_idle().await;

    let progress = engine.progress();
    assert_eq!(progress.processed, 1);
    assert!(
        progress
            .log
            .iter()
            .any(|line| line.contains("loading linked document")),
        "missing load line: {:#?}",
        progress.log
    );

    let articles = store::recent_articles(&pool, 10).await.expect("articles");
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Imported Title");
    assert_eq!(articles[0].body_markdown, "Imported body");
    assert_eq!(articles[0].status, "exported");
}
