//! End-to-end pipeline tests against the public API: ingestion into a
//! SQLite index, retrieval, and the HTTP endpoints with a scripted generator.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use clausemate::config::{Config, IngestConfig, RetrievalConfig};
use clausemate::embedding::{EmbeddingClient, RetryPolicy};
use clausemate::generation::{GenerationError, Generator, PromptPart};
use clausemate::ingest::CorpusIngestor;
use clausemate::search::PrecedentRetriever;
use clausemate::server::{router, AppState};
use clausemate::services::Services;
use clausemate::sqlite_index::SqliteIndex;
use clausemate_core::embedding::EmbeddingProvider;
use clausemate_core::error::ProviderError;
use clausemate_core::models::{CaseMeta, CaseRecord};
use clausemate_core::store::VectorIndex;

const DIMS: usize = 12;

/// Character-histogram embeddings; records every embedded text.
struct HistogramProvider {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl EmbeddingProvider for HistogramProvider {
    fn model_name(&self) -> &str {
        "histogram"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.lock().unwrap().push(text.to_string());
        let mut v = vec![0.0f32; DIMS];
        for c in text.chars() {
            v[(c as usize) % DIMS] += 1.0;
        }
        Ok(v)
    }
}

struct ScriptedGenerator {
    reply: String,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn generate(&self, parts: &[PromptPart]) -> Result<String, GenerationError> {
        match parts.last() {
            Some(PromptPart::Text(_)) => Ok(self.reply.clone()),
            _ => Err(GenerationError::NoText("instruction text must be last".into())),
        }
    }
}

struct Harness {
    _tmp: TempDir,
    config: Config,
    provider: Arc<HistogramProvider>,
    client: Arc<EmbeddingClient>,
    index: Arc<SqliteIndex>,
}

async fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal(tmp.path().join("data/index.sqlite"));
    config.embedding.dims = Some(DIMS);

    let provider = Arc::new(HistogramProvider {
        calls: Mutex::new(Vec::new()),
    });
    let client = Arc::new(EmbeddingClient::new(provider.clone(), RetryPolicy::default()));
    let index = Arc::new(SqliteIndex::open(&config).await.unwrap());
    Harness {
        _tmp: tmp,
        config,
        provider,
        client,
        index,
    }
}

fn case(id: &str, title: &str, body: &str) -> CaseRecord {
    CaseRecord {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        meta: CaseMeta {
            source: format!("대법원 판례 {}", id),
            date: Some("2023.05.18".to_string()),
            ..CaseMeta::default()
        },
    }
}

fn corpus(ids: &[&str]) -> Vec<CaseRecord> {
    ids.iter()
        .map(|id| case(id, &format!("사건{}", id), "보증금 반환 의무와 동시이행"))
        .collect()
}

fn ingest_config() -> IngestConfig {
    IngestConfig {
        batch_size: 2,
        batch_delay_ms: 0,
        max_payload_chars: 9000,
    }
}

#[tokio::test]
async fn test_reingestion_into_sqlite_only_adds_new_cases() {
    let h = harness().await;
    let ingestor = CorpusIngestor::new(h.client.clone(), h.index.clone(), &ingest_config());

    let first = ingestor.ingest(corpus(&["1", "2", "3"])).await;
    assert_eq!((first.added, first.skipped, first.failed), (3, 0, 0));

    let second = ingestor.ingest(corpus(&["1", "2", "3", "4"])).await;
    assert_eq!((second.added, second.skipped, second.failed), (1, 3, 0));
    assert!(second.is_consistent());

    let third = ingestor.ingest(corpus(&["1", "2", "3", "4"])).await;
    assert_eq!(third.added, 0);
    assert_eq!(h.index.count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_retrieval_bounds_query_and_uses_fallback() {
    let h = harness().await;
    let ingestor = CorpusIngestor::new(h.client.clone(), h.index.clone(), &ingest_config());
    ingestor.ingest(corpus(&["1", "2"])).await;
    h.provider.calls.lock().unwrap().clear();

    let retriever =
        PrecedentRetriever::new(h.client.clone(), h.index.clone(), &RetrievalConfig::default());

    let long_query: String = "위약금".chars().cycle().take(5000).collect();
    let results = retriever.retrieve(&long_query, 3).await;
    assert_eq!(results.len(), 2);

    retriever.retrieve("", 3).await;

    let calls = h.provider.calls.lock().unwrap().clone();
    assert_eq!(calls[0].chars().count(), 2000);
    assert_eq!(calls[1], "general contract review");
}

#[tokio::test]
async fn test_closed_index_degrades_to_no_precedents() {
    let h = harness().await;
    let retriever =
        PrecedentRetriever::new(h.client.clone(), h.index.clone(), &RetrievalConfig::default());
    h.index.close().await;
    assert!(retriever.retrieve("보증금", 3).await.is_empty());
}

async fn spawn_server(reply: &str) -> (String, Harness) {
    let h = harness().await;
    let ingestor = CorpusIngestor::new(h.client.clone(), h.index.clone(), &ingest_config());
    ingestor
        .ingest(vec![case("77", "위약금감액", "손해배상 예정액이 부당히 과다하면 감액한다")])
        .await;

    let generator: Arc<dyn Generator> = Arc::new(ScriptedGenerator {
        reply: reply.to_string(),
    });
    let services = Services::assemble(h.client.clone(), h.index.clone(), generator, &h.config);
    let app = router(AppState::from_services(&services));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), h)
}

const REVIEW_REPLY: &str = "```json\n{\"title\": \"용역 계약\", \"score\": \"70\", \
    \"score_comment\": \"위약금 조항 주의\", \"analysis\": [{\"type\": \"주의\", \
    \"location\": \"제7조\", \"original\": \"위약금 300%\", \"reason\": \"과다\", \
    \"fix\": \"30%\"}]}\n```\n참고하세요.";

#[tokio::test]
async fn test_http_review_round_trip() {
    let (base, _h) = spawn_server(REVIEW_REPLY).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/review", base))
        .json(&serde_json::json!({
            "text": "제7조 위약금은 300%로 한다.",
            "images": [{ "mime_type": "image/png", "data_base64": "iVBORw0KGgo=" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["title"], "용역 계약");
    assert_eq!(body["score"], 70);
    assert_eq!(body["analysis"][0]["type"], "주의");
    let raw: serde_json::Value =
        serde_json::from_str(body["full_analysis_json"].as_str().unwrap()).unwrap();
    assert_eq!(raw["score_comment"], "위약금 조항 주의");
}

#[tokio::test]
async fn test_http_review_errors() {
    let (base, _h) = spawn_server("no json here").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/review", base))
        .json(&serde_json::json!({ "text": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "분석할 내용이 없습니다.");

    let resp = client
        .post(format!("{}/review", base))
        .json(&serde_json::json!({ "text": "계약서 본문" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "malformed_response");

    let resp = client
        .post(format!("{}/review", base))
        .json(&serde_json::json!({
            "images": [{ "mime_type": "image/png", "data_base64": "***" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_http_chat_and_search() {
    let (base, _h) = spawn_server("  과다한 위약금은 감액될 수 있습니다. ").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "question": "위약금이 과하면?", "context": "제7조" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], "과다한 위약금은 감액될 수 있습니다.");

    let resp = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "question": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/search", base))
        .json(&serde_json::json!({ "query": "위약금 감액", "top_k": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["source"], "대법원 판례 77");
    assert_eq!(results[0]["date"], "2023.05.18");

    let health: serde_json::Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
}
