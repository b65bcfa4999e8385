//! HTTP tests: the real router and pipeline, with a scripted model behind
//! the generation engine.

use std::sync::{mpsc, Arc};

use anyhow::Result;
use ingres_rag::app::App;
use ingres_rag::config::Config;
use ingres_rag::engine::{GenerationEngine, GenerationSettings, LanguageModel};
use ingres_rag::server::run_server_with_app;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tempfile::TempDir;

const EOS: u32 = 256;
const ANSWER: &str = "Aquifers hold groundwater.";
const ASSISTANT: &[u8] = b"### Assistant:";

/// Byte-level model that always answers [`ANSWER`] and then stops.
struct ScriptedModel;

impl LanguageModel for ScriptedModel {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let bytes: Vec<u8> = ids.iter().filter(|&&i| i < 256).map(|&i| i as u8).collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn eos_token_id(&self) -> u32 {
        EOS
    }

    fn next_token_logits(&mut self, ids: &[u32]) -> Result<Vec<f32>> {
        let bytes: Vec<u8> = ids.iter().map(|&i| i as u8).collect();
        let start = bytes
            .windows(ASSISTANT.len())
            .rposition(|w| w == ASSISTANT)
            .map(|p| p + ASSISTANT.len())
            .unwrap_or(bytes.len());
        let produced = ids.len() - start;

        let next = match produced {
            0 => u32::from(b' '),
            n => ANSWER
                .as_bytes()
                .get(n - 1)
                .map(|&b| u32::from(b))
                .unwrap_or(EOS),
        };
        let mut logits = vec![0.0; 257];
        logits[next as usize] = 100.0;
        Ok(logits)
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn test_config(tmp: &TempDir, port: u16) -> Config {
    let records = tmp.path().join("groundwater.json");
    std::fs::write(
        &records,
        r#"[{"district": "Pune", "season": "Monsoon 2021", "gwl": 4.2, "pH": 7.1, "TDS": 350, "Classification": "Safe"}]"#,
    )
    .unwrap();

    let mut cfg = Config::minimal();
    cfg.data.records_path = records;
    cfg.store.dir = tmp.path().join("pdf_texts");
    cfg.server.bind = format!("127.0.0.1:{}", port);
    cfg.model.do_sample = false;
    cfg.model.max_new_tokens = 64;
    cfg.model.seed = Some(7);
    cfg
}

/// Starts a server whose engine loads via `loader`; returns the base URL.
async fn start_server<F>(cfg: &Config, loader: F, wait: bool) -> String
where
    F: FnOnce() -> Result<Box<dyn LanguageModel>> + Send + 'static,
{
    let engine = GenerationEngine::spawn(GenerationSettings::from(&cfg.model), loader).unwrap();
    let app = App::open(cfg, Arc::new(engine)).unwrap();
    tokio::spawn(async move {
        run_server_with_app(app).await.ok();
    });

    let port = cfg.server.bind.rsplit(':').next().unwrap().parse().unwrap();
    if wait {
        wait_for_server(port).await;
    }
    format!("http://127.0.0.1:{}", port)
}

fn scripted() -> Result<Box<dyn LanguageModel>> {
    Ok(Box::new(ScriptedModel))
}

async fn wait_for_engine(client: &reqwest::Client, base: &str) {
    for _ in 0..50 {
        let health: Value = client
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if health["engine"] == "ready" {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    panic!("engine did not become ready");
}

#[tokio::test]
async fn test_health_reports_version_and_engine() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, find_free_port());
    let base = start_server(&cfg, scripted, true).await;
    let client = reqwest::Client::new();
    wait_for_engine(&client, &base).await;

    let body: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["engine"], "ready");
}

#[tokio::test]
async fn test_chat_answers_from_structured_records() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, find_free_port());
    let base = start_server(&cfg, scripted, true).await;
    let client = reqwest::Client::new();
    wait_for_engine(&client, &base).await;

    let resp = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "question": "groundwater level in pune 2021" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reply"], ANSWER);
    assert!(body["context_used"]
        .as_str()
        .unwrap()
        .starts_with("In Pune (Monsoon 2021): GWL=4.2 m, pH=7.1, TDS=350 mg/L, Classification=Safe."));
}

#[tokio::test]
async fn test_ingest_then_chat_uses_document() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, find_free_port());
    let base = start_server(&cfg, scripted, true).await;
    let client = reqwest::Client::new();
    wait_for_engine(&client, &base).await;

    let form = Form::new().part(
        "file",
        Part::bytes(b"An aquifer is a layer of rock that holds water.".to_vec())
            .file_name("aquifer-basics.txt"),
    );
    let resp = client
        .post(format!("{}/ingest", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let receipt: Value = resp.json().await.unwrap();
    assert_eq!(receipt["filename"], "aquifer-basics.txt");
    assert!(receipt["snippet"]
        .as_str()
        .unwrap()
        .starts_with("An aquifer is a layer"));
    let id = receipt["id"].as_str().unwrap().to_string();

    let docs: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(docs["documents"][0]["id"], id.as_str());
    assert_eq!(docs["documents"][0]["filename"], "aquifer-basics.txt");

    let body: Value = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "question": "what is an aquifer" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let context = body["context_used"].as_str().unwrap();
    assert!(context.contains("From aquifer-basics.txt: an aquifer is a layer"));
    assert!(!context.contains("Pune"));
}

#[tokio::test]
async fn test_chat_no_context_sentinel() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, find_free_port());
    let base = start_server(&cfg, scripted, true).await;
    let client = reqwest::Client::new();
    wait_for_engine(&client, &base).await;

    let body: Value = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "question": "xyzzy" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["context_used"], "No relevant context found.");
    assert_eq!(body["reply"], ANSWER);
}

#[tokio::test]
async fn test_chat_empty_question_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, find_free_port());
    let base = start_server(&cfg, scripted, true).await;
    let client = reqwest::Client::new();

    for payload in [serde_json::json!({ "question": "   " }), serde_json::json!({})] {
        let resp = client
            .post(format!("{}/chat", base))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");
    }
}

#[tokio::test]
async fn test_chat_malformed_body_uses_error_shape() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, find_free_port());
    let base = start_server(&cfg, scripted, true).await;
    let client = reqwest::Client::new();

    let malformed = client
        .post(format!("{}/chat", base))
        .header("content-type", "application/json")
        .body("{\"question\": ")
        .send()
        .await
        .unwrap();
    let no_content_type = client
        .post(format!("{}/chat", base))
        .body(r#"{"question": "pune"}"#)
        .send()
        .await
        .unwrap();

    for resp in [malformed, no_content_type] {
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");
        assert!(!body["error"]["message"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_chat_while_loading_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, find_free_port());

    let (release_tx, release_rx) = mpsc::channel::<()>();
    let base = start_server(
        &cfg,
        move || {
            release_rx.recv().ok();
            scripted()
        },
        true,
    )
    .await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["engine"], "loading");

    let resp = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "question": "pune" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "engine_unavailable");

    release_tx.send(()).unwrap();
    wait_for_engine(&client, &base).await;
    let resp = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "question": "pune" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_ingest_rejections() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = test_config(&tmp, find_free_port());
    cfg.ingest.max_upload_bytes = 32;
    let base = start_server(&cfg, scripted, true).await;
    let client = reqwest::Client::new();

    // No `file` field.
    let form = Form::new().text("note", "hello");
    let resp = client
        .post(format!("{}/ingest", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Over the configured limit.
    let form = Form::new().part("file", Part::bytes(vec![b'a'; 100]).file_name("big.txt"));
    let resp = client
        .post(format!("{}/ingest", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);

    // Not a PDF and not text.
    let form = Form::new().part("file", Part::bytes(b"PK\x03\x04".to_vec()).file_name("a.xlsx"));
    let resp = client
        .post(format!("{}/ingest", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "ingestion_failed");

    let docs: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(docs["documents"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_greeting_short_circuit() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = test_config(&tmp, find_free_port());
    cfg.server.greetings = true;
    let base = start_server(&cfg, scripted, true).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "question": "Hello" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["reply"].as_str().unwrap().contains("INGRES assistant"));
    assert_eq!(body["context_used"], "");
}

#[tokio::test]
async fn test_cli_ingest_visible_to_running_server() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, find_free_port());
    let base = start_server(&cfg, scripted, true).await;
    let client = reqwest::Client::new();

    let src = tmp.path().join("recharge.txt");
    std::fs::write(&src, "Recharge pits near Baramati").unwrap();
    let from_cli = ingres_rag::commands::ingest_file(&cfg, &src).await.unwrap();

    let form = Form::new().part(
        "file",
        Part::bytes(b"Borewell survey".to_vec()).file_name("survey.txt"),
    );
    let resp = client
        .post(format!("{}/ingest", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let docs: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let filenames: Vec<&str> = docs["documents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["filename"].as_str().unwrap())
        .collect();
    assert_eq!(filenames, vec!["recharge.txt", "survey.txt"]);
    assert_eq!(docs["documents"][0]["id"], from_cli.id.as_str());
}
