use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use salesdesk::config::Config;
use salesdesk::knowledge::KnowledgeSource;
use salesdesk::llm::{ChatModel, CompletionRequest};
use salesdesk::server::{router, AppState};
use salesdesk::{db, migrate};

struct CannedModel(Option<&'static str>);

#[async_trait]
impl ChatModel for CannedModel {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
        self.0
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("chat completion API error 503"))
    }
}

struct Silent;

#[async_trait]
impl KnowledgeSource for Silent {
    async fn short_answer(&self, _query: &str) -> Option<String> {
        None
    }
}

const PRODUCTS: &str = r#"[
    {"id":1,"tabela":"T","unidade":"UN","segmento":"REDES","codigo":"4750021","descricao":"Roteador Wi-Fi 6","psd":199.9,"pscf":249.9,"status":"em_linha"},
    {"id":2,"tabela":"T","unidade":"UN","segmento":"SEGURANCA","codigo":"1234","descricao":"Central de alarme antiga","psd":300,"pscf":350,"status":"em_linha"}
]"#;

const DISCONTINUED: &str =
    "codigo,descricao,substituto,indicacao\n1234,Central de alarme antiga,5678,-\n";

async fn app_with(model: CannedModel) -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("produtos.json"), PRODUCTS).unwrap();
    fs::write(tmp.path().join("encerramentos.csv"), DISCONTINUED).unwrap();

    let mut cfg = Config::rooted_at(tmp.path());
    cfg.admin.seed_password = Some("12345".to_string());
    let pool = db::connect(&cfg).await.unwrap();
    migrate::run_migrations(&pool, &cfg).await.unwrap();

    let state = AppState::assemble(&cfg, pool, Arc::new(Silent), Arc::new(model)).unwrap();
    (tmp, router(state))
}

async fn app() -> (TempDir, Router) {
    app_with(CannedModel(Some("Resposta do assistente."))).await
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_req(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const BOUNDARY: &str = "salesdesk-test-boundary";

/// `(name, file name, content)`; a `None` file name makes a plain text field.
fn multipart_req(uri: &str, parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, file_name, content) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match file_name {
            Some(f) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                name, f
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            )),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (_tmp, app) = app().await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_login_flags_only_seed_account_as_admin() {
    let (_tmp, app) = app().await;

    let (status, body) = send(
        &app,
        json_req("POST", "/api/login", json!({"username": "admin", "password": "12345"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isAdmin"], true);

    let (status, _) = send(
        &app,
        json_req("POST", "/api/register", json!({"username": "ana", "password": "pw"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        json_req("POST", "/api/login", json!({"username": "ana", "password": "pw"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isAdmin"], false);

    let (status, body) = send(
        &app,
        json_req("POST", "/api/login", json!({"username": "ana", "password": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn test_register_validation_and_conflict() {
    let (_tmp, app) = app().await;
    let (status, _) = send(
        &app,
        json_req("POST", "/api/register", json!({"username": "bia"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = || json_req("POST", "/api/register", json!({"username": "bia", "password": "x"}));
    assert_eq!(send(&app, req()).await.0, StatusCode::CREATED);
    let (status, body) = send(&app, req()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn test_user_management_requires_admin() {
    let (_tmp, app) = app().await;
    send(
        &app,
        json_req("POST", "/api/register", json!({"username": "caio", "password": "x"})),
    )
    .await;

    let (status, _) = send(&app, get("/api/users?username=caio")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, get("/api/users?username=admin")).await;
    assert_eq!(status, StatusCode::OK);
    let users = body["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    let caio_id = users[1]["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        json_req("DELETE", "/api/users/1", json!({"username": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        json_req("DELETE", &format!("/api/users/{}", caio_id), json!({"username": "caio"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        json_req("DELETE", "/api/users/999", json!({"username": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        json_req("DELETE", &format!("/api/users/{}", caio_id), json!({"username": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_chat_sources_and_history() {
    let (_tmp, app) = app().await;

    let (status, _) = send(&app, json_req("POST", "/api/chat", json!({"message": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_req("POST", "/api/chat", json!({"message": "roteador", "username": "ana"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["origem"], "catalog");
    assert_eq!(body["reply"], "Resposta do assistente.");

    let (_, body) = send(&app, json_req("POST", "/api/chat", json!({"message": "geladeira"}))).await;
    assert_eq!(body["origem"], "model");

    let (status, body) = send(&app, get("/api/chat/history")).await;
    assert_eq!(status, StatusCode::OK);
    let turns = body["history"].as_array().unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[0]["text"], "roteador");
    assert_eq!(turns[1]["role"], "assistant");

    let (status, body) = send(&app, get("/api/chat/history?day=2001-01-01")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["history"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, get("/api/chat/history?day=yesterday")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get("/api/chat-logs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_chat_logs_missing_is_404() {
    let (_tmp, app) = app().await;
    let (status, body) = send(&app, get("/api/chat-logs")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_chat_model_failure_returns_fallback_with_500() {
    let (tmp, app) = app_with(CannedModel(None)).await;
    let (status, body) = send(&app, json_req("POST", "/api/chat", json!({"message": "roteador"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["origem"], "catalog");
    assert!(body["reply"].as_str().unwrap().starts_with("Sorry"));

    let log = fs::read_to_string(tmp.path().join("chat_logs.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 1);
}

#[tokio::test]
async fn test_products_and_discontinued() {
    let (_tmp, app) = app().await;

    let (status, body) = send(&app, get("/api/products")).await;
    assert_eq!(status, StatusCode::OK);
    let products = body.as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[1]["status"], "encerrado");
    assert_eq!(products[1]["substituto"], "5678");

    let (_, body) = send(&app, get("/api/products?status=em_linha")).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(&app, get("/api/products?q=wi-fi&segment=redes")).await;
    assert_eq!(body[0]["codigo"], "4750021");

    let (status, _) = send(&app, get("/api/products?status=sold-out")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, get("/api/encerrados")).await;
    assert_eq!(body[0]["codigo"], "1234");
    assert_eq!(body[0]["indicacao"], Value::Null);
}

#[tokio::test]
async fn test_upload_requires_admin_and_replaces_catalog() {
    let (_tmp, app) = app().await;
    let sheet = "Código,Descrição,PSD\n9001,Nobreak 600VA,450\n";

    let (status, _) = send(
        &app,
        multipart_req(
            "/api/upload-psd",
            &[("username", None, "ana"), ("file", Some("psd.csv"), sheet)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        multipart_req(
            "/api/upload-psd",
            &[("username", None, "admin"), ("file", Some("psd.csv"), sheet)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    let backup = body["backup"].as_str().unwrap().to_string();

    let (_, body) = send(&app, get("/api/products")).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["codigo"], "9001");

    let (_, body) = send(&app, get("/api/backups")).await;
    assert_eq!(body[0]["name"], backup.as_str());

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/backups/{}", backup)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("attachment"));
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], sheet.as_bytes());

    let (status, _) = send(&app, get("/api/backups/..%2Fprodutos.json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, get("/api/backups/backup_%22x%22.csv")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, get("/api/backups/backup_missing.csv")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejects_unsupported_file() {
    let (_tmp, app) = app().await;
    let (status, body) = send(
        &app,
        multipart_req(
            "/api/upload-psd",
            &[("username", None, "admin"), ("file", Some("psd.pdf"), "%PDF")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unsupported file type"));
}

#[tokio::test]
async fn test_compare_requires_both_datasheets() {
    let (_tmp, app) = app().await;
    let (status, _) = send(
        &app,
        multipart_req(
            "/api/comparar-datasheets",
            &[("datasheet1", Some("a.pdf"), "%PDF-1.4")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analysis_flow() {
    let (_tmp, app) = app().await;

    let (status, _) = send(&app, get("/api/analise")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(
        &app,
        json_req("POST", "/api/chat", json!({"message": "roteador", "username": "ana"})),
    )
    .await;

    let (status, _) = send(
        &app,
        json_req("POST", "/api/executar-analise", json!({"username": "ana"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        json_req("POST", "/api/executar-analise", json!({"username": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = send(&app, get("/api/analise")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["most_active_user"]["username"], "ana");
}
