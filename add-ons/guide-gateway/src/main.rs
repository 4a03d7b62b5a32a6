//! Axum-based gateway over the guide orchestrator. Config-driven via GuideConfig.

mod handlers;

use axum::{
    extract::{Json, Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use guide_core::{
    AliasCatalog, AliasFile, Answer, ContentPack, GuideConfig, GuideError, KeywordKb, Orchestrator,
    QueryResponse,
};
use guide_skills::WikiClient;
use handlers::reply::{reply_lines, ImageRoutes, KB_IMAGE_ROUTE, PACK_ROUTE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pre-flight check: pack, alias file, KB, wiki endpoint and port.
fn run_verify() -> Result<(), String> {
    let config = GuideConfig::load().map_err(|e| format!("Config load failed: {}", e))?;

    // 1. Content pack
    print!("Checking content pack {}... ", config.pack_dir.display());
    let (pack, report) = ContentPack::open_path(&config.pack_dir);
    if !pack.entries_dir().is_dir() {
        return Err(format!("entries directory {} is missing", pack.entries_dir().display()));
    }
    if !report.is_success() {
        let failed: Vec<String> = report
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.file.display(), e.message))
            .collect();
        return Err(format!("{} pack file(s) failed to load:\n  {}", failed.len(), failed.join("\n  ")));
    }
    println!("OK ({} entries)", pack.len());

    // 2. Alias file (missing is fine, malformed is not)
    print!("Checking alias file {}... ", config.alias_path.display());
    match std::fs::read_to_string(&config.alias_path) {
        Ok(text) => {
            serde_json::from_str::<AliasFile>(&text).map_err(|e| format!("alias file is not valid JSON: {}", e))?;
            println!("OK ({} aliases)", AliasCatalog::open_path(&config.alias_path).len());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => println!("OK (not present, starting empty)"),
        Err(e) => return Err(format!("alias file unreadable: {}", e)),
    }

    // 3. Keyword KB
    print!("Checking keyword KB {}... ", config.kb_path.display());
    let kb = KeywordKb::open_path(&config.kb_path, &config.kb_image_dir);
    println!("OK ({} entries)", kb.len());

    // 4. Wiki endpoint
    print!("Checking wiki client... ");
    let wiki = WikiClient::from_config(&config).map_err(|e| format!("wiki client: {}", e))?;
    println!("OK ({})", wiki.endpoint().api_url);

    // 5. Port availability
    let port = config.port;
    print!("Checking port {}... ", port);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    match std::net::TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => {
            return Err(format!("Port {} BLOCKED: {}", port, e));
        }
    }

    println!("\nSUCCESS: all checks passed. Ready to start gateway.");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[guide-gateway] .env not loaded: {} (using system environment)", e);
    }

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(GuideConfig::load().expect("load GuideConfig"));
    let wiki = Arc::new(WikiClient::from_config(&config).expect("build wiki client"));
    let (orchestrator, report) = Orchestrator::from_config(&config, wiki);
    if !report.is_success() {
        tracing::warn!(
            target: "guide::gateway",
            failed = report.errors.len(),
            "content pack loaded with errors"
        );
    }

    let app = build_app(AppState {
        config: Arc::clone(&config),
        orchestrator: Arc::new(orchestrator),
    });

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    tracing::info!("{} listening on {}", config.app_name, addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await.expect("bind gateway port"),
        app,
    )
    .await
    .expect("gateway server");
}

fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let pack_dir = state.config.pack_dir.clone();
    let kb_image_dir = state.config.kb_image_dir.clone();

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/query", post(query))
        .route("/v1/query/local", post(query_local))
        .route("/v1/wiki", post(wiki))
        .route("/v1/entries", get(entries))
        .route("/v1/aliases", post(add_alias))
        .route("/v1/aliases/:alias", delete(remove_alias))
        .route("/v1/reload", post(reload))
        .with_state(state)
        .nest_service(PACK_ROUTE, ServeDir::new(pack_dir))
        .nest_service(KB_IMAGE_ROUTE, ServeDir::new(kb_image_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<GuideConfig>,
    pub(crate) orchestrator: Arc<Orchestrator>,
}

/// GET /api/v1/health – liveness check for scripts.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// GET /v1/status – app identity, wiki target and library counts.
async fn status(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "app_name": state.config.app_name,
        "port": state.config.port,
        "wiki_mode": state.config.wiki_mode,
        "library": state.orchestrator.status(),
    }))
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Serialize)]
struct QueryReply {
    #[serde(flatten)]
    response: QueryResponse,
    reply: Vec<String>,
}

fn query_reply(state: &AppState, response: QueryResponse) -> Response {
    let code = if matches!(response.answer, Answer::EmptyQuery) {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    let routes = ImageRoutes::new(&state.config.pack_dir, &state.config.kb_image_dir);
    let reply = reply_lines(&response.answer, &routes);
    (code, Json(QueryReply { response, reply })).into_response()
}

/// POST /v1/query – pack → KB → wiki.
async fn query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> Response {
    let response = state.orchestrator.answer(&req.query).await;
    tracing::info!(
        target: "guide::gateway",
        query = %response.query,
        score = response.resolution.score,
        "query answered"
    );
    query_reply(&state, response)
}

/// POST /v1/query/local – pack → KB, never the wiki.
async fn query_local(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> Response {
    let response = state.orchestrator.answer_local(&req.query);
    query_reply(&state, response)
}

/// POST /v1/wiki – wiki only.
async fn wiki(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> Response {
    let response = state.orchestrator.wiki_lookup(&req.query).await;
    query_reply(&state, response)
}

#[derive(Deserialize, Default)]
struct EntriesParams {
    #[serde(default)]
    prefix: String,
}

/// GET /v1/entries?prefix= – sorted pack keys.
async fn entries(
    State(state): State<AppState>,
    Query(params): Query<EntriesParams>,
) -> axum::Json<serde_json::Value> {
    let keys = state.orchestrator.list_keys(&params.prefix);
    axum::Json(serde_json::json!({ "count": keys.len(), "keys": keys }))
}

#[derive(Deserialize)]
struct AliasRequest {
    alias: String,
    target: String,
}

fn error_response(err: &GuideError) -> Response {
    let code = match err {
        GuideError::InvalidAlias(_) => StatusCode::BAD_REQUEST,
        GuideError::StoreUnreadable { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(serde_json::json!({ "status": "error", "error": err.to_string() }))).into_response()
}

/// POST /v1/aliases – add or replace an alias.
async fn add_alias(State(state): State<AppState>, Json(req): Json<AliasRequest>) -> Response {
    match state.orchestrator.add_alias(&req.alias, &req.target) {
        Ok(()) => Json(serde_json::json!({
            "status": "ok",
            "alias": req.alias,
            "target": req.target.trim(),
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(target: "guide::gateway", alias = %req.alias, error = %e, "add alias failed");
            error_response(&e)
        }
    }
}

/// DELETE /v1/aliases/:alias
async fn remove_alias(State(state): State<AppState>, Path(alias): Path<String>) -> Response {
    match state.orchestrator.remove_alias(&alias) {
        Ok(removed) => {
            let code = if removed { StatusCode::OK } else { StatusCode::NOT_FOUND };
            (code, Json(serde_json::json!({ "alias": alias, "removed": removed }))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "lowercase")]
enum ReloadScope {
    #[default]
    All,
    Pack,
}

#[derive(Deserialize, Default)]
struct ReloadRequest {
    #[serde(default)]
    scope: ReloadScope,
}

/// POST /v1/reload – `{"scope": "pack"}` reloads only the pack; default reloads everything.
async fn reload(State(state): State<AppState>, body: Option<Json<ReloadRequest>>) -> Response {
    let scope = body.map(|Json(r)| r.scope).unwrap_or_default();
    let report = match scope {
        ReloadScope::Pack => state.orchestrator.reload_pack(),
        ReloadScope::All => state.orchestrator.reload_all(),
    };
    let code = if report.is_success() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    (code, Json(report)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use guide_core::{BoxError, WikiHit, WikiService, WikiSummary};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubWiki {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl WikiService for StubWiki {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<WikiHit>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query == "nothing" {
                return Ok(Vec::new());
            }
            Ok(vec![WikiHit {
                title: "Magma".into(),
                url: "https://wiki.test/Magma".into(),
                snippet: String::new(),
            }])
        }

        async fn summary(&self, title: &str) -> Result<WikiSummary, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(WikiSummary {
                title: title.to_string(),
                extract: "Molten rock.".into(),
                url: format!("https://wiki.test/{}", title),
            })
        }
    }

    fn test_config(root: &std::path::Path) -> GuideConfig {
        let entries = root.join("pack").join("entries");
        std::fs::create_dir_all(&entries).unwrap();
        std::fs::write(
            entries.join("waterskin.md"),
            "---\nkey: Waterskin\naliases: [水壶]\n---\nHolds water. ![](https://img.test/skin.png)",
        )
        .unwrap();
        GuideConfig {
            app_name: "Test Guide".into(),
            port: 8099,
            pack_dir: root.join("pack"),
            alias_path: root.join("aliases.json"),
            kb_path: root.join("kb.json"),
            kb_image_dir: root.join("images"),
            ..GuideConfig::default()
        }
    }

    fn test_app(root: &std::path::Path) -> (Router, Arc<StubWiki>) {
        let config = test_config(root);
        let wiki = Arc::new(StubWiki::default());
        let (orchestrator, _) = Orchestrator::from_config(&config, wiki.clone());
        let app = build_app(AppState {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
        });
        (app, wiki)
    }

    async fn get_uri(app: Router, uri: &str) -> Response {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(dir.path());
        let req = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_query_hits_pack_without_wiki() {
        let dir = tempfile::tempdir().unwrap();
        let (app, wiki) = test_app(dir.path());
        let res = app
            .oneshot(post_json("/v1/query", serde_json::json!({ "query": "ＷＡＴＥＲＳＫＩＮ" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["answer"]["kind"], "pack");
        assert_eq!(json["answer"]["key"], "Waterskin");
        assert_eq!(json["resolution"]["tier"], "exact");
        assert_eq!(json["reply"][0], "Holds water.");
        assert_eq!(json["reply"][1], "[image] https://img.test/skin.png");
        assert_eq!(wiki.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_falls_back_to_wiki() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(dir.path());
        let res = app
            .clone()
            .oneshot(post_json("/v1/query", serde_json::json!({ "query": "magma" })))
            .await
            .unwrap();
        let json = body_json(res).await;
        assert_eq!(json["answer"]["kind"], "wiki");
        assert_eq!(json["answer"]["summary"], "Molten rock.");

        let res = app
            .oneshot(post_json("/v1/query", serde_json::json!({ "query": "nothing" })))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["answer"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_empty_query_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(dir.path());
        let res = app
            .oneshot(post_json("/v1/query", serde_json::json!({ "query": "  " })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["answer"]["kind"], "empty_query");
    }

    #[tokio::test]
    async fn test_local_query_never_calls_wiki() {
        let dir = tempfile::tempdir().unwrap();
        let (app, wiki) = test_app(dir.path());
        let res = app
            .oneshot(post_json("/v1/query/local", serde_json::json!({ "query": "magma" })))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["answer"]["kind"], "not_found");
        assert_eq!(wiki.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_alias_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(dir.path());

        let res = app
            .clone()
            .oneshot(post_json("/v1/aliases", serde_json::json!({ "alias": "flask", "target": "Waterskin" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(dir.path().join("aliases.json").exists());

        let res = app
            .clone()
            .oneshot(post_json("/v1/query/local", serde_json::json!({ "query": "flask" })))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["answer"]["key"], "Waterskin");

        let res = app
            .clone()
            .oneshot(post_json("/v1/aliases", serde_json::json!({ "alias": " ", "target": "x" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let del = || {
            Request::builder()
                .method("DELETE")
                .uri("/v1/aliases/flask")
                .body(Body::empty())
                .unwrap()
        };
        let res = app.clone().oneshot(del()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["removed"], true);
        let res = app.oneshot(del()).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_kb_image_is_served_and_linked() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("beer.png"), b"png").unwrap();
        std::fs::write(
            dir.path().join("kb.json"),
            r#"{"entries": {"beer": {"answer": "Drink.", "image": "beer.png"}}}"#,
        )
        .unwrap();
        let (app, _) = test_app(dir.path());

        let res = app
            .clone()
            .oneshot(post_json("/v1/query/local", serde_json::json!({ "query": "beer" })))
            .await
            .unwrap();
        let json = body_json(res).await;
        assert_eq!(json["answer"]["kind"], "kb");
        assert_eq!(json["reply"], serde_json::json!(["Drink.", "[image] /kb-images/beer.png"]));

        let res = get_uri(app, "/kb-images/beer.png").await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_alias_edit_refused_when_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let broken = r#"{"aliases": {"a": "A",}}"#;
        std::fs::write(dir.path().join("aliases.json"), broken).unwrap();
        let (app, _) = test_app(dir.path());

        let res = app
            .oneshot(post_json("/v1/aliases", serde_json::json!({ "alias": "b", "target": "B" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("aliases.json")).unwrap(),
            broken
        );
    }

    #[tokio::test]
    async fn test_reload_and_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(dir.path());
        std::fs::write(
            dir.path().join("pack").join("entries").join("pick.md"),
            "---\nkey: Pick\n---\nDigs.",
        )
        .unwrap();

        let req = Request::builder()
            .method("POST")
            .uri("/v1/reload")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["entries_loaded"], 2);

        let req = Request::builder().uri("/v1/entries?prefix=pi").body(Body::empty()).unwrap();
        let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(json["keys"], serde_json::json!(["Pick"]));

        let req = Request::builder().uri("/v1/status").body(Body::empty()).unwrap();
        let json = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(json["app_name"], "Test Guide");
        assert_eq!(json["wiki_mode"], "mediawiki");
        assert_eq!(json["library"]["pack_entries"], 2);
    }
}
