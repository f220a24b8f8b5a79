//! Servidor web Axum com WebSocket para experimentar a análise dinâmica em tempo real

mod settings;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use dynan_core::{
    pipeline::DEFAULT_FIELD, AnalysisError, AnalysisEvent, AnalysisOutcome, AnalysisPipeline,
    AnalyzedToken, AnalyzerRegistry, ClonerRegistry,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::settings::{Loader, ServerSettings};

/// Estado compartilhado da aplicação
struct AppState {
    pipeline: AnalysisPipeline,
    analyzer_names: Vec<String>,
    ws_event_delay_ms: u64,
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    text: String,
    #[serde(default)]
    field: Option<String>,
}

#[derive(Deserialize)]
struct BatchRequest {
    texts: Vec<String>,
    #[serde(default)]
    field: Option<String>,
}

/// Mensagem WebSocket recebida do cliente
#[derive(Deserialize)]
struct WsRequest {
    text: String,
    #[serde(default)]
    field: Option<String>,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    tokens: Vec<AnalyzedToken>,
    tag: Option<String>,
    matched: bool,
    analyzers: Vec<String>,
    total_tokens: usize,
    processing_ms: u64,
}

impl From<AnalysisOutcome> for AnalyzeResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        Self {
            total_tokens: outcome.tokens.len(),
            tokens: outcome.tokens,
            tag: outcome.resolution.tag,
            matched: outcome.resolution.matched,
            analyzers: outcome.resolution.analyzers,
            processing_ms: outcome.processing_ms,
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum BatchItem {
    Ok(AnalyzeResponse),
    Err { error: String },
}

#[derive(Serialize)]
struct AnalyzersResponse {
    analyzers: Vec<String>,
    base_analyzers: Vec<String>,
    tags: BTreeMap<String, Vec<String>>,
    delimiter: String,
    gap: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Loader::new()
        .with_optional_file("dynan.toml")
        .with_env()
        .build()?;
    let address = settings.server.address();
    let state = Arc::new(build_state(settings)?);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("🚀 Servidor dynan iniciado em http://{address}");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Monta os registros e o pipeline a partir da configuração.
fn build_state(settings: ServerSettings) -> Result<AppState, AnalysisError> {
    let mut registry = AnalyzerRegistry::with_builtins();
    for (name, spec) in &settings.analyzers {
        registry.register_spec(name, spec)?;
    }
    let analyzer_names = registry.names();
    let cloners = ClonerRegistry::with_buffering(settings.cloner.into())?;
    let pipeline =
        AnalysisPipeline::new(settings.analysis, Arc::new(registry), Arc::new(cloners))?;
    // Resolve os nomes já na subida: erro de configuração não deve esperar a 1ª requisição
    pipeline.analyzer().get_or_build()?;

    Ok(AppState {
        pipeline,
        analyzer_names,
        ws_event_delay_ms: settings.server.ws_event_delay_ms,
    })
}

fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/analyze/batch", post(batch_handler))
        .route("/analyzers", get(analyzers_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

/// Erros de configuração são do servidor; os demais são da requisição.
fn status_for(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::Duplication(_) | AnalysisError::Io(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Análise via HTTP POST (sem streaming)
async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Response {
    if req.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Texto vazio");
    }

    let field = req.field.as_deref().unwrap_or(DEFAULT_FIELD);
    match state.pipeline.analyze(field, &req.text) {
        Ok(outcome) => Json(AnalyzeResponse::from(outcome)).into_response(),
        Err(err) => error_response(status_for(&err), err.to_string()),
    }
}

/// Análise de vários textos em paralelo (rayon, fora do runtime async)
async fn batch_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> Response {
    if req.texts.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Lista de textos vazia");
    }

    let field = req.field.unwrap_or_else(|| DEFAULT_FIELD.to_string());
    let worker_state = Arc::clone(&state);
    let results = tokio::task::spawn_blocking(move || {
        worker_state.pipeline.analyze_batch(&field, &req.texts)
    })
    .await;

    match results {
        Ok(results) => {
            let items: Vec<BatchItem> = results
                .into_iter()
                .map(|result| match result {
                    Ok(outcome) => BatchItem::Ok(outcome.into()),
                    Err(err) => BatchItem::Err {
                        error: err.to_string(),
                    },
                })
                .collect();
            Json(serde_json::json!({ "results": items })).into_response()
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// Analisadores registrados e o mapeamento de tags já composto
async fn analyzers_handler(State(state): State<Arc<AppState>>) -> Response {
    let config = state.pipeline.analyzer().config();
    Json(AnalyzersResponse {
        analyzers: state.analyzer_names.clone(),
        base_analyzers: config.base_analyzers.clone(),
        tags: config.composed_tags(),
        delimiter: config.delimiter.clone(),
        gap: config.gap.max(0),
    })
    .into_response()
}

/// Upgrade HTTP → WebSocket
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Lógica do WebSocket: recebe texto, executa o pipeline e envia os eventos
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket conectado");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                // Aceita JSON {text, field}; senão usa a mensagem como texto puro
                let (text_str, field) = match serde_json::from_str::<WsRequest>(&text) {
                    Ok(req) => (req.text, req.field.unwrap_or_else(|| DEFAULT_FIELD.to_string())),
                    Err(_) => (text.to_string(), DEFAULT_FIELD.to_string()),
                };

                if text_str.trim().is_empty() {
                    continue;
                }

                info!("Analisando via WebSocket [{}]: {} chars", field, text_str.len());

                // O pipeline é síncrono: roda fora do runtime
                let (tx, rx) = std::sync::mpsc::channel::<AnalysisEvent>();
                let worker_state = Arc::clone(&state);
                let handle = tokio::task::spawn_blocking(move || {
                    worker_state.pipeline.analyze_streaming(&field, &text_str, tx);
                });
                if let Err(err) = handle.await {
                    warn!("Falha na análise via WebSocket: {err}");
                    continue;
                }

                let events: Vec<AnalysisEvent> = rx.try_iter().collect();
                for event in &events {
                    if let Ok(json) = serde_json::to_string(event) {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            return; // cliente desconectou
                        }
                        if state.ws_event_delay_ms > 0 {
                            tokio::time::sleep(tokio::time::Duration::from_millis(
                                state.ws_event_delay_ms,
                            ))
                            .await;
                        }
                    }
                }
            }
            Message::Close(_) => {
                info!("WebSocket desconectado");
                return;
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            _ => {}
        }
    }
}
