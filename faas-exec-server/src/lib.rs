use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use faas_exec::{
    BackendKind, EngineConfig, ExecutionOutcome, FunctionService, FunctionSpec,
    InMemoryFunctionStore, Language, MetricsSink, DEFAULT_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Engine error: {0}")]
    Engine(#[from] faas_exec::Error),
    #[error("Server error: {0}")]
    ServerError(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Engine(faas_exec::Error::FunctionNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Function not found".to_string())
            }
            ServerError::Engine(faas_exec::Error::FunctionExists(name)) => (
                StatusCode::CONFLICT,
                format!("Function {} already exists", name),
            ),
            ServerError::Engine(e) => {
                error!("Request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ServerError::ServerError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub language: String,
    pub code: String,
    pub timeout_ms: Option<u64>,
    pub backend: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub input: Option<Value>,
}

#[derive(Clone)]
pub struct AppState {
    service: FunctionService,
    store: Arc<InMemoryFunctionStore>,
}

/// Build the router over a fresh in-memory function store
pub fn create_app(config: &EngineConfig, metrics: Arc<dyn MetricsSink>) -> Router {
    let store = Arc::new(InMemoryFunctionStore::new());
    let service = FunctionService::from_config(config, store.clone(), metrics);

    let state = AppState { service, store };

    let cors = CorsLayer::permissive();

    Router::new()
        .route("/health", get(health_check))
        .route("/api/functions", post(register_function))
        .route("/api/functions/:id", get(get_function))
        .route("/api/executions/:id", post(invoke_function))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), ServerError> {
    info!("Starting function execution server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn register_function(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<FunctionSpec>), ServerError> {
    let language: Language = payload
        .language
        .parse()
        .map_err(ServerError::InvalidRequest)?;
    let backend: BackendKind = match payload.backend {
        Some(backend) => backend.parse().map_err(ServerError::InvalidRequest)?,
        None => BackendKind::default(),
    };
    if payload.name.trim().is_empty() {
        return Err(ServerError::InvalidRequest("name must not be empty".to_string()));
    }
    if payload.timeout_ms == Some(0) {
        return Err(ServerError::InvalidRequest(
            "timeoutMs must be a positive number of milliseconds".to_string(),
        ));
    }

    let spec = FunctionSpec {
        id: Uuid::new_v4().to_string(),
        name: payload.name,
        language,
        code: payload.code,
        timeout_ms: payload.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        backend,
    };
    state.store.insert(spec.clone()).await?;
    info!("Registered function {} ({})", spec.name, spec.id);

    Ok((StatusCode::CREATED, Json(spec)))
}

async fn get_function(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FunctionSpec>, ServerError> {
    use faas_exec::FunctionStore;

    let spec = state
        .store
        .lookup(&id)
        .await?
        .ok_or(faas_exec::Error::FunctionNotFound(id))?;
    Ok(Json(spec))
}

async fn invoke_function(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<InvokeRequest>>,
) -> Result<Json<ExecutionOutcome>, ServerError> {
    let input = payload
        .and_then(|Json(request)| request.input)
        .unwrap_or_else(|| json!({}));

    let outcome = state.service.invoke(&id, input).await?;
    Ok(Json(outcome))
}
