//! HTTP surface: both diagnosis endpoints, record submission and
//! listing, and static assets

use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use log::{debug, error, info};

use crate::config::{DxConfig, ServerConfig};
use crate::failover::FallbackOrchestrator;
use crate::providers::{GeminiClient, OpenAiClient, ProviderClient};
use crate::records::DiagnosticRecord;
use crate::request::UnifiedOutcome;
use crate::store::RecordStore;
use crate::Provider;

/// Application state shared across handlers
pub struct AppState
{   pub orchestrator: FallbackOrchestrator
  , pub gemini: Arc<dyn ProviderClient>
  , pub openai: Arc<dyn ProviderClient>
  , pub store: RecordStore
}

impl AppState
{   pub fn new(
      orchestrator: FallbackOrchestrator
    , gemini: Arc<dyn ProviderClient>
    , openai: Arc<dyn ProviderClient>
    , store: RecordStore
    ) -> Self
    {   AppState
        {   orchestrator
          , gemini
          , openai
          , store
        }
    }

    /// Real provider clients and a store under the configured data dir.
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: &DxConfig)
      -> Result<Self, crate::error::Error>
    {   Ok(AppState::new(
          FallbackOrchestrator::from_config(&config.failover)
        , Arc::new(GeminiClient::new(config.gemini.clone())?)
        , Arc::new(OpenAiClient::new(config.openai.clone())?)
        , RecordStore::new(config.server.data_dir.clone())
        ))
    }

    fn client(&self, provider: Provider) -> &dyn ProviderClient
    {   match provider
        {   Provider::Gemini => self.gemini.as_ref()
          , Provider::OpenAi => self.openai.as_ref()
        }
    }

    /// (primary, fallback) for a diagnosis endpoint
    fn clients_for(&self, primary: Provider)
      -> (&dyn ProviderClient, &dyn ProviderClient)
    {   (self.client(primary), self.client(primary.other()))
    }

    /// Validate, then run the orchestrator with `primary` first.
    pub async fn diagnose(&self, primary: Provider, body: &[u8])
      -> Result<String, crate::error::Error>
    {   let (prompt, config) = crate::request::validate_bytes(body)?;
        let (primary, secondary) = self.clients_for(primary);
        self.orchestrator
          .diagnose(&prompt, &config, primary, Some(secondary))
          .await
    }
}

impl IntoResponse for crate::error::Error
{   fn into_response(self) -> Response
    {   let status = StatusCode::from_u16(self.status_code())
          .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(UnifiedOutcome::failure(&self))).into_response()
    }
}

/// API routes, without state
pub fn api_routes() -> Router<Arc<AppState>>
{   Router::new()
      .route("/api/gemini-diagnosis", post(gemini_diagnosis))
      .route("/api/openai-diagnosis", post(openai_diagnosis))
      .route("/api/diagnostic-result", post(append_result))
      .route("/api/diagnostic-results", get(list_results))
}

/// Full application: API plus static assets, `/` mapped to the index
pub fn router(state: Arc<AppState>, server: &ServerConfig) -> Router
{   let index = server.static_dir.join(&server.index_file);
    debug!(
      "Serving static assets from {} (index {})",
      server.static_dir.display(),
      index.display()
    );
    api_routes()
      .route_service("/", ServeFile::new(index))
      .fallback_service(ServeDir::new(&server.static_dir))
      .with_state(state)
      .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl+C
pub async fn run(config: DxConfig) -> Result<(), crate::error::Error>
{   config.server.check_layout()?;
    let state = Arc::new(AppState::from_config(&config)?);
    let app = router(state, &config.server);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
      .await
      .map_err(|e| {
        error!("Cannot bind {}: {}", addr, e);
        crate::error::Error::Other(format!("bind {}: {}", addr, e))
      })?;
    info!("Server running on port {}", config.server.port);

    axum::serve(listener, app)
      .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
      })
      .await
      .map_err(|e| crate::error::Error::Other(e.to_string()))
}

async fn gemini_diagnosis(
  State(state): State<Arc<AppState>>
, body: Bytes
) -> Result<Json<UnifiedOutcome>, crate::error::Error>
{   let text = state.diagnose(Provider::Gemini, &body).await?;
    Ok(Json(UnifiedOutcome::success(text)))
}

async fn openai_diagnosis(
  State(state): State<Arc<AppState>>
, body: Bytes
) -> Result<Json<UnifiedOutcome>, crate::error::Error>
{   let text = state.diagnose(Provider::OpenAi, &body).await?;
    Ok(Json(UnifiedOutcome::success(text)))
}

async fn append_result(
  State(state): State<Arc<AppState>>
, body: Bytes
) -> Result<Json<Value>, crate::error::Error>
{   let raw = serde_json::from_slice::<Value>(&body)
      .unwrap_or(Value::Null);
    let record = DiagnosticRecord::normalize(&raw)?;
    let count = state.store.append_record(record).await?;
    info!("Stored diagnostic result, {} total", count);
    Ok(Json(json!({ "ok": true, "count": count })))
}

async fn list_results(
  State(state): State<Arc<AppState>>
) -> Result<Json<Value>, crate::error::Error>
{   let results = state.store.list_records().await?;
    let count = results.len();
    Ok(Json(json!({ "ok": true, "results": results, "count": count })))
}
