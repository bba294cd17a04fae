//! Axum-based HTTP surface for the gateway.
//!
//! [`ApiServer`] wires the built-in modules, the session resolver and the
//! [`Gateway`] into a running axum service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check, always `200 OK`. |
//! | `GET`/`POST` | `/api` | The API. Parameters come from the query string and, for `POST`, an urlencoded form body. |

use crate::catalog::StaticCatalog;
use crate::dispatch::ModuleRegistry;
use crate::modules::{SiteInfo, register_builtin};
use crate::origin::is_valid_callback;
use crate::pipeline::Gateway;
use crate::session::SessionResolver;
use apigate_kernel::config::GatewaySettings;
use apigate_kernel::gateway::{ApiRequest, ApiResponse, HttpMethod, ParamValue, RegistryError};
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every axum handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
    sessions: Arc<SessionResolver>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, sessions: Arc<SessionResolver>) -> Self {
        Self { gateway, sessions }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiServer
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP server exposing a [`Gateway`] with the built-in modules.
pub struct ApiServer {
    settings: GatewaySettings,
}

impl ApiServer {
    pub fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }

    /// Build the gateway with `ping` and `siteinfo` registered.
    pub fn build_gateway(&self) -> Result<Gateway, RegistryError> {
        let catalog = StaticCatalog::new();
        let site = SiteInfo::from_settings(&self.settings, catalog.languages(), Utc::now());

        let mut registry = ModuleRegistry::new();
        register_builtin(&mut registry, Arc::new(site))?;

        Ok(Gateway::builder(self.settings.clone())
            .with_registry(registry)
            .with_localizer(Arc::new(catalog))
            .build())
    }

    /// Build the axum [`Router`]. Call [`start()`](Self::start) to bind and
    /// serve.
    pub fn build_app(&self) -> Result<Router, RegistryError> {
        let gateway = self.build_gateway()?;
        let sessions = SessionResolver::from_settings(&self.settings);
        Ok(router(AppState::new(Arc::new(gateway), Arc::new(sessions))))
    }

    /// Bind to `[server] host:port` and serve until the process exits.
    pub async fn start(self) -> anyhow::Result<()> {
        let app = self.build_app()?;
        let addr = format!("{}:{}", self.settings.server.host, self.settings.server.port);
        info!(addr = %addr, "apigate starting");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Routes and layers over an existing state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api", get(api_handler).post(api_handler))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health`: liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET|POST /api`: run the request through the gateway.
async fn api_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(http_method) = HttpMethod::from_str_ci(method.as_str()) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE));
    let params = collect_params(uri.query(), is_form.then_some(body.as_ref()));

    let caller = state.sessions.resolve(&headers);
    let mut request = ApiRequest::new(Uuid::new_v4().to_string(), http_method, caller);
    for (name, value) in params {
        request = request.with_param_value(name, value);
    }
    for (name, value) in &headers {
        if let Ok(v) = value.to_str() {
            request = request.with_header(name.as_str(), v);
        }
    }

    match state.gateway.execute(&request) {
        Ok(response) => into_http(response, request.scalar("callback")),
        Err(err) => {
            error!(request_id = %request.id, error = %err, "module contract violation");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Query string and form body as ordered parameters. Keys in array syntax
/// (`name[]`, `name[k]`) become [`ParamValue::MalformedArray`] for `name`.
/// Undecodable input contributes no parameters; the gateway then reports
/// whatever is missing in its own document.
fn collect_params(query: Option<&str>, form: Option<&[u8]>) -> Vec<(String, ParamValue)> {
    let mut pairs = query.map(|q| decode_pairs(q.as_bytes())).unwrap_or_default();
    if let Some(form) = form {
        pairs.extend(decode_pairs(form));
    }

    pairs
        .into_iter()
        .map(|(key, value)| match array_base(&key) {
            Some(base) => (base.to_string(), ParamValue::MalformedArray),
            None => (key, ParamValue::Scalar(value)),
        })
        .collect()
}

fn decode_pairs(input: &[u8]) -> Vec<(String, String)> {
    serde_urlencoded::from_bytes(input).unwrap_or_else(|err| {
        warn!(error = %err, "undecodable request parameters ignored");
        Vec::new()
    })
}

fn array_base(key: &str) -> Option<&str> {
    let open = key.find('[')?;
    (open > 0 && key.ends_with(']')).then(|| &key[..open])
}

fn into_http(response: ApiResponse, callback: Option<&str>) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers.iter() {
        builder = builder.header(name, value);
    }

    let built = match response.body {
        None => builder.body(Body::empty()),
        Some(body) => {
            let json = body.to_string();
            match callback.filter(|cb| is_valid_callback(cb)) {
                Some(cb) => builder
                    .header(header::CONTENT_TYPE, "text/javascript; charset=utf-8")
                    .body(Body::from(format!("/**/{cb}({json})"))),
                None => builder
                    .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
                    .body(Body::from(json)),
            }
        }
    };
    built.unwrap_or_else(|err| {
        error!(error = %err, "failed to build response");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}
