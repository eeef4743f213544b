//! HTTP transport implementation.
//!
//! Serves the definitions dump and replace endpoints, health, and webhook
//! fulfillment for every other path.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Map, Value, json};
use std::future::IntoFuture;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use super::{TransportConfig, TransportError, TransportResult};
use crate::core::GraffitiServer;
use crate::domains::templates::TemplateError;
use crate::domains::webhooks::{WebhookError, WebhookRequest};

/// HTTP transport handler.
pub struct HttpTransport {
    config: TransportConfig,
}

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    server: GraffitiServer,
}

/// A webhook error rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError(WebhookError);

impl From<WebhookError> for ApiError {
    fn from(e: WebhookError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            WebhookError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            WebhookError::Template(TemplateError::MissingArgument { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            WebhookError::Template(_) | WebhookError::UnknownHandler(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            WebhookError::Source(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.0.is_client_error() {
            info!(status = status.as_u16(), error = %self.0, "Request rejected");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Run the HTTP transport until `cancel` fires.
    ///
    /// In-flight requests get `shutdown_timeout` to complete.
    pub async fn run(self, server: GraffitiServer, cancel: CancellationToken) -> TransportResult<()> {
        let addr = self.address();
        let app = router(server, &self.config);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        info!("Ready - listening on {}", self.config.description());
        info!("  → Webhooks:    POST /{{endpoint}}");
        info!("  → Definitions: GET /get_definitions, POST /update_definitions");
        info!("  → Health:      GET /health");

        let shutdown = cancel.clone();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .into_future();

        let grace = self.config.shutdown_timeout();
        tokio::select! {
            result = serve => result.map_err(|e| TransportError::http(e.to_string()))?,
            () = async {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out, dropping connections");
            }
        }

        info!("HTTP transport stopped");
        Ok(())
    }
}

/// Build the application router.
pub fn router(server: GraffitiServer, config: &TransportConfig) -> Router {
    let state = AppState { server };

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/handlers", get(list_handlers))
        .route("/endpoints", get(get_definitions))
        .route("/get_definitions", get(get_definitions))
        .route("/update_definitions", post(update_definitions))
        .route("/{*endpoint}", post(handle_webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Root handler - provides API info.
async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": state.server.name(),
        "version": state.server.version(),
        "agent": state.server.cache().agent_name(),
        "endpoints": {
            "webhook": "POST /{endpoint}",
            "definitions": "GET /get_definitions",
            "update": "POST /update_definitions",
            "handlers": "GET /handlers",
            "health": "GET /health"
        }
    }))
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.server.health();
    let status = if health.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

async fn list_handlers(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "handlers": state.server.list_handlers() }))
}

/// Dump every stored definition.
#[instrument(skip_all)]
async fn get_definitions(State(state): State<AppState>) -> impl IntoResponse {
    let definitions = state.server.definitions();
    info!(count = definitions.len(), "Serving definitions");
    Json(definitions)
}

/// Replace the definitions document.
#[instrument(skip_all)]
async fn update_definitions(
    State(state): State<AppState>,
    Json(definitions): Json<Map<String, Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let written = state.server.update_definitions(definitions).await?;
    Ok(Json(written))
}

/// Fulfill a webhook for `/{endpoint}`.
#[instrument(skip_all, fields(endpoint = %endpoint))]
async fn handle_webhook(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    Json(request): Json<WebhookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = format!("/{}", endpoint);
    let response = state.server.fulfill(&key, request)?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::domains::sync::MemoryDocumentSource;
    use axum::body::Body;
    use http::{Request, header};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn definitions() -> Map<String, Value> {
        json!({
            "/test_endpoint_1": {
                "handler-name": "universal-answer",
                "calculated-variables": ["UniversalAnswer"],
                "session-variables": { "user_name": "Name" },
                "prototype": "Hello {{.Name}}, the answer is {{.UniversalAnswer}}"
            },
            "/strict": {
                "calculated-variables": ["Answer"],
                "prototype": "{{.Answer}}"
            }
        })
        .as_object()
        .unwrap()
        .clone()
    }

    async fn app() -> (Router, Arc<MemoryDocumentSource>) {
        let source = Arc::new(MemoryDocumentSource::with_document(definitions()));
        let mut config = Config::default();
        config.listener.ready_timeout_ms = Some(2_000);
        let server = GraffitiServer::with_source(config, source.clone());
        server
            .start_listener(CancellationToken::new())
            .await
            .unwrap();
        (router(server, &TransportConfig::default()), source)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_webhook_fulfillment() {
        let (app, _) = app().await;
        let response = app
            .oneshot(post_json(
                "/test_endpoint_1",
                json!({ "sessionInfo": { "parameters": { "user_name": "Ada" } } }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["fulfillmentResponse"]["messages"][0]["text"]["text"][0],
            "Hello Ada, the answer is 42"
        );
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_404() {
        let (app, _) = app().await;
        let response = app.oneshot(post_json("/nope", json!({}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("/nope"));
    }

    #[tokio::test]
    async fn test_missing_argument_is_422() {
        let (app, _) = app().await;
        let response = app.oneshot(post_json("/strict", json!({}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Answer"));
    }

    #[tokio::test]
    async fn test_get_definitions() {
        let (app, _) = app().await;
        for uri in ["/get_definitions", "/endpoints"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = body_json(response).await;
            assert_eq!(body["/strict"]["prototype"], "{{.Answer}}");
            assert_eq!(
                body["/test_endpoint_1"]["session-variables"]["user_name"],
                "Name"
            );
        }
    }

    #[tokio::test]
    async fn test_update_definitions() {
        let (app, source) = app().await;
        let replacement = json!({ "/only": { "prototype": "only one" } });

        let response = app
            .oneshot(post_json("/update_definitions", replacement.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["updateTime"].is_string());

        assert_eq!(
            Value::Object(source.current().unwrap().data),
            replacement
        );
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let response = app.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["templates"], 2);
        assert_eq!(body["listener"]["snapshots_received"], 1);
    }

    #[tokio::test]
    async fn test_handlers_listed() {
        let (app, _) = app().await;
        let response = app.oneshot(get("/handlers")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["handlers"].as_array().unwrap().len(), 3);
    }
}
