//! LinguaChat API Gateway
//!
//! The HTTP front of the chat application.
//! Handles:
//! - Session creation and the per-session view-state machine
//! - The identity provider login round trip
//! - Chat message submission
//! - The admin usage dashboard and CSV export
//! - Observability (logging, metrics, tracing) and rate limiting

mod handlers;
mod middleware;
mod state;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use linguachat_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics::{self, LATENCY_BUCKETS, METRICS_PREFIX, MODEL_BUCKETS},
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};
pub use crate::state::{AppState, SessionRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting LinguaChat API Gateway v{}",
        linguachat_common::VERSION
    );

    // Initialize metrics
    init_metrics_exporter(config.observability.metrics_port)?;
    metrics::register_metrics();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let grace = config.shutdown_timeout();

    // Create app state
    let state = AppState::from_config(config).await.map_err(|e| {
        error!(error = %e, "Failed to initialise services");
        e
    })?;

    // Build the router
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(grace))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Structured logging; `RUST_LOG` overrides the configured level
fn init_tracing(config: &ObservabilityConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Serve Prometheus metrics on their own port; 0 disables the exporter
fn init_metrics_exporter(port: u16) -> anyhow::Result<()> {
    if port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_model_duration_seconds", METRICS_PREFIX)),
            MODEL_BUCKETS,
        )?
        .install()?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Session endpoints
        .route("/sessions", post(handlers::sessions::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route("/sessions/{id}/actions", post(handlers::actions::apply_action))
        .route(
            "/sessions/{id}/login/callback",
            post(handlers::actions::login_callback),
        )
        // Chat endpoints
        .route("/sessions/{id}/messages", post(handlers::messages::submit_message))
        // Admin endpoints
        .route("/sessions/{id}/admin", get(handlers::admin::get_overview))
        .route("/sessions/{id}/admin/export", get(handlers::admin::export_csv))
        .route_layer(from_fn(middleware::metrics::track_requests));

    let mut app = Router::new().nest("/v1", api_routes);

    let limits = &state.config.rate_limit;
    if limits.enabled {
        let limiter = create_rate_limiter(limits.requests_per_second, limits.burst);
        app = app.layer(from_fn_with_state(limiter, rate_limit_middleware));
    }

    // Compose the app
    app.layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler. In-flight requests get `grace` to
/// finish before the process exits.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!("Graceful shutdown timed out, exiting");
        std::process::exit(1);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use linguachat_common::{
        chat::MockChatClient,
        clock::SystemClock,
        db::MemoryStore,
        identity::{AdminPolicy, IdClaims, JwtIdentityProvider},
        language::WhatlangDetector,
        usage::UsageRecorder,
        ChatService,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const ADMIN_EMAIL: &str = "admin@example.org";

    fn test_app(rate_limited: bool) -> (Router, Arc<JwtIdentityProvider>) {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(JwtIdentityProvider::new("router-secret"));
        let recorder = UsageRecorder::new(Some(store.clone()), Arc::new(SystemClock));

        let service = ChatService::new(
            Arc::new(WhatlangDetector::new()),
            Some(Arc::new(MockChatClient::new())),
            Some(provider.clone()),
            AdminPolicy::new(vec![ADMIN_EMAIL.to_string()], Vec::new()),
            recorder,
        );

        let mut config = AppConfig::default();
        config.rate_limit.enabled = rate_limited;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 2;

        let state = AppState {
            sessions: SessionRegistry::new(config.session_idle(), Arc::new(SystemClock)),
            config: Arc::new(config),
            service: Arc::new(service),
            store: Some(store),
        };

        (create_router(state), provider)
    }

    fn token(provider: &JwtIdentityProvider, sub: &str, email: &str) -> String {
        provider
            .issue_token(
                IdClaims {
                    sub: Some(sub.to_string()),
                    email: Some(email.to_string()),
                    name: Some("Router Test".to_string()),
                    ..IdClaims::default()
                },
                3600,
            )
            .unwrap()
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/v1/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["view"]["screen"], "home");
        body["session_id"].as_str().unwrap().to_string()
    }

    async fn signed_in(app: &Router, provider: &JwtIdentityProvider, email: &str) -> String {
        let id = new_session(app).await;
        let (status, body) = send(
            app,
            "POST",
            &format!("/v1/sessions/{}/login/callback", id),
            Some(json!({ "id_token": token(provider, "sub-router", email) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"]["screen"], "chat");
        id
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app(false);
        let (status, body) = send(&app, "GET", "/v1/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_checks() {
        let (app, _) = test_app(false);
        let (status, body) = send(&app, "GET", "/v1/ready", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["persistence"]["status"], "up");
        assert_eq!(body["checks"]["chat_model"]["status"], "configured");
    }

    #[tokio::test]
    async fn test_full_user_flow() {
        let (app, provider) = test_app(false);
        let id = new_session(&app).await;
        let actions = format!("/v1/sessions/{}/actions", id);

        let (_, body) = send(&app, "POST", &actions, Some(json!({ "action": "get_started" }))).await;
        assert_eq!(body["view"]["screen"], "login_prompt");

        let (_, body) = send(&app, "POST", &actions, Some(json!({ "action": "back" }))).await;
        assert_eq!(body["view"]["screen"], "home");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/sessions/{}/login/callback", id),
            Some(json!({ "id_token": token(&provider, "sub-1", "user@example.org") })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"]["screen"], "chat");
        assert_eq!(body["view"]["profile"]["email"], "user@example.org");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/sessions/{}/messages", id),
            Some(json!({ "text": "Hola, ¿cómo estás? Espero que tengas un buen día." })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let conversation = body["view"]["conversation"].as_array().unwrap();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0]["role"], "user");
        assert_eq!(conversation[1]["role"], "assistant");
        assert_eq!(body["view"]["profile"]["messages_sent"], 1);

        // Non-admins are kept out of the dashboard
        let (status, _) = send(&app, "GET", &format!("/v1/sessions/{}/admin", id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, body) = send(
            &app,
            "POST",
            &actions,
            Some(json!({ "action": "navigate", "page": "admin_dashboard" })),
        )
        .await;
        assert_eq!(body["view"]["screen"], "chat");

        let (_, body) = send(&app, "POST", &actions, Some(json!({ "action": "clear_chat" }))).await;
        assert_eq!(body["view"]["conversation"].as_array().unwrap().len(), 0);
        assert_eq!(body["view"]["notice"], "Chat history cleared!");

        let (_, body) = send(&app, "POST", &actions, Some(json!({ "action": "logout" }))).await;
        assert_eq!(body["view"]["screen"], "home");
    }

    #[tokio::test]
    async fn test_admin_overview_and_export() {
        let (app, provider) = test_app(false);
        let id = signed_in(&app, &provider, ADMIN_EMAIL).await;

        let (_, body) = send(
            &app,
            "POST",
            &format!("/v1/sessions/{}/actions", id),
            Some(json!({ "action": "navigate", "page": "Admin Dashboard" })),
        )
        .await;
        assert_eq!(body["view"]["screen"], "admin_dashboard");

        let (status, body) = send(&app, "GET", &format!("/v1/sessions/{}/admin", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "available");
        assert_eq!(body["totals"]["users"], 1);

        let request = Request::builder()
            .uri(format!("/v1/sessions/{}/admin/export", id))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(csv.starts_with("uid,name,email,"));
        assert!(csv.contains("sub-router"));
    }

    #[tokio::test]
    async fn test_message_requires_login() {
        let (app, _) = test_app(false);
        let id = new_session(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/sessions/{}/messages", id),
            Some(json!({ "text": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (app, provider) = test_app(false);
        let id = signed_in(&app, &provider, "user@example.org").await;

        let (status, _) = send(
            &app,
            "POST",
            &format!("/v1/sessions/{}/messages", id),
            Some(json!({ "text": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_without_subject_rejected() {
        let (app, provider) = test_app(false);
        let id = new_session(&app).await;
        let credential = provider
            .issue_token(
                IdClaims {
                    email: Some("nosub@example.org".to_string()),
                    ..IdClaims::default()
                },
                3600,
            )
            .unwrap();

        let (status, _) = send(
            &app,
            "POST",
            &format!("/v1/sessions/{}/login/callback", id),
            Some(json!({ "id_token": credential })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, body) = send(&app, "GET", &format!("/v1/sessions/{}", id), None).await;
        assert_eq!(body["screen"], "home");
        assert!(body["notice"].is_string());
    }

    #[tokio::test]
    async fn test_forged_token_rejected() {
        let (app, _) = test_app(false);
        let id = new_session(&app).await;
        let forged = JwtIdentityProvider::new("other-secret");

        let (status, _) = send(
            &app,
            "POST",
            &format!("/v1/sessions/{}/login/callback", id),
            Some(json!({ "id_token": token(&forged, "sub-1", ADMIN_EMAIL) })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let (app, _) = test_app(false);
        let id = new_session(&app).await;

        let (status, _) = send(&app, "DELETE", &format!("/v1/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "GET", &format!("/v1/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_session_not_found() {
        let (app, _) = test_app(false);
        let uri = format!("/v1/sessions/{}", uuid::Uuid::new_v4());

        let (status, _) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let (app, _) = test_app(true);

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let (status, _) = send(&app, "GET", "/v1/health", None).await;
            statuses.push(status);
        }

        assert_eq!(statuses[0], StatusCode::OK);
        assert_eq!(statuses[2], StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let (app, _) = test_app(false);
        let request = Request::builder()
            .uri("/v1/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }
}
