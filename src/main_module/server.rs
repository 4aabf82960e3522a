//! HTTP server initialization and routing

use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::configure_auth_routes;
use crate::categories::configure_categories_routes;
use crate::core::config::CorsConfig;
use crate::core::middleware::authentication_middleware;
use crate::core::shared::state::AppState;
use crate::customers::configure_customers_routes;
use crate::dashboard::configure_dashboard_routes;
use crate::employees::configure_employees_routes;
use crate::invoices::configure_invoices_routes;
use crate::leads::configure_leads_routes;
use crate::quotations::configure_quotations_routes;
use crate::tickets::{configure_resolution_routes, configure_tickets_routes};

use super::{health_check, health_check_simple, shutdown_signal};

pub fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT];

    if config.allowed_origins.iter().any(|o| o == "*") {
        warn!("CORS allows any origin");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{origin}'");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
}

/// Full application router. Every request passes through the soft
/// authentication gate before reaching a handler.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/health", get(health_check_simple))
        .route("/api/health/ready", get(health_check))
        .merge(configure_auth_routes())
        .merge(configure_employees_routes())
        .merge(configure_customers_routes())
        .merge(configure_tickets_routes())
        .merge(configure_resolution_routes())
        .merge(configure_categories_routes())
        .merge(configure_leads_routes())
        .merge(configure_quotations_routes())
        .merge(configure_invoices_routes())
        .merge(configure_dashboard_routes());

    api_router
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            authentication_middleware,
        ))
        .layer(create_cors_layer(&app_state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub async fn run_axum_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let addr = app_state.config.bind_address();
    let app = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {addr}: {e} - is another instance running?");
            return Err(e);
        }
    };
    info!("HTTP server listening on {addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::enums::Role;
    use crate::core::shared::test_utils::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = build_router(Arc::new(test_state()));
        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "crmserver");
    }

    #[tokio::test]
    async fn test_readiness_reports_store() {
        let app = build_router(Arc::new(test_state()));
        let response = app
            .oneshot(
                Request::get("/api/health/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["database"], true);
    }

    #[tokio::test]
    async fn test_protected_route_without_token() {
        let app = build_router(Arc::new(test_state()));
        let response = app
            .oneshot(Request::get("/api/tickets").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE),
            Some(&HeaderValue::from_static("Bearer"))
        );
    }

    #[tokio::test]
    async fn test_bearer_token_reaches_handler() {
        let state = Arc::new(test_state());
        let token = state
            .tokens
            .issue("ops@crm.io", Role::Employee, 1)
            .expect("token");
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::get("/api/tickets/stats")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 0);
        assert_eq!(body["byStatus"]["OPEN"], 0);
    }

    #[test]
    fn test_cors_skips_invalid_origin() {
        let config = CorsConfig {
            allowed_origins: vec!["http://localhost:5173".into(), "bad\norigin".into()],
        };
        let _layer = create_cors_layer(&config);
    }
}
