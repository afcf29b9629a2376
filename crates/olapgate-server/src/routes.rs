//! HTTP routes.
//!
//! Every path not claimed by a health route is a query endpoint, so legacy
//! clients can keep posting to whatever path they used before.

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use olapgate_core::{QueryParser, QueryTranslator};
use serde_json::json;
use std::sync::Arc;

use crate::pipeline::Gateway;

/// Build the application router.
pub fn router<P, T>(gateway: Arc<Gateway<P, T>>, enable_health_routes: bool) -> Router
where
    P: QueryParser + 'static,
    T: QueryTranslator<P::Query> + 'static,
{
    let routes = if enable_health_routes {
        health_routes()
    } else {
        Router::new()
    };

    routes.fallback(handle_query::<P, T>).with_state(gateway)
}

/// `/ping` for load balancers and `/health` for humans.
pub fn health_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health_check))
}

async fn ping() -> &'static str {
    "Ok.\n"
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "olapgate"
    }))
}

async fn handle_query<P, T>(
    State(gateway): State<Arc<Gateway<P, T>>>,
    request: Request,
) -> Response
where
    P: QueryParser + 'static,
    T: QueryTranslator<P::Query> + 'static,
{
    gateway.handle(request).await
}
