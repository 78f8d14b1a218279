//! Control surface router.
//!
//! `/health` sits at the root; everything else is nested under `/api/`.
//! Path params use `:param` syntax (matchit 0.7 / axum 0.7).

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the full router around a shared `CoreState`.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    let api = Router::new()
        .route("/claims", get(endpoints::claims::list_runs))
        .route("/claims/available", get(endpoints::claims::available))
        .route("/claims/process", post(endpoints::claims::process))
        .route("/claims/status", get(endpoints::claims::status))
        .route("/claims/cancel", post(endpoints::claims::cancel))
        .route("/claims/:id", get(endpoints::claims::latest))
        .route("/claims/:id/preview", get(endpoints::claims::preview))
        .route("/results/:run_id", get(endpoints::runs::detail))
        .route("/facilities/verify", post(endpoints::facilities::verify));

    Router::new()
        .route("/health", get(endpoints::health::check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(ctx)
}
