use axum::{http::Method, middleware::from_fn_with_state, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod bookings;
pub mod error;
pub mod holds;
pub mod middleware;
pub mod showtimes;
pub mod state;
pub mod worker;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // Anything that creates, drops or converts a lease needs a holder identity
    let holder_routes = Router::new()
        .merge(holds::routes())
        .merge(bookings::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::holder_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .nest("/v1/auth", auth::routes())
        .merge(showtimes::routes())
        .merge(holder_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
