use std::any::Any;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, error};

use crate::{
    modules,
    web::{AppState, responses::json_error, status},
};

pub fn build_router(state: AppState) -> Router {
    // The frontend defaults to an `/api` base URL; serve both layouts.
    let api = api_routes();
    let routes = Router::new().merge(api.clone()).nest("/api", api);

    with_service_layers(routes, state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(status::root))
        .route("/health", get(status::health))
        .merge(modules::check_ai::router())
        .merge(modules::chat::router())
        .merge(modules::feedback::router())
        .merge(modules::analyze::router())
}

fn with_service_layers(routes: Router<AppState>, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let body_limit = state.settings().max_upload_bytes;

    routes
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

/// Turns a handler panic into the regular error body instead of a dropped connection.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };

    error!(%message, "handler panicked");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Internal server error: {message}"),
    )
    .into_response()
}
