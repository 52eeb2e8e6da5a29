//! HTTP companion server (`pb serve`).

mod error;
mod routes;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::io::Library;

pub use error::ApiError;

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                log::warn!("ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
}

/// All `/api` routes with CORS and request tracing applied.
pub fn router(lib: Arc<Library>) -> axum::Router {
    let origins = lib.config().cors_origins.clone();
    routes::api(lib)
        .layer(cors(&origins))
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured host/port and serve until the process ends.
pub async fn serve(lib: Arc<Library>) -> std::io::Result<()> {
    let addr = format!("{}:{}", lib.config().host, lib.config().port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!(
        "serving {} on http://{}",
        lib.plans_dir().display(),
        listener.local_addr()?
    );
    axum::serve(listener, router(lib)).await
}
