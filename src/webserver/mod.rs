use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;

use crate::errors::{WorkerError, WorkerResult};
use crate::metrics::render;

pub(crate) fn app() -> Router {
    Router::new().route("/metrics", get(get_metrics))
}

/// Serve `GET /metrics` until the runtime is shut down.
pub async fn run_webserver(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting metrics server on {addr:?}");

    axum::Server::bind(&addr)
        .serve(app().into_make_service())
        .await
        .map_err(|err| {
            WorkerError::Metrics(format!(
                "Unable to create local webserver at port {port}: {err}"
            ))
        })
}

async fn get_metrics() -> Response {
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("{err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

#[tokio::test]
async fn metrics_route_answers() {
    let response = get_metrics().await;
    assert_eq!(response.status(), StatusCode::OK);
}
