//! HTTP front for a [`KeyService`].
//!
//! Routes:
//! - `POST /v1/fetch_key`: certificate + policy transaction in, user keys out
//! - `GET /v1/service`: server id and master public key

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::key_server::{KeyServerError, KeyService};
use crate::wire::{ErrorBody, ErrorKind, FetchKeyRequest, ServiceInfo};

pub fn router(service: Arc<KeyService>) -> Router {
    Router::new()
        .route("/v1/fetch_key", post(fetch_key_handler))
        .route("/v1/service", get(service_handler))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn fetch_key_handler(
    State(service): State<Arc<KeyService>>,
    Json(request): Json<FetchKeyRequest>,
) -> Response {
    match service.handle(&request) {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => error_response(e),
    }
}

async fn service_handler(State(service): State<Arc<KeyService>>) -> Json<ServiceInfo> {
    Json(service.service_info())
}

fn error_response(err: KeyServerError) -> Response {
    let (status, kind, message) = match err {
        KeyServerError::NoAccess(m) => (StatusCode::FORBIDDEN, ErrorKind::NoAccess, m),
        KeyServerError::InvalidCertificate(m) => {
            (StatusCode::UNAUTHORIZED, ErrorKind::InvalidCertificate, m)
        }
        KeyServerError::InvalidRequest(m) => {
            (StatusCode::BAD_REQUEST, ErrorKind::InvalidRequest, m)
        }
        KeyServerError::Unavailable(m) => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal, m)
        }
    };
    (
        status,
        Json(ErrorBody {
            error: kind,
            message,
        }),
    )
        .into_response()
}

/// Bind `addr` and serve `service` on a background task. Returns the bound
/// address (useful with port 0).
pub async fn spawn(
    addr: SocketAddr,
    service: Arc<KeyService>,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let server_id = service.server_id().to_string();
    info!(%server_id, addr = %local, "key server listening");

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(service)).await {
            error!(%server_id, "key server stopped: {e}");
        }
    });
    Ok((local, handle))
}
