//! HTTP surface of the relay
//!
//! - `GET /health` runs a probe cycle (200 healthy/degraded, 503 unhealthy)
//! - `HEAD /health` answers from the current tracker state without probing
//! - `GET /status` reports lifecycle, provider, agent and routing state
//! - `POST /chat` routes one request to an agent

use crate::agent::AgentRequest;
use crate::error::{RelayError, RelayResult};
use crate::health::status::HealthStatus;
use crate::system::RelaySystem;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Largest accepted chat request body
const MAX_BODY_BYTES: u64 = 256 * 1024;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    timestamp: String,
}

fn error_reply(code: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorResponse {
        error: message.into(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    warp::reply::with_status(warp::reply::json(&body), code).into_response()
}

fn status_code_for(status: HealthStatus) -> StatusCode {
    if status.is_usable() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn with_system(
    system: Arc<RelaySystem>,
) -> impl Filter<Extract = (Arc<RelaySystem>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&system))
}

/// All routes, with rejections rendered as JSON errors
pub fn routes(
    system: Arc<RelaySystem>,
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_system(Arc::clone(&system)))
        .and_then(health_handler);

    let liveness = warp::path("health")
        .and(warp::path::end())
        .and(warp::head())
        .and(with_system(Arc::clone(&system)))
        .and_then(liveness_handler);

    let status = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_system(Arc::clone(&system)))
        .and_then(status_handler);

    let chat = warp::path("chat")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_system(system))
        .and_then(chat_handler);

    health
        .or(liveness)
        .unify()
        .or(status)
        .unify()
        .or(chat)
        .unify()
        .recover(handle_rejection)
        .unify()
}

async fn health_handler(system: Arc<RelaySystem>) -> Result<Response, Rejection> {
    let report = system.health_report().await;
    let code = status_code_for(report.status);
    Ok(warp::reply::with_status(warp::reply::json(&report), code).into_response())
}

async fn liveness_handler(system: Arc<RelaySystem>) -> Result<Response, Rejection> {
    Ok(warp::reply::with_status(warp::reply(), status_code_for(system.liveness())).into_response())
}

async fn status_handler(system: Arc<RelaySystem>) -> Result<Response, Rejection> {
    Ok(warp::reply::json(&system.status_report()).into_response())
}

async fn chat_handler(
    request: AgentRequest,
    system: Arc<RelaySystem>,
) -> Result<Response, Rejection> {
    match system.handle(request).await {
        Ok(response) => Ok(warp::reply::json(&response).into_response()),
        Err(e @ RelayError::InvalidInput { .. }) => {
            Ok(error_reply(StatusCode::BAD_REQUEST, e.user_message()))
        }
        Err(e) => {
            error!(error = %e, "Chat request failed");
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.user_message(),
            ))
        }
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (code, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("invalid request body: {e}"))
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string())
    } else if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected application/json".to_string(),
        )
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        error!(rejection = ?rejection, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    };
    Ok(error_reply(code, message))
}

/// Serves the relay routes on a TCP port
pub struct RelayServer {
    system: Arc<RelaySystem>,
    port: u16,
}

impl RelayServer {
    pub fn new(system: Arc<RelaySystem>, port: u16) -> Self {
        Self { system, port }
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until<S>(self, shutdown: S) -> RelayResult<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let (bound, server) = warp::serve(routes(self.system))
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| RelayError::setup_failure(format!("failed to bind {addr}: {e}")))?;

        info!(addr = %bound, "HTTP server listening");
        server.await;
        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code_for(HealthStatus::Healthy), StatusCode::OK);
        assert_eq!(status_code_for(HealthStatus::Degraded), StatusCode::OK);
        assert_eq!(
            status_code_for(HealthStatus::Unhealthy),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
