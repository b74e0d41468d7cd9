use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use super::AppState;
use crate::error::AppError;
use crate::metrics::HttpMetrics;

/// Header carrying the shared secret of internal callers
pub const SERVICE_TOKEN_HEADER: &str = "X-Service-Token";

/// Service token authentication middleware.
/// Validates X-Service-Token against `api.service_token`; when no token is
/// configured every request is refused.
pub async fn service_token_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = &state.settings.api.service_token else {
        tracing::warn!("Internal route called but no service token is configured");
        return Err(AppError::Auth("Internal routes are disabled".to_string()));
    };

    let provided = req
        .headers()
        .get(SERVICE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(token) if token == expected => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!("Invalid service token provided");
            Err(AppError::Auth("Invalid service token".to_string()))
        }
        None => {
            tracing::warn!("Missing service token header");
            Err(AppError::Auth("No service token provided".to_string()))
        }
    }
}

/// Count every request by method, matched route and status.
pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    HttpMetrics::record_request(&method, &route, response.status().as_u16());
    response
}
