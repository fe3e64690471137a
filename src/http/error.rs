use axum::{
    extract::{Request, State},
    http::{header::ACCEPT_LANGUAGE, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

use super::state::AppState;
use crate::errors::CookitError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing x-user-id header")]
    MissingUser,

    #[error(transparent)]
    Service(#[from] CookitError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingUser => StatusCode::UNAUTHORIZED,
            ApiError::Service(err) => match err {
                CookitError::Validation(_) => StatusCode::BAD_REQUEST,
                CookitError::NotFound(_) => StatusCode::NOT_FOUND,
                CookitError::ExternalService(_) => StatusCode::BAD_GATEWAY,
                CookitError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                CookitError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                CookitError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn message_key(&self) -> &'static str {
        match self {
            ApiError::MissingUser => "error-missing-user",
            ApiError::Service(err) => err.message_key(),
        }
    }
}

/// Error summary carried from a handler to [`localize_errors`]
#[derive(Debug, Clone)]
pub struct Failure {
    pub message_key: &'static str,
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {self}");
        } else {
            warn!(status = status.as_u16(), "Request rejected: {self}");
        }

        let failure = Failure {
            message_key: self.message_key(),
            detail: self.to_string(),
        };
        let mut response = (status, Json(json!({ "error": failure.message_key }))).into_response();
        response.extensions_mut().insert(failure);
        response
    }
}

/// Replace error bodies with a message in the client's language
///
/// Internal details are only exposed in development mode.
pub async fn localize_errors(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let accept_language = request
        .headers()
        .get(ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(request).await;
    let Some(failure) = response.extensions_mut().remove::<Failure>() else {
        return response;
    };

    let lang = state.localizer.resolve_language(accept_language.as_deref());
    let mut body = json!({
        "success": false,
        "error": state.localizer.message(lang, failure.message_key),
    });
    if state.development {
        body["detail"] = json!(failure.detail);
    }

    (response.status(), Json(body)).into_response()
}
