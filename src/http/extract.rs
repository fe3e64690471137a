use async_trait::async_trait;
use axum::{
    extract::{FromRequest, FromRequestParts, Multipart, Path, Request},
    http::{header::ACCEPT_LANGUAGE, request::Parts},
    Json,
};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::errors::CookitError;

/// Caller identity from the `x-user-id` header
#[derive(Debug, Clone)]
pub struct UserId(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| UserId(id.to_string()))
            .ok_or(ApiError::MissingUser)
    }
}

/// Supported language negotiated from `Accept-Language`
#[derive(Debug, Clone)]
pub struct Language(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Language {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok());
        Ok(Language(state.localizer.resolve_language(header).to_string()))
    }
}

/// JSON body whose rejection is reported as a validation error
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state)
            .await
            .map_err(|rejection| CookitError::Validation(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// Path parameters whose rejection is reported as a validation error
#[derive(Debug, Clone)]
pub struct PathParam<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| CookitError::Validation(rejection.body_text()))?;
        Ok(PathParam(value))
    }
}

/// Multipart body; a request that is not `multipart/form-data` is a
/// validation error
pub struct MultipartBody(pub Multipart);

#[async_trait]
impl<S> FromRequest<S> for MultipartBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| CookitError::Validation(rejection.body_text()))?;
        Ok(MultipartBody(multipart))
    }
}
