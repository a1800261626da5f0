use crate::error::ApiError;
use axum::extract::{FromRequest, FromRequestParts};

/// `axum::Json`, but a bad body becomes a 400 `{"error": ..}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` with the same rejection shape as [`ApiJson`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
