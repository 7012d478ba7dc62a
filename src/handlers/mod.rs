use axum::extract::FromRequest;

use crate::errors::AppError;

pub(crate) mod auth;
pub(crate) mod auth_otp;

/// JSON body extractor whose rejections use the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
