use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::{backend::BackendError, cart::CartError, checkout::CheckoutError};

/// Envelope every endpoint answers with.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct StdResponse<T, M> {
    pub data: Option<T>,
    pub message: Option<M>,
}

impl<T: Serialize, M: Serialize> IntoResponse for StdResponse<T, M> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Other(err) => {
                error!("Request failed: {:#}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            AppError::Other(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = StdResponse::<(), String> {
            data: None,
            message: Some(message),
        };

        (status, body).into_response()
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound => AppError::NotFound,
            BackendError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            BackendError::MissingReference(detail) => {
                warn!("Write refers to a deleted record: {}", detail);
                AppError::Conflict("A referenced record no longer exists".into())
            }
            other => AppError::Other(other.into()),
        }
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::InvalidSession(_) => AppError::BadRequest(err.to_string()),
            CartError::Poisoned => AppError::Other(err.into()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Backend(BackendError::MissingReference(detail)) => {
                warn!("Checkout refers to a deleted menu item: {}", detail);
                AppError::Conflict("An item in the cart is no longer on the menu".into())
            }
            CheckoutError::Backend(err) => err.into(),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}
