use crate::models::CouponRejection;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Voucher cooldown active until {next_available_at}")]
    CooldownActive { next_available_at: DateTime<Utc> },

    #[error("Coupon rejected: {}", .0.code())]
    Coupon(CouponRejection),

    #[error("Expired: {0}")]
    Expired(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Stripe error: {0}")]
    StripeError(#[from] stripe::StripeError),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    /// Machine-readable code clients branch on.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::Unauthenticated(_) | AppError::JwtError(_) => "UNAUTHENTICATED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            AppError::Coupon(rejection) => rejection.code(),
            AppError::Expired(_) => "EXPIRED",
            AppError::ExternalApiError(_) | AppError::StripeError(_) => "UPSTREAM_FAILURE",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) | AppError::JwtError(_) => StatusCode::FORBIDDEN,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::CooldownActive { .. } => StatusCode::CONFLICT,
            AppError::Coupon(CouponRejection::NotFound) => StatusCode::NOT_FOUND,
            AppError::Coupon(_) => StatusCode::BAD_REQUEST,
            AppError::Expired(_) => StatusCode::GONE,
            AppError::ExternalApiError(_) | AppError::StripeError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                msg.clone()
            }
            AppError::Unauthenticated(msg) => {
                log::warn!("Unauthenticated request: {msg}");
                msg.clone()
            }
            AppError::JwtError(err) => {
                log::warn!("Invalid session token: {err}");
                "Invalid session token".to_string()
            }
            AppError::Forbidden => {
                log::warn!("Forbidden access");
                "Forbidden".to_string()
            }
            AppError::NotFound(msg) | AppError::Conflict(msg) | AppError::Expired(msg) => {
                msg.clone()
            }
            AppError::CooldownActive { next_available_at } => {
                format!("You can request a new voucher after {}", next_available_at.to_rfc3339())
            }
            AppError::Coupon(rejection) => rejection.message().to_string(),
            AppError::ExternalApiError(msg) => {
                log::error!("External API error: {msg}");
                "Payment provider request failed".to_string()
            }
            AppError::StripeError(err) => {
                log::error!("Stripe error: {err}");
                "Payment provider request failed".to_string()
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                "Database error".to_string()
            }
            _ => {
                log::error!("Internal error: {self}");
                "Internal server error".to_string()
            }
        };

        let mut error = json!({
            "code": self.code(),
            "message": message,
        });
        if let AppError::CooldownActive { next_available_at } = self {
            error["next_available_at"] = json!(next_available_at);
        }

        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": error
        }))
    }
}
