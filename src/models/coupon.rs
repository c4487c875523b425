use crate::entities::{CouponStatus, coupon_entity as coupon};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Why a coupon cannot be used. The codes are part of the client contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    Expired,
    LimitReached,
    AlreadyUsed,
    InvalidEstablishment,
}

impl CouponRejection {
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::NotFound => "NOT_FOUND",
            CouponRejection::Inactive => "INACTIVE",
            CouponRejection::Expired => "EXPIRED",
            CouponRejection::LimitReached => "LIMIT_REACHED",
            CouponRejection::AlreadyUsed => "ALREADY_USED",
            CouponRejection::InvalidEstablishment => "INVALID_ESTABLISHMENT",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            CouponRejection::NotFound => "Coupon not found",
            CouponRejection::Inactive => "This coupon is no longer active",
            CouponRejection::Expired => "This coupon has expired",
            CouponRejection::LimitReached => "This coupon has reached its usage limit",
            CouponRejection::AlreadyUsed => "You have already used this coupon",
            CouponRejection::InvalidEstablishment => "Invalid establishment",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CouponRequest {
    #[schema(example = "SUMMER10")]
    pub code: String,
    pub establishment_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CouponResponse {
    pub id: i64,
    pub code: String,
    pub discount: i32,
    pub establishment_id: i64,
    pub valid_until: DateTime<Utc>,
    pub status: CouponStatus,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
}

impl From<coupon::Model> for CouponResponse {
    fn from(m: coupon::Model) -> Self {
        Self {
            id: m.id,
            code: m.code,
            discount: m.discount,
            establishment_id: m.establishment_id,
            valid_until: m.valid_until,
            status: m.status,
            max_uses: m.max_uses,
            current_uses: m.current_uses,
        }
    }
}
