pub mod admin;
pub mod coupon;
pub mod rating;
pub mod subscription;
pub mod voucher;
pub mod webhook;

pub use admin::admin_config;
pub use coupon::coupon_config;
pub use rating::rating_config;
pub use subscription::subscription_config;
pub use voucher::voucher_config;
pub use webhook::webhook_config;

use crate::error::AppResult;
use crate::middlewares::session_claims;
use crate::utils::{SessionClaims, UserType};
use actix_web::HttpRequest;

/// Session of the caller, rejected unless its user type is in `allowed`.
pub(crate) fn require_role(req: &HttpRequest, allowed: &[UserType]) -> AppResult<SessionClaims> {
    let claims = session_claims(req)?;
    claims.require(allowed)?;
    Ok(claims)
}
