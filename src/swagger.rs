use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{CouponStatus, EffectiveVoucherStatus, SubscriptionStatus};
use crate::handlers;
use crate::middlewares::SESSION_HEADER;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(SESSION_HEADER))),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::webhook::stripe_webhook,
        handlers::subscription::list_subscriptions,
        handlers::subscription::create_checkout,
        handlers::subscription::sync_checkout,
        handlers::subscription::cancel_subscription,
        handlers::voucher::list_vouchers,
        handlers::voucher::issue_voucher,
        handlers::voucher::check_cooldown,
        handlers::voucher::redeem_voucher,
        handlers::coupon::validate_coupon,
        handlers::coupon::redeem_coupon,
        handlers::rating::create_rating,
        handlers::admin::create_subscription,
        handlers::admin::deactivate_subscription,
    ),
    components(
        schemas(
            ApiError,
            SubscriptionStatus,
            SubscriptionSource,
            SubscriptionView,
            SubscriptionResponse,
            CreateCheckoutRequest,
            CreateCheckoutResponse,
            SyncCheckoutRequest,
            AdminCreateSubscriptionRequest,
            ReconcileAction,
            ReconcileOutcome,
            IssueVoucherRequest,
            RedeemVoucherRequest,
            CooldownStatus,
            EffectiveVoucherStatus,
            VoucherResponse,
            CouponStatus,
            CouponRejection,
            CouponRequest,
            CouponResponse,
            CreateRatingRequest,
            RatingResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "webhook", description = "Payment provider callbacks"),
        (name = "subscriptions", description = "Member subscriptions to partners"),
        (name = "vouchers", description = "Voucher issuance and redemption"),
        (name = "coupons", description = "Coupon validation and redemption"),
        (name = "ratings", description = "Establishment ratings"),
        (name = "admin", description = "Manual subscription management"),
    ),
    info(
        title = "NTC Backend API",
        version = "1.0.0",
        description = "NTC partner subscriptions, vouchers and coupons"
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
