use crate::handlers::require_role;
use crate::models::*;
use crate::services::SubscriptionService;
use crate::utils::UserType;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    post,
    path = "/api/v1/admin/subscriptions",
    tag = "admin",
    request_body = AdminCreateSubscriptionRequest,
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Active subscription for the pair", body = SubscriptionResponse),
        (status = 403, description = "Not a master account")
    )
)]
pub async fn create_subscription(
    req: HttpRequest,
    subscription_service: web::Data<SubscriptionService>,
    body: web::Json<AdminCreateSubscriptionRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_role(&req, &[UserType::Master]) {
        return Ok(e.error_response());
    }

    match subscription_service
        .admin_create(body.member_id, body.partner_id)
        .await
    {
        Ok(sub) => Ok(HttpResponse::Ok().json(ApiResponse::success(sub))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/subscriptions/{id}/deactivate",
    tag = "admin",
    params(("id" = i64, Path, description = "Subscription id")),
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Subscription deactivated", body = SubscriptionResponse),
        (status = 403, description = "Not a master account"),
        (status = 404, description = "Subscription not found")
    )
)]
pub async fn deactivate_subscription(
    req: HttpRequest,
    subscription_service: web::Data<SubscriptionService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_role(&req, &[UserType::Master]) {
        return Ok(e.error_response());
    }

    match subscription_service
        .admin_deactivate(path.into_inner())
        .await
    {
        Ok(sub) => Ok(HttpResponse::Ok().json(ApiResponse::success(sub))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/subscriptions", web::post().to(create_subscription))
            .route(
                "/subscriptions/{id}/deactivate",
                web::post().to(deactivate_subscription),
            ),
    );
}
