use crate::handlers::require_role;
use crate::models::*;
use crate::services::VoucherService;
use crate::utils::UserType;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    get,
    path = "/api/v1/vouchers",
    tag = "vouchers",
    params(PaginationParams),
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Member vouchers, newest first", body = Vec<VoucherResponse>),
        (status = 403, description = "Missing session or not a member")
    )
)]
pub async fn list_vouchers(
    req: HttpRequest,
    voucher_service: web::Data<VoucherService>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Member]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match voucher_service
        .list_member_vouchers(claims.uid, &query.into_inner())
        .await
    {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/vouchers",
    tag = "vouchers",
    request_body = IssueVoucherRequest,
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Voucher issued", body = VoucherResponse),
        (status = 403, description = "No active subscription for the partner"),
        (status = 404, description = "Establishment not found"),
        (status = 409, description = "Cooldown active", body = ApiError)
    )
)]
pub async fn issue_voucher(
    req: HttpRequest,
    voucher_service: web::Data<VoucherService>,
    body: web::Json<IssueVoucherRequest>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Member]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match voucher_service
        .issue_voucher(claims.uid, body.establishment_id)
        .await
    {
        Ok(voucher) => Ok(HttpResponse::Ok().json(ApiResponse::success(voucher))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/vouchers/cooldown",
    tag = "vouchers",
    params(CooldownQuery),
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Cooldown state", body = CooldownStatus),
        (status = 404, description = "Establishment not found")
    )
)]
pub async fn check_cooldown(
    req: HttpRequest,
    voucher_service: web::Data<VoucherService>,
    query: web::Query<CooldownQuery>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Member]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match voucher_service
        .check_cooldown(claims.uid, query.establishment_id)
        .await
    {
        Ok(status) => Ok(HttpResponse::Ok().json(ApiResponse::success(status))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/vouchers/redeem",
    tag = "vouchers",
    request_body = RedeemVoucherRequest,
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Voucher redeemed", body = VoucherResponse),
        (status = 403, description = "Not a business account"),
        (status = 404, description = "Unknown voucher for this business"),
        (status = 409, description = "Voucher already used"),
        (status = 410, description = "Voucher expired")
    )
)]
pub async fn redeem_voucher(
    req: HttpRequest,
    voucher_service: web::Data<VoucherService>,
    body: web::Json<RedeemVoucherRequest>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Business]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match voucher_service.redeem_voucher(claims.uid, &body.code).await {
        Ok(voucher) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            voucher,
            "Voucher redeemed",
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn voucher_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/vouchers")
            .route("", web::get().to(list_vouchers))
            .route("", web::post().to(issue_voucher))
            .route("/cooldown", web::get().to(check_cooldown))
            .route("/redeem", web::post().to(redeem_voucher)),
    );
}
