use crate::handlers::require_role;
use crate::models::*;
use crate::services::CouponService;
use crate::utils::UserType;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    tag = "coupons",
    request_body = CouponRequest,
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Coupon can be used", body = CouponResponse),
        (status = 400, description = "INACTIVE, EXPIRED, LIMIT_REACHED, ALREADY_USED or INVALID_ESTABLISHMENT", body = ApiError),
        (status = 404, description = "Coupon not found", body = ApiError)
    )
)]
pub async fn validate_coupon(
    req: HttpRequest,
    coupon_service: web::Data<CouponService>,
    body: web::Json<CouponRequest>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Member]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match coupon_service
        .validate_coupon(&body.code, claims.uid, body.establishment_id)
        .await
    {
        Ok(coupon) => Ok(HttpResponse::Ok().json(ApiResponse::success(coupon))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/coupons/redeem",
    tag = "coupons",
    request_body = CouponRequest,
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Coupon redeemed", body = CouponResponse),
        (status = 400, description = "Coupon rejected", body = ApiError),
        (status = 404, description = "Coupon not found", body = ApiError)
    )
)]
pub async fn redeem_coupon(
    req: HttpRequest,
    coupon_service: web::Data<CouponService>,
    body: web::Json<CouponRequest>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Member]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match coupon_service
        .redeem_coupon(&body.code, claims.uid, body.establishment_id)
        .await
    {
        Ok(coupon) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            coupon,
            "Coupon redeemed",
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn coupon_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/coupons")
            .route("/validate", web::post().to(validate_coupon))
            .route("/redeem", web::post().to(redeem_coupon)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CouponStatus;
    use crate::middlewares::{SESSION_HEADER, SessionMiddleware};
    use crate::test_support::*;
    use crate::utils::SessionTokenService;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};

    #[actix_web::test]
    async fn test_rejection_codes_reach_the_client() {
        let db = setup_db().await;
        let establishment = insert_establishment(&db, 10, 500, 24).await;
        insert_coupon(
            &db,
            CouponFixture {
                code: "FULL",
                establishment_id: establishment.id,
                status: CouponStatus::Active,
                valid_until: Utc::now() + Duration::days(1),
                max_uses: Some(1),
                current_uses: 1,
            },
        )
        .await;

        let tokens = SessionTokenService::new("test-secret");
        let member = tokens
            .issue(1, UserType::Member, "m@example.com", Duration::hours(1))
            .unwrap();
        let app = test::init_service(
            App::new()
                .wrap(SessionMiddleware::new(tokens))
                .app_data(web::Data::new(CouponService::new(db.clone())))
                .service(web::scope("/api/v1").configure(coupon_config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/coupons/validate")
            .insert_header((SESSION_HEADER, member.clone()))
            .set_json(json!({ "code": "FULL", "establishment_id": establishment.id }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "LIMIT_REACHED");

        let req = test::TestRequest::post()
            .uri("/api/v1/coupons/redeem")
            .insert_header((SESSION_HEADER, member))
            .set_json(json!({ "code": "MISSING", "establishment_id": establishment.id }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
