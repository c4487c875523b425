use crate::handlers::require_role;
use crate::models::*;
use crate::services::RatingService;
use crate::utils::UserType;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    post,
    path = "/api/v1/ratings",
    tag = "ratings",
    request_body = CreateRatingRequest,
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Rating stored, aggregates updated", body = RatingResponse),
        (status = 400, description = "Score out of range or voucher not redeemed"),
        (status = 403, description = "Voucher belongs to another member"),
        (status = 404, description = "Voucher not found"),
        (status = 409, description = "Voucher already rated")
    )
)]
pub async fn create_rating(
    req: HttpRequest,
    rating_service: web::Data<RatingService>,
    body: web::Json<CreateRatingRequest>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Member]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match rating_service
        .rate_establishment(claims.uid, body.into_inner())
        .await
    {
        Ok(rating) => Ok(HttpResponse::Ok().json(ApiResponse::success(rating))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn rating_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/ratings").route("", web::post().to(create_rating)));
}
