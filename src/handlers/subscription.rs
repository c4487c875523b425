use crate::handlers::require_role;
use crate::models::*;
use crate::services::{ReconcilerService, SubscriptionService};
use crate::utils::UserType;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    get,
    path = "/api/v1/subscriptions",
    tag = "subscriptions",
    security(("session_token" = [])),
    responses(
        (status = 200, description = "One entry per partner", body = Vec<SubscriptionView>),
        (status = 403, description = "Missing session or not a member")
    )
)]
pub async fn list_subscriptions(
    req: HttpRequest,
    subscription_service: web::Data<SubscriptionService>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Member]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match subscription_service.member_view(claims.uid).await {
        Ok(view) => Ok(HttpResponse::Ok().json(ApiResponse::success(view))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/subscriptions/checkout",
    tag = "subscriptions",
    request_body = CreateCheckoutRequest,
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Checkout session created", body = CreateCheckoutResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Already subscribed to this partner"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
pub async fn create_checkout(
    req: HttpRequest,
    subscription_service: web::Data<SubscriptionService>,
    body: web::Json<CreateCheckoutRequest>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Member]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match subscription_service
        .create_checkout(&claims, body.into_inner())
        .await
    {
        Ok(checkout) => Ok(HttpResponse::Ok().json(ApiResponse::success(checkout))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/subscriptions/sync",
    tag = "subscriptions",
    request_body = SyncCheckoutRequest,
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Checkout reconciled", body = ReconcileOutcome),
        (status = 403, description = "Session belongs to another member"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
pub async fn sync_checkout(
    req: HttpRequest,
    reconciler: web::Data<ReconcilerService>,
    body: web::Json<SyncCheckoutRequest>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Member, UserType::Master]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match reconciler
        .sync_checkout_session(&claims, &body.session_id)
        .await
    {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/subscriptions/{id}/cancel",
    tag = "subscriptions",
    params(("id" = i64, Path, description = "Subscription id")),
    security(("session_token" = [])),
    responses(
        (status = 200, description = "Subscription canceled", body = SubscriptionResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Subscription not found")
    )
)]
pub async fn cancel_subscription(
    req: HttpRequest,
    subscription_service: web::Data<SubscriptionService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let claims = match require_role(&req, &[UserType::Member]) {
        Ok(c) => c,
        Err(e) => return Ok(e.error_response()),
    };

    match subscription_service
        .cancel_for_member(claims.uid, path.into_inner())
        .await
    {
        Ok(sub) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            sub,
            "Subscription canceled",
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn subscription_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/subscriptions")
            .route("", web::get().to(list_subscriptions))
            .route("/checkout", web::post().to(create_checkout))
            .route("/sync", web::post().to(sync_checkout))
            .route("/{id}/cancel", web::post().to(cancel_subscription)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::PaymentGateway;
    use crate::middlewares::{SESSION_HEADER, SessionMiddleware};
    use crate::test_support::*;
    use crate::utils::SessionTokenService;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use chrono::Duration;
    use serde_json::{Value, json};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_member_checkout_and_view() {
        let db = setup_db().await;
        let fake = FakeGateway::new();
        let gateway: Arc<dyn PaymentGateway> = Arc::new(fake.clone());
        let subs = SubscriptionService::new(db.clone(), gateway.clone(), "http://localhost:3000");
        let reconciler = ReconcilerService::new(db.clone(), gateway, subs.clone());
        insert_legacy_entitlement(&db, 1, 11, "active", None).await;

        let tokens = SessionTokenService::new("test-secret");
        let member = tokens
            .issue(1, UserType::Member, "m@example.com", Duration::hours(1))
            .unwrap();
        let business = tokens
            .issue(500, UserType::Business, "b@example.com", Duration::hours(1))
            .unwrap();

        let app = test::init_service(
            App::new()
                .wrap(SessionMiddleware::new(tokens))
                .app_data(web::Data::new(subs))
                .app_data(web::Data::new(reconciler))
                .service(web::scope("/api/v1").configure(subscription_config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/subscriptions/checkout")
            .insert_header((SESSION_HEADER, member.clone()))
            .set_json(json!({ "partner_id": 10, "price_id": "price_1" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert!(body["data"]["checkout_url"].as_str().unwrap().starts_with("https://checkout.example/"));
        assert_eq!(fake.checkouts().len(), 1);

        let req = test::TestRequest::get()
            .uri("/api/v1/subscriptions")
            .insert_header((SESSION_HEADER, business))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/v1/subscriptions")
            .insert_header((SESSION_HEADER, member))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let view = body["data"].as_array().unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0]["partner_id"], 11);
        assert_eq!(view[0]["source"], "legacy");
    }
}
