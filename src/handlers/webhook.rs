use crate::external::{WebhookEvent, WebhookVerifier};
use crate::services::ReconcilerService;
use actix_web::{HttpRequest, HttpResponse, Result, web};
use chrono::Utc;
use log::{error, info, warn};
use serde_json::json;

/// Stripe webhook endpoint.
///
/// Signature or payload problems answer 400. Processing failures answer 500 so
/// the provider redelivers; every handler is idempotent.
#[utoipa::path(
    post,
    path = "/webhook/stripe",
    tag = "webhook",
    request_body(content = String, description = "Raw Stripe event payload"),
    params(
        ("Stripe-Signature" = String, Header, description = "t=<unix>,v1=<hex>")
    ),
    responses(
        (status = 200, description = "Event processed or ignored"),
        (status = 400, description = "Missing or invalid signature"),
        (status = 500, description = "Processing failed; the provider will retry")
    )
)]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    verifier: web::Data<WebhookVerifier>,
    reconciler: web::Data<ReconcilerService>,
) -> Result<HttpResponse> {
    let Some(signature) = req
        .headers()
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        warn!("Missing Stripe-Signature header");
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Missing Stripe-Signature header"
        })));
    };

    if let Err(e) = verifier.verify(&body, signature, Utc::now().timestamp()) {
        error!("Webhook signature verification failed: {e}");
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Invalid signature"
        })));
    }

    let event = match WebhookEvent::parse(&body) {
        Ok(event) => event,
        Err(e) => {
            error!("{e}");
            return Ok(HttpResponse::BadRequest().json(json!({
                "error": "Malformed event payload"
            })));
        }
    };

    info!(
        "Received Stripe webhook event: {} ({})",
        event.event_type, event.id
    );

    match reconciler.dispatch(&event).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({ "received": true }))),
        Err(e) => {
            error!("Failed to process webhook event {}: {e}", event.id);
            Ok(HttpResponse::InternalServerError().json(json!({
                "received": false,
                "error": "Processing failed"
            })))
        }
    }
}

pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhook").route("/stripe", web::post().to(stripe_webhook)));
}
