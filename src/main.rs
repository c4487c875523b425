use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use ntc_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{PaymentGateway, StripeGateway, WebhookVerifier},
    handlers,
    middlewares::{SessionMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    tasks,
    utils::SessionTokenService,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    let config =
        Config::from_toml().map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    let pool = create_pool(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to the database: {e}"))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("failed to run database migrations: {e}"))?;

    if config.stripe.webhook_secret.is_empty() {
        log::warn!("STRIPE_WEBHOOK_SECRET is empty; every webhook delivery will be rejected");
    }

    let session_tokens = SessionTokenService::new(&config.jwt.secret);
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(&config.stripe));
    let webhook_verifier = WebhookVerifier::new(
        config.stripe.webhook_secret.clone(),
        config.stripe.webhook_tolerance_secs,
    );

    let subscription_service =
        SubscriptionService::new(pool.clone(), gateway.clone(), config.app.base_url.clone());
    let reconciler_service =
        ReconcilerService::new(pool.clone(), gateway.clone(), subscription_service.clone());
    let voucher_service =
        VoucherService::new(pool.clone(), subscription_service.clone(), &config.vouchers);
    let coupon_service = CouponService::new(pool.clone());
    let rating_service = RatingService::new(pool.clone());

    tasks::spawn_all(voucher_service.clone());

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(SessionMiddleware::new(session_tokens.clone()))
            .wrap(create_cors())
            .wrap(Logger::default())
            .app_data(web::Data::new(webhook_verifier.clone()))
            .app_data(web::Data::new(subscription_service.clone()))
            .app_data(web::Data::new(reconciler_service.clone()))
            .app_data(web::Data::new(voucher_service.clone()))
            .app_data(web::Data::new(coupon_service.clone()))
            .app_data(web::Data::new(rating_service.clone()))
            .configure(swagger_config)
            .configure(handlers::webhook_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::subscription_config)
                    .configure(handlers::voucher_config)
                    .configure(handlers::coupon_config)
                    .configure(handlers::rating_config)
                    .configure(handlers::admin_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
