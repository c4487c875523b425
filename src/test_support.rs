//! Shared fixtures for service and handler tests: an in-memory SQLite store
//! with the real schema, and an in-memory payment gateway.

use crate::entities::{
    CouponStatus, coupon_entity as coupon, establishment_entity as est,
    member_partner_entity as mp, partner_link_entity as link,
};
use crate::error::{AppError, AppResult};
use crate::external::*;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub async fn setup_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    // a single connection keeps the in-memory database alive and shared
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("open sqlite");
    Migrator::up(&db, None).await.expect("run migrations");
    db
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub async fn insert_establishment(
    db: &DatabaseConnection,
    partner_id: i64,
    business_id: i64,
    cooldown_hours: i32,
) -> est::Model {
    let now = Utc::now();
    est::ActiveModel {
        partner_id: Set(partner_id),
        business_id: Set(business_id),
        name: Set(format!("Establishment of partner {partner_id}")),
        voucher_cooldown: Set(cooldown_hours),
        average_rating: Set(0.0),
        total_ratings: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert establishment")
}

pub async fn insert_partner_link(db: &DatabaseConnection, partner_id: i64, code: &str) -> link::Model {
    let now = Utc::now();
    link::ActiveModel {
        partner_id: Set(partner_id),
        code: Set(code.to_string()),
        conversions: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert partner link")
}

pub async fn insert_legacy_entitlement(
    db: &DatabaseConnection,
    member_id: i64,
    partner_id: i64,
    status: &str,
    expires_at: Option<DateTime<Utc>>,
) -> mp::Model {
    mp::ActiveModel {
        member_id: Set(member_id),
        partner_id: Set(partner_id),
        status: Set(status.to_string()),
        expires_at: Set(expires_at),
        created_at: Set(Utc::now() - Duration::days(90)),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert legacy entitlement")
}

pub struct CouponFixture {
    pub code: &'static str,
    pub establishment_id: i64,
    pub status: CouponStatus,
    pub valid_until: DateTime<Utc>,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
}

pub async fn insert_coupon(db: &DatabaseConnection, f: CouponFixture) -> coupon::Model {
    let now = Utc::now();
    coupon::ActiveModel {
        code: Set(f.code.to_string()),
        discount: Set(10),
        establishment_id: Set(f.establishment_id),
        valid_until: Set(f.valid_until),
        status: Set(f.status),
        max_uses: Set(f.max_uses),
        current_uses: Set(f.current_uses),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert coupon")
}

#[derive(Default)]
struct FakeState {
    subscriptions: HashMap<String, ProviderSubscription>,
    customers: HashMap<String, ProviderCustomer>,
    sessions: HashMap<String, ProviderCheckoutSession>,
    checkouts: Vec<SubscriptionCheckout>,
    canceled: Vec<String>,
}

/// In-memory provider. Unknown ids fail like an unreachable upstream.
#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<FakeState>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, customer_id: &str, user_id: i64) {
        let mut state = self.state.lock().unwrap();
        state.customers.insert(
            customer_id.to_string(),
            ProviderCustomer {
                id: customer_id.to_string(),
                email: Some(format!("member{user_id}@example.com")),
                metadata: HashMap::from([(META_USER_ID.to_string(), user_id.to_string())]),
            },
        );
    }

    pub fn add_subscription(
        &self,
        subscription_id: &str,
        customer_id: &str,
        partner_id: i64,
        partner_link_id: Option<i64>,
    ) {
        let mut metadata = HashMap::from([(META_PARTNER_ID.to_string(), partner_id.to_string())]);
        if let Some(link_id) = partner_link_id {
            metadata.insert(META_PARTNER_LINK_ID.to_string(), link_id.to_string());
        }
        let mut state = self.state.lock().unwrap();
        state.subscriptions.insert(
            subscription_id.to_string(),
            ProviderSubscription {
                id: subscription_id.to_string(),
                status: "active".to_string(),
                customer_id: customer_id.to_string(),
                metadata,
                current_period_end: Some(Utc::now() + Duration::days(30)),
            },
        );
    }

    pub fn add_session(&self, session_id: &str, customer_id: &str, subscription_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.sessions.insert(
            session_id.to_string(),
            ProviderCheckoutSession {
                id: session_id.to_string(),
                customer_id: Some(customer_id.to_string()),
                subscription_id: Some(subscription_id.to_string()),
            },
        );
    }

    pub fn checkouts(&self) -> Vec<SubscriptionCheckout> {
        self.state.lock().unwrap().checkouts.clone()
    }

    pub fn canceled(&self) -> Vec<String> {
        self.state.lock().unwrap().canceled.clone()
    }

    fn missing(kind: &str, id: &str) -> AppError {
        AppError::ExternalApiError(format!("No such {kind}: {id}"))
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<ProviderSubscription> {
        let state = self.state.lock().unwrap();
        state
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| Self::missing("subscription", subscription_id))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> AppResult<ProviderCustomer> {
        let state = self.state.lock().unwrap();
        state
            .customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| Self::missing("customer", customer_id))
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> AppResult<ProviderCheckoutSession> {
        let state = self.state.lock().unwrap();
        state
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| Self::missing("checkout session", session_id))
    }

    async fn find_or_create_customer(
        &self,
        user_id: i64,
        email: &str,
    ) -> AppResult<ProviderCustomer> {
        let mut state = self.state.lock().unwrap();
        let uid = user_id.to_string();
        if let Some(c) = state
            .customers
            .values()
            .find(|c| c.metadata.get(META_USER_ID) == Some(&uid))
        {
            return Ok(c.clone());
        }
        let customer = ProviderCustomer {
            id: format!("cus_fake{user_id}"),
            email: Some(email.to_string()),
            metadata: HashMap::from([(META_USER_ID.to_string(), uid)]),
        };
        state.customers.insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn create_subscription_checkout(
        &self,
        checkout: SubscriptionCheckout,
    ) -> AppResult<CheckoutLink> {
        let mut state = self.state.lock().unwrap();
        let session_id = format!("cs_fake{}", state.checkouts.len() + 1);
        state.checkouts.push(checkout);
        Ok(CheckoutLink {
            url: format!("https://checkout.example/{session_id}"),
            session_id,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        let sub = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| Self::missing("subscription", subscription_id))?;
        sub.status = "canceled".to_string();
        state.canceled.push(subscription_id.to_string());
        Ok(())
    }
}
