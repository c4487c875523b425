use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Metadata keys the checkout flow writes and the reconciler reads back.
pub const META_USER_ID: &str = "userId";
pub const META_PARTNER_ID: &str = "partnerId";
pub const META_PARTNER_LINK_ID: &str = "partnerLinkId";

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: String,
    pub customer_id: String,
    pub metadata: HashMap<String, String>,
    pub current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCustomer {
    pub id: String,
    pub email: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCheckoutSession {
    pub id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionCheckout {
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Copied onto the provider subscription.
    pub subscription_metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutLink {
    pub session_id: String,
    pub url: String,
}

/// Outbound calls to the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn retrieve_subscription(&self, subscription_id: &str)
    -> AppResult<ProviderSubscription>;

    async fn retrieve_customer(&self, customer_id: &str) -> AppResult<ProviderCustomer>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> AppResult<ProviderCheckoutSession>;

    /// Customer tagged with `userId = user_id`, created on first use.
    async fn find_or_create_customer(&self, user_id: i64, email: &str)
    -> AppResult<ProviderCustomer>;

    async fn create_subscription_checkout(
        &self,
        checkout: SubscriptionCheckout,
    ) -> AppResult<CheckoutLink>;

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<()>;
}
