use crate::entities::{SubscriptionStatus, member_partner_entity as mp, subscription_entity as sub};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which physical table a [`SubscriptionView`] row was read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionSource {
    Subscriptions,
    Legacy,
}

/// One entitlement row as seen by readers, regardless of the backing table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SubscriptionView {
    pub id: i64,
    pub source: SubscriptionSource,
    pub member_id: i64,
    pub partner_id: i64,
    pub status: SubscriptionStatus,
    pub external_subscription_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionView {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

impl From<sub::Model> for SubscriptionView {
    fn from(m: sub::Model) -> Self {
        Self {
            id: m.id,
            source: SubscriptionSource::Subscriptions,
            member_id: m.member_id,
            partner_id: m.partner_id,
            status: m.status,
            external_subscription_id: m.external_subscription_id,
            expires_at: m.expires_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<mp::Model> for SubscriptionView {
    fn from(m: mp::Model) -> Self {
        Self {
            id: m.id,
            source: SubscriptionSource::Legacy,
            member_id: m.member_id,
            partner_id: m.partner_id,
            status: SubscriptionStatus::from_legacy(&m.status),
            external_subscription_id: None,
            expires_at: m.expires_at,
            updated_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionResponse {
    pub id: i64,
    pub member_id: i64,
    pub partner_id: i64,
    pub status: SubscriptionStatus,
    pub external_subscription_id: Option<String>,
    pub partner_link_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<sub::Model> for SubscriptionResponse {
    fn from(m: sub::Model) -> Self {
        Self {
            id: m.id,
            member_id: m.member_id,
            partner_id: m.partner_id,
            status: m.status,
            external_subscription_id: m.external_subscription_id,
            partner_link_id: m.partner_link_id,
            expires_at: m.expires_at,
            canceled_at: m.canceled_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateCheckoutRequest {
    pub partner_id: i64,
    #[schema(example = "price_1Q2w3E")]
    pub price_id: String,
    pub partner_link_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateCheckoutResponse {
    pub session_id: String,
    pub checkout_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncCheckoutRequest {
    #[schema(example = "cs_test_a1b2c3")]
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminCreateSubscriptionRequest {
    pub member_id: i64,
    pub partner_id: i64,
}

/// What a reconciliation did to the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// A new active subscription was inserted.
    Created,
    /// An existing active subscription for the pair took over the provider id.
    Attached,
    /// The provider subscription was already recorded, or the pair's active row
    /// is linked to another provider subscription; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ReconcileOutcome {
    pub action: ReconcileAction,
    pub subscription_id: i64,
}
