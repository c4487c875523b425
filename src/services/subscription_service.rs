use crate::entities::{
    SubscriptionStatus, member_partner_entity as mp, partner_link_entity as link,
    subscription_entity as sub,
};
use crate::error::{AppError, AppResult};
use crate::external::{
    META_PARTNER_ID, META_PARTNER_LINK_ID, PaymentGateway, SubscriptionCheckout,
};
use crate::models::*;
use crate::utils::SessionClaims;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Owner of member entitlements. `subscriptions` is the only table written;
/// `member_partners` is merged in on read.
#[derive(Clone)]
pub struct SubscriptionService {
    pool: DatabaseConnection,
    gateway: Arc<dyn PaymentGateway>,
    app_base_url: String,
}

impl SubscriptionService {
    pub fn new(
        pool: DatabaseConnection,
        gateway: Arc<dyn PaymentGateway>,
        app_base_url: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            gateway,
            app_base_url: app_base_url.into(),
        }
    }

    pub async fn find_active<C: ConnectionTrait>(
        db: &C,
        member_id: i64,
        partner_id: i64,
    ) -> AppResult<Option<sub::Model>> {
        Ok(sub::Entity::find()
            .filter(sub::Column::MemberId.eq(member_id))
            .filter(sub::Column::PartnerId.eq(partner_id))
            .filter(sub::Column::Status.eq(SubscriptionStatus::Active))
            .one(db)
            .await?)
    }

    pub async fn find_by_external_id<C: ConnectionTrait>(
        db: &C,
        external_subscription_id: &str,
    ) -> AppResult<Option<sub::Model>> {
        Ok(sub::Entity::find()
            .filter(sub::Column::ExternalSubscriptionId.eq(external_subscription_id))
            .one(db)
            .await?)
    }

    /// Every entitlement row for the pair, from both tables.
    pub async fn list_for_member_partner(
        &self,
        member_id: i64,
        partner_id: i64,
    ) -> AppResult<Vec<SubscriptionView>> {
        let current = sub::Entity::find()
            .filter(sub::Column::MemberId.eq(member_id))
            .filter(sub::Column::PartnerId.eq(partner_id))
            .all(&self.pool)
            .await?;
        let legacy = mp::Entity::find()
            .filter(mp::Column::MemberId.eq(member_id))
            .filter(mp::Column::PartnerId.eq(partner_id))
            .all(&self.pool)
            .await?;

        Ok(current
            .into_iter()
            .map(SubscriptionView::from)
            .chain(legacy.into_iter().map(SubscriptionView::from))
            .collect())
    }

    /// True when any record for the pair, from either table, is active or
    /// has an `expires_at` still ahead of `now`.
    pub async fn has_entitlement(
        &self,
        member_id: i64,
        partner_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let rows = self.list_for_member_partner(member_id, partner_id).await?;
        Ok(rows
            .iter()
            .any(|row| row.is_active() || row.expires_at.is_some_and(|exp| exp > now)))
    }

    /// Active in the merged view: a `subscriptions` row or a legacy
    /// `active`/`paid`/`trialing` row.
    pub async fn has_active(&self, member_id: i64, partner_id: i64) -> AppResult<bool> {
        let rows = self.list_for_member_partner(member_id, partner_id).await?;
        Ok(rows.iter().any(SubscriptionView::is_active))
    }

    /// The member's partners, one row per partner.
    pub async fn member_view(&self, member_id: i64) -> AppResult<Vec<SubscriptionView>> {
        let current = sub::Entity::find()
            .filter(sub::Column::MemberId.eq(member_id))
            .all(&self.pool)
            .await?;
        let legacy = mp::Entity::find()
            .filter(mp::Column::MemberId.eq(member_id))
            .all(&self.pool)
            .await?;

        Ok(merge_views(
            current
                .into_iter()
                .map(SubscriptionView::from)
                .chain(legacy.into_iter().map(SubscriptionView::from)),
        ))
    }

    pub async fn get(&self, subscription_id: i64) -> AppResult<sub::Model> {
        sub::Entity::find_by_id(subscription_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
    }

    /// Grants an entitlement by hand. Returns the pair's active row when one exists.
    pub async fn admin_create(
        &self,
        member_id: i64,
        partner_id: i64,
    ) -> AppResult<SubscriptionResponse> {
        let txn = self.pool.begin().await?;
        if let Some(existing) = Self::find_active(&txn, member_id, partner_id).await? {
            txn.commit().await?;
            return Ok(SubscriptionResponse::from(existing));
        }

        let now = Utc::now();
        let created = sub::ActiveModel {
            member_id: Set(member_id),
            partner_id: Set(partner_id),
            status: Set(SubscriptionStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        log::info!(
            "Subscription {} created by admin for member {member_id} / partner {partner_id}",
            created.id
        );
        Ok(SubscriptionResponse::from(created))
    }

    pub async fn admin_deactivate(&self, subscription_id: i64) -> AppResult<SubscriptionResponse> {
        let record = self.get(subscription_id).await?;
        let updated = Self::deactivate(&self.pool, record, Utc::now()).await?;
        log::info!("Subscription {subscription_id} deactivated by admin");
        Ok(SubscriptionResponse::from(updated))
    }

    async fn deactivate<C: ConnectionTrait>(
        db: &C,
        record: sub::Model,
        now: DateTime<Utc>,
    ) -> AppResult<sub::Model> {
        if record.status == SubscriptionStatus::Inactive && record.canceled_at.is_some() {
            return Ok(record);
        }
        let mut am = record.into_active_model();
        am.status = Set(SubscriptionStatus::Inactive);
        am.canceled_at = Set(Some(now));
        am.updated_at = Set(now);
        Ok(am.update(db).await?)
    }

    /// Applies a provider status to the row holding `external_subscription_id`.
    /// Returns how many rows changed; 0 means no row references that id.
    pub async fn set_status_by_external_id(
        &self,
        external_subscription_id: &str,
        status: SubscriptionStatus,
        canceled_at: Option<DateTime<Utc>>,
    ) -> AppResult<u64> {
        let txn = self.pool.begin().await?;
        let Some(record) = Self::find_by_external_id(&txn, external_subscription_id).await? else {
            txn.commit().await?;
            return Ok(0);
        };

        if status == SubscriptionStatus::Active && record.status != SubscriptionStatus::Active {
            if let Some(other) =
                Self::find_active(&txn, record.member_id, record.partner_id).await?
            {
                log::warn!(
                    "Not reactivating subscription {}: subscription {} is already active for member {} / partner {}",
                    record.id,
                    other.id,
                    record.member_id,
                    record.partner_id
                );
                txn.commit().await?;
                return Ok(0);
            }
        }

        let now = Utc::now();
        let previous = record.status;
        let id = record.id;
        let mut am = record.into_active_model();
        am.status = Set(status);
        if canceled_at.is_some() {
            am.canceled_at = Set(canceled_at);
        }
        am.updated_at = Set(now);
        am.update(&txn).await?;
        txn.commit().await?;

        log::info!("Subscription {id} status {previous} -> {status}");
        Ok(1)
    }

    /// Starts a provider checkout for `partner_id`.
    pub async fn create_checkout(
        &self,
        member: &SessionClaims,
        req: CreateCheckoutRequest,
    ) -> AppResult<CreateCheckoutResponse> {
        if req.price_id.trim().is_empty() {
            return Err(AppError::ValidationError("price_id is required".into()));
        }
        if self.has_active(member.uid, req.partner_id).await? {
            return Err(AppError::Conflict(
                "You already have an active subscription for this partner".into(),
            ));
        }

        let mut metadata = HashMap::from([(META_PARTNER_ID.to_string(), req.partner_id.to_string())]);
        if let Some(link_id) = req.partner_link_id {
            let partner_link = link::Entity::find_by_id(link_id)
                .one(&self.pool)
                .await?
                .ok_or_else(|| AppError::ValidationError("Unknown partner link".into()))?;
            if partner_link.partner_id != req.partner_id {
                return Err(AppError::ValidationError(
                    "Partner link does not belong to this partner".into(),
                ));
            }
            metadata.insert(META_PARTNER_LINK_ID.to_string(), link_id.to_string());
        }

        let customer = self
            .gateway
            .find_or_create_customer(member.uid, &member.email)
            .await?;

        let base = self.app_base_url.trim_end_matches('/');
        let checkout = self
            .gateway
            .create_subscription_checkout(SubscriptionCheckout {
                customer_id: customer.id,
                price_id: req.price_id,
                success_url: format!("{base}/subscriptions/success?session_id={{CHECKOUT_SESSION_ID}}"),
                cancel_url: format!("{base}/partners/{}", req.partner_id),
                subscription_metadata: metadata,
            })
            .await?;

        log::info!(
            "Checkout session {} created for member {} / partner {}",
            checkout.session_id,
            member.uid,
            req.partner_id
        );
        Ok(CreateCheckoutResponse {
            session_id: checkout.session_id,
            checkout_url: checkout.url,
        })
    }

    /// Member-initiated cancellation: the provider first, then the local row.
    pub async fn cancel_for_member(
        &self,
        member_id: i64,
        subscription_id: i64,
    ) -> AppResult<SubscriptionResponse> {
        let record = self.get(subscription_id).await?;
        if record.member_id != member_id {
            return Err(AppError::Forbidden);
        }
        if let Some(external_id) = record.external_subscription_id.as_deref() {
            self.gateway.cancel_subscription(external_id).await?;
        }
        let updated = Self::deactivate(&self.pool, record, Utc::now()).await?;
        log::info!("Subscription {subscription_id} canceled by member {member_id}");
        Ok(SubscriptionResponse::from(updated))
    }
}

/// De-duplicates by `partner_id`. A `subscriptions` row beats a legacy row;
/// within one source an active row beats an inactive one, then the newest wins.
pub fn merge_views(rows: impl IntoIterator<Item = SubscriptionView>) -> Vec<SubscriptionView> {
    fn rank(v: &SubscriptionView) -> (bool, bool, DateTime<Utc>) {
        (
            v.source == SubscriptionSource::Subscriptions,
            v.is_active(),
            v.updated_at,
        )
    }

    let mut by_partner: HashMap<i64, SubscriptionView> = HashMap::new();
    for row in rows {
        match by_partner.get(&row.partner_id) {
            Some(kept) if rank(kept) >= rank(&row) => {}
            _ => {
                by_partner.insert(row.partner_id, row);
            }
        }
    }

    let mut merged: Vec<SubscriptionView> = by_partner.into_values().collect();
    merged.sort_by_key(|v| v.partner_id);
    merged
}
