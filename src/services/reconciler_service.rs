use crate::entities::{SubscriptionStatus, partner_link_entity as link, subscription_entity as sub};
use crate::error::{AppError, AppResult};
use crate::external::{
    CheckoutSessionObject, META_PARTNER_ID, META_PARTNER_LINK_ID, META_USER_ID, PaymentGateway,
    ProviderSubscription, SubscriptionObject, WebhookEvent,
};
use crate::models::{ReconcileAction, ReconcileOutcome};
use crate::services::SubscriptionService;
use crate::utils::{SessionClaims, UserType};
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Identity resolved from provider metadata for one provider subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CheckoutOwner {
    member_id: i64,
    partner_id: i64,
    partner_link_id: Option<i64>,
}

/// Turns provider events into subscription state. Every entry point is safe
/// to call again with the same input.
#[derive(Clone)]
pub struct ReconcilerService {
    pool: DatabaseConnection,
    gateway: Arc<dyn PaymentGateway>,
    subscription_service: SubscriptionService,
}

impl ReconcilerService {
    pub fn new(
        pool: DatabaseConnection,
        gateway: Arc<dyn PaymentGateway>,
        subscription_service: SubscriptionService,
    ) -> Self {
        Self {
            pool,
            gateway,
            subscription_service,
        }
    }

    /// Routes a verified webhook event. Unknown types are acknowledged untouched.
    pub async fn dispatch(&self, event: &WebhookEvent) -> AppResult<()> {
        match event.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                let session: CheckoutSessionObject = event.object()?;
                self.handle_checkout_completed(&session).await?;
            }
            SUBSCRIPTION_UPDATED => {
                let subscription: SubscriptionObject = event.object()?;
                let status = subscription.status.as_deref().unwrap_or_default();
                self.handle_subscription_updated(&subscription.id, status)
                    .await?;
            }
            SUBSCRIPTION_DELETED => {
                let subscription: SubscriptionObject = event.object()?;
                self.handle_subscription_deleted(&subscription.id).await?;
            }
            other => {
                log::info!("Ignoring webhook event {} of type {other}", event.id);
            }
        }
        Ok(())
    }

    /// `None` when the session did not start a subscription.
    pub async fn handle_checkout_completed(
        &self,
        session: &CheckoutSessionObject,
    ) -> AppResult<Option<ReconcileOutcome>> {
        let Some(subscription_id) = session.subscription.as_deref() else {
            log::info!(
                "Checkout session {} has no subscription, nothing to reconcile",
                session.id
            );
            return Ok(None);
        };

        let subscription = self.gateway.retrieve_subscription(subscription_id).await?;
        let customer_id = session
            .customer
            .clone()
            .unwrap_or_else(|| subscription.customer_id.clone());
        let customer = self.gateway.retrieve_customer(&customer_id).await?;
        let owner = resolve_owner(&customer.metadata, &subscription.metadata)?;

        let outcome = self.apply_checkout(&subscription, &owner).await?;
        Ok(Some(outcome))
    }

    /// Manual sync from the success page. Members may only sync their own sessions.
    pub async fn sync_checkout_session(
        &self,
        caller: &SessionClaims,
        session_id: &str,
    ) -> AppResult<ReconcileOutcome> {
        let session = self.gateway.retrieve_checkout_session(session_id).await?;
        let subscription_id = session.subscription_id.ok_or_else(|| {
            AppError::ValidationError("Checkout session has no subscription yet".into())
        })?;

        let subscription = self.gateway.retrieve_subscription(&subscription_id).await?;
        let customer_id = session
            .customer_id
            .unwrap_or_else(|| subscription.customer_id.clone());
        let customer = self.gateway.retrieve_customer(&customer_id).await?;
        let owner = resolve_owner(&customer.metadata, &subscription.metadata)?;

        if caller.user_type != UserType::Master && owner.member_id != caller.uid {
            log::warn!(
                "User {} tried to sync checkout session {session_id} owned by member {}",
                caller.uid,
                owner.member_id
            );
            return Err(AppError::Forbidden);
        }

        self.apply_checkout(&subscription, &owner).await
    }

    async fn apply_checkout(
        &self,
        subscription: &ProviderSubscription,
        owner: &CheckoutOwner,
    ) -> AppResult<ReconcileOutcome> {
        let txn = self.pool.begin().await?;

        if let Some(existing) = SubscriptionService::find_by_external_id(&txn, &subscription.id).await? {
            txn.commit().await?;
            log::info!(
                "Provider subscription {} already recorded as {}",
                subscription.id,
                existing.id
            );
            return Ok(ReconcileOutcome {
                action: ReconcileAction::Duplicate,
                subscription_id: existing.id,
            });
        }

        if let Some(active) =
            SubscriptionService::find_active(&txn, owner.member_id, owner.partner_id).await?
        {
            let outcome = Self::attach(&txn, active, subscription).await?;
            txn.commit().await?;
            return Ok(outcome);
        }

        let now = Utc::now();
        let row = sub::ActiveModel {
            member_id: Set(owner.member_id),
            partner_id: Set(owner.partner_id),
            status: Set(SubscriptionStatus::Active),
            external_subscription_id: Set(Some(subscription.id.clone())),
            partner_link_id: Set(owner.partner_link_id),
            expires_at: Set(subscription.current_period_end),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        // no conflict target: the external id and the active-pair index both count
        let inserted = sub::Entity::insert(row)
            .on_conflict(OnConflict::new().do_nothing().to_owned())
            .exec_without_returning(&txn)
            .await?;

        if inserted == 0 {
            let outcome = if let Some(existing) =
                SubscriptionService::find_by_external_id(&txn, &subscription.id).await?
            {
                ReconcileOutcome {
                    action: ReconcileAction::Duplicate,
                    subscription_id: existing.id,
                }
            } else if let Some(active) =
                SubscriptionService::find_active(&txn, owner.member_id, owner.partner_id).await?
            {
                Self::attach(&txn, active, subscription).await?
            } else {
                return Err(AppError::InternalError(format!(
                    "Insert of provider subscription {} was skipped without a conflicting row",
                    subscription.id
                )));
            };
            txn.commit().await?;
            return Ok(outcome);
        }

        let created = SubscriptionService::find_by_external_id(&txn, &subscription.id)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(format!(
                    "Provider subscription {} missing after insert",
                    subscription.id
                ))
            })?;

        if let Some(link_id) = owner.partner_link_id {
            let bumped = link::Entity::update_many()
                .col_expr(
                    link::Column::Conversions,
                    Expr::col(link::Column::Conversions).add(1),
                )
                .col_expr(link::Column::UpdatedAt, Expr::value(now))
                .filter(link::Column::Id.eq(link_id))
                .exec(&txn)
                .await?;
            if bumped.rows_affected == 0 {
                log::warn!("Partner link {link_id} not found, conversion not counted");
            }
        }

        txn.commit().await?;
        log::info!(
            "Subscription {} created for member {} / partner {} from provider subscription {}",
            created.id,
            owner.member_id,
            owner.partner_id,
            subscription.id
        );
        Ok(ReconcileOutcome {
            action: ReconcileAction::Created,
            subscription_id: created.id,
        })
    }

    async fn attach(
        txn: &DatabaseTransaction,
        active: sub::Model,
        subscription: &ProviderSubscription,
    ) -> AppResult<ReconcileOutcome> {
        if let Some(linked) = active.external_subscription_id.as_deref() {
            log::warn!(
                "Member {} already pays for partner {} through provider subscription {} (row {}); extra provider subscription {} left unlinked",
                active.member_id,
                active.partner_id,
                linked,
                active.id,
                subscription.id
            );
            return Ok(ReconcileOutcome {
                action: ReconcileAction::Duplicate,
                subscription_id: active.id,
            });
        }

        log::warn!(
            "Member {} already has active subscription {} for partner {}; attaching provider subscription {}",
            active.member_id,
            active.id,
            active.partner_id,
            subscription.id
        );
        let id = active.id;
        let mut am = active.into_active_model();
        am.external_subscription_id = Set(Some(subscription.id.clone()));
        if subscription.current_period_end.is_some() {
            am.expires_at = Set(subscription.current_period_end);
        }
        am.updated_at = Set(Utc::now());
        am.update(txn).await?;
        Ok(ReconcileOutcome {
            action: ReconcileAction::Attached,
            subscription_id: id,
        })
    }

    pub async fn handle_subscription_updated(
        &self,
        external_subscription_id: &str,
        provider_status: &str,
    ) -> AppResult<u64> {
        let status = SubscriptionStatus::from_provider(provider_status);
        let changed = self
            .subscription_service
            .set_status_by_external_id(external_subscription_id, status, None)
            .await?;
        if changed == 0 {
            log::info!(
                "customer.subscription.updated for {external_subscription_id} ({provider_status}) changed nothing"
            );
        }
        Ok(changed)
    }

    pub async fn handle_subscription_deleted(&self, external_subscription_id: &str) -> AppResult<u64> {
        let changed = self
            .subscription_service
            .set_status_by_external_id(
                external_subscription_id,
                SubscriptionStatus::Inactive,
                Some(Utc::now()),
            )
            .await?;
        if changed == 0 {
            log::info!("customer.subscription.deleted for unknown subscription {external_subscription_id}");
        }
        Ok(changed)
    }
}

fn resolve_owner(
    customer_metadata: &HashMap<String, String>,
    subscription_metadata: &HashMap<String, String>,
) -> AppResult<CheckoutOwner> {
    fn id(meta: &HashMap<String, String>, key: &str) -> AppResult<Option<i64>> {
        match meta.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| AppError::ValidationError(format!("Invalid {key} metadata: {raw}"))),
        }
    }

    let member_id = id(customer_metadata, META_USER_ID)?
        .ok_or_else(|| AppError::ValidationError("Customer has no userId metadata".into()))?;
    let partner_id = id(subscription_metadata, META_PARTNER_ID)?
        .ok_or_else(|| AppError::ValidationError("Subscription has no partnerId metadata".into()))?;
    let partner_link_id = id(subscription_metadata, META_PARTNER_LINK_ID)?;

    Ok(CheckoutOwner {
        member_id,
        partner_id,
        partner_link_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    fn services(db: &DatabaseConnection, gateway: &FakeGateway) -> (SubscriptionService, ReconcilerService) {
        let gateway: Arc<dyn PaymentGateway> = Arc::new(gateway.clone());
        let subs = SubscriptionService::new(db.clone(), gateway.clone(), "http://localhost:3000");
        let reconciler = ReconcilerService::new(db.clone(), gateway, subs.clone());
        (subs, reconciler)
    }

    fn session(id: &str, subscription: &str, customer: &str) -> CheckoutSessionObject {
        CheckoutSessionObject {
            id: id.to_string(),
            subscription: Some(subscription.to_string()),
            customer: Some(customer.to_string()),
        }
    }

    fn claims(uid: i64, user_type: UserType) -> SessionClaims {
        SessionClaims {
            uid,
            user_type,
            email: format!("user{uid}@example.com"),
            exp: 0,
        }
    }

    #[test]
    fn test_resolve_owner_reads_metadata() {
        let customer = HashMap::from([(META_USER_ID.to_string(), "5".to_string())]);
        let subscription = HashMap::from([
            (META_PARTNER_ID.to_string(), "9".to_string()),
            (META_PARTNER_LINK_ID.to_string(), "".to_string()),
        ]);
        let owner = resolve_owner(&customer, &subscription).unwrap();
        assert_eq!(
            owner,
            CheckoutOwner {
                member_id: 5,
                partner_id: 9,
                partner_link_id: None
            }
        );

        let bad = HashMap::from([(META_PARTNER_ID.to_string(), "nine".to_string())]);
        assert!(matches!(
            resolve_owner(&customer, &bad),
            Err(AppError::ValidationError(_))
        ));
        assert!(resolve_owner(&HashMap::new(), &subscription).is_err());
    }

    #[tokio::test]
    async fn test_duplicate_checkout_delivery_keeps_one_active_row() {
        let db = setup_db().await;
        let gateway = FakeGateway::new();
        let partner_link = insert_partner_link(&db, 10, "LAUNCH").await;
        gateway.add_customer("cus_1", 1);
        gateway.add_subscription("sub_1", "cus_1", 10, Some(partner_link.id));
        let (subs, reconciler) = services(&db, &gateway);

        let event = session("cs_1", "sub_1", "cus_1");
        let first = reconciler.handle_checkout_completed(&event).await.unwrap().unwrap();
        let second = reconciler.handle_checkout_completed(&event).await.unwrap().unwrap();

        assert_eq!(first.action, ReconcileAction::Created);
        assert_eq!(second.action, ReconcileAction::Duplicate);
        assert_eq!(first.subscription_id, second.subscription_id);

        let rows = subs.list_for_member_partner(1, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_active());
        assert_eq!(rows[0].external_subscription_id.as_deref(), Some("sub_1"));

        let partner_link = link::Entity::find_by_id(partner_link.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(partner_link.conversions, 1);
    }

    #[tokio::test]
    async fn test_checkout_attaches_to_existing_active_row() {
        let db = setup_db().await;
        let gateway = FakeGateway::new();
        gateway.add_customer("cus_1", 1);
        gateway.add_subscription("sub_new", "cus_1", 10, None);
        let (subs, reconciler) = services(&db, &gateway);

        let manual = subs.admin_create(1, 10).await.unwrap();
        let outcome = reconciler
            .handle_checkout_completed(&session("cs_2", "sub_new", "cus_1"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.action, ReconcileAction::Attached);
        assert_eq!(outcome.subscription_id, manual.id);
        let stored = subs.get(manual.id).await.unwrap();
        assert_eq!(stored.external_subscription_id.as_deref(), Some("sub_new"));
        assert!(stored.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_second_checkout_keeps_first_provider_link() {
        let db = setup_db().await;
        let gateway = FakeGateway::new();
        gateway.add_customer("cus_1", 1);
        gateway.add_subscription("sub_a", "cus_1", 10, None);
        gateway.add_subscription("sub_b", "cus_1", 10, None);
        let (subs, reconciler) = services(&db, &gateway);

        let first = reconciler
            .handle_checkout_completed(&session("cs_a", "sub_a", "cus_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.action, ReconcileAction::Created);

        let second = reconciler
            .handle_checkout_completed(&session("cs_b", "sub_b", "cus_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.action, ReconcileAction::Duplicate);
        assert_eq!(second.subscription_id, first.subscription_id);

        let stored = subs.get(first.subscription_id).await.unwrap();
        assert_eq!(stored.external_subscription_id.as_deref(), Some("sub_a"));

        // events for the unlinked subscription must not touch the paying row
        assert_eq!(reconciler.handle_subscription_deleted("sub_b").await.unwrap(), 0);
        assert!(SubscriptionService::find_active(&db, 1, 10).await.unwrap().is_some());
        assert_eq!(
            reconciler.handle_subscription_updated("sub_a", "past_due").await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_checkout_without_subscription_is_ignored() {
        let db = setup_db().await;
        let (_, reconciler) = services(&db, &FakeGateway::new());
        let one_time = CheckoutSessionObject {
            id: "cs_pay".into(),
            subscription: None,
            customer: None,
        };
        assert!(reconciler.handle_checkout_completed(&one_time).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upstream_failure_surfaces_as_external_error() {
        let db = setup_db().await;
        let (_, reconciler) = services(&db, &FakeGateway::new());
        let err = reconciler
            .handle_checkout_completed(&session("cs_x", "sub_unknown", "cus_unknown"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalApiError(_)));
    }

    #[tokio::test]
    async fn test_subscription_updated_maps_provider_status() {
        let db = setup_db().await;
        let gateway = FakeGateway::new();
        gateway.add_customer("cus_1", 1);
        gateway.add_subscription("sub_1", "cus_1", 10, None);
        let (subs, reconciler) = services(&db, &gateway);
        reconciler
            .handle_checkout_completed(&session("cs_1", "sub_1", "cus_1"))
            .await
            .unwrap();

        assert_eq!(reconciler.handle_subscription_updated("sub_1", "past_due").await.unwrap(), 1);
        assert!(SubscriptionService::find_active(&db, 1, 10).await.unwrap().is_none());

        assert_eq!(reconciler.handle_subscription_updated("sub_1", "active").await.unwrap(), 1);
        assert!(SubscriptionService::find_active(&db, 1, 10).await.unwrap().is_some());

        assert_eq!(reconciler.handle_subscription_updated("sub_other", "active").await.unwrap(), 0);
        assert_eq!(subs.member_view(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_event_for_unknown_subscription_is_silent() {
        let db = setup_db().await;
        let (_, reconciler) = services(&db, &FakeGateway::new());
        assert_eq!(reconciler.handle_subscription_deleted("sub_ghost").await.unwrap(), 0);
        assert!(sub::Entity::find().all(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_event_deactivates_and_stamps() {
        let db = setup_db().await;
        let gateway = FakeGateway::new();
        gateway.add_customer("cus_1", 1);
        gateway.add_subscription("sub_1", "cus_1", 10, None);
        let (subs, reconciler) = services(&db, &gateway);
        let outcome = reconciler
            .handle_checkout_completed(&session("cs_1", "sub_1", "cus_1"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reconciler.handle_subscription_deleted("sub_1").await.unwrap(), 1);
        let stored = subs.get(outcome.subscription_id).await.unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Inactive);
        assert!(stored.canceled_at.is_some());
    }

    #[tokio::test]
    async fn test_sync_checks_session_owner() {
        let db = setup_db().await;
        let gateway = FakeGateway::new();
        gateway.add_customer("cus_1", 1);
        gateway.add_subscription("sub_1", "cus_1", 10, None);
        gateway.add_session("cs_1", "cus_1", "sub_1");
        let (_, reconciler) = services(&db, &gateway);

        let err = reconciler
            .sync_checkout_session(&claims(2, UserType::Member), "cs_1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let outcome = reconciler
            .sync_checkout_session(&claims(1, UserType::Member), "cs_1")
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Created);

        let again = reconciler
            .sync_checkout_session(&claims(99, UserType::Master), "cs_1")
            .await
            .unwrap();
        assert_eq!(again.action, ReconcileAction::Duplicate);
    }

    #[tokio::test]
    async fn test_dispatch_ignores_unknown_event_types() {
        let db = setup_db().await;
        let (_, reconciler) = services(&db, &FakeGateway::new());
        let event = WebhookEvent::parse(
            br#"{"id":"evt_1","type":"invoice.paid","data":{"object":{"id":"in_1"}}}"#,
        )
        .unwrap();
        reconciler.dispatch(&event).await.unwrap();
    }
}
