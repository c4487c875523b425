use crate::config::VoucherConfig;
use crate::entities::{
    VoucherStatus, establishment_entity as est, voucher_cooldown_entity as slot,
    voucher_entity as voucher,
};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::SubscriptionService;
use crate::utils::generate_voucher_code;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

#[derive(Clone)]
pub struct VoucherService {
    pool: DatabaseConnection,
    subscription_service: SubscriptionService,
    ttl: Duration,
    rating_reminder_delay: Duration,
}

/// Cooldown decision for a member at an establishment, given the last issue time.
pub fn evaluate_cooldown(
    cooldown_hours: i32,
    last_generated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CooldownStatus {
    let cooldown = Duration::hours(i64::from(cooldown_hours.max(0)));
    let next_available_at = last_generated_at
        .map(|last| last + cooldown)
        .filter(|next| *next > now);

    CooldownStatus {
        eligible: next_available_at.is_none(),
        cooldown_hours,
        last_generated_at,
        next_available_at,
    }
}

impl VoucherService {
    pub fn new(
        pool: DatabaseConnection,
        subscription_service: SubscriptionService,
        config: &VoucherConfig,
    ) -> Self {
        Self {
            pool,
            subscription_service,
            ttl: Duration::hours(config.ttl_hours),
            rating_reminder_delay: Duration::hours(config.rating_reminder_delay_hours),
        }
    }

    async fn establishment(&self, establishment_id: i64) -> AppResult<est::Model> {
        est::Entity::find_by_id(establishment_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Establishment not found".to_string()))
    }

    async fn last_generated_at(
        &self,
        member_id: i64,
        establishment_id: i64,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let last = voucher::Entity::find()
            .filter(voucher::Column::MemberId.eq(member_id))
            .filter(voucher::Column::EstablishmentId.eq(establishment_id))
            .order_by_desc(voucher::Column::GeneratedAt)
            .order_by_desc(voucher::Column::Id)
            .one(&self.pool)
            .await?;
        Ok(last.map(|v| v.generated_at))
    }

    pub async fn check_cooldown(
        &self,
        member_id: i64,
        establishment_id: i64,
    ) -> AppResult<CooldownStatus> {
        self.check_cooldown_at(member_id, establishment_id, Utc::now())
            .await
    }

    pub async fn check_cooldown_at(
        &self,
        member_id: i64,
        establishment_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<CooldownStatus> {
        let establishment = self.establishment(establishment_id).await?;
        let last = self.last_generated_at(member_id, establishment_id).await?;
        Ok(evaluate_cooldown(establishment.voucher_cooldown, last, now))
    }

    pub async fn issue_voucher(
        &self,
        member_id: i64,
        establishment_id: i64,
    ) -> AppResult<VoucherResponse> {
        self.issue_voucher_at(member_id, establishment_id, Utc::now())
            .await
    }

    pub async fn issue_voucher_at(
        &self,
        member_id: i64,
        establishment_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<VoucherResponse> {
        let establishment = self.establishment(establishment_id).await?;

        if !self
            .subscription_service
            .has_entitlement(member_id, establishment.partner_id, now)
            .await?
        {
            log::warn!(
                "Member {member_id} has no active subscription for partner {}",
                establishment.partner_id
            );
            return Err(AppError::Forbidden);
        }

        let last = self.last_generated_at(member_id, establishment_id).await?;
        let status = evaluate_cooldown(establishment.voucher_cooldown, last, now);
        if let Some(next_available_at) = status.next_available_at {
            return Err(AppError::CooldownActive { next_available_at });
        }

        let cooldown = Duration::hours(i64::from(establishment.voucher_cooldown.max(0)));
        let txn = self.pool.begin().await?;
        Self::claim_slot(&txn, member_id, establishment_id, cooldown, now).await?;

        let issued = voucher::ActiveModel {
            code: Set(generate_voucher_code()),
            member_id: Set(member_id),
            establishment_id: Set(establishment_id),
            partner_id: Set(establishment.partner_id),
            business_id: Set(establishment.business_id),
            status: Set(VoucherStatus::Pending),
            generated_at: Set(now),
            expires_at: Set(now + self.ttl),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        log::info!(
            "Voucher {} issued to member {member_id} at establishment {establishment_id}",
            issued.id
        );
        Ok(VoucherResponse::from_model(issued, now))
    }

    /// Compare-and-set on the (member, establishment) slot: only one issuer
    /// per cooldown window gets past this point.
    async fn claim_slot(
        txn: &DatabaseTransaction,
        member_id: i64,
        establishment_id: i64,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let inserted = slot::Entity::insert(slot::ActiveModel {
            member_id: Set(member_id),
            establishment_id: Set(establishment_id),
            last_generated_at: Set(now),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([slot::Column::MemberId, slot::Column::EstablishmentId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(txn)
        .await?;
        if inserted > 0 {
            return Ok(());
        }

        let claimed = slot::Entity::update_many()
            .col_expr(slot::Column::LastGeneratedAt, Expr::value(now))
            .filter(slot::Column::MemberId.eq(member_id))
            .filter(slot::Column::EstablishmentId.eq(establishment_id))
            .filter(slot::Column::LastGeneratedAt.lte(now - cooldown))
            .exec(txn)
            .await?;
        if claimed.rows_affected > 0 {
            return Ok(());
        }

        let holder = slot::Entity::find()
            .filter(slot::Column::MemberId.eq(member_id))
            .filter(slot::Column::EstablishmentId.eq(establishment_id))
            .one(txn)
            .await?;
        let next_available_at = holder.map_or(now + cooldown, |s| s.last_generated_at + cooldown);
        log::warn!(
            "Concurrent voucher request for member {member_id} at establishment {establishment_id} lost the cooldown slot"
        );
        Err(AppError::CooldownActive { next_available_at })
    }

    pub async fn list_member_vouchers(
        &self,
        member_id: i64,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<VoucherResponse>> {
        let page = params.get_page();
        let page_size = params.get_page_size();

        let paginator = voucher::Entity::find()
            .filter(voucher::Column::MemberId.eq(member_id))
            .order_by_desc(voucher::Column::GeneratedAt)
            .order_by_desc(voucher::Column::Id)
            .paginate(&self.pool, page_size);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;

        let now = Utc::now();
        let data = rows
            .into_iter()
            .map(|m| VoucherResponse::from_model(m, now))
            .collect();
        Ok(PaginatedResponse::new(data, page, page_size, total))
    }

    pub async fn redeem_voucher(&self, business_id: i64, code: &str) -> AppResult<VoucherResponse> {
        self.redeem_voucher_at(business_id, code, Utc::now()).await
    }

    /// Marks a pending voucher of `business_id` as used.
    pub async fn redeem_voucher_at(
        &self,
        business_id: i64,
        code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<VoucherResponse> {
        let code = code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(AppError::ValidationError("Voucher code is required".into()));
        }

        let candidates = voucher::Entity::find()
            .filter(voucher::Column::Code.eq(code.as_str()))
            .filter(voucher::Column::BusinessId.eq(business_id))
            .order_by_desc(voucher::Column::GeneratedAt)
            .all(&self.pool)
            .await?;
        let target = match candidates
            .iter()
            .find(|v| v.status == VoucherStatus::Pending)
        {
            Some(v) => v.clone(),
            None if !candidates.is_empty() => {
                return Err(AppError::Conflict("Voucher has already been used".into()));
            }
            None => return Err(AppError::NotFound("Voucher not found".into())),
        };
        if target.expires_at <= now {
            return Err(AppError::Expired("Voucher has expired".into()));
        }

        let result = voucher::Entity::update_many()
            .col_expr(voucher::Column::Status, Expr::value(VoucherStatus::Used))
            .col_expr(voucher::Column::UsedAt, Expr::value(Some(now)))
            .col_expr(voucher::Column::UpdatedAt, Expr::value(now))
            .filter(voucher::Column::Id.eq(target.id))
            .filter(voucher::Column::Status.eq(VoucherStatus::Pending))
            .exec(&self.pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::Conflict("Voucher has already been used".into()));
        }

        log::info!("Voucher {} redeemed by business {business_id}", target.id);
        let redeemed = voucher::Model {
            status: VoucherStatus::Used,
            used_at: Some(now),
            updated_at: now,
            ..target
        };
        Ok(VoucherResponse::from_model(redeemed, now))
    }

    /// Stamps used vouchers whose rating reminder is due. Returns how many were stamped.
    pub async fn stamp_due_rating_reminders(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let due_before = now - self.rating_reminder_delay;
        let due = voucher::Entity::find()
            .filter(voucher::Column::Status.eq(VoucherStatus::Used))
            .filter(voucher::Column::UsedAt.lte(due_before))
            .filter(voucher::Column::RatingPromptedAt.is_null())
            .all(&self.pool)
            .await?;

        let mut stamped = 0;
        for v in due {
            let result = voucher::Entity::update_many()
                .col_expr(voucher::Column::RatingPromptedAt, Expr::value(Some(now)))
                .filter(voucher::Column::Id.eq(v.id))
                .filter(voucher::Column::RatingPromptedAt.is_null())
                .exec(&self.pool)
                .await?;
            if result.rows_affected > 0 {
                stamped += 1;
                log::info!(
                    "Rating reminder due for member {} (voucher {}, establishment {})",
                    v.member_id,
                    v.id,
                    v.establishment_id
                );
            }
        }
        Ok(stamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EffectiveVoucherStatus;
    use crate::external::PaymentGateway;
    use crate::test_support::*;
    use std::sync::Arc;

    fn config() -> VoucherConfig {
        VoucherConfig {
            ttl_hours: 24,
            rating_reminder_delay_hours: 24,
        }
    }

    async fn setup() -> (DatabaseConnection, SubscriptionService, VoucherService) {
        let db = setup_db().await;
        let gateway: Arc<dyn PaymentGateway> = Arc::new(FakeGateway::new());
        let subs = SubscriptionService::new(db.clone(), gateway, "http://localhost:3000");
        let vouchers = VoucherService::new(db.clone(), subs.clone(), &config());
        (db, subs, vouchers)
    }

    #[test]
    fn test_evaluate_cooldown_window() {
        let t = at(2026, 3, 1, 10);
        let status = evaluate_cooldown(24, Some(t), t + Duration::hours(1));
        assert!(!status.eligible);
        assert_eq!(status.next_available_at, Some(t + Duration::hours(24)));

        let status = evaluate_cooldown(24, Some(t), t + Duration::hours(24));
        assert!(status.eligible);
        assert_eq!(status.next_available_at, None);

        let status = evaluate_cooldown(24, None, t);
        assert!(status.eligible);
        assert_eq!(status.last_generated_at, None);
    }

    #[tokio::test]
    async fn test_cooldown_rejects_second_voucher_within_window() {
        let (db, subs, vouchers) = setup().await;
        let establishment = insert_establishment(&db, 10, 500, 24).await;
        subs.admin_create(1, 10).await.unwrap();
        let t = at(2026, 3, 1, 10);

        let first = vouchers.issue_voucher_at(1, establishment.id, t).await.unwrap();
        assert_eq!(first.code.len(), crate::utils::VOUCHER_CODE_LEN);
        assert_eq!(first.status, EffectiveVoucherStatus::Pending);
        assert_eq!(first.expires_at, t + Duration::hours(24));

        let err = vouchers
            .issue_voucher_at(1, establishment.id, t + Duration::hours(1))
            .await
            .unwrap_err();
        match err {
            AppError::CooldownActive { next_available_at } => {
                assert_eq!(next_available_at, t + Duration::hours(24));
            }
            other => panic!("expected cooldown, got {other:?}"),
        }

        let status = vouchers
            .check_cooldown_at(1, establishment.id, t + Duration::hours(1))
            .await
            .unwrap();
        assert!(!status.eligible);
        assert_eq!(status.last_generated_at, Some(t));

        vouchers
            .issue_voucher_at(1, establishment.id, t + Duration::hours(24))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_issue_yields_one_voucher() {
        let (db, subs, vouchers) = setup().await;
        let establishment = insert_establishment(&db, 10, 500, 24).await;
        subs.admin_create(1, 10).await.unwrap();
        let t = at(2026, 3, 1, 10);

        let (a, b) = tokio::join!(
            vouchers.issue_voucher_at(1, establishment.id, t),
            vouchers.issue_voucher_at(1, establishment.id, t + Duration::minutes(1)),
        );
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        let failure = if a.is_err() { a } else { b };
        assert!(matches!(failure, Err(AppError::CooldownActive { .. })));

        let stored = voucher::Entity::find().all(&db).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_issue_requires_entitlement_and_establishment() {
        let (db, _, vouchers) = setup().await;
        let establishment = insert_establishment(&db, 10, 500, 24).await;

        assert!(matches!(
            vouchers.issue_voucher(1, establishment.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            vouchers.issue_voucher(1, 4242).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            vouchers.check_cooldown(1, 4242).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_legacy_expiry_grants_vouchers() {
        let (db, _, vouchers) = setup().await;
        let establishment = insert_establishment(&db, 10, 500, 24).await;
        insert_legacy_entitlement(&db, 1, 10, "canceled", Some(Utc::now() + Duration::days(7)))
            .await;

        vouchers.issue_voucher(1, establishment.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_legacy_paid_status_grants_vouchers() {
        let (db, _, vouchers) = setup().await;
        let establishment = insert_establishment(&db, 10, 500, 24).await;
        insert_legacy_entitlement(&db, 1, 10, "paid", None).await;

        let issued = vouchers.issue_voucher(1, establishment.id).await.unwrap();
        assert_eq!(issued.status, EffectiveVoucherStatus::Pending);
    }

    #[tokio::test]
    async fn test_redeem_voucher_flow() {
        let (db, subs, vouchers) = setup().await;
        let establishment = insert_establishment(&db, 10, 500, 24).await;
        subs.admin_create(1, 10).await.unwrap();
        let t = at(2026, 3, 1, 10);
        let issued = vouchers.issue_voucher_at(1, establishment.id, t).await.unwrap();

        assert!(matches!(
            vouchers
                .redeem_voucher_at(501, &issued.code, t + Duration::hours(1))
                .await,
            Err(AppError::NotFound(_))
        ));

        let redeemed = vouchers
            .redeem_voucher_at(500, &issued.code.to_lowercase(), t + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(redeemed.status, EffectiveVoucherStatus::Used);
        assert_eq!(redeemed.used_at, Some(t + Duration::hours(1)));

        assert!(matches!(
            vouchers
                .redeem_voucher_at(500, &issued.code, t + Duration::hours(2))
                .await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_redeem_expired_voucher() {
        let (db, subs, vouchers) = setup().await;
        let establishment = insert_establishment(&db, 10, 500, 24).await;
        subs.admin_create(1, 10).await.unwrap();
        let t = at(2026, 3, 1, 10);
        let issued = vouchers.issue_voucher_at(1, establishment.id, t).await.unwrap();

        assert!(matches!(
            vouchers
                .redeem_voucher_at(500, &issued.code, t + Duration::hours(24))
                .await,
            Err(AppError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn test_list_member_vouchers_newest_first() {
        let (db, subs, vouchers) = setup().await;
        let establishment = insert_establishment(&db, 10, 500, 1).await;
        subs.admin_create(1, 10).await.unwrap();
        let t = at(2020, 3, 1, 10);
        for h in [0, 2, 4] {
            vouchers
                .issue_voucher_at(1, establishment.id, t + Duration::hours(h))
                .await
                .unwrap();
        }

        let page = vouchers
            .list_member_vouchers(1, &PaginationParams::new(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].generated_at, t + Duration::hours(4));
        assert!(page
            .data
            .iter()
            .all(|v| v.status == EffectiveVoucherStatus::Expired));
    }

    #[tokio::test]
    async fn test_rating_reminders_are_stamped_once() {
        let (db, subs, vouchers) = setup().await;
        let establishment = insert_establishment(&db, 10, 500, 24).await;
        subs.admin_create(1, 10).await.unwrap();
        let t = at(2026, 3, 1, 10);
        let issued = vouchers.issue_voucher_at(1, establishment.id, t).await.unwrap();
        vouchers
            .redeem_voucher_at(500, &issued.code, t + Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(
            vouchers
                .stamp_due_rating_reminders(t + Duration::hours(2))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            vouchers
                .stamp_due_rating_reminders(t + Duration::hours(26))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            vouchers
                .stamp_due_rating_reminders(t + Duration::hours(30))
                .await
                .unwrap(),
            0
        );
    }
}
