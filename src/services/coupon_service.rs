use crate::entities::{
    CouponStatus, coupon_entity as coupon, establishment_entity as est,
    used_coupon_entity as used,
};
use crate::error::{AppError, AppResult};
use crate::models::{CouponRejection, CouponResponse};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set, TransactionTrait,
};

/// Ordered coupon checks; the first failing one wins.
pub fn evaluate_coupon(
    coupon: &coupon::Model,
    already_used: bool,
    establishment_exists: bool,
    now: DateTime<Utc>,
) -> Result<(), CouponRejection> {
    if coupon.status != CouponStatus::Active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.valid_until <= now {
        return Err(CouponRejection::Expired);
    }
    if coupon.max_uses.is_some_and(|max| coupon.current_uses >= max) {
        return Err(CouponRejection::LimitReached);
    }
    if already_used {
        return Err(CouponRejection::AlreadyUsed);
    }
    if !establishment_exists {
        return Err(CouponRejection::InvalidEstablishment);
    }
    Ok(())
}

#[derive(Clone)]
pub struct CouponService {
    pool: DatabaseConnection,
}

impl CouponService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    async fn check<C: ConnectionTrait>(
        db: &C,
        code: &str,
        user_id: i64,
        establishment_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<coupon::Model> {
        let found = coupon::Entity::find()
            .filter(coupon::Column::Code.eq(code.trim()))
            .filter(coupon::Column::EstablishmentId.eq(establishment_id))
            .one(db)
            .await?
            .ok_or(AppError::Coupon(CouponRejection::NotFound))?;

        let already_used = used::Entity::find()
            .filter(used::Column::UserId.eq(user_id))
            .filter(used::Column::CouponId.eq(found.id))
            .count(db)
            .await?
            > 0;
        let establishment_exists = est::Entity::find_by_id(establishment_id)
            .count(db)
            .await?
            > 0;

        evaluate_coupon(&found, already_used, establishment_exists, now).map_err(AppError::Coupon)?;
        Ok(found)
    }

    pub async fn validate_coupon(
        &self,
        code: &str,
        user_id: i64,
        establishment_id: i64,
    ) -> AppResult<CouponResponse> {
        self.validate_coupon_at(code, user_id, establishment_id, Utc::now())
            .await
    }

    pub async fn validate_coupon_at(
        &self,
        code: &str,
        user_id: i64,
        establishment_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<CouponResponse> {
        let found = Self::check(&self.pool, code, user_id, establishment_id, now).await?;
        Ok(CouponResponse::from(found))
    }

    pub async fn redeem_coupon(
        &self,
        code: &str,
        user_id: i64,
        establishment_id: i64,
    ) -> AppResult<CouponResponse> {
        self.redeem_coupon_at(code, user_id, establishment_id, Utc::now())
            .await
    }

    /// Usage record and counter move together or not at all.
    pub async fn redeem_coupon_at(
        &self,
        code: &str,
        user_id: i64,
        establishment_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<CouponResponse> {
        let txn = self.pool.begin().await?;
        let found = Self::check(&txn, code, user_id, establishment_id, now).await?;

        let recorded = used::Entity::insert(used::ActiveModel {
            user_id: Set(user_id),
            coupon_id: Set(found.id),
            establishment_id: Set(establishment_id),
            used_at: Set(now),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([used::Column::UserId, used::Column::CouponId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;
        if recorded == 0 {
            return Err(AppError::Coupon(CouponRejection::AlreadyUsed));
        }

        let bumped = coupon::Entity::update_many()
            .col_expr(
                coupon::Column::CurrentUses,
                Expr::col(coupon::Column::CurrentUses).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
            .filter(coupon::Column::Id.eq(found.id))
            .filter(coupon::Column::Status.eq(CouponStatus::Active))
            .filter(
                Condition::any()
                    .add(coupon::Column::MaxUses.is_null())
                    .add(Expr::col(coupon::Column::CurrentUses).lt(Expr::col(coupon::Column::MaxUses))),
            )
            .exec(&txn)
            .await?;
        if bumped.rows_affected == 0 {
            let current = coupon::Entity::find_by_id(found.id).one(&txn).await?;
            let rejection = match current {
                Some(c) if c.status == CouponStatus::Active => CouponRejection::LimitReached,
                Some(_) => CouponRejection::Inactive,
                None => CouponRejection::NotFound,
            };
            return Err(AppError::Coupon(rejection));
        }

        coupon::Entity::update_many()
            .col_expr(coupon::Column::Status, Expr::value(CouponStatus::Used))
            .filter(coupon::Column::Id.eq(found.id))
            .filter(coupon::Column::MaxUses.is_not_null())
            .filter(Expr::col(coupon::Column::CurrentUses).gte(Expr::col(coupon::Column::MaxUses)))
            .exec(&txn)
            .await?;

        let updated = coupon::Entity::find_by_id(found.id)
            .one(&txn)
            .await?
            .ok_or(AppError::Coupon(CouponRejection::NotFound))?;
        txn.commit().await?;

        log::info!(
            "Coupon {} redeemed by user {user_id} at establishment {establishment_id} ({}/{})",
            updated.code,
            updated.current_uses,
            updated
                .max_uses
                .map_or_else(|| "unlimited".to_string(), |m| m.to_string())
        );
        Ok(CouponResponse::from(updated))
    }
}
