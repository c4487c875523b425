use crate::entities::{
    VoucherStatus, establishment_entity as est, rating_entity as rating,
    voucher_entity as voucher,
};
use crate::error::{AppError, AppResult};
use crate::models::{CreateRatingRequest, RatingResponse};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};

/// Running mean after one more score.
pub fn fold_rating(average: f64, total: i64, score: i32) -> (f64, i64) {
    let next_total = total + 1;
    let next_average = (average * total as f64 + f64::from(score)) / next_total as f64;
    (next_average, next_total)
}

#[derive(Clone)]
pub struct RatingService {
    pool: DatabaseConnection,
}

impl RatingService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn rate_establishment(
        &self,
        member_id: i64,
        req: CreateRatingRequest,
    ) -> AppResult<RatingResponse> {
        if !(1..=5).contains(&req.score) {
            return Err(AppError::ValidationError(
                "Score must be between 1 and 5".into(),
            ));
        }

        let v = voucher::Entity::find_by_id(req.voucher_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Voucher not found".into()))?;
        if v.member_id != member_id {
            return Err(AppError::Forbidden);
        }
        if v.status != VoucherStatus::Used {
            return Err(AppError::ValidationError("Voucher not redeemed yet".into()));
        }

        let txn = self.pool.begin().await?;
        let establishment = est::Entity::find_by_id(v.establishment_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Establishment not found".into()))?;
        let (average_rating, total_ratings) = fold_rating(
            establishment.average_rating,
            establishment.total_ratings,
            req.score,
        );

        let now = Utc::now();
        let recorded = rating::Entity::insert(rating::ActiveModel {
            establishment_id: Set(establishment.id),
            member_id: Set(member_id),
            voucher_id: Set(v.id),
            score: Set(req.score),
            comment: Set(req.comment.filter(|c| !c.trim().is_empty())),
            created_at: Set(now),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::column(rating::Column::VoucherId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;
        if recorded == 0 {
            return Err(AppError::Conflict("This voucher has already been rated".into()));
        }
        let created = rating::Entity::find()
            .filter(rating::Column::VoucherId.eq(v.id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(format!("Rating for voucher {} missing after insert", v.id))
            })?;

        let establishment_id = establishment.id;
        let mut am = establishment.into_active_model();
        am.average_rating = Set(average_rating);
        am.total_ratings = Set(total_ratings);
        am.updated_at = Set(now);
        am.update(&txn).await?;
        txn.commit().await?;

        log::info!(
            "Member {member_id} rated establishment {establishment_id} {} (avg {average_rating:.2} over {total_ratings})",
            req.score
        );
        Ok(RatingResponse::new(created, average_rating, total_ratings))
    }
}
