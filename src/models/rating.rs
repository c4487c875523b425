use crate::entities::rating_entity as rating;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRatingRequest {
    pub voucher_id: i64,
    #[schema(minimum = 1, maximum = 5)]
    pub score: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct RatingResponse {
    pub id: i64,
    pub establishment_id: i64,
    pub voucher_id: i64,
    pub score: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub average_rating: f64,
    pub total_ratings: i64,
}

impl RatingResponse {
    pub fn new(m: rating::Model, average_rating: f64, total_ratings: i64) -> Self {
        Self {
            id: m.id,
            establishment_id: m.establishment_id,
            voucher_id: m.voucher_id,
            score: m.score,
            comment: m.comment,
            created_at: m.created_at,
            average_rating,
            total_ratings,
        }
    }
}
