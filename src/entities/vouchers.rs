use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Stored voucher state. `expired` is never written; see [`Model::effective_status`].
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "used")]
    Used,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveVoucherStatus {
    Pending,
    Used,
    Expired,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub code: String,
    pub member_id: i64,
    pub establishment_id: i64,
    pub partner_id: i64,
    pub business_id: i64,
    pub status: VoucherStatus,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub rating_prompted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn effective_status(&self, now: DateTime<Utc>) -> EffectiveVoucherStatus {
        match self.status {
            VoucherStatus::Used => EffectiveVoucherStatus::Used,
            VoucherStatus::Pending if self.expires_at <= now => EffectiveVoucherStatus::Expired,
            VoucherStatus::Pending => EffectiveVoucherStatus::Pending,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
