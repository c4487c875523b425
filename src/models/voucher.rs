use crate::entities::{EffectiveVoucherStatus, voucher_entity as voucher};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IssueVoucherRequest {
    pub establishment_id: i64,
}

#[derive(Debug, Serialize, Deserialize, IntoParams)]
pub struct CooldownQuery {
    pub establishment_id: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedeemVoucherRequest {
    #[schema(example = "K7Q2ZD")]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CooldownStatus {
    pub eligible: bool,
    pub cooldown_hours: i32,
    pub last_generated_at: Option<DateTime<Utc>>,
    /// `last_generated_at + cooldown`; only set while the cooldown is running.
    pub next_available_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct VoucherResponse {
    pub id: i64,
    pub code: String,
    pub member_id: i64,
    pub establishment_id: i64,
    pub partner_id: i64,
    pub business_id: i64,
    pub status: EffectiveVoucherStatus,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl VoucherResponse {
    pub fn from_model(m: voucher::Model, now: DateTime<Utc>) -> Self {
        let status = m.effective_status(now);
        Self {
            id: m.id,
            code: m.code,
            member_id: m.member_id,
            establishment_id: m.establishment_id,
            partner_id: m.partner_id,
            business_id: m.business_id,
            status,
            generated_at: m.generated_at,
            expires_at: m.expires_at,
            used_at: m.used_at,
        }
    }
}
