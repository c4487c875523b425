//! Recurring background jobs. Call `spawn_all` once during startup.

use crate::services::VoucherService;
use chrono::Utc;

const RATING_REMINDER_INTERVAL_SECS: u64 = 3600;

/// Detaches every background task via `tokio::spawn`; does not block.
///
/// Each run is idempotent, so overlapping deployments are harmless.
pub fn spawn_all(voucher_service: VoucherService) {
    // rating reminders (hourly)
    {
        let svc = voucher_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.stamp_due_rating_reminders(Utc::now()).await {
                    Ok(n) if n > 0 => log::info!("Rating reminders stamped: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to stamp rating reminders: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(
                    RATING_REMINDER_INTERVAL_SECS,
                ))
                .await;
            }
        });
    }
}
