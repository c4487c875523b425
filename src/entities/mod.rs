pub mod coupons;
pub mod establishments;
pub mod member_partners;
pub mod partner_links;
pub mod ratings;
pub mod subscriptions;
pub mod used_coupons;
pub mod voucher_cooldowns;
pub mod vouchers;

pub use coupons as coupon_entity;
pub use establishments as establishment_entity;
pub use member_partners as member_partner_entity;
pub use partner_links as partner_link_entity;
pub use ratings as rating_entity;
pub use subscriptions as subscription_entity;
pub use used_coupons as used_coupon_entity;
pub use voucher_cooldowns as voucher_cooldown_entity;
pub use vouchers as voucher_entity;

pub use coupons::CouponStatus;
pub use subscriptions::SubscriptionStatus;
pub use vouchers::{EffectiveVoucherStatus, VoucherStatus};
