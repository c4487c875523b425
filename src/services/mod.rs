pub mod coupon_service;
pub mod rating_service;
pub mod reconciler_service;
pub mod subscription_service;
pub mod voucher_service;

pub use coupon_service::*;
pub use rating_service::*;
pub use reconciler_service::*;
pub use subscription_service::*;
pub use voucher_service::*;
