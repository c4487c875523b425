pub mod common;
pub mod coupon;
pub mod pagination;
pub mod rating;
pub mod subscription;
pub mod voucher;

pub use common::*;
pub use coupon::*;
pub use pagination::*;
pub use rating::*;
pub use subscription::*;
pub use voucher::*;
