pub mod code_generator;
pub mod jwt;

pub use code_generator::{VOUCHER_CODE_LEN, generate_voucher_code};
pub use jwt::*;
