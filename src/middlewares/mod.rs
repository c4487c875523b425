pub mod auth;
pub mod cors;

pub use auth::{SESSION_HEADER, SessionMiddleware, session_claims};
pub use cors::create_cors;
