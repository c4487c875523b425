pub mod payment_gateway;
pub mod stripe_gateway;
pub mod webhook;

pub use payment_gateway::*;
pub use stripe_gateway::StripeGateway;
pub use webhook::*;
