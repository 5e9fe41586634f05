//! Admission Webhook
//!
//! HTTP surface of the admission validator: validating and mutating
//! endpoints plus health and metrics.

pub mod routes;
pub mod server;

pub use routes::WebhookRouter;
pub use server::WebhookServer;
