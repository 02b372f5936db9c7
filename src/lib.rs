//! Orangepay payment gateway for order-management hosts.
//!
//! The host registers the gateway once through [`registration::register`],
//! then calls the [`gateway::Gateway`] facade to start payments, issue
//! refunds and feed it payment notifications. All traffic to the Orangepay
//! API goes through [`orangepay::rest::OrangepayRestClient`].

pub mod gateway;
pub mod host;
pub mod orangepay;
pub mod registration;
pub mod settings;
pub mod webhook_server;

#[cfg(test)]
mod test_support;

pub use gateway::{Gateway, GatewayError, HostServices, PaymentRedirect, RefundOutcome, WebhookResponse};
pub use registration::{register, GatewayDescriptor, Registration};
