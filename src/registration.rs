//! Entry point for the host's extension discovery.
//!
//! The host calls [`register`] once at startup and keeps the returned
//! [`Registration`] for the lifetime of the process.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::gateway::{Gateway, GatewayError, HostServices};
use crate::orangepay::{GATEWAY_ID, WEBHOOK_HOOK};
use crate::settings::GatewaySettings;
use crate::webhook_server::WEBHOOK_PATH;

pub const ABOUT_URL: &str = "https://orange-pay.com/about";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayFeature {
    Products,
    Refunds,
}

/// Static description of what this gateway offers the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayDescriptor {
    pub id: &'static str,
    pub method_title: &'static str,
    pub method_description: &'static str,
    pub order_button_text: &'static str,
    pub about_url: &'static str,
    pub has_fields: bool,
    pub supports: &'static [GatewayFeature],
    pub webhook_hook: &'static str,
    pub webhook_path: &'static str,
    pub enabled: bool,
}

pub struct Registration {
    pub descriptor: GatewayDescriptor,
    pub gateway: Arc<Gateway>,
}

impl Gateway {
    pub fn descriptor(&self) -> GatewayDescriptor {
        GatewayDescriptor {
            id: GATEWAY_ID,
            method_title: "Orangepay",
            method_description: "Redirects customers to Orangepay to enter their payment information.",
            order_button_text: "Proceed to Orangepay",
            about_url: ABOUT_URL,
            has_fields: false,
            supports: &[GatewayFeature::Products, GatewayFeature::Refunds],
            webhook_hook: WEBHOOK_HOOK,
            webhook_path: WEBHOOK_PATH,
            enabled: self.is_enabled(),
        }
    }
}

pub fn register(settings: GatewaySettings, host: HostServices) -> Result<Registration, GatewayError> {
    let gateway = Arc::new(Gateway::new(settings, host)?);
    let descriptor = gateway.descriptor();
    info!(
        gateway = descriptor.id,
        enabled = descriptor.enabled,
        notify_url = %gateway.notify_url(),
        "Payment gateway registered"
    );
    Ok(Registration { descriptor, gateway })
}
