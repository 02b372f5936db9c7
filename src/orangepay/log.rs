// Debug request/response log, switched on by the gateway's debug setting

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Keys whose values are replaced before anything reaches the log.
const MASKED_KEYS: [&str; 2] = ["api_token", "authorization"];
const MASK: &str = "***";

/// Request/response recorder handed to the gateway and the REST client.
///
/// The flag is fixed at construction; a disabled log costs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLog {
    enabled: bool,
}

impl RequestLog {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn request<T: Serialize>(&self, op: &'static str, order_number: &str, body: &T) {
        if !self.enabled {
            return;
        }
        let params = serde_json::to_value(body)
            .map(mask_secrets)
            .map(|v| v.to_string())
            .unwrap_or_else(|e| format!("<unserializable: {e}>"));
        debug!(
            target: "orangepay",
            op = op,
            order_number = %order_number,
            authorization = "Bearer ***",
            params = %params,
            "request parameters"
        );
    }

    pub fn response(&self, op: &'static str, status: Option<u16>, body: &str) {
        if !self.enabled {
            return;
        }
        let body = match serde_json::from_str::<Value>(body) {
            Ok(v) => mask_secrets(v).to_string(),
            Err(_) => body.to_string(),
        };
        debug!(target: "orangepay", op = op, status = ?status, body = %body, "response");
    }

    pub fn failure(&self, op: &'static str, error: &dyn std::fmt::Display) {
        if !self.enabled {
            return;
        }
        debug!(target: "orangepay", op = op, error = %error, "request failed");
    }
}

/// Replace every value stored under a sensitive key, at any depth.
pub fn mask_secrets(mut value: Value) -> Value {
    mask_in_place(&mut value);
    value
}

fn mask_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                if MASKED_KEYS.contains(&k.to_ascii_lowercase().as_str()) {
                    *v = Value::String(MASK.to_string());
                } else {
                    mask_in_place(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_in_place),
        _ => {}
    }
}
