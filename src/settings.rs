use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::host::{Order, OrderStatus};

/// Currencies the processor settles in unless the operator narrows the list.
pub const DEFAULT_SUPPORTED_CURRENCIES: [&str; 10] = [
    "EUR", "USD", "RUB", "CZK", "HUF", "PLN", "CHF", "AUD", "GBP", "THB",
];

/// Bearer token for the Orangepay API. Formatting never reveals the value.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for the Authorization header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

impl fmt::Display for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GatewaySettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_email: Option<String>,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_token: ApiToken,
    #[serde(default)]
    pub testmode: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_supported_currencies")]
    pub supported_currencies: BTreeSet<String>,
    #[serde(default = "default_charge_timeout", with = "humantime_serde")]
    pub charge_timeout: Duration,
    #[serde(default = "default_refund_timeout", with = "humantime_serde")]
    pub refund_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            title: default_title(),
            description: default_description(),
            email: String::new(),
            receiver_email: None,
            api_url: String::new(),
            api_token: ApiToken::default(),
            testmode: false,
            debug: false,
            supported_currencies: default_supported_currencies(),
            charge_timeout: default_charge_timeout(),
            refund_timeout: default_refund_timeout(),
        }
    }
}

impl GatewaySettings {
    /// Falls back to the merchant email when no receiver is configured.
    pub fn receiver_email(&self) -> &str {
        self.receiver_email.as_deref().unwrap_or(&self.email)
    }

    pub fn supports_currency(&self, currency: &str) -> bool {
        self.supported_currencies.contains(currency)
    }
}

/// Local stand-in for the host, used by the sandbox binary.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SandboxSettings {
    #[serde(default = "default_sandbox_currency")]
    pub currency: String,
    #[serde(default = "default_sandbox_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub orders: Vec<SandboxOrder>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            currency: default_sandbox_currency(),
            base_url: default_sandbox_base_url(),
            orders: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SandboxOrder {
    pub id: u64,
    pub key: String,
    pub total: Decimal,
    #[serde(default)]
    pub billing_email: String,
}

impl From<&SandboxOrder> for Order {
    fn from(o: &SandboxOrder) -> Self {
        Order {
            id: o.id.into(),
            key: o.key.clone(),
            number: o.id.to_string(),
            status: OrderStatus::Pending,
            total: o.total,
            billing_email: o.billing_email.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewaySettings,
    pub server_port: u16,
    #[serde(default)]
    pub sandbox: SandboxSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewaySettings::default(),
            server_port: 8080,
            sandbox: SandboxSettings::default(),
        }
    }
}

impl Config {
    /// Load from `config.toml` in the working directory (if present) and
    /// environment variables. Environment variables override file values.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from("config.toml")
    }

    /// Supported env keys: ORANGEPAY_ENABLED, ORANGEPAY_TITLE,
    /// ORANGEPAY_DESCRIPTION, ORANGEPAY_EMAIL, ORANGEPAY_RECEIVER_EMAIL,
    /// ORANGEPAY_API_URL, ORANGEPAY_API_TOKEN, ORANGEPAY_TESTMODE,
    /// ORANGEPAY_DEBUG, ORANGEPAY_SUPPORTED_CURRENCIES (comma separated),
    /// ORANGEPAY_CHARGE_TIMEOUT, ORANGEPAY_REFUND_TIMEOUT, SERVER_PORT
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        let mut fig = Figment::from(Serialized::defaults(Config::default()));
        if path.as_ref().exists() {
            fig = fig.merge(Toml::file(path.as_ref()));
        }
        let mut cfg: Config = fig.extract()?;

        let gw = &mut cfg.gateway;
        if let Ok(v) = std::env::var("ORANGEPAY_ENABLED") {
            gw.enabled = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("ORANGEPAY_TITLE") {
            gw.title = v;
        }
        if let Ok(v) = std::env::var("ORANGEPAY_DESCRIPTION") {
            gw.description = v;
        }
        if let Ok(v) = std::env::var("ORANGEPAY_EMAIL") {
            gw.email = v;
        }
        if let Ok(v) = std::env::var("ORANGEPAY_RECEIVER_EMAIL") {
            gw.receiver_email = Some(v);
        }
        if let Ok(v) = std::env::var("ORANGEPAY_API_URL") {
            gw.api_url = v;
        }
        if let Ok(v) = std::env::var("ORANGEPAY_API_TOKEN") {
            gw.api_token = ApiToken::new(v);
        }
        if let Ok(v) = std::env::var("ORANGEPAY_TESTMODE") {
            gw.testmode = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("ORANGEPAY_DEBUG") {
            gw.debug = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("ORANGEPAY_SUPPORTED_CURRENCIES") {
            gw.supported_currencies = v
                .split(',')
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("ORANGEPAY_CHARGE_TIMEOUT") {
            gw.charge_timeout = parse_duration_env(&v, gw.charge_timeout);
        }
        if let Ok(v) = std::env::var("ORANGEPAY_REFUND_TIMEOUT") {
            gw.refund_timeout = parse_duration_env(&v, gw.refund_timeout);
        }
        if let Ok(v) = std::env::var("SERVER_PORT") {
            cfg.server_port = v.parse().unwrap_or(cfg.server_port);
        }

        Ok(cfg)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}

fn parse_duration_env(value: &str, current: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(current)
}

fn default_enabled() -> bool {
    true
}

fn default_title() -> String {
    "Orangepay".to_string()
}

fn default_description() -> String {
    "Pay via Orangepay with your credit card.".to_string()
}

fn default_supported_currencies() -> BTreeSet<String> {
    DEFAULT_SUPPORTED_CURRENCIES.iter().map(|c| c.to_string()).collect()
}

fn default_charge_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_refund_timeout() -> Duration {
    Duration::from_secs(300) // refunds settle slowly upstream
}

fn default_sandbox_currency() -> String {
    "EUR".to_string()
}

fn default_sandbox_base_url() -> String {
    "http://localhost:8080".to_string()
}
