// Orangepay REST client
// Three endpoints: create charge, fetch charge, create refund. One attempt each.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

use crate::host::Order;
use crate::orangepay::errors::ApiError;
use crate::orangepay::log::RequestLog;
use crate::orangepay::types::{
    limit_length, Charge, ChargeRequest, Envelope, PayMethod, RefundRequest, Require, FIELD_LIMIT,
};
use crate::settings::GatewaySettings;

/// Host-supplied context for one checkout.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub currency: String,
    pub return_url: Url,
    pub cancel_url: Url,
}

#[derive(Clone)]
pub struct OrangepayRestClient {
    pub(crate) http: Client,
    pub(crate) settings: Arc<GatewaySettings>,
    // None until an API URL is configured; calls then fail with `Endpoint`.
    pub(crate) endpoint: Option<Url>,
    pub(crate) notify_url: Url,
    pub(crate) log: RequestLog,
}

impl OrangepayRestClient {
    pub fn new(
        http: Client,
        settings: Arc<GatewaySettings>,
        notify_url: Url,
        log: RequestLog,
    ) -> Result<Self, ApiError> {
        let endpoint = match settings.api_url.trim() {
            "" => None,
            api_url => {
                let endpoint = Url::parse(api_url)
                    .map_err(|e| ApiError::Endpoint(format!("{api_url:?}: {e}")))?;
                if endpoint.cannot_be_a_base() {
                    return Err(ApiError::Endpoint(format!("{endpoint} cannot carry a path")));
                }
                Some(endpoint)
            }
        };
        Ok(Self {
            http,
            settings,
            endpoint,
            notify_url,
            log,
        })
    }

    pub fn notify_url(&self) -> &Url {
        &self.notify_url
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    fn endpoint(&self) -> Result<&Url, ApiError> {
        self.endpoint
            .as_ref()
            .ok_or_else(|| ApiError::Endpoint("api_url is not configured".to_string()))
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.endpoint()?.clone();
        // Checked in `new`: the endpoint can be a base.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn apply_common_headers(&self, req: RequestBuilder, timeout: Duration) -> RequestBuilder {
        req.bearer_auth(self.settings.api_token.expose())
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
    }

    // Any body that parses as an envelope is handed back, whatever the
    // status; callers pull the field they need out of it. A non-2xx answer
    // without `data` is reported as a status error.
    async fn send(&self, op: &'static str, req: RequestBuilder) -> Result<Envelope, ApiError> {
        let resp = req.send().await.map_err(|e| {
            self.log.failure(op, &e);
            ApiError::Http(e.to_string())
        })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| ApiError::Http(e.to_string()))?;
        self.log.response(op, Some(status.as_u16()), &text);

        match serde_json::from_str::<Envelope>(&text) {
            Ok(env) if status.is_success() || env.data.is_some() => Ok(env),
            Ok(_) => Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            }),
            Err(e) if status.is_success() => Err(ApiError::Decode(e.to_string())),
            Err(_) => Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            }),
        }
    }

    /// Charge payload for `order`. The email is cut to the field budget.
    pub fn charge_request(&self, order: &Order, checkout: &Checkout) -> ChargeRequest {
        let mut return_success_url = checkout.return_url.clone();
        return_success_url
            .query_pairs_mut()
            .append_pair("utm_nooverride", "1");

        ChargeRequest {
            reference_id: order.key.clone(),
            pay_method: PayMethod::Card,
            email: limit_length(&order.billing_email, FIELD_LIMIT).into_owned(),
            description: format!("Payment for order #{}", order.id),
            amount: order.total,
            currency: checkout.currency.clone(),
            return_success_url,
            return_error_url: checkout.cancel_url.clone(),
            callback_url: self.notify_url.clone(),
        }
    }

    // POST /charges
    #[instrument(skip(self, order, request), fields(method = "POST", path = "/charges", order_id = %order.id))]
    pub async fn create_charge(
        &self,
        order: &Order,
        request: &ChargeRequest,
    ) -> Result<Url, ApiError> {
        self.log.request("create_charge", &order.number, request);
        info!(
            target: "orangepay",
            amount = %request.amount,
            currency = %request.currency,
            "orangepay request"
        );

        let req = self.http.post(self.url(&["charges"])?).json(request);
        let req = self.apply_common_headers(req, self.settings.charge_timeout);
        let redirect = self.send("create_charge", req).await?.redirect_uri()?;

        // Absolute URIs pass through; a relative one is taken against the API host.
        self.endpoint()?
            .join(&redirect)
            .map_err(|e| ApiError::Decode(format!("redirect_uri {redirect:?}: {e}")))
    }

    // GET /charges/{order_key}
    #[instrument(skip(self), fields(method = "GET", path = "/charges/{key}"))]
    pub async fn fetch_charge(&self, order_key: &str) -> Result<Charge, ApiError> {
        let req = self.http.get(self.url(&["charges", order_key])?);
        let req = self.apply_common_headers(req, self.settings.charge_timeout);
        Ok(self.send("fetch_charge", req).await?.charge()?)
    }

    // POST /refunds, after looking up the charge id for the order
    #[instrument(skip(self, order, amount), fields(method = "POST", path = "/refunds", order_id = %order.id, amount = %amount))]
    pub async fn create_refund(&self, order: &Order, amount: Decimal) -> Result<String, ApiError> {
        let charge = self.fetch_charge(&order.key).await.inspect_err(|e| {
            warn!(target: "orangepay", error = %e, "charge lookup before refund failed");
        })?;

        let request = RefundRequest {
            charge_id: charge.id.require("data.charge.id")?,
            amount,
        };
        self.log.request("create_refund", &order.number, &request);

        let req = self.http.post(self.url(&["refunds"])?).json(&request);
        let req = self.apply_common_headers(req, self.settings.refund_timeout);
        let charge = self.send("create_refund", req).await?.charge()?;

        Ok(charge
            .refund_id()
            .map(str::to_string)
            .require("data.charge.included[type=refund].id")?)
    }
}
