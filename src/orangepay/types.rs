// Orangepay request DTOs, response envelopes and field helpers

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use url::Url;

use super::errors::MissingField;

/// Length budget for free-text fields, measured percent-encoded.
pub const FIELD_LIMIT: usize = 127;
const ELLIPSIS: &str = "...";

// RFC 3986 unreserved characters stay literal; everything else is escaped.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encoded_len(s: &str) -> usize {
    utf8_percent_encode(s, UNRESERVED).map(str::len).sum()
}

/// Cut `value` so that its percent-encoded form fits in `limit` bytes.
///
/// Values already within the limit are returned untouched. Longer values keep
/// the longest run of whole characters whose encoded length leaves room for a
/// trailing `...`, so a multi-byte character or an escape triplet is never
/// split.
pub fn limit_length(value: &str, limit: usize) -> Cow<'_, str> {
    if encoded_len(value) <= limit {
        return Cow::Borrowed(value);
    }

    let budget = limit.saturating_sub(ELLIPSIS.len());
    let mut used = 0;
    let mut end = 0;
    let mut buf = [0u8; 4];
    for (idx, ch) in value.char_indices() {
        let width = encoded_len(ch.encode_utf8(&mut buf));
        if used + width > budget {
            break;
        }
        used += width;
        end = idx + ch.len_utf8();
    }

    Cow::Owned(format!("{}{}", &value[..end], ELLIPSIS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayMethod {
    Card,
}

/// Body of `POST /charges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub reference_id: String,
    pub pay_method: PayMethod,
    pub email: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub return_success_url: Url,
    pub return_error_url: Url,
    pub callback_url: Url,
}

/// Body of `POST /refunds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub charge_id: String,
    pub amount: Decimal,
}

// Response envelopes. Every field is optional: the API shape is trusted but
// a missing key must surface as `MissingField`, not as a decode failure.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    pub data: Option<EnvelopeData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvelopeData {
    pub links: Option<Links>,
    pub charge: Option<Charge>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Links {
    pub redirect_uri: Option<String>,
}

// Ids are read as strings or numbers; any other shape counts as absent, so a
// stray value in a field nobody reads cannot fail the whole envelope.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Charge {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    pub attributes: Option<ChargeAttributes>,
    pub included: Option<Vec<IncludedResource>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChargeAttributes {
    pub status: Option<String>,
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IncludedResource {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
}

pub const STATUS_SUCCESSFUL: &str = "successful";
const KIND_REFUND: &str = "refund";

impl Charge {
    pub fn status(&self) -> Option<&str> {
        self.attributes.as_ref()?.status.as_deref()
    }

    pub fn is_successful(&self) -> bool {
        self.status() == Some(STATUS_SUCCESSFUL)
    }

    /// Id of the first included resource of type `refund`.
    pub fn refund_id(&self) -> Option<&str> {
        self.included
            .as_deref()?
            .iter()
            .find(|r| r.kind.as_deref() == Some(KIND_REFUND))?
            .id
            .as_deref()
    }
}

/// Turns an absent optional into a [`MissingField`] naming the path.
pub trait Require<T> {
    fn require(self, path: &'static str) -> Result<T, MissingField>;
}

impl<T> Require<T> for Option<T> {
    fn require(self, path: &'static str) -> Result<T, MissingField> {
        self.ok_or(MissingField(path))
    }
}

impl Envelope {
    pub fn redirect_uri(self) -> Result<String, MissingField> {
        self.data
            .require("data")?
            .links
            .require("data.links")?
            .redirect_uri
            .require("data.links.redirect_uri")
    }

    pub fn charge(self) -> Result<Charge, MissingField> {
        self.data.require("data")?.charge.require("data.charge")
    }

    /// `data.charge.attributes.reference_id` together with the charge id.
    pub fn charge_reference(self) -> Result<(String, Option<String>), MissingField> {
        let charge = self.charge()?;
        let reference = charge
            .attributes
            .require("data.charge.attributes")?
            .reference_id
            .require("data.charge.attributes.reference_id")?;
        Ok((reference, charge.id))
    }
}
