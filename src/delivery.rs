//! Wire format of the delivery API.
//!
//! Requests serialize with absent blocks omitted entirely. Responses parse permissively: unknown
//! keys are ignored, and a malformed entry in the prefetched mbox list does not fail the whole
//! response.
use std::{collections::BTreeMap, sync::Arc};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{shared_state::AuthenticationState, Error, Result};

/// Body of a delivery call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<VisitorIds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<Property>,
    pub prefetch: PrefetchRequest,
}

impl DeliveryRequest {
    /// Names of requested mboxes, in request order.
    pub fn mbox_names(&self) -> impl Iterator<Item = &str> {
        self.prefetch.mboxes.iter().map(|mbox| mbox.name.as_str())
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| Error::RequestSerialization(Arc::new(err)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tnt_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_party_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marketing_cloud_visitor_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub customer_ids: Vec<CustomerId>,
}

impl VisitorIds {
    pub fn is_empty(&self) -> bool {
        self.tnt_id.is_none()
            && self.third_party_id.is_none()
            && self.marketing_cloud_visitor_id.is_none()
            && self.customer_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerId {
    pub id: String,
    pub integration_code: String,
    pub authenticated_state: AuthenticationState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub channel: Channel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_platform: Option<MobilePlatform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<Application>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<Screen>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Mobile,
    Web,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlatformType {
    Android,
    Ios,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    Phone,
    Tablet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MobilePlatform {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    pub device_type: DeviceType,
    pub platform_type: PlatformType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrefetchRequest {
    pub mboxes: Vec<MboxRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MboxRequest {
    pub index: usize,
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profile_parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub purchased_product_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    Parsed(T),
    ParseFailed(Value),
}

impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// Deserialize any JSON value, keeping it only if it has the expected shape.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Parsed body of a delivery response.
///
/// Known fields holding a value of the wrong type read as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<ResponseIds>,
    #[serde(default, deserialize_with = "lenient")]
    pub edge_host: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub prefetch: Option<PrefetchResponse>,
}

impl DeliveryResponse {
    /// Parse a response body. Anything that is not a JSON object is a parse failure.
    pub fn from_slice(body: &[u8]) -> Result<DeliveryResponse> {
        let value: Value =
            serde_json::from_slice(body).map_err(|err| Error::ResponseParse(Arc::new(err)))?;
        if !value.is_object() {
            return Err(Error::ResponseParse(Arc::new(
                <serde_json::Error as serde::de::Error>::custom(
                    "delivery response is not a JSON object",
                ),
            )));
        }
        serde_json::from_value(value).map_err(|err| Error::ResponseParse(Arc::new(err)))
    }

    pub fn tnt_id(&self) -> Option<&str> {
        self.id.as_ref()?.tnt_id.as_deref()
    }

    pub fn edge_host(&self) -> Option<&str> {
        self.edge_host.as_deref()
    }

    /// Prefetched mbox entries, if the response has a prefetch section.
    pub fn mboxes(&self) -> Option<&[TryParse<MboxResponse>]> {
        self.prefetch.as_ref()?.mboxes.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseIds {
    #[serde(default, deserialize_with = "lenient")]
    pub tnt_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PrefetchResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub mboxes: Option<Vec<TryParse<MboxResponse>>>,
}

/// One prefetched mbox: its name plus opaque content.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MboxResponse {
    pub name: String,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}
