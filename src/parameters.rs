//! Caller-facing prefetch request objects.
//!
//! These deserialize from the event data the host delivers with a prefetch request, and can be
//! constructed directly when driving the extension from Rust.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Order details attached to an mbox request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOrder {
    pub id: String,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub purchased_product_ids: Vec<String>,
}

/// Product details attached to an mbox request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetProduct {
    pub product_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
}

/// Parameters for one mbox, or for a whole batch when passed as global parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetParameters {
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub profile_parameters: HashMap<String, String>,
    #[serde(default)]
    pub order: Option<TargetOrder>,
    #[serde(default)]
    pub product: Option<TargetProduct>,
}

impl TargetParameters {
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn profile_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.profile_parameters.insert(key.into(), value.into());
        self
    }

    pub fn order(mut self, order: TargetOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn product(mut self, product: TargetProduct) -> Self {
        self.product = Some(product);
        self
    }
}

/// A request to prefetch content for one mbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchMbox {
    pub name: String,
    #[serde(default)]
    pub target_parameters: Option<TargetParameters>,
}

impl PrefetchMbox {
    pub fn new(name: impl Into<String>) -> Self {
        PrefetchMbox {
            name: name.into(),
            target_parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: TargetParameters) -> Self {
        self.target_parameters = Some(parameters);
        self
    }
}
