//! Typed views of the shared states published by other host components, and the shared state this
//! crate publishes in return.
//!
//! The host hands shared states over as loosely-typed JSON documents. Each snapshot here is a
//! permissive parse of one of them: unknown keys are ignored, and missing keys read as `None`.
//! Whether a snapshot has been *resolved* at all is expressed by the caller holding an
//! `Option<Snapshot>`; a resolved snapshot may still be structurally empty.
use std::{collections::HashMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Upstream shared states required before a delivery request can be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedStateName {
    Configuration,
    Lifecycle,
    Identity,
}

impl SharedStateName {
    /// Name under which the host publishes this shared state.
    pub fn extension_name(self) -> &'static str {
        match self {
            SharedStateName::Configuration => "com.adobe.module.configuration",
            SharedStateName::Lifecycle => "com.adobe.module.lifecycle",
            SharedStateName::Identity => "com.adobe.module.identity",
        }
    }
}

impl fmt::Display for SharedStateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SharedStateName::Configuration => "configuration",
            SharedStateName::Lifecycle => "lifecycle",
            SharedStateName::Identity => "identity",
        })
    }
}

/// Global privacy status from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PrivacyStatus {
    OptedIn,
    OptedOut,
    /// `optunknown` or any unrecognized value.
    Unknown,
}

impl PrivacyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PrivacyStatus::OptedIn => "optedin",
            PrivacyStatus::OptedOut => "optedout",
            PrivacyStatus::Unknown => "optunknown",
        }
    }
}

impl From<String> for PrivacyStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "optedin" => PrivacyStatus::OptedIn,
            "optedout" => PrivacyStatus::OptedOut,
            _ => PrivacyStatus::Unknown,
        }
    }
}

/// Configuration shared state, in the host's flat dotted-key form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigurationSnapshot {
    #[serde(rename = "global.privacy")]
    pub privacy: Option<PrivacyStatus>,
    #[serde(rename = "target.clientCode")]
    pub client_code: Option<String>,
    /// Network timeout in seconds.
    #[serde(rename = "target.timeout")]
    pub timeout: Option<f64>,
    #[serde(rename = "target.environmentId")]
    pub environment_id: Option<i64>,
    #[serde(rename = "target.propertyToken")]
    pub property_token: Option<String>,
    /// Session timeout in seconds.
    #[serde(rename = "target.sessionTimeout")]
    pub session_timeout: Option<i32>,
    #[serde(rename = "target.server")]
    pub server: Option<String>,
    #[serde(rename = "target.previewEnabled")]
    pub preview_enabled: Option<bool>,
}

impl ConfigurationSnapshot {
    /// Timeout applied when `target.timeout` is absent, not positive or too large for a `Duration`.
    pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(2);

    /// Client code, if present and non-empty.
    pub fn client_code(&self) -> Option<&str> {
        self.client_code.as_deref().filter(|code| !code.is_empty())
    }

    /// Connect and read timeout for delivery calls.
    pub fn network_timeout(&self) -> Duration {
        self.timeout
            .filter(|t| *t > 0.0)
            .and_then(|t| Duration::try_from_secs_f64(t).ok())
            .unwrap_or(Self::DEFAULT_NETWORK_TIMEOUT)
    }

    /// Configured server override, if non-empty.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref().filter(|s| !s.is_empty())
    }

    pub fn property_token(&self) -> Option<&str> {
        self.property_token.as_deref().filter(|s| !s.is_empty())
    }
}

/// Authentication state attached to a customer visitor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(from = "i64", rename_all = "snake_case")]
pub enum AuthenticationState {
    #[default]
    Unknown,
    Authenticated,
    LoggedOut,
}

impl From<i64> for AuthenticationState {
    fn from(value: i64) -> Self {
        match value {
            1 => AuthenticationState::Authenticated,
            2 => AuthenticationState::LoggedOut,
            _ => AuthenticationState::Unknown,
        }
    }
}

/// A customer id synced through the identity component.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VisitorId {
    #[serde(rename = "id.type")]
    pub id_type: String,
    #[serde(rename = "id")]
    pub id: Option<String>,
    #[serde(rename = "authentication.state", default)]
    pub authentication_state: AuthenticationState,
}

/// Identity shared state.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IdentitySnapshot {
    /// Experience Cloud visitor id.
    #[serde(rename = "mid")]
    pub marketing_cloud_id: Option<String>,
    #[serde(rename = "visitoridslist", default)]
    pub visitor_ids: Vec<VisitorId>,
}

/// Lifecycle shared state.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LifecycleSnapshot {
    #[serde(rename = "lifecyclecontextdata", default)]
    pub context_data: HashMap<String, String>,
}

impl LifecycleSnapshot {
    fn get(&self, key: &str) -> Option<&str> {
        self.context_data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn app_id(&self) -> Option<&str> {
        self.get("appid")
    }

    pub fn device_name(&self) -> Option<&str> {
        self.get("devicename")
    }

    pub fn os_version(&self) -> Option<&str> {
        self.get("osversion")
    }

    pub fn locale(&self) -> Option<&str> {
        self.get("locale")
    }

    /// Screen resolution as `(width, height)`, parsed from `WxH`.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        let (w, h) = self.get("resolution")?.split_once('x')?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

/// Upstream snapshots as resolved for a single event. `None` means "not yet resolved".
#[derive(Debug, Clone, Default)]
pub struct SharedStates {
    pub configuration: Option<ConfigurationSnapshot>,
    pub lifecycle: Option<LifecycleSnapshot>,
    pub identity: Option<IdentitySnapshot>,
}

/// The shared state published after every delivery cycle. Absent identifiers are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedStateDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tnt_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_party_id: Option<String>,
}

impl SharedStateDelta {
    /// Render as a JSON object for the host.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        if let Some(tnt_id) = &self.tnt_id {
            map.insert("tntId".to_owned(), tnt_id.clone().into());
        }
        if let Some(third_party_id) = &self.third_party_id {
            map.insert("thirdPartyId".to_owned(), third_party_id.clone().into());
        }
        map
    }
}
