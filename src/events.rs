//! Events exchanged with the host event bus, and the host runtime the extension talks back to.
use derive_more::From;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    delivery::TryParse,
    parameters::{PrefetchMbox, TargetParameters},
    shared_state::SharedStateName,
};

/// Event data key carrying the error of a failed prefetch.
pub const PREFETCH_ERROR_KEY: &str = "prefetcherror";
pub const TNT_ID_KEY: &str = "tntid";
pub const THIRD_PARTY_ID_KEY: &str = "thirdpartyid";

/// Requests the extension handles.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetRequest {
    Prefetch(PrefetchRequestEvent),
    SetThirdPartyId(String),
    ClearPrefetchCache,
    RequestIdentity,
    ResetIdentity,
}

impl From<PrefetchRequestEvent> for TargetRequest {
    fn from(value: PrefetchRequestEvent) -> Self {
        TargetRequest::Prefetch(value)
    }
}

/// Data of a prefetch request event.
///
/// Entries that fail to decode are dropped, matching how the host delivers partially valid lists.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PrefetchRequestEvent {
    #[serde(rename = "prefetch", default)]
    pub mboxes: Option<Vec<TryParse<PrefetchMbox>>>,
    #[serde(rename = "targetparams", default)]
    pub parameters: Option<TargetParameters>,
}

impl PrefetchRequestEvent {
    pub fn new(mboxes: Vec<PrefetchMbox>, parameters: Option<TargetParameters>) -> Self {
        PrefetchRequestEvent {
            mboxes: Some(mboxes.into_iter().map(TryParse::Parsed).collect()),
            parameters,
        }
    }

    /// Successfully decoded mbox requests, in order.
    pub fn decoded_mboxes(&self) -> Vec<PrefetchMbox> {
        self.mboxes
            .iter()
            .flatten()
            .filter_map(|mbox| Option::<&PrefetchMbox>::from(mbox).cloned())
            .collect()
    }
}

/// Answer to a prefetch request. `error` is `None` on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchResponseEvent {
    pub error: Option<String>,
}

/// Answer to an identity request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityResponseEvent {
    pub tnt_id: Option<String>,
    pub third_party_id: Option<String>,
}

/// Events the extension dispatches back to the host.
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum ResponseEvent {
    Prefetch(PrefetchResponseEvent),
    Identity(IdentityResponseEvent),
}

impl ResponseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseEvent::Prefetch(_) => "prefetchRespond",
            ResponseEvent::Identity(_) => "TargetResponseIdentity",
        }
    }

    /// Event data in the host's dictionary form. Absent values are omitted.
    pub fn data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        let mut put = |key: &str, value: &Option<String>| {
            if let Some(value) = value {
                data.insert(key.to_owned(), Value::from(value.as_str()));
            }
        };
        match self {
            ResponseEvent::Prefetch(event) => put(PREFETCH_ERROR_KEY, &event.error),
            ResponseEvent::Identity(event) => {
                put(TNT_ID_KEY, &event.tnt_id);
                put(THIRD_PARTY_ID_KEY, &event.third_party_id);
            }
        }
        data
    }
}

/// The host side of the extension: shared state lookup, event dispatch and shared state
/// publication.
pub trait ExtensionRuntime {
    /// Latest resolved shared state published under `name`, or `None` if it is still pending.
    fn shared_state(&self, name: SharedStateName) -> Option<Value>;

    fn dispatch(&self, event: ResponseEvent);

    fn create_shared_state(&self, state: Map<String, Value>);
}

/// Runtime that never resolves shared state and drops everything sent to it.
pub struct NoopRuntime;

impl ExtensionRuntime for NoopRuntime {
    fn shared_state(&self, _name: SharedStateName) -> Option<Value> {
        None
    }

    fn dispatch(&self, _event: ResponseEvent) {}

    fn create_shared_state(&self, _state: Map<String, Value>) {}
}
