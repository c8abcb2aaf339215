//! Client-side mbox prefetching: session state, request building and response reconciliation for
//! a remote decisioning service.
//!
//! # Overview
//!
//! A [`TargetExtension`] receives request events from the host (see [`TargetRequest`]), gathers the
//! shared states it depends on through an [`ExtensionRuntime`], and performs delivery calls to
//! prefetch content for named locations ("mboxes"). Responses are reconciled into
//! [`SessionState`] (visitor id, edge host, session activity) and a [`PrefetchCache`] that only
//! ever grows by merging.
//!
//! The two halves of a delivery call are exposed as pure building blocks:
//! [`build_delivery_request`] turns snapshots into a [`DeliveryRequest`], and [`reconcile`] applies
//! a [`DeliveryResponse`] to state.
//!
//! Session state is written through to a [`DataStore`]. [`MemoryDataStore`] and
//! [`FileDataStore`] are provided; hosts usually plug in their own.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum, grouped by [`ErrorKind`]. The extension never
//! propagates errors across the event boundary: every failed prefetch is answered with a
//! [`PrefetchResponseEvent`] carrying the error message.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with the `mbox_prefetch`
//! target. Consider integrating a `log`-compatible logger implementation for better visibility
//! into delivery calls.

#![warn(rustdoc::missing_crate_level_docs)]

mod config;
mod data_store;
mod delivery;
mod error;
mod events;
mod extension;
mod parameters;
mod prefetch_cache;
mod reconciler;
mod request_builder;
mod session;
mod shared_state;
mod transport;

pub use config::ExtensionConfig;
pub use data_store::{DataStore, FileDataStore, MemoryDataStore};
pub use delivery::{
    Application, Channel, Context, CustomerId, DeliveryRequest, DeliveryResponse, DeviceType,
    MboxRequest, MboxResponse, MobilePlatform, Order, PlatformType, PrefetchRequest,
    PrefetchResponse, Product, Property, ResponseIds, Screen, TryParse, VisitorIds,
};
pub use error::{Error, ErrorKind, Result};
pub use events::{
    ExtensionRuntime, IdentityResponseEvent, NoopRuntime, PrefetchRequestEvent,
    PrefetchResponseEvent, ResponseEvent, TargetRequest, PREFETCH_ERROR_KEY, THIRD_PARTY_ID_KEY,
    TNT_ID_KEY,
};
pub use extension::TargetExtension;
pub use parameters::{PrefetchMbox, TargetOrder, TargetParameters, TargetProduct};
pub use prefetch_cache::PrefetchCache;
pub use reconciler::{reconcile, ReconcileOutcome, SUCCESS_STATUS};
pub use request_builder::{
    build_delivery_request, check_preconditions, delivery_url, merge_parameters, Preconditions,
};
pub use session::{SessionPhase, SessionSnapshot, SessionState, DEFAULT_SESSION_TIMEOUT};
pub use shared_state::{
    AuthenticationState, ConfigurationSnapshot, IdentitySnapshot, LifecycleSnapshot,
    PrivacyStatus, SharedStateDelta, SharedStateName, SharedStates, VisitorId,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport};
