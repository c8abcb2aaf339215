use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    delivery::DeliveryResponse,
    events::{
        ExtensionRuntime, IdentityResponseEvent, PrefetchRequestEvent, PrefetchResponseEvent,
        TargetRequest,
    },
    prefetch_cache::PrefetchCache,
    reconciler::reconcile,
    request_builder::{build_delivery_request, check_preconditions, delivery_url},
    session::SessionState,
    shared_state::{SharedStateName, SharedStates},
    transport::{HttpRequest, Transport},
    ExtensionConfig, Result,
};

/// Prefetches mbox content and keeps session, identity and cached content in sync with the
/// delivery service.
///
/// The extension expects to be driven from a single serialized context (the host's event queue).
/// Delivery calls block that context until the transport returns.
///
/// # Examples
/// ```no_run
/// # use mbox_prefetch::{ExtensionConfig, ExtensionRuntime, PrefetchMbox, PrefetchRequestEvent};
/// # fn test(runtime: impl ExtensionRuntime) {
/// let mut extension = ExtensionConfig::new(runtime).to_extension();
/// if extension.ready_for_event() {
///     let _ = extension.prefetch_content(&PrefetchRequestEvent::new(
///         vec![PrefetchMbox::new("home-banner")],
///         None,
///     ));
/// }
/// let content = extension.prefetched_content("home-banner");
/// # }
/// ```
pub struct TargetExtension<'a> {
    runtime: Box<dyn ExtensionRuntime + 'a>,
    transport: Box<dyn Transport + 'a>,
    session: SessionState<'a>,
    cache: PrefetchCache,
}

impl<'a> TargetExtension<'a> {
    pub const EXTENSION_NAME: &'static str = "com.adobe.module.target";

    /// Create the extension, loading session state from the configured store.
    pub fn new(config: ExtensionConfig<'a>) -> Self {
        TargetExtension {
            runtime: config.runtime,
            transport: config.transport,
            session: SessionState::load(config.data_store),
            cache: PrefetchCache::new(),
        }
    }

    pub fn session(&self) -> &SessionState<'a> {
        &self.session
    }

    pub fn prefetch_cache(&self) -> &PrefetchCache {
        &self.cache
    }

    /// Cached content for `mbox_name`, if it has been prefetched.
    pub fn prefetched_content(&self, mbox_name: &str) -> Option<&Value> {
        self.cache.get(mbox_name)
    }

    /// Resolve upstream shared states through the runtime.
    ///
    /// A shared state that cannot be parsed is treated as not yet resolved.
    pub fn shared_states(&self) -> SharedStates {
        SharedStates {
            configuration: self.snapshot(SharedStateName::Configuration),
            lifecycle: self.snapshot(SharedStateName::Lifecycle),
            identity: self.snapshot(SharedStateName::Identity),
        }
    }

    fn snapshot<T: DeserializeOwned>(&self, name: SharedStateName) -> Option<T> {
        let value = self.runtime.shared_state(name)?;
        serde_json::from_value(value)
            .inspect_err(|err| {
                log::warn!(target: "mbox_prefetch",
                           shared_state:display = name;
                           "ignoring malformed shared state: {:?}", err);
            })
            .ok()
    }

    /// Whether upstream state is resolved far enough to process events.
    pub fn ready_for_event(&self) -> bool {
        let states = self.shared_states();
        states.lifecycle.is_some()
            && states.identity.is_some()
            && states
                .configuration
                .as_ref()
                .and_then(|c| c.client_code())
                .is_some()
    }

    /// Handle a request event from the host.
    pub fn handle(&mut self, request: TargetRequest) {
        match request {
            TargetRequest::Prefetch(event) => {
                // Failures were already dispatched as a prefetch response event.
                if let Err(err) = self.prefetch_content(&event) {
                    log::trace!(target: "mbox_prefetch", "prefetch event handled with error: {}", err);
                }
            }
            TargetRequest::SetThirdPartyId(id) => self.set_third_party_id(&id),
            TargetRequest::ClearPrefetchCache => self.clear_prefetch_cache(),
            TargetRequest::RequestIdentity => self.identity(),
            TargetRequest::ResetIdentity => self.reset_identity(),
        }
    }

    /// Prefetch content for the mboxes in `event` and merge it into the cache.
    ///
    /// Always answers with a [`PrefetchResponseEvent`]. On success, returns the names of mboxes
    /// merged from the response. Shared state is published after every completed call, including
    /// calls answered with an error.
    pub fn prefetch_content(&mut self, event: &PrefetchRequestEvent) -> Result<Vec<String>> {
        let result = self.try_prefetch(event, Utc::now().timestamp());

        let error = match &result {
            Ok(merged) => {
                log::debug!(target: "mbox_prefetch", merged = merged.len(); "prefetch succeeded");
                None
            }
            Err(err) => {
                log::warn!(target: "mbox_prefetch",
                           kind:debug = err.kind();
                           "prefetch failed: {}", err);
                Some(err.to_string())
            }
        };
        self.runtime
            .dispatch(PrefetchResponseEvent { error }.into());

        result
    }

    fn try_prefetch(&mut self, event: &PrefetchRequestEvent, now: i64) -> Result<Vec<String>> {
        let mboxes = event.decoded_mboxes();
        let states = self.shared_states();

        let checked = check_preconditions(
            states.identity.as_ref(),
            states.configuration.as_ref(),
            states.lifecycle.as_ref(),
            &mboxes,
        )?;
        self.session.apply_configuration(checked.configuration);

        let session = self.session.snapshot_at(now);
        let request = build_delivery_request(
            Some(checked.identity),
            Some(checked.configuration),
            Some(checked.lifecycle),
            &session,
            &mboxes,
            event.parameters.as_ref(),
        )?;
        let http_request = HttpRequest {
            url: delivery_url(checked.client_code, checked.configuration, &session)?,
            body: request.to_json()?,
            timeout: checked.configuration.network_timeout(),
        };

        let http_response = self.transport.send(&http_request)?;
        let response = DeliveryResponse::from_slice(&http_response.body)?;

        let outcome = reconcile(
            &response,
            http_response.status,
            &mut self.session,
            &mut self.cache,
            now,
        );
        self.runtime
            .create_shared_state(outcome.shared_state.to_map());

        match outcome.remote_error {
            Some(err) => Err(err),
            None => Ok(outcome.merged_mboxes),
        }
    }

    pub fn clear_prefetch_cache(&mut self) {
        log::debug!(target: "mbox_prefetch", cached = self.cache.len(); "clearing prefetch cache");
        self.cache.clear();
    }

    /// Set the caller-supplied visitor alias and publish it.
    pub fn set_third_party_id(&mut self, third_party_id: &str) {
        self.session.update_third_party_id(third_party_id);
        self.publish_shared_state();
    }

    /// Forget visitor identifiers, edge host and session, and publish the emptied shared state.
    pub fn reset_identity(&mut self) {
        log::debug!(target: "mbox_prefetch", "resetting identities");
        self.session.reset_identity();
        self.publish_shared_state();
    }

    /// Answer with the current visitor identifiers.
    pub fn identity(&self) {
        self.runtime.dispatch(
            IdentityResponseEvent {
                tnt_id: self.session.tnt_id().map(str::to_owned),
                third_party_id: self.session.third_party_id().map(str::to_owned),
            }
            .into(),
        );
    }

    fn publish_shared_state(&self) {
        self.runtime
            .create_shared_state(self.session.shared_state().to_map());
    }
}
