//! Applies a parsed delivery response to session state and the prefetch cache.
use std::collections::HashMap;

use serde_json::Value;

use crate::{
    delivery::{DeliveryResponse, TryParse},
    prefetch_cache::PrefetchCache,
    session::SessionState,
    Error, SharedStateDelta,
};

/// Status code of a successful delivery call.
pub const SUCCESS_STATUS: u16 = 200;

/// What a reconciled response changed, and whether it reported an error.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Shared state to publish after this call.
    pub shared_state: SharedStateDelta,
    /// Names of mboxes merged into the cache, in response order.
    pub merged_mboxes: Vec<String>,
    /// Set when the service answered with a non-success status. Fields present in the same
    /// response have still been applied.
    pub remote_error: Option<Error>,
}

/// Reconcile a response from a completed delivery call made at `now` (Unix seconds).
///
/// Session activity is recorded regardless of payload, since the call itself completed. Visitor
/// id, edge host and prefetched mboxes are applied whenever present, even alongside an error.
pub fn reconcile(
    response: &DeliveryResponse,
    status: u16,
    session: &mut SessionState<'_>,
    cache: &mut PrefetchCache,
    now: i64,
) -> ReconcileOutcome {
    let remote_error = if status != SUCCESS_STATUS {
        let message = response
            .message
            .clone()
            .unwrap_or_else(|| format!("unexpected status code {status}"));
        log::warn!(target: "mbox_prefetch", status, message:display; "delivery call returned an error");
        Some(Error::Remote { status, message })
    } else {
        if let Some(message) = &response.message {
            log::warn!(target: "mbox_prefetch", message:display; "delivery response carries a message");
        }
        None
    };

    session.record_successful_call(now);

    if let Some(tnt_id) = response.tnt_id().filter(|id| !id.is_empty()) {
        session.update_tnt_id(tnt_id);
    }
    if let Some(edge_host) = response.edge_host().filter(|host| !host.is_empty()) {
        session.update_edge_host(edge_host);
    }

    let shared_state = session.shared_state();

    let mut merged_mboxes = Vec::new();
    if let Some(mboxes) = response.mboxes() {
        let mut batch = HashMap::with_capacity(mboxes.len());
        for (index, mbox) in mboxes.iter().enumerate() {
            match mbox {
                TryParse::Parsed(mbox) => {
                    merged_mboxes.push(mbox.name.clone());
                    batch.insert(mbox.name.clone(), Value::Object(mbox.content.clone()));
                }
                TryParse::ParseFailed(_) => {
                    log::warn!(target: "mbox_prefetch", index; "skipping prefetched mbox without a name");
                }
            }
        }
        cache.merge(batch);
        log::debug!(target: "mbox_prefetch",
                    merged = merged_mboxes.len(),
                    cached = cache.len();
                    "merged prefetched mboxes");
    }

    ReconcileOutcome {
        shared_state,
        merged_mboxes,
        remote_error,
    }
}
