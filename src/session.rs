//! Session and visitor identity state, hydrated from and written through to a [`DataStore`].
use chrono::Utc;

use crate::{data_store::DataStore, shared_state::ConfigurationSnapshot, SharedStateDelta};

/// Keys owned by [`SessionState`] in the persistent store.
pub(crate) mod keys {
    pub const TNT_ID: &str = "TNT_ID";
    pub const THIRD_PARTY_ID: &str = "THIRD_PARTY_ID";
    pub const EDGE_HOST: &str = "EDGE_HOST";
    pub const SESSION_TIMESTAMP: &str = "SESSION_TIMESTAMP";
    pub const SESSION_ID: &str = "SESSION_ID";
    pub const SESSION_TIMEOUT: &str = "SESSION_TIMEOUT";
}

/// Session timeout used when none is stored or configured, in seconds.
pub const DEFAULT_SESSION_TIMEOUT: i32 = 30 * 60;

/// Where the session stands relative to its timeout.
///
/// There is no background timer: a session only leaves `ExpiredPendingRegeneration` when its id is
/// read through [`SessionState::current_session_id_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Active,
    ExpiredPendingRegeneration,
}

/// The values a delivery request needs from session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub tnt_id: Option<String>,
    pub third_party_id: Option<String>,
    pub edge_host: Option<String>,
}

/// Session id, timeout and visitor identifiers.
///
/// Every mutation is written through to the store. If a write fails, the state keeps working from
/// memory for the rest of the process lifetime and further writes are skipped.
pub struct SessionState<'a> {
    store: Box<dyn DataStore + Send + 'a>,
    persistence_degraded: bool,

    session_id: String,
    session_timestamp: Option<i64>,
    session_timeout: i32,
    tnt_id: Option<String>,
    third_party_id: Option<String>,
    edge_host: Option<String>,
    client_code: Option<String>,
}

impl<'a> SessionState<'a> {
    /// Load state from `store`. Missing keys start out unset.
    pub fn load(store: Box<dyn DataStore + Send + 'a>) -> SessionState<'a> {
        let stored_session_id = store
            .get_string(keys::SESSION_ID)
            .filter(|id| !id.is_empty());

        let mut state = SessionState {
            tnt_id: store.get_string(keys::TNT_ID),
            third_party_id: store.get_string(keys::THIRD_PARTY_ID),
            edge_host: store.get_string(keys::EDGE_HOST),
            session_timestamp: store.get_long(keys::SESSION_TIMESTAMP),
            session_timeout: store
                .get_int(keys::SESSION_TIMEOUT)
                .unwrap_or(DEFAULT_SESSION_TIMEOUT),
            session_id: stored_session_id.clone().unwrap_or_else(new_session_id),
            client_code: None,
            persistence_degraded: false,
            store,
        };

        if stored_session_id.is_none() {
            let session_id = state.session_id.clone();
            state.persist(keys::SESSION_ID, |store| {
                store.set_string(keys::SESSION_ID, &session_id)
            });
        }

        log::debug!(target: "mbox_prefetch",
                    has_tnt_id = state.tnt_id.is_some(),
                    has_edge_host = state.edge_host.is_some(),
                    session_timeout = state.session_timeout;
                    "loaded session state");
        state
    }

    pub fn tnt_id(&self) -> Option<&str> {
        self.tnt_id.as_deref()
    }

    pub fn third_party_id(&self) -> Option<&str> {
        self.third_party_id.as_deref()
    }

    pub fn edge_host(&self) -> Option<&str> {
        self.edge_host.as_deref()
    }

    pub fn client_code(&self) -> Option<&str> {
        self.client_code.as_deref()
    }

    /// The stored session id, without checking for expiry.
    pub fn stored_session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_timestamp(&self) -> Option<i64> {
        self.session_timestamp
    }

    pub fn session_timeout(&self) -> i32 {
        self.session_timeout
    }

    /// Whether the session has timed out as of `now` (Unix seconds).
    ///
    /// A session that never completed a delivery call has no timestamp and is never expired.
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.session_timestamp {
            None => false,
            Some(timestamp) => now.saturating_sub(timestamp) > i64::from(self.session_timeout),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    pub fn phase_at(&self, now: i64) -> SessionPhase {
        if self.is_expired_at(now) {
            SessionPhase::ExpiredPendingRegeneration
        } else {
            SessionPhase::Active
        }
    }

    /// Current session id, regenerating it first if the session expired as of `now`.
    ///
    /// Regeneration also clears the session timestamp, so the fresh id stays stable until the next
    /// completed delivery call starts timing it.
    pub fn current_session_id_at(&mut self, now: i64) -> &str {
        if self.phase_at(now) == SessionPhase::ExpiredPendingRegeneration {
            self.start_new_session();
        }
        &self.session_id
    }

    pub fn current_session_id(&mut self) -> &str {
        self.current_session_id_at(Utc::now().timestamp())
    }

    fn start_new_session(&mut self) {
        self.session_id = new_session_id();
        self.session_timestamp = None;
        log::debug!(target: "mbox_prefetch",
                    session_id:display = self.session_id;
                    "session expired, started a new session");

        let session_id = self.session_id.clone();
        self.persist(keys::SESSION_ID, |store| {
            store.set_string(keys::SESSION_ID, &session_id)
        });
        self.persist(keys::SESSION_TIMESTAMP, |store| {
            store.remove(keys::SESSION_TIMESTAMP)
        });
    }

    /// Mark session activity at `now`. Called once per completed delivery call.
    pub fn record_successful_call(&mut self, now: i64) {
        self.session_timestamp = Some(now);
        self.persist(keys::SESSION_TIMESTAMP, |store| {
            store.set_long(keys::SESSION_TIMESTAMP, now)
        });
    }

    pub fn update_tnt_id(&mut self, tnt_id: &str) {
        self.tnt_id = Some(tnt_id.to_owned());
        self.persist(keys::TNT_ID, |store| store.set_string(keys::TNT_ID, tnt_id));
    }

    pub fn update_edge_host(&mut self, edge_host: &str) {
        self.edge_host = Some(edge_host.to_owned());
        self.persist(keys::EDGE_HOST, |store| {
            store.set_string(keys::EDGE_HOST, edge_host)
        });
    }

    pub fn update_third_party_id(&mut self, third_party_id: &str) {
        self.third_party_id = Some(third_party_id.to_owned());
        self.persist(keys::THIRD_PARTY_ID, |store| {
            store.set_string(keys::THIRD_PARTY_ID, third_party_id)
        });
    }

    pub fn update_session_timeout(&mut self, session_timeout: i32) {
        self.session_timeout = session_timeout;
        self.persist(keys::SESSION_TIMEOUT, |store| {
            store.set_int(keys::SESSION_TIMEOUT, session_timeout)
        });
    }

    /// Adopt tenant settings from a configuration snapshot.
    ///
    /// The edge host is tenant-specific, so it is dropped when the client code changes.
    pub fn apply_configuration(&mut self, configuration: &ConfigurationSnapshot) {
        if let Some(timeout) = configuration.session_timeout {
            if timeout > 0 && timeout != self.session_timeout {
                self.update_session_timeout(timeout);
            }
        }

        let client_code = configuration.client_code();
        if client_code != self.client_code.as_deref() {
            if self.client_code.is_some() && self.edge_host.is_some() {
                log::debug!(target: "mbox_prefetch", "client code changed, clearing edge host");
                self.edge_host = None;
                self.persist(keys::EDGE_HOST, |store| store.remove(keys::EDGE_HOST));
            }
            self.client_code = client_code.map(str::to_owned);
        }
    }

    /// Forget the visitor: identifiers, edge host and session.
    pub fn reset_identity(&mut self) {
        self.tnt_id = None;
        self.third_party_id = None;
        self.edge_host = None;
        for key in [keys::TNT_ID, keys::THIRD_PARTY_ID, keys::EDGE_HOST] {
            self.persist(key, |store| store.remove(key));
        }
        self.start_new_session();
    }

    /// Identifiers to publish as shared state.
    pub fn shared_state(&self) -> SharedStateDelta {
        SharedStateDelta {
            tnt_id: self.tnt_id.clone(),
            third_party_id: self.third_party_id.clone(),
        }
    }

    /// Snapshot for building a request at `now`. May regenerate the session id.
    pub fn snapshot_at(&mut self, now: i64) -> SessionSnapshot {
        let session_id = self.current_session_id_at(now).to_owned();
        SessionSnapshot {
            session_id,
            tnt_id: self.tnt_id.clone(),
            third_party_id: self.third_party_id.clone(),
            edge_host: self.edge_host.clone(),
        }
    }

    fn persist(
        &mut self,
        key: &str,
        write: impl FnOnce(&mut (dyn DataStore + Send + 'a)) -> crate::Result<()>,
    ) {
        if self.persistence_degraded {
            log::debug!(target: "mbox_prefetch", key; "skipping write, persistence is degraded");
            return;
        }
        if let Err(err) = write(self.store.as_mut()) {
            log::warn!(target: "mbox_prefetch",
                       key;
                       "failed to persist session state, continuing in memory only: {:?}", err);
            self.persistence_degraded = true;
        }
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
