//! Process-wide conversation store.
//!
//! Owns three maps behind one lock: sessions (each with its expiry timer),
//! keyless request counters, and the set of ids with a reply in flight.
//! The lock is never held across an `.await`.

use crate::error::{Result, SessionError};
use crate::session::Session;
use parking_lot::Mutex;
use parley_core::config::SessionConfig;
use parley_core::{ChatMessage, Role};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub default_system_prompt: String,
    pub inactivity_window: Duration,
}

impl From<&SessionConfig> for StoreConfig {
    fn from(cfg: &SessionConfig) -> Self {
        Self {
            default_system_prompt: cfg.default_system_prompt.clone(),
            inactivity_window: cfg.inactivity_window(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// Proof that a user message landed in a specific incarnation of a session.
///
/// `messages` is the full sequence to send for generation, including the new
/// user message.
#[derive(Debug, Clone)]
pub struct TurnTicket {
    pub id: String,
    pub epoch: u64,
    pub messages: Vec<ChatMessage>,
}

struct ExpiryTimer {
    seq: u64,
    handle: AbortHandle,
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Entry {
    session: Session,
    timer: Option<ExpiryTimer>,
}

#[derive(Default)]
struct State {
    sessions: HashMap<String, Entry>,
    request_counts: HashMap<String, u64>,
    in_flight: HashSet<String>,
}

struct Inner {
    config: StoreConfig,
    state: Mutex<State>,
    next_epoch: AtomicU64,
    next_timer: AtomicU64,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                next_epoch: AtomicU64::new(1),
                next_timer: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Fetch the session for `id`, creating it if needed. A non-empty
    /// `system_override` replaces the stored system prompt in place.
    /// Does not touch the expiry timer.
    pub fn get_or_create(&self, id: &str, system_override: Option<&str>) -> Session {
        let mut state = self.inner.state.lock();
        self.ensure(&mut state, id, system_override).session.clone()
    }

    pub fn append_user(&self, id: &str, content: impl Into<String>) -> Result<TurnTicket> {
        let mut state = self.inner.state.lock();
        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound { id: id.to_string() })?;
        entry.session.push(Role::User, content);
        Ok(ticket(&entry.session))
    }

    /// `get_or_create` followed by `append_user` under a single lock, so a
    /// concurrent reset cannot land between the two.
    pub fn start_turn(
        &self,
        id: &str,
        system_override: Option<&str>,
        prompt: impl Into<String>,
    ) -> TurnTicket {
        let mut state = self.inner.state.lock();
        let entry = self.ensure(&mut state, id, system_override);
        entry.session.push(Role::User, prompt);
        ticket(&entry.session)
    }

    /// Record the reply for a turn. Refuses to write into a session that was
    /// reset or expired (and possibly recreated) after the ticket was issued.
    pub fn append_assistant(&self, ticket: &TurnTicket, content: impl Into<String>) -> Result<()> {
        let mut state = self.inner.state.lock();
        match state.sessions.get_mut(&ticket.id) {
            Some(entry) if entry.session.epoch == ticket.epoch => {
                entry.session.push(Role::Assistant, content);
                Ok(())
            }
            _ => {
                warn!(id = %ticket.id, epoch = ticket.epoch, "discarding reply for replaced conversation");
                Err(SessionError::Superseded { id: ticket.id.clone() })
            }
        }
    }

    /// Drop the session, its timer and its request counter. Idempotent.
    /// Returns whether a session existed.
    pub fn reset(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let existed = state.sessions.remove(id).is_some();
        state.request_counts.remove(id);
        info!(id = %id, existed, "conversation reset");
        existed
    }

    /// Restart the inactivity countdown for `id`. Returns false if there is no
    /// session. Must be called from within a tokio runtime.
    pub fn touch(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock();
        self.arm_expiry(&mut state, id)
    }

    /// Start the inactivity countdown only if none is pending, so an existing
    /// deadline is never pushed back. Returns true if a timer was armed.
    pub fn arm_if_unscheduled(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let scheduled = state.sessions.get(id).is_some_and(|e| e.timer.is_some());
        !scheduled && self.arm_expiry(&mut state, id)
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner.state.lock().sessions.get(id).map(|e| e.session.clone())
    }

    pub fn history(&self, id: &str) -> Option<Vec<ChatMessage>> {
        self.inner.state.lock().sessions.get(id).map(|e| e.session.messages.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.state.lock().sessions.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    pub fn has_pending_expiry(&self, id: &str) -> bool {
        self.inner
            .state
            .lock()
            .sessions
            .get(id)
            .is_some_and(|e| e.timer.is_some())
    }

    /// Claim `id` for one generation turn. Fails with `Busy` while another
    /// turn for the same id holds its guard.
    pub fn begin_turn(&self, id: &str) -> Result<TurnGuard> {
        let mut state = self.inner.state.lock();
        if !state.in_flight.insert(id.to_string()) {
            return Err(SessionError::Busy { id: id.to_string() });
        }
        Ok(TurnGuard { store: self.clone(), id: id.to_string() })
    }

    pub fn is_busy(&self, id: &str) -> bool {
        self.inner.state.lock().in_flight.contains(id)
    }

    /// Count one request made without a valid access key. Fails once the
    /// count exceeds `limit`; the increment is kept either way.
    pub fn admit_keyless(&self, id: &str, limit: u64) -> Result<u64> {
        let mut state = self.inner.state.lock();
        let count = state.request_counts.entry(id.to_string()).or_insert(0);
        *count += 1;
        if *count > limit {
            return Err(SessionError::RateLimited { id: id.to_string(), count: *count, limit });
        }
        Ok(*count)
    }

    pub fn request_count(&self, id: &str) -> u64 {
        self.inner.state.lock().request_counts.get(id).copied().unwrap_or(0)
    }

    fn ensure<'a>(&self, state: &'a mut State, id: &str, system_override: Option<&str>) -> &'a mut Entry {
        let system_override = system_override.filter(|s| !s.is_empty());
        let entry = state.sessions.entry(id.to_string()).or_insert_with(|| {
            let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
            let prompt = system_override.unwrap_or(self.inner.config.default_system_prompt.as_str());
            debug!(id = %id, epoch, "conversation created");
            Entry { session: Session::new(id, epoch, prompt), timer: None }
        });
        if let Some(prompt) = system_override {
            if entry.session.system_prompt != prompt {
                entry.session.set_system_prompt(prompt);
            }
        }
        entry
    }

    fn arm_expiry(&self, state: &mut State, id: &str) -> bool {
        let Some(entry) = state.sessions.get_mut(id) else {
            return false;
        };
        let seq = self.inner.next_timer.fetch_add(1, Ordering::Relaxed);
        let window = self.inner.config.inactivity_window;
        let store = Arc::downgrade(&self.inner);
        let key = id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            expire(store, &key, seq);
        })
        .abort_handle();
        // Replacing the old timer aborts it.
        entry.timer = Some(ExpiryTimer { seq, handle });
        true
    }
}

fn expire(store: Weak<Inner>, id: &str, seq: u64) {
    let Some(inner) = store.upgrade() else {
        return;
    };
    let store = SessionStore { inner };
    let mut state = store.inner.state.lock();

    let current = state.sessions.get(id).and_then(|e| e.timer.as_ref()).map(|t| t.seq);
    if current != Some(seq) {
        return;
    }
    if state.in_flight.contains(id) {
        debug!(id = %id, "reply in flight, postponing expiry");
        store.arm_expiry(&mut state, id);
        return;
    }
    if let Some(entry) = state.sessions.remove(id) {
        info!(id = %id, messages = entry.session.message_count(), "conversation cleared due to inactivity");
    }
}

fn ticket(session: &Session) -> TurnTicket {
    TurnTicket {
        id: session.id.clone(),
        epoch: session.epoch,
        messages: session.messages.clone(),
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("config", &self.inner.config)
            .field("sessions", &self.count())
            .finish()
    }
}

/// Releases the in-flight claim on drop, including on error or cancellation.
#[must_use = "dropping the guard ends the turn immediately"]
pub struct TurnGuard {
    store: SessionStore,
    id: String,
}

impl TurnGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.store.inner.state.lock().in_flight.remove(&self.id);
    }
}

impl fmt::Debug for TurnGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnGuard").field("id", &self.id).finish()
    }
}
