use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::RwLock;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::config::{BrightdataConfig, RotationSettings};
use crate::health::HealthTracker;
use crate::rotation::Rotator;
use crate::stats::SessionDetail;

use super::proxy_session::{short_id, ProxySession, SessionLease, SESSION_ID_PREFIX};

const ID_GENERATION_ATTEMPTS: usize = 8;

/// Everything selection touches sits behind one lock, so an acquire sees
/// the pool, the ordering and the blacklist as a single snapshot.
struct RegistryInner {
    sessions: AHashMap<String, ProxySession>,
    session_order: Vec<String>,
    blacklist: AHashMap<String, Instant>,
    requests_since_rotation: u64,
}

/// Sessions and blacklist entries removed by one cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub retired: Vec<String>,
    pub unblacklisted: Vec<String>,
}

type RetireHook = Box<dyn Fn(&[String]) + Send + Sync>;

/// Owner of the active session pool and the blacklist.
pub struct SessionRegistry {
    config: Option<Arc<BrightdataConfig>>,
    clock: Arc<dyn Clock>,
    max_sessions: usize,
    max_requests_per_session: u32,
    max_session_duration: Duration,
    blacklist_ttl: Duration,
    inner: RwLock<RegistryInner>,
    retire_hook: RwLock<Option<RetireHook>>,
}

impl SessionRegistry {
    pub fn new(
        config: Option<Arc<BrightdataConfig>>,
        settings: &RotationSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            clock,
            max_sessions: settings.max_sessions,
            max_requests_per_session: settings.max_requests_per_session,
            max_session_duration: Duration::from_secs(settings.max_session_duration_secs),
            blacklist_ttl: Duration::from_secs(settings.blacklist_ttl_secs),
            inner: RwLock::new(RegistryInner {
                sessions: AHashMap::new(),
                session_order: Vec::new(),
                blacklist: AHashMap::new(),
                requests_since_rotation: 0,
            }),
            retire_hook: RwLock::new(None),
        }
    }

    /// Register a retirement hook, fired whenever sessions leave the active
    /// pool (expiry sweep or blacklisting) so downstream caches can drop
    /// their per-session state.
    pub fn on_retire(&self, hook: impl Fn(&[String]) + Send + Sync + 'static) {
        *self.retire_hook.write() = Some(Box::new(hook));
    }

    /// Select a session for one outbound request: sweep expired state,
    /// refill the pool, rotate. `exclude` keeps a retry away from the
    /// session that just failed it.
    pub fn acquire(
        &self,
        rotator: &Rotator,
        tracker: &HealthTracker,
        exclude: Option<&str>,
    ) -> Option<SessionLease> {
        let now = self.clock.now();
        let (lease, report) = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            let report = self.cleanup_locked(inner, now);
            self.fill_locked(inner, now);

            let selected_id = {
                let candidates: Vec<&ProxySession> = inner
                    .session_order
                    .iter()
                    .filter_map(|id| inner.sessions.get(id))
                    .filter(|s| !s.is_expired(now))
                    .filter(|s| exclude.map_or(true, |ex| s.session_id != ex))
                    .collect();
                rotator
                    .select(&candidates, tracker, now)
                    .map(|s| s.session_id.clone())
            };

            let lease = selected_id.and_then(|id| {
                inner.requests_since_rotation += 1;
                let session = inner.sessions.get_mut(&id)?;
                session.touch(now);
                Some(SessionLease {
                    session_id: session.session_id.clone(),
                    proxy_url: session.proxy_url(),
                    created_at_millis: session.created_at_millis,
                    requests_count: session.requests_count,
                })
            });
            (lease, report)
        };

        self.notify_retired(&report.retired);
        lease
    }

    /// Remove expired sessions and lapsed blacklist entries.
    pub fn cleanup_expired(&self) -> CleanupReport {
        let now = self.clock.now();
        let report = {
            let mut guard = self.inner.write();
            self.cleanup_locked(&mut guard, now)
        };
        self.notify_retired(&report.retired);
        report
    }

    /// Lazily fill the pool up to `max_sessions`.
    pub fn ensure_capacity(&self) {
        let now = self.clock.now();
        let mut guard = self.inner.write();
        self.fill_locked(&mut guard, now);
    }

    /// Pull the session out of the active pool and bar its id for the
    /// blacklist TTL.
    pub fn blacklist(&self, session_id: &str) {
        let was_active = {
            let mut inner = self.inner.write();
            let was_active = inner.sessions.remove(session_id).is_some();
            if was_active {
                inner.session_order.retain(|id| id != session_id);
            }
            inner.blacklist.insert(session_id.to_string(), self.clock.now());
            was_active
        };

        tracing::warn!(
            session = short_id(session_id),
            ttl_secs = self.blacklist_ttl.as_secs(),
            "blacklisted proxy session"
        );

        if was_active {
            let retired = [session_id.to_string()];
            self.notify_retired(&retired);
        }
    }

    pub fn active_count(&self) -> usize {
        let now = self.clock.now();
        self.inner
            .read()
            .sessions
            .values()
            .filter(|s| !s.is_expired(now))
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn blacklisted_count(&self) -> usize {
        self.inner.read().blacklist.len()
    }

    pub fn is_blacklisted(&self, session_id: &str) -> bool {
        self.inner.read().blacklist.contains_key(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.read().sessions.contains_key(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.inner.read().session_order.clone()
    }

    pub fn requests_since_rotation(&self) -> u64 {
        self.inner.read().requests_since_rotation
    }

    /// Close-of-run rows for the active pool.
    pub fn session_details(&self, tracker: &HealthTracker) -> Vec<SessionDetail> {
        let now = self.clock.now();
        let inner = self.inner.read();
        inner
            .session_order
            .iter()
            .filter_map(|id| inner.sessions.get(id))
            .filter(|s| !s.is_expired(now))
            .map(|s| SessionDetail {
                id: s.short_id().to_string(),
                requests: s.requests_count,
                success_rate: round2(tracker.success_rate(&s.session_id)),
                created_minutes_ago: round1(
                    now.duration_since(s.created_at).as_secs_f64() / 60.0,
                ),
            })
            .collect()
    }

    fn cleanup_locked(&self, inner: &mut RegistryInner, now: Instant) -> CleanupReport {
        let mut report = CleanupReport::default();

        let expired: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.session_id.clone())
            .collect();
        for id in &expired {
            inner.sessions.remove(id);
            tracing::info!(session = short_id(id), "removed expired session");
        }
        if !expired.is_empty() {
            inner.session_order.retain(|id| !expired.contains(id));
        }
        report.retired = expired;

        let lapsed: Vec<String> = inner
            .blacklist
            .iter()
            .filter(|(_, blacklisted_at)| {
                now.duration_since(**blacklisted_at) >= self.blacklist_ttl
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &lapsed {
            inner.blacklist.remove(id);
            tracing::info!(session = short_id(id), "blacklist entry lapsed");
        }
        report.unblacklisted = lapsed;

        report
    }

    fn fill_locked(&self, inner: &mut RegistryInner, now: Instant) {
        let Some(config) = self.config.as_ref() else {
            return;
        };

        let mut active = inner
            .sessions
            .values()
            .filter(|s| !s.is_expired(now))
            .count();
        while active < self.max_sessions {
            let Some(session_id) = self.generate_id(inner) else {
                tracing::warn!(
                    "session-id generation kept colliding with the blacklist, pool left underfilled"
                );
                return;
            };
            let session = ProxySession::new(
                session_id.clone(),
                Arc::clone(config),
                now,
                self.clock.unix_millis(),
                self.max_requests_per_session,
                self.max_session_duration,
            );
            tracing::info!(session = session.short_id(), "created proxy session");
            inner.session_order.push(session_id.clone());
            inner.sessions.insert(session_id, session);
            active += 1;
        }
    }

    /// `scraper-` plus 16 hex chars digested from a millisecond timestamp
    /// and a 4-digit nonce. Ids barred by the blacklist are re-drawn a
    /// bounded number of times.
    fn generate_id(&self, inner: &RegistryInner) -> Option<String> {
        let mut rng = rand::thread_rng();
        for _ in 0..ID_GENERATION_ATTEMPTS {
            let seed = format!("{}-{}", self.clock.unix_millis(), rng.gen_range(1000..=9999));
            let digest = Sha256::digest(seed.as_bytes());
            let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
            let id = format!("{SESSION_ID_PREFIX}{hex}");
            if !inner.blacklist.contains_key(&id) && !inner.sessions.contains_key(&id) {
                return Some(id);
            }
        }
        None
    }

    fn notify_retired(&self, session_ids: &[String]) {
        if session_ids.is_empty() {
            return;
        }
        if let Some(hook) = self.retire_hook.read().as_ref() {
            hook(session_ids);
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
