use std::collections::HashMap;

use dashmap::DashMap;
use serde::Serialize;

use super::pool::{BrowserProfilePool, PROFILE_POOL};
use super::profile::{BrowserFamily, BrowserProfile};

/// Pins one browser profile to each proxy session so the target site sees a
/// consistent fingerprint for the session's whole lifetime.
pub struct FingerprintCoordinator {
    pool: &'static BrowserProfilePool,
    session_profiles: DashMap<String, BrowserProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FingerprintStats {
    pub pinned_sessions: usize,
    pub available_profiles: usize,
    pub browser_usage: HashMap<String, usize>,
    pub catalog: HashMap<String, usize>,
}

impl FingerprintCoordinator {
    pub fn new() -> Self {
        Self {
            pool: &PROFILE_POOL,
            session_profiles: DashMap::new(),
        }
    }

    /// Profile pinned to the session, assigning one on first sight.
    pub fn profile(&self, session_id: &str) -> BrowserProfile {
        self.session_profiles
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let profile = self.pool.profile_for(session_id).clone();
                tracing::debug!(
                    session = session_id,
                    browser = profile.browser.name(),
                    version = %profile.browser_version,
                    "pinned browser profile to session"
                );
                profile
            })
            .clone()
    }

    /// Full outbound header set for the session: the profile baseline plus
    /// the navigation headers a real browser adds, plus client hints for
    /// Chrome profiles.
    pub fn session_headers(&self, session_id: &str) -> HashMap<String, String> {
        let profile = self.profile(session_id);
        let mut headers = profile.to_headers();

        headers.insert("DNT".to_string(), "1".to_string());
        headers.insert("Connection".to_string(), "keep-alive".to_string());
        headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());
        headers.insert("Sec-Fetch-Dest".to_string(), "document".to_string());
        headers.insert("Sec-Fetch-Mode".to_string(), "navigate".to_string());
        headers.insert("Sec-Fetch-Site".to_string(), "none".to_string());
        headers.insert("Cache-Control".to_string(), "max-age=0".to_string());

        if profile.browser == BrowserFamily::Chrome {
            let major = profile.major_version();
            headers.insert(
                "sec-ch-ua".to_string(),
                format!(
                    "\"Google Chrome\";v=\"{major}\", \"Chromium\";v=\"{major}\", \"Not_A Brand\";v=\"8\""
                ),
            );
            headers.insert("sec-ch-ua-mobile".to_string(), "?0".to_string());
            headers.insert(
                "sec-ch-ua-platform".to_string(),
                format!("\"{}\"", profile.platform.name()),
            );
        }

        headers
    }

    /// Drop cached pins for sessions the registry has retired.
    pub fn forget(&self, session_ids: &[String]) {
        for id in session_ids {
            if self.session_profiles.remove(id).is_some() {
                tracing::debug!(session = %id, "dropped fingerprint pin for retired session");
            }
        }
    }

    pub fn stats(&self) -> FingerprintStats {
        let mut browser_usage = HashMap::new();
        for entry in self.session_profiles.iter() {
            let profile = entry.value();
            let key = format!("{} {}", profile.browser.name(), profile.browser_version);
            *browser_usage.entry(key).or_insert(0) += 1;
        }

        FingerprintStats {
            pinned_sessions: self.session_profiles.len(),
            available_profiles: self.pool.len(),
            browser_usage,
            catalog: self.pool.stats(),
        }
    }
}

impl Default for FingerprintCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
