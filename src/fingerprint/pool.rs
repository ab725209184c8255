use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};

use ahash::RandomState;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;

use super::profile::{BrowserFamily, BrowserProfile, Platform};

/// Shared immutable catalog; every component sees the same profiles.
pub static PROFILE_POOL: Lazy<BrowserProfilePool> = Lazy::new(BrowserProfilePool::new);

// Fixed seeds: profile selection must stay stable for any session id the
// process replays, so the hasher cannot randomize per run.
const HASH_SEEDS: (u64, u64, u64, u64) = (
    0x9e37_79b9_7f4a_7c15,
    0x2545_f491_4f6c_dd1d,
    0x27d4_eb2f_1656_67c5,
    0x1656_67b1_9e37_79f9,
);

pub struct BrowserProfilePool {
    profiles: Vec<BrowserProfile>,
    hasher: RandomState,
}

impl BrowserProfilePool {
    pub fn new() -> Self {
        let profiles = build_catalog();
        tracing::debug!(profiles = profiles.len(), "browser profile catalog built");
        Self {
            profiles,
            hasher: RandomState::with_seeds(HASH_SEEDS.0, HASH_SEEDS.1, HASH_SEEDS.2, HASH_SEEDS.3),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// The same session id always maps to the same profile for the
    /// catalog's lifetime.
    pub fn profile_for(&self, session_id: &str) -> &BrowserProfile {
        let mut hasher = self.hasher.build_hasher();
        session_id.hash(&mut hasher);
        let index = (hasher.finish() % self.profiles.len() as u64) as usize;
        &self.profiles[index]
    }

    pub fn random(&self) -> &BrowserProfile {
        self.profiles
            .choose(&mut rand::thread_rng())
            .expect("profile catalog is never empty")
    }

    pub fn by_family(&self, family: BrowserFamily) -> Vec<&BrowserProfile> {
        self.profiles.iter().filter(|p| p.browser == family).collect()
    }

    /// Profile counts keyed `"<family> (<platform>)"`.
    pub fn stats(&self) -> HashMap<String, usize> {
        let mut stats = HashMap::new();
        for profile in &self.profiles {
            let key = format!("{} ({})", profile.browser.name(), profile.platform.name());
            *stats.entry(key).or_insert(0) += 1;
        }
        stats
    }
}

impl Default for BrowserProfilePool {
    fn default() -> Self {
        Self::new()
    }
}

fn build_catalog() -> Vec<BrowserProfile> {
    const CHROME_VERSIONS: [&str; 4] = ["120.0.0.0", "119.0.0.0", "118.0.0.0", "117.0.0.0"];
    const FIREFOX_VERSIONS: [&str; 4] = ["120.0", "119.0", "118.0", "117.0"];
    const SAFARI_VERSIONS: [&str; 3] = ["17.1", "16.6", "16.5"];

    let mut profiles = Vec::new();

    for version in CHROME_VERSIONS {
        profiles.push(BrowserProfile {
            user_agent: format!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36"
            ),
            accept_language: "de-DE,de;q=0.9,en;q=0.8".to_string(),
            accept_encoding: "gzip, deflate, br".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8".to_string(),
            platform: Platform::Windows,
            browser: BrowserFamily::Chrome,
            browser_version: version.to_string(),
        });
    }

    for version in CHROME_VERSIONS {
        profiles.push(BrowserProfile {
            user_agent: format!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36"
            ),
            accept_language: "de-DE,de;q=0.9,en;q=0.8".to_string(),
            accept_encoding: "gzip, deflate, br".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8".to_string(),
            platform: Platform::MacOs,
            browser: BrowserFamily::Chrome,
            browser_version: version.to_string(),
        });
    }

    for version in FIREFOX_VERSIONS {
        profiles.push(BrowserProfile {
            user_agent: format!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:{version}) Gecko/20100101 Firefox/{version}"
            ),
            accept_language: "de-DE,de;q=0.8,en-US;q=0.5,en;q=0.3".to_string(),
            accept_encoding: "gzip, deflate".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                .to_string(),
            platform: Platform::Windows,
            browser: BrowserFamily::Firefox,
            browser_version: version.to_string(),
        });
    }

    for version in SAFARI_VERSIONS {
        profiles.push(BrowserProfile {
            user_agent: format!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{version} Safari/605.1.15"
            ),
            accept_language: "de-DE,de;q=0.9".to_string(),
            accept_encoding: "gzip, deflate, br".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            platform: Platform::MacOs,
            browser: BrowserFamily::Safari,
            browser_version: version.to_string(),
        });
    }

    profiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_all_families() {
        let pool = BrowserProfilePool::new();
        assert_eq!(pool.len(), 15);

        let stats = pool.stats();
        assert_eq!(stats["Chrome (Windows)"], 4);
        assert_eq!(stats["Chrome (macOS)"], 4);
        assert_eq!(stats["Firefox (Windows)"], 4);
        assert_eq!(stats["Safari (macOS)"], 3);
    }

    #[test]
    fn profile_selection_is_deterministic() {
        let pool = BrowserProfilePool::new();
        let first = pool.profile_for("scraper-0123456789abcdef");
        for _ in 0..50 {
            let again = pool.profile_for("scraper-0123456789abcdef");
            assert_eq!(first.user_agent, again.user_agent);
        }

        // An identical reload of the catalog keeps the mapping.
        let reloaded = BrowserProfilePool::new();
        assert_eq!(
            first.user_agent,
            reloaded.profile_for("scraper-0123456789abcdef").user_agent
        );
    }

    #[test]
    fn family_filter_matches_catalog() {
        let pool = BrowserProfilePool::new();
        assert_eq!(pool.by_family(BrowserFamily::Chrome).len(), 8);
        assert_eq!(pool.by_family(BrowserFamily::Safari).len(), 3);
    }

    #[test]
    fn random_profile_comes_from_the_catalog() {
        let pool = BrowserProfilePool::new();
        for _ in 0..20 {
            let profile = pool.random();
            assert!(pool
                .by_family(profile.browser)
                .iter()
                .any(|p| p.user_agent == profile.user_agent));
        }
    }
}
