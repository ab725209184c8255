use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rand::Rng;

use crate::health::HealthTracker;
use crate::session::ProxySession;

/// Selection policy over the healthy candidate set. Closed set, picked at
/// construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    RoundRobin,
    #[default]
    Weighted,
    Random,
}

pub struct Rotator {
    strategy: RotationStrategy,
    cursor: AtomicUsize,
}

impl Rotator {
    pub fn new(strategy: RotationStrategy) -> Self {
        Self {
            strategy,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> RotationStrategy {
        self.strategy
    }

    /// Pick the next session among non-expired candidates. When no candidate
    /// is healthy the least-used session is returned instead so the pool
    /// keeps serving while it recovers.
    pub fn select<'a>(
        &self,
        candidates: &[&'a ProxySession],
        tracker: &HealthTracker,
        now: Instant,
    ) -> Option<&'a ProxySession> {
        if candidates.is_empty() {
            return None;
        }

        let healthy: Vec<&'a ProxySession> = candidates
            .iter()
            .copied()
            .filter(|s| tracker.is_healthy(&s.session_id, now))
            .collect();

        if healthy.is_empty() {
            tracing::warn!("no healthy proxy session available, falling back to least-used");
            return candidates
                .iter()
                .copied()
                .min_by_key(|s| (s.requests_count, s.last_used));
        }

        let chosen = match self.strategy {
            RotationStrategy::RoundRobin => {
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
                healthy[idx]
            }
            RotationStrategy::Weighted => self.weighted_pick(&healthy, tracker),
            RotationStrategy::Random => healthy[rand::thread_rng().gen_range(0..healthy.len())],
        };

        Some(chosen)
    }

    /// Weight by success rate and inverse of usage, then sample in proportion.
    fn weighted_pick<'a>(
        &self,
        healthy: &[&'a ProxySession],
        tracker: &HealthTracker,
    ) -> &'a ProxySession {
        let weights: Vec<f64> = healthy
            .iter()
            .map(|s| {
                let success_weight = tracker.success_rate(&s.session_id) / 100.0;
                let usage_weight = 1.0 / (s.requests_count as f64 + 1.0);
                success_weight * usage_weight
            })
            .collect();

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return healthy[0];
        }

        let mut roll = rand::thread_rng().gen_range(0.0..total);
        for (session, weight) in healthy.iter().zip(&weights) {
            if roll < *weight {
                return session;
            }
            roll -= weight;
        }

        healthy[healthy.len() - 1]
    }
}
