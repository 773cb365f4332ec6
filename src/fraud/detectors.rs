//! Fraud signal detectors
//!
//! Each detector evaluates one class of signal against the shared signal store
//! and returns a partial score with an audit reason. Detectors never fail: a
//! store error degrades that signal to score 0 with an `:unavailable` reason.

use std::sync::Arc;

use super::model::{DetectorKind, DetectorSignal, RiskInput};
use crate::config::RiskSettings;
use crate::signal_store::SignalStore;

/// Highest score the velocity detector can report
const VELOCITY_MAX_SCORE: i64 = 50;

/// Points added per request above the limit
const VELOCITY_POINTS_PER_EXCESS: i64 = 2;

/// Score for a repeated action inside the duplicate window
const DUPLICATE_SCORE: i32 = 40;

/// Score for a blacklisted network address
const BLACKLIST_SCORE: i32 = 40;

/// Score for a fingerprint seen from too many networks
const MULTI_IP_SCORE: i32 = 30;

/// Set holding blacklisted network addresses
pub const IP_BLACKLIST_KEY: &str = "ip:blacklist";

/// Counter key for the velocity detector.
///
/// Anonymous traffic is bucketed by network address when one is known, and
/// only falls back to the shared `anonymous` bucket when neither is present.
pub fn velocity_key(input: &RiskInput) -> String {
    match (input.actor(), input.network_address()) {
        (Some(actor), _) => format!("velocity:{}", actor),
        (None, Some(ip)) => format!("velocity:ip:{}", ip),
        (None, None) => "velocity:anonymous".to_string(),
    }
}

pub fn duplicate_key(actor: &str, action: &str) -> String {
    format!("duplicate:{}:{}", actor, action)
}

pub fn fingerprint_key(fingerprint: &str) -> String {
    format!("fp:{}", fingerprint)
}

/// Score for `count` requests inside the window
pub fn velocity_score(count: i64, limit: i64) -> i32 {
    if count <= limit {
        return 0;
    }
    let score = (count - limit)
        .saturating_mul(VELOCITY_POINTS_PER_EXCESS)
        .min(VELOCITY_MAX_SCORE);
    score as i32
}

/// Sliding-window request counter per actor
#[derive(Clone)]
pub struct VelocityDetector {
    store: Arc<dyn SignalStore>,
    window_seconds: u64,
    limit: i64,
}

impl VelocityDetector {
    pub fn new(store: Arc<dyn SignalStore>, settings: &RiskSettings) -> Self {
        Self {
            store,
            window_seconds: settings.velocity_window_seconds,
            limit: settings.velocity_limit,
        }
    }

    pub async fn evaluate(&self, input: &RiskInput) -> DetectorSignal {
        let key = velocity_key(input);

        let count = match self
            .store
            .increment_with_expiry(&key, self.window_seconds)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Velocity detector degraded");
                return DetectorSignal::new(DetectorKind::Velocity, 0, "velocity:unavailable");
            }
        };

        let unit = if self.window_seconds == 60 {
            "min".to_string()
        } else {
            format!("{}s", self.window_seconds)
        };

        DetectorSignal::new(
            DetectorKind::Velocity,
            velocity_score(count, self.limit),
            format!("velocity:{}/{}", count, unit),
        )
    }
}

/// At-most-once guard per (actor, action) pair
#[derive(Clone)]
pub struct DuplicateDetector {
    store: Arc<dyn SignalStore>,
    ttl_seconds: u64,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn SignalStore>, settings: &RiskSettings) -> Self {
        Self {
            store,
            ttl_seconds: settings.duplicate_ttl_seconds,
        }
    }

    pub async fn evaluate(&self, input: &RiskInput) -> DetectorSignal {
        let (Some(actor), Some(action)) = (input.actor(), input.action()) else {
            return DetectorSignal::new(DetectorKind::Duplicate, 0, "duplicate:insufficient");
        };

        let key = duplicate_key(actor, action);
        match self.store.set_if_absent(&key, "1", self.ttl_seconds).await {
            Ok(true) => DetectorSignal::new(DetectorKind::Duplicate, 0, "duplicate:ok"),
            Ok(false) => DetectorSignal::new(
                DetectorKind::Duplicate,
                DUPLICATE_SCORE,
                "duplicate:repeat-order",
            ),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Duplicate detector degraded");
                DetectorSignal::new(DetectorKind::Duplicate, 0, "duplicate:unavailable")
            }
        }
    }
}

/// IP blacklist plus fingerprint-to-IP diversity
#[derive(Clone)]
pub struct ReputationDetector {
    store: Arc<dyn SignalStore>,
    fingerprint_ttl_seconds: u64,
    max_ips: usize,
}

impl ReputationDetector {
    pub fn new(store: Arc<dyn SignalStore>, settings: &RiskSettings) -> Self {
        Self {
            store,
            fingerprint_ttl_seconds: settings.fingerprint_ttl_seconds,
            max_ips: settings.fingerprint_max_ips,
        }
    }

    pub async fn evaluate(&self, input: &RiskInput) -> DetectorSignal {
        let mut score = 0;
        let mut reasons: Vec<&str> = Vec::new();

        if let Some(ip) = input.network_address() {
            match self.store.is_member(IP_BLACKLIST_KEY, ip).await {
                Ok(true) => {
                    score += BLACKLIST_SCORE;
                    reasons.push("ip:blacklist");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(ip = %ip, error = %e, "Blacklist lookup degraded");
                    reasons.push("ip:unavailable");
                }
            }
        }

        if let (Some(fingerprint), Some(ip)) = (input.fingerprint(), input.network_address()) {
            match self.check_fingerprint(fingerprint, ip).await {
                Ok(true) => {
                    score += MULTI_IP_SCORE;
                    reasons.push("fingerprint:multi-ip");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(fingerprint = %fingerprint, error = %e, "Fingerprint check degraded");
                    reasons.push("fingerprint:unavailable");
                }
            }
        }

        let reason = if reasons.is_empty() {
            "ipfp:ok".to_string()
        } else {
            reasons.join("|")
        };

        DetectorSignal::new(DetectorKind::Reputation, score, reason)
    }

    /// Record `ip` for `fingerprint`; true when this new IP brings the set to the limit or beyond.
    ///
    /// A repeated IP never triggers, since only the call that actually
    /// inserts it sees it as new.
    async fn check_fingerprint(
        &self,
        fingerprint: &str,
        ip: &str,
    ) -> Result<bool, crate::signal_store::SignalStoreError> {
        let key = fingerprint_key(fingerprint);

        let is_new = self
            .store
            .add_member(&key, ip, Some(self.fingerprint_ttl_seconds))
            .await?;
        let distinct_ips = self.store.cardinality(&key).await?;

        Ok(is_new && distinct_ips >= self.max_ips)
    }
}
