// Metrics hooks for identity resolution.
//
// An `IdentityResolver` reports every resolution, and every drift anomaly, to
// the `ResolveMetrics` observer it was built with. No observer means no
// reporting; there is no process-wide recorder.
use std::time::Duration;

use crate::types::{LookupTier, Resolution};

/// Metrics observer for resolution outcomes.
pub trait ResolveMetrics: Send + Sync {
    /// Record one resolution.
    ///
    /// `candidates` is the number of thresholded candidates considered and
    /// `latency` the wall-clock time spent looking them up.
    fn record_resolution(&self, resolution: &Resolution, candidates: usize, latency: Duration);

    /// Record that `identity_key` matched the probe but maps to no record.
    fn record_drift(&self, identity_key: &str);

    /// Record which lookup tier produced a match. Legacy tiers firing means
    /// un-migrated data is still being served.
    fn record_tier(&self, _tier: LookupTier) {}
}
