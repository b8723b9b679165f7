//! Cache lifetime by result quality.

use std::time::Duration;

use super::request::EnhancedResult;
use crate::cache::Ttl;

/// Chooses a cache TTL for a result. Enhanced results live longest, then
/// high-quality ones; low-quality results expire soonest.
#[derive(Debug, Clone, PartialEq)]
pub struct TtlPolicy {
    pub enhanced: Duration,
    pub high_quality: Duration,
    pub default: Duration,
    pub low_quality: Duration,
    /// Scores at or above this are high quality.
    pub high_quality_threshold: f64,
    /// Scores below this are low quality.
    pub low_quality_threshold: f64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            enhanced: Duration::from_secs(24 * 3600),
            high_quality: Duration::from_secs(12 * 3600),
            default: Duration::from_secs(3600),
            low_quality: Duration::from_secs(15 * 60),
            high_quality_threshold: 0.8,
            low_quality_threshold: 0.5,
        }
    }
}

impl TtlPolicy {
    pub fn duration_for(&self, result: &EnhancedResult) -> Duration {
        if result.enhanced {
            self.enhanced
        } else if result.quality_score >= self.high_quality_threshold {
            self.high_quality
        } else if result.quality_score < self.low_quality_threshold {
            self.low_quality
        } else {
            self.default
        }
    }

    pub fn ttl_for(&self, result: &EnhancedResult) -> Ttl {
        Ttl::After(self.duration_for(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Artifact;

    fn result(score: f64, enhanced: bool) -> EnhancedResult {
        let mut artifact = Artifact::new("x", score, "p");
        artifact.enhanced = enhanced;
        EnhancedResult::from_artifact("k", artifact)
    }

    #[test]
    fn tiers_are_ordered_by_quality() {
        let policy = TtlPolicy::default();
        let enhanced = policy.duration_for(&result(0.3, true));
        let high = policy.duration_for(&result(0.85, false));
        let default = policy.duration_for(&result(0.6, false));
        let low = policy.duration_for(&result(0.2, false));
        assert!(enhanced > high);
        assert!(high > default);
        assert!(default > low);
    }

    #[test]
    fn thresholds_are_inclusive_for_high_quality() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.duration_for(&result(0.8, false)), policy.high_quality);
        assert_eq!(policy.duration_for(&result(0.5, false)), policy.default);
    }
}
