//! Promotion rule for a freshly evaluated model version.

use serde::{Deserialize, Serialize};

/// Why a candidate was or was not promoted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PromotionDecision {
    /// Accuracy is under the promotion threshold.
    BelowThreshold { accuracy: f64, threshold: f64 },
    /// Nothing holds the stage yet.
    NoIncumbent { accuracy: f64 },
    Outperforms { accuracy: f64, incumbent: f64 },
    Underperforms { accuracy: f64, incumbent: f64 },
}

impl PromotionDecision {
    pub fn promoted(&self) -> bool {
        matches!(self, Self::NoIncumbent { .. } | Self::Outperforms { .. })
    }
}

/// Decide whether a candidate with test `accuracy` takes the stage.
///
/// `incumbent` is the recorded test accuracy of the version currently
/// holding the stage, if any. A candidate must reach `threshold` and then
/// strictly beat the incumbent.
pub fn decide_promotion(accuracy: f64, threshold: f64, incumbent: Option<f64>) -> PromotionDecision {
    if accuracy < threshold {
        return PromotionDecision::BelowThreshold { accuracy, threshold };
    }
    match incumbent {
        None => PromotionDecision::NoIncumbent { accuracy },
        Some(incumbent) if accuracy > incumbent => PromotionDecision::Outperforms { accuracy, incumbent },
        Some(incumbent) => PromotionDecision::Underperforms { accuracy, incumbent },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_is_never_promoted() {
        assert!(!decide_promotion(0.79, 0.8, None).promoted());
        assert!(!decide_promotion(0.79, 0.8, Some(0.1)).promoted());
    }

    #[test]
    fn test_first_model_is_promoted() {
        let decision = decide_promotion(0.85, 0.8, None);
        assert_eq!(decision, PromotionDecision::NoIncumbent { accuracy: 0.85 });
        assert!(decision.promoted());
    }

    #[test]
    fn test_must_strictly_beat_incumbent() {
        assert!(!decide_promotion(0.85, 0.8, Some(0.90)).promoted());
        assert!(!decide_promotion(0.90, 0.8, Some(0.90)).promoted());
        assert!(decide_promotion(0.91, 0.8, Some(0.90)).promoted());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(decide_promotion(0.8, 0.8, None).promoted());
    }
}
