use std::fmt;
use serde::{Deserialize, Serialize};
use crate::detect::Metrics;

pub const PASS_CEILING: f64 = 0.4;
pub const WARNING_CEILING: f64 = 0.7;
/// Minimum severity of a pair whose synthesis had to be replaced
pub const DEGRADED_SEVERITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warning,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Pass => "PASS",
            Verdict::Warning => "WARNING",
            Verdict::Fail => "FAIL",
        })
    }
}

pub fn verdict_for(severity: f64) -> Verdict {
    if severity <= PASS_CEILING {
        Verdict::Pass
    } else if severity <= WARNING_CEILING {
        Verdict::Warning
    } else {
        Verdict::Fail
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub verdict: Verdict,
    /// 0.0..=1.0
    pub severity: f64,
    pub details: Vec<String>,
}

impl Explanation {
    fn from_parts(severity: f64, details: Vec<String>) -> Self {
        let severity = severity.clamp(0.0, 1.0);
        Self { verdict: verdict_for(severity), severity, details }
    }

    /// Marks a pair whose synthesized frame is a stand-in, never PASS
    pub fn degraded(mut self, reason: impl fmt::Display) -> Self {
        self.details.push(format!("Synthesis failed ({}). A linear blend was substituted.", reason));
        Self::from_parts(self.severity.max(DEGRADED_SEVERITY), self.details)
    }

    /// A pair that could not be analyzed at all
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::from_parts(1.0, vec![format!("Artifact analysis failed ({}). The frame could not be graded.", reason)])
    }
}

struct Rule {
    applies: fn(&Metrics) -> bool,
    /// Hundredths of severity, summed as integers so thresholds are hit exactly
    delta: u32,
    message: fn(&Metrics) -> String,
}

/// Evaluated top to bottom, which fixes the order of the rationale lines
const RULES: [Rule; 7] = [
    Rule {
        applies: |m| m.motion_complexity > 5.0,
        delta: 40,
        message: |m| format!("High motion detected (magnitude: {:.2}). This increases the risk of occlusion artifacts.", m.motion_complexity),
    },
    Rule {
        applies: |m| m.motion_complexity > 2.0 && m.motion_complexity <= 5.0,
        delta: 10,
        message: |m| format!("Moderate motion detected (magnitude: {:.2}).", m.motion_complexity),
    },
    Rule {
        applies: |m| m.motion_complexity <= 2.0,
        delta: 0,
        message: |_| "Low motion scene. Interpolation should be reliable.".to_string(),
    },
    Rule {
        applies: |m| m.temporal_consistency < 0.8,
        delta: 50,
        message: |m| format!(
            "Low temporal consistency ({:.2}). The interpolated frame deviates significantly from its neighbors, suggesting warping or structural errors.",
            m.temporal_consistency
        ),
    },
    Rule {
        applies: |m| m.edge_preservation < 0.8,
        delta: 30,
        message: |m| format!("Reduced edge density ({:.2}). The frame may suffer from blurring or ghosting.", m.edge_preservation),
    },
    Rule {
        applies: |m| m.edge_preservation > 1.2,
        delta: 20,
        message: |m| format!("Increased edge density ({:.2}). Potential high-frequency noise or artifacts introduced.", m.edge_preservation),
    },
    Rule {
        applies: |m| m.occlusion_risk > 20.0,
        delta: 30,
        message: |m| format!("High occlusion risk detected (diff: {:.2}).", m.occlusion_risk),
    },
];

/// Grades one synthesized frame. Pure function of the metrics.
pub fn explain(metrics: &Metrics) -> Explanation {
    let mut hundredths = 0u32;
    let mut details = Vec::new();
    for rule in RULES.iter().filter(|r| (r.applies)(metrics)) {
        hundredths += rule.delta;
        details.push((rule.message)(metrics));
    }
    Explanation::from_parts(hundredths.min(100) as f64 / 100.0, details)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nominal() -> Metrics {
        Metrics {
            motion_complexity: 0.5,
            temporal_consistency: 0.97,
            edge_preservation: 1.0,
            occlusion_risk: 3.0,
        }
    }

    #[test]
    fn verdict_boundaries() {
        assert_eq!(verdict_for(0.0), Verdict::Pass);
        assert_eq!(verdict_for(0.4), Verdict::Pass);
        assert_eq!(verdict_for(0.41), Verdict::Warning);
        assert_eq!(verdict_for(0.7), Verdict::Warning);
        assert_eq!(verdict_for(0.71), Verdict::Fail);
        assert_eq!(verdict_for(1.0), Verdict::Fail);
    }

    #[test]
    fn nominal_metrics_pass_with_low_motion_note() {
        let explanation = explain(&nominal());
        assert_eq!(explanation.severity, 0.0);
        assert_eq!(explanation.verdict, Verdict::Pass);
        assert_eq!(explanation.details.len(), 1);
        assert!(explanation.details[0].starts_with("Low motion scene"));
    }

    #[test]
    fn low_consistency_alone_warns() {
        let explanation = explain(&Metrics { temporal_consistency: 0.5, ..nominal() });
        assert!(explanation.severity >= 0.5);
        assert_eq!(explanation.verdict, Verdict::Warning);
        assert!(explanation.details[1].contains("0.50"));
    }

    #[test]
    fn high_motion_and_blur_sum() {
        let explanation = explain(&Metrics { motion_complexity: 6.0, edge_preservation: 0.5, ..nominal() });
        assert_eq!(explanation.severity, 0.7);
        assert_eq!(explanation.verdict, Verdict::Warning);
        assert!(explanation.details[0].starts_with("High motion"));
        assert!(explanation.details[1].starts_with("Reduced edge density"));
    }

    #[test]
    fn summed_deltas_land_on_exact_thresholds() {
        let noisy = explain(&Metrics { motion_complexity: 3.0, edge_preservation: 1.5, ..nominal() });
        assert_eq!(noisy.severity, 0.3);

        // 0.1 + 0.3 + 0.3 sits exactly on the warning ceiling
        let edge = explain(&Metrics { motion_complexity: 3.0, edge_preservation: 0.5, occlusion_risk: 25.0, ..nominal() });
        assert_eq!(edge.severity, WARNING_CEILING);
        assert_eq!(edge.verdict, Verdict::Warning);
    }

    #[test]
    fn moderate_motion_boundary() {
        assert!(explain(&Metrics { motion_complexity: 2.0, ..nominal() }).details[0].starts_with("Low motion"));
        let moderate = explain(&Metrics { motion_complexity: 5.0, ..nominal() });
        assert!((moderate.severity - 0.1).abs() < 1e-12);
        assert!(moderate.details[0].starts_with("Moderate motion"));
    }

    #[test]
    fn everything_wrong_is_capped() {
        let explanation = explain(&Metrics {
            motion_complexity: 12.0,
            temporal_consistency: -0.2,
            edge_preservation: 3.0,
            occlusion_risk: 60.0,
        });
        assert_eq!(explanation.severity, 1.0);
        assert_eq!(explanation.verdict, Verdict::Fail);
        // motion, consistency, edges, occlusion
        assert_eq!(explanation.details.len(), 4);
        assert!(explanation.details[3].starts_with("High occlusion"));
    }

    #[test]
    fn degraded_is_never_pass() {
        let explanation = explain(&nominal()).degraded("model timed out");
        assert_eq!(explanation.severity, DEGRADED_SEVERITY);
        assert_eq!(explanation.verdict, Verdict::Warning);
        assert!(explanation.details.last().unwrap().contains("model timed out"));
    }

    #[test]
    fn degraded_keeps_higher_severity() {
        let explanation = explain(&Metrics { temporal_consistency: 0.1, occlusion_risk: 30.0, ..nominal() }).degraded("x");
        assert!((explanation.severity - 0.8).abs() < 1e-12);
        assert_eq!(explanation.verdict, Verdict::Fail);
    }

    #[test]
    fn failed_analysis_is_fail() {
        let explanation = Explanation::failed("bad frame");
        assert_eq!(explanation.severity, 1.0);
        assert_eq!(explanation.verdict, Verdict::Fail);
    }

    #[test]
    fn verdict_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Verdict::Warning).unwrap(), "\"WARNING\"");
    }
}
