//! Confidence scoring: a single 0–100 trust score for a snapshot, built
//! from sample-size, completeness, and consistency penalties.

use funnel_core::config::{ConfidenceConfig, SamplePenaltyConfig};
use funnel_core::{Counter, FunnelSnapshot};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

/// Declaration order doubles as the tie-break order for top penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyCategory {
    Sample,
    Completeness,
    Consistency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub reason: String,
    pub points: f64,
    pub category: PenaltyCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub score: f64,
    pub tier: ConfidenceTier,
    /// In check order.
    pub penalties: Vec<Penalty>,
    /// The two heaviest penalties, for explaining the score.
    pub top_penalties: Vec<Penalty>,
    pub has_inconsistency: bool,
}

/// The two heaviest penalties. Ties go to the earlier category, then to the
/// earlier check.
pub fn top_penalties(penalties: &[Penalty]) -> Vec<Penalty> {
    let mut ranked: Vec<&Penalty> = penalties.iter().collect();
    ranked.sort_by(|a, b| {
        b.points
            .partial_cmp(&a.points)
            .unwrap_or(Ordering::Equal)
            .then(a.category.cmp(&b.category))
    });
    ranked.into_iter().take(2).cloned().collect()
}

impl ConfidenceResult {
    pub fn total_deducted(&self) -> f64 {
        self.penalties.iter().map(|p| p.points).sum()
    }
}

/// Stage denominators checked for sample size, top of funnel first.
const SAMPLE_CHECKS: [Counter; 4] = [
    Counter::Leads,
    Counter::Qualified,
    Counter::SalesQualified,
    Counter::Opportunities,
];

/// (downstream, upstream) pairs that must satisfy downstream ≤ upstream.
const ORDER_CHECKS: [(Counter, Counter); 4] = [
    (Counter::Qualified, Counter::Leads),
    (Counter::SalesQualified, Counter::Qualified),
    (Counter::Opportunities, Counter::SalesQualified),
    (Counter::Deals, Counter::Opportunities),
];

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ConfidenceConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn tier_for(&self, score: f64) -> ConfidenceTier {
        if score < self.config.medium_from {
            ConfidenceTier::Low
        } else if score < self.config.high_from {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::High
        }
    }

    pub fn score_confidence(&self, snapshot: &FunnelSnapshot) -> ConfidenceResult {
        let mut penalties = Vec::new();
        self.sample_penalties(snapshot, &mut penalties);
        self.completeness_penalties(snapshot, &mut penalties);
        let violations = self.consistency_penalties(snapshot, &mut penalties);

        let deducted: f64 = penalties.iter().map(|p| p.points).sum();
        let score = (100.0 - deducted).clamp(0.0, 100.0);
        let tier = self.tier_for(score);

        tracing::debug!(score, ?tier, penalties = penalties.len(), violations, "confidence scored");

        ConfidenceResult {
            score,
            tier,
            top_penalties: top_penalties(&penalties),
            penalties,
            has_inconsistency: violations > 0,
        }
    }

    fn sample_config(&self, counter: Counter) -> &SamplePenaltyConfig {
        match counter {
            Counter::Qualified => &self.config.qualified,
            Counter::SalesQualified => &self.config.sales_qualified,
            Counter::Opportunities => &self.config.opportunities,
            _ => &self.config.leads,
        }
    }

    fn sample_penalties(&self, snapshot: &FunnelSnapshot, out: &mut Vec<Penalty>) {
        for counter in SAMPLE_CHECKS {
            let cfg = self.sample_config(counter);
            let penalty = match snapshot.get(counter) {
                None => Some((cfg.missing, format!("{counter} missing"))),
                Some(v) if v == 0.0 => Some((cfg.missing, format!("{counter} missing"))),
                Some(v) if v < cfg.small_below => Some((
                    cfg.small,
                    format!("very small {counter} sample ({v:.0} < {:.0})", cfg.small_below),
                )),
                Some(v) if v < cfg.moderate_below => Some((
                    cfg.moderate,
                    format!("small {counter} sample ({v:.0} < {:.0})", cfg.moderate_below),
                )),
                Some(_) => None,
            };
            if let Some((points, reason)) = penalty {
                out.push(Penalty {
                    reason,
                    points,
                    category: PenaltyCategory::Sample,
                });
            }
        }
    }

    fn completeness_penalties(&self, snapshot: &FunnelSnapshot, out: &mut Vec<Penalty>) {
        let mut push = |points: f64, reason: &str| {
            out.push(Penalty {
                reason: reason.to_string(),
                points,
                category: PenaltyCategory::Completeness,
            })
        };

        if snapshot.spend.is_none() {
            push(self.config.missing_spend, "media spend not reported");
        }
        if snapshot.first_touch_minutes.is_none() {
            push(self.config.missing_first_touch, "time to first touch not reported");
        }
        if snapshot.spend.is_some() && (snapshot.clicks.is_none() || snapshot.impressions.is_none()) {
            push(
                self.config.spend_without_media,
                "spend reported without clicks and impressions",
            );
        }
    }

    /// Returns the number of violations found. Each one is penalised.
    fn consistency_penalties(&self, snapshot: &FunnelSnapshot, out: &mut Vec<Penalty>) -> usize {
        let mut violations = 0;
        for (downstream, upstream) in ORDER_CHECKS {
            if let (Some(down), Some(up)) = (snapshot.get(downstream), snapshot.get(upstream)) {
                if down > up {
                    violations += 1;
                    out.push(Penalty {
                        reason: format!("{downstream} ({down:.0}) exceeds {upstream} ({up:.0})"),
                        points: self.config.consistency_violation,
                        category: PenaltyCategory::Consistency,
                    });
                }
            }
        }
        violations
    }
}
