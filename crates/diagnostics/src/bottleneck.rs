//! Stage assessment and bottleneck ranking.
//!
//! Each stage is gated on sample size and graded against its targets. An
//! eligible stage below target gets an estimate of the extra units that
//! hitting the target would produce, carried through the downstream stages
//! to the final outcome (closed deals).

use crate::eligibility::{Eligibility, GatedStage};
use crate::rates::DerivedMetrics;
use crate::registry::{StageDefinition, StageId, TargetDirection, TargetSet};
use crate::status::{aggregate_stage_status, MetricGrade, StageStatus};
use funnel_core::{Counter, FunnelSnapshot};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ─── Impact estimates ────────────────────────────────────────────────

/// Knock-on effect on the final outcome, tagged with how far it can be
/// trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalOutcome {
    /// Every downstream stage contributed an observed rate.
    Trusted { units: u64 },
    /// At least one downstream stage had too small a sample and its target
    /// rate stood in for the observed one.
    Estimated { units: u64, fallback_stages: Vec<StageId> },
    /// Propagation stopped at a stage whose data cannot support it.
    Unavailable { blocked_at: StageId, reason: String },
}

impl FinalOutcome {
    /// Zero when unavailable.
    pub fn units(&self) -> u64 {
        match self {
            FinalOutcome::Trusted { units } | FinalOutcome::Estimated { units, .. } => *units,
            FinalOutcome::Unavailable { .. } => 0,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, FinalOutcome::Unavailable { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactEstimate {
    pub extra_numerator_units: u64,
    pub final_outcome: FinalOutcome,
    pub description: String,
}

impl ImpactEstimate {
    pub fn extra_final_outcome_units(&self) -> u64 {
        self.final_outcome.units()
    }
}

// ─── Stage assessment ────────────────────────────────────────────────

/// Computed per-stage view. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageImpact {
    pub stage: StageId,
    pub name: String,
    pub numerator: Counter,
    pub weight: f64,
    /// Defined only when the stage is eligible and the rate is computable.
    pub current_rate: Option<f64>,
    pub target_rate: Option<f64>,
    /// Shortfall below target in percentage points, floored at zero.
    pub gap_pp: Option<f64>,
    pub status: StageStatus,
    pub eligibility: Eligibility,
    /// Main metric first, then member metrics, all graded.
    pub metrics: Vec<MetricGrade>,
    pub impact: Option<ImpactEstimate>,
}

impl StageImpact {
    pub fn is_eligible(&self) -> bool {
        self.eligibility.is_eligible()
    }
}

/// Assess every stage in declaration order.
pub fn assess_stages(
    stages: &[GatedStage],
    snapshot: &FunnelSnapshot,
    derived: &DerivedMetrics,
    targets: &TargetSet,
) -> Vec<StageImpact> {
    let mut assessed: Vec<StageImpact> = stages
        .iter()
        .map(|stage| assess_stage(stage, derived, targets, snapshot))
        .collect();

    // Impact needs every downstream stage assessed first.
    for (index, gated) in stages.iter().enumerate() {
        let impact = estimate_impact(
            &gated.definition,
            &assessed[index],
            &assessed[index + 1..],
            snapshot,
        );
        assessed[index].impact = impact;
    }

    assessed
}

fn assess_stage(
    stage: &GatedStage,
    derived: &DerivedMetrics,
    targets: &TargetSet,
    snapshot: &FunnelSnapshot,
) -> StageImpact {
    let definition = &stage.definition;
    let eligibility = stage.check(snapshot);
    let target = targets.get(definition.main_metric);

    let current_rate = if eligibility.is_eligible() {
        derived.get(definition.main_metric)
    } else {
        None
    };

    let metrics: Vec<MetricGrade> = std::iter::once(MetricGrade::evaluate(
        definition.main_metric,
        current_rate,
        targets,
    ))
    .chain(
        definition
            .member_metrics
            .iter()
            .map(|&metric| MetricGrade::from_derived(metric, derived, targets)),
    )
    .collect();

    let status = match eligibility {
        Eligibility::Eligible => {
            let statuses: Vec<_> = metrics.iter().map(|m| m.status).collect();
            aggregate_stage_status(&statuses)
        }
        Eligibility::NoData { .. } => StageStatus::NoData,
        Eligibility::LowSample { .. } => StageStatus::LowSample,
    };

    let gap_pp = match (current_rate, target) {
        (Some(current), Some(target)) => Some(match target.direction {
            TargetDirection::Min => (target.value - current).max(0.0),
            TargetDirection::Max => (current - target.value).max(0.0),
        }),
        _ => None,
    };

    StageImpact {
        stage: definition.id,
        name: definition.name.clone(),
        numerator: definition.numerator,
        weight: definition.weight,
        current_rate,
        target_rate: target.map(|t| t.value),
        gap_pp,
        status,
        eligibility,
        metrics,
        impact: None,
    }
}

fn estimate_impact(
    definition: &StageDefinition,
    stage: &StageImpact,
    downstream: &[StageImpact],
    snapshot: &FunnelSnapshot,
) -> Option<ImpactEstimate> {
    if !stage.is_eligible() {
        return None;
    }
    let (current, target) = (stage.current_rate?, stage.target_rate?);
    if current >= target {
        return None;
    }
    let denominator = snapshot.get(definition.denominator).filter(|d| *d > 0.0)?;
    let numerator = snapshot.get(definition.numerator)?;

    let extra = (denominator * target / 100.0 - numerator).round();
    if extra <= 0.0 {
        return None;
    }
    let extra_units = extra as u64;
    let final_outcome = if downstream.is_empty() {
        FinalOutcome::Trusted { units: extra_units }
    } else {
        propagate(extra, downstream)
    };

    let description = describe_impact(stage, extra_units, &final_outcome, downstream.last());

    Some(ImpactEstimate {
        extra_numerator_units: extra_units,
        final_outcome,
        description,
    })
}

/// Carry `extra` units through `downstream`. Rounds once, at the end.
///
/// Eligible stages contribute their observed rate. A stage gated out for a
/// small sample contributes its target rate and downgrades the result to
/// `Estimated`. A stage with no data, an observed rate above 100% (more
/// output than input), or no rate at all blocks propagation.
pub fn propagate(extra: f64, downstream: &[StageImpact]) -> FinalOutcome {
    let mut units = extra;
    let mut fallback_stages = Vec::new();

    for stage in downstream {
        let rate = match stage.eligibility {
            Eligibility::Eligible => match stage.current_rate {
                Some(rate) if rate <= 100.0 => rate,
                Some(rate) => {
                    return FinalOutcome::Unavailable {
                        blocked_at: stage.stage,
                        reason: format!("observed rate {rate:.1}% exceeds 100%"),
                    }
                }
                None => {
                    return FinalOutcome::Unavailable {
                        blocked_at: stage.stage,
                        reason: "observed rate not computable".to_string(),
                    }
                }
            },
            Eligibility::LowSample { .. } => match stage.target_rate {
                Some(target) => {
                    fallback_stages.push(stage.stage);
                    target
                }
                None => {
                    return FinalOutcome::Unavailable {
                        blocked_at: stage.stage,
                        reason: "no target rate to fall back on".to_string(),
                    }
                }
            },
            Eligibility::NoData { field } => {
                return FinalOutcome::Unavailable {
                    blocked_at: stage.stage,
                    reason: format!("no {field} reported"),
                }
            }
        };
        units *= rate / 100.0;
    }

    let units = units.round().max(0.0) as u64;
    if fallback_stages.is_empty() {
        FinalOutcome::Trusted { units }
    } else {
        FinalOutcome::Estimated {
            units,
            fallback_stages,
        }
    }
}

fn describe_impact(
    stage: &StageImpact,
    extra_units: u64,
    outcome: &FinalOutcome,
    last: Option<&StageImpact>,
) -> String {
    let head = format!(
        "Reaching {:.1}% on {} adds ~{} {}",
        stage.target_rate.unwrap_or_default(),
        stage.name,
        extra_units,
        stage.numerator
    );
    let final_counter = last.map_or(stage.numerator, |s| s.numerator);

    match (outcome, last) {
        (_, None) => head,
        (FinalOutcome::Trusted { units }, Some(_)) => {
            format!("{head} and ~{units} {final_counter}")
        }
        (FinalOutcome::Estimated { units, fallback_stages }, Some(_)) => format!(
            "{head} and an estimated ~{units} {final_counter} (target rate used for {} stage{})",
            fallback_stages.len(),
            if fallback_stages.len() == 1 { "" } else { "s" }
        ),
        (FinalOutcome::Unavailable { blocked_at, reason }, Some(_)) => {
            format!("{head}; final impact unavailable ({blocked_at}: {reason})")
        }
    }
}

// ─── Ranking ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub stage: StageId,
    pub severity: f64,
    pub gap_pp: f64,
    pub extra_final_outcome_units: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BottleneckRanking {
    pub primary: Option<Bottleneck>,
    pub secondary: Option<Bottleneck>,
    /// First eligible `ok` stage in declaration order.
    pub best_stage: Option<StageId>,
    /// Every candidate, most severe first.
    pub ranked: Vec<Bottleneck>,
}

/// `|gap| × weight × max(1, extra final units)`.
pub fn severity(stage: &StageImpact) -> f64 {
    let gap = stage.gap_pp.unwrap_or(0.0).abs();
    let downstream = stage
        .impact
        .as_ref()
        .map_or(0, ImpactEstimate::extra_final_outcome_units)
        .max(1);
    gap * stage.weight * downstream as f64
}

/// Rank eligible, critical stages that sit below their target rate by
/// severity. Ties keep declaration order.
pub fn rank_bottlenecks(stages: &[StageImpact]) -> BottleneckRanking {
    let mut ranked: Vec<Bottleneck> = stages
        .iter()
        .filter(|s| {
            s.is_eligible()
                && s.status == StageStatus::Critical
                && s.gap_pp.is_some_and(|gap| gap > 0.0)
        })
        .map(|s| Bottleneck {
            stage: s.stage,
            severity: severity(s),
            gap_pp: s.gap_pp.unwrap_or(0.0),
            extra_final_outcome_units: s
                .impact
                .as_ref()
                .map_or(0, ImpactEstimate::extra_final_outcome_units),
        })
        .collect();

    // Stable: equal severities keep stage order.
    ranked.sort_by(|a, b| b.severity.partial_cmp(&a.severity).unwrap_or(Ordering::Equal));

    let best_stage = stages
        .iter()
        .find(|s| s.is_eligible() && s.status == StageStatus::Ok)
        .map(|s| s.stage);

    BottleneckRanking {
        primary: ranked.first().cloned(),
        secondary: ranked.get(1).cloned(),
        best_stage,
        ranked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::EligibilityGate;
    use crate::registry::{default_stages, MetricKey, MetricTarget, MetricUnit};

    fn gated() -> Vec<GatedStage> {
        EligibilityGate::default()
            .resolve_stages(&default_stages())
            .unwrap()
    }

    fn assess(snapshot: &FunnelSnapshot, targets: &TargetSet) -> Vec<StageImpact> {
        let derived = DerivedMetrics::from_snapshot(snapshot);
        assess_stages(&gated(), snapshot, &derived, targets)
    }

    fn find(stages: &[StageImpact], id: StageId) -> &StageImpact {
        stages.iter().find(|s| s.stage == id).unwrap()
    }

    #[test]
    fn test_zero_leads_all_no_data() {
        let snapshot = FunnelSnapshot::new().with(Counter::Leads, 0.0);
        let stages = assess(&snapshot, &TargetSet::default_registry());
        assert!(stages.iter().all(|s| s.status == StageStatus::NoData));
        assert!(stages.iter().all(|s| s.current_rate.is_none()));
        assert!(stages.iter().all(|s| !s.is_eligible()));
        let ranking = rank_bottlenecks(&stages);
        assert!(ranking.primary.is_none());
        assert!(ranking.ranked.is_empty());
        assert!(ranking.best_stage.is_none());
    }

    #[test]
    fn test_low_sample_stage_has_no_rate() {
        let snapshot = FunnelSnapshot::new()
            .with(Counter::Leads, 12.0)
            .with(Counter::Qualified, 1.0);
        let stages = assess(&snapshot, &TargetSet::default_registry());
        let first = find(&stages, StageId::LeadToQualified);
        assert_eq!(first.status, StageStatus::LowSample);
        assert_eq!(first.current_rate, None);
        assert!(first.impact.is_none());
    }

    #[test]
    fn test_impact_propagates_through_observed_rate() {
        let targets = TargetSet::default_registry().with_target(
            MetricKey::SalesQualifiedToOpportunityRate,
            MetricTarget::min(30.0, "SQL → Opportunity", MetricUnit::Percent),
        );
        let snapshot = FunnelSnapshot::new()
            .with(Counter::SalesQualified, 100.0)
            .with(Counter::Opportunities, 20.0)
            .with(Counter::Deals, 8.0);
        let stages = assess(&snapshot, &targets);

        let stage = find(&stages, StageId::SalesQualifiedToOpportunity);
        assert_eq!(stage.current_rate, Some(20.0));
        assert_eq!(stage.gap_pp, Some(10.0));
        let impact = stage.impact.as_ref().unwrap();
        assert_eq!(impact.extra_numerator_units, 10);
        assert_eq!(impact.final_outcome, FinalOutcome::Trusted { units: 4 });
        assert_eq!(impact.extra_final_outcome_units(), 4);
        assert!(impact.description.contains("~4 deals"));
    }

    #[test]
    fn test_last_stage_impact_is_its_own_outcome() {
        let snapshot = FunnelSnapshot::new()
            .with(Counter::Opportunities, 50.0)
            .with(Counter::Deals, 5.0);
        let stages = assess(&snapshot, &TargetSet::default_registry());
        let impact = find(&stages, StageId::OpportunityToWon).impact.clone().unwrap();
        assert_eq!(impact.extra_numerator_units, 5);
        assert_eq!(impact.final_outcome, FinalOutcome::Trusted { units: 5 });
    }

    #[test]
    fn test_low_sample_downstream_uses_target_rate() {
        // Opportunities below the 10 minimum: target 20% stands in.
        let snapshot = FunnelSnapshot::new()
            .with(Counter::SalesQualified, 100.0)
            .with(Counter::Opportunities, 8.0)
            .with(Counter::Deals, 4.0);
        let stages = assess(&snapshot, &TargetSet::default_registry());
        let impact = find(&stages, StageId::SalesQualifiedToOpportunity)
            .impact
            .clone()
            .unwrap();
        assert_eq!(impact.extra_numerator_units, 42);
        assert_eq!(
            impact.final_outcome,
            FinalOutcome::Estimated {
                units: 8,
                fallback_stages: vec![StageId::OpportunityToWon]
            }
        );
        assert!(impact.description.contains("estimated"));
    }

    #[test]
    fn test_no_data_downstream_blocks_propagation() {
        let snapshot = FunnelSnapshot::new()
            .with(Counter::Leads, 500.0)
            .with(Counter::Qualified, 50.0)
            .with(Counter::SalesQualified, 30.0);
        let stages = assess(&snapshot, &TargetSet::default_registry());
        let impact = find(&stages, StageId::LeadToQualified).impact.clone().unwrap();
        assert_eq!(impact.extra_numerator_units, 75);
        assert!(!impact.final_outcome.is_available());
        assert_eq!(impact.extra_final_outcome_units(), 0);
        assert!(impact.description.contains("final impact unavailable"));
    }

    #[test]
    fn test_inconsistent_downstream_blocks_propagation() {
        let snapshot = FunnelSnapshot::new()
            .with(Counter::SalesQualified, 100.0)
            .with(Counter::Opportunities, 20.0)
            .with(Counter::Deals, 35.0);
        let stages = assess(&snapshot, &TargetSet::default_registry());
        let impact = find(&stages, StageId::SalesQualifiedToOpportunity)
            .impact
            .clone()
            .unwrap();
        assert_eq!(
            impact.final_outcome,
            FinalOutcome::Unavailable {
                blocked_at: StageId::OpportunityToWon,
                reason: "observed rate 175.0% exceeds 100%".to_string()
            }
        );
    }

    #[test]
    fn test_rounding_happens_once() {
        let downstream = |rate: f64| StageImpact {
            stage: StageId::OpportunityToWon,
            name: "x".into(),
            numerator: Counter::Deals,
            weight: 1.0,
            current_rate: Some(rate),
            target_rate: Some(20.0),
            gap_pp: Some(0.0),
            status: StageStatus::Ok,
            eligibility: Eligibility::Eligible,
            metrics: vec![],
            impact: None,
        };
        // 5 × 0.3 × 0.3 = 0.45 rounds to 0; rounding after each stage would give 1.
        let outcome = propagate(5.0, &[downstream(30.0), downstream(30.0)]);
        assert_eq!(outcome, FinalOutcome::Trusted { units: 0 });
        let outcome = propagate(3.0, &[downstream(50.0), downstream(50.0)]);
        assert_eq!(outcome, FinalOutcome::Trusted { units: 1 });
    }

    #[test]
    fn test_ranking_by_severity_with_best_stage() {
        let snapshot = FunnelSnapshot {
            leads: Some(1000.0),
            qualified: Some(300.0),
            sales_qualified: Some(60.0),
            opportunities: Some(20.0),
            deals: Some(2.0),
            ..Default::default()
        };
        let stages = assess(&snapshot, &TargetSet::default_registry());
        // lead→qualified 30% ok; qualified→SQL 20% fail; SQL→opp 33.3% fail; opp→won 10% fail.
        let ranking = rank_bottlenecks(&stages);
        assert_eq!(ranking.best_stage, Some(StageId::LeadToQualified));
        assert_eq!(ranking.ranked.len(), 3);
        let primary = ranking.primary.unwrap();
        assert_eq!(primary.stage, StageId::QualifiedToSalesQualified);
        assert!(ranking.ranked.windows(2).all(|w| w[0].severity >= w[1].severity));
        assert_eq!(ranking.secondary.unwrap().stage, ranking.ranked[1].stage);
    }

    #[test]
    fn test_member_failure_alone_is_not_a_bottleneck() {
        // Rate passes at 30%; only the first-touch member fails.
        let snapshot = FunnelSnapshot {
            leads: Some(1000.0),
            qualified: Some(300.0),
            first_touch_minutes: Some(60.0),
            ..Default::default()
        };
        let stages = assess(&snapshot, &TargetSet::default_registry());
        let first = find(&stages, StageId::LeadToQualified);
        assert_eq!(first.status, StageStatus::Critical);
        assert_eq!(first.gap_pp, Some(0.0));

        let ranking = rank_bottlenecks(&stages);
        assert!(ranking.primary.is_none());
        assert!(ranking.ranked.is_empty());
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        let stage = |id: StageId| StageImpact {
            stage: id,
            name: id.to_string(),
            numerator: Counter::Deals,
            weight: 1.0,
            current_rate: Some(10.0),
            target_rate: Some(20.0),
            gap_pp: Some(10.0),
            status: StageStatus::Critical,
            eligibility: Eligibility::Eligible,
            metrics: vec![],
            impact: None,
        };
        let ranking = rank_bottlenecks(&[
            stage(StageId::QualifiedToSalesQualified),
            stage(StageId::SalesQualifiedToOpportunity),
        ]);
        assert_eq!(ranking.primary.unwrap().stage, StageId::QualifiedToSalesQualified);
        assert_eq!(ranking.secondary.unwrap().stage, StageId::SalesQualifiedToOpportunity);
    }
}
