//! Metric registry: target values, comparison direction, and display
//! metadata for every graded metric, plus the stage and sample-size tables.
//!
//! All tables are plain values built by constructor functions. Callers that
//! want different targets build a new `TargetSet`; the defaults are never
//! mutated in place.

use funnel_core::config::BenchmarkProfile;
use funnel_core::{Counter, DiagnosticError, DiagnosticResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─── Metric keys ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    LeadToQualifiedRate,
    QualifiedToSalesQualifiedRate,
    SalesQualifiedToOpportunityRate,
    OpportunityToWonRate,
    LeadToWonRate,
    ClickThroughRate,
    ClickToLeadRate,
    CostPerClick,
    CostPerLead,
    CostPerOpportunity,
    CostPerDeal,
    ReturnOnAdSpend,
    FirstTouchMinutes,
    ConnectRate,
    SalesCycleDays,
    DiscountRate,
}

impl MetricKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::LeadToQualifiedRate => "lead_to_qualified_rate",
            MetricKey::QualifiedToSalesQualifiedRate => "qualified_to_sales_qualified_rate",
            MetricKey::SalesQualifiedToOpportunityRate => "sales_qualified_to_opportunity_rate",
            MetricKey::OpportunityToWonRate => "opportunity_to_won_rate",
            MetricKey::LeadToWonRate => "lead_to_won_rate",
            MetricKey::ClickThroughRate => "click_through_rate",
            MetricKey::ClickToLeadRate => "click_to_lead_rate",
            MetricKey::CostPerClick => "cost_per_click",
            MetricKey::CostPerLead => "cost_per_lead",
            MetricKey::CostPerOpportunity => "cost_per_opportunity",
            MetricKey::CostPerDeal => "cost_per_deal",
            MetricKey::ReturnOnAdSpend => "return_on_ad_spend",
            MetricKey::FirstTouchMinutes => "first_touch_minutes",
            MetricKey::ConnectRate => "connect_rate",
            MetricKey::SalesCycleDays => "sales_cycle_days",
            MetricKey::DiscountRate => "discount_rate",
        }
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Targets ─────────────────────────────────────────────────────────

/// `Min` means higher is better (the target is a floor); `Max` means lower
/// is better (the target is a ceiling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDirection {
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    #[default]
    Percent,
    Currency,
    Ratio,
    Minutes,
    Days,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTarget {
    pub value: f64,
    pub direction: TargetDirection,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub unit: MetricUnit,
    /// Decimal places used when the value is rendered.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    1
}

impl MetricTarget {
    pub fn new(value: f64, direction: TargetDirection, label: &str, unit: MetricUnit) -> Self {
        let decimals = match unit {
            MetricUnit::Percent => 1,
            MetricUnit::Currency | MetricUnit::Ratio => 2,
            MetricUnit::Minutes | MetricUnit::Days => 0,
        };
        Self {
            value,
            direction,
            label: label.to_string(),
            unit,
            decimals,
        }
    }

    pub fn min(value: f64, label: &str, unit: MetricUnit) -> Self {
        Self::new(value, TargetDirection::Min, label, unit)
    }

    pub fn max(value: f64, label: &str, unit: MetricUnit) -> Self {
        Self::new(value, TargetDirection::Max, label, unit)
    }

    /// Renders `value` with this target's unit and precision.
    pub fn format_value(&self, value: f64) -> String {
        let precision = usize::from(self.decimals);
        match self.unit {
            MetricUnit::Percent => format!("{value:.precision$}%"),
            MetricUnit::Currency => format!("${value:.precision$}"),
            MetricUnit::Ratio => format!("{value:.precision$}x"),
            MetricUnit::Minutes => format!("{value:.precision$} min"),
            MetricUnit::Days => format!("{value:.precision$} days"),
        }
    }
}

/// Mapping from metric key to target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetSet {
    targets: BTreeMap<MetricKey, MetricTarget>,
}

impl TargetSet {
    pub fn empty() -> Self {
        Self {
            targets: BTreeMap::new(),
        }
    }

    /// The default registry.
    pub fn default_registry() -> Self {
        use MetricUnit::*;

        let entries = [
            (MetricKey::LeadToQualifiedRate, MetricTarget::min(25.0, "Lead → Qualified", Percent)),
            (
                MetricKey::QualifiedToSalesQualifiedRate,
                MetricTarget::min(40.0, "Qualified → Sales Qualified", Percent),
            ),
            (
                MetricKey::SalesQualifiedToOpportunityRate,
                MetricTarget::min(50.0, "Sales Qualified → Opportunity", Percent),
            ),
            (MetricKey::OpportunityToWonRate, MetricTarget::min(20.0, "Opportunity → Won", Percent)),
            (MetricKey::LeadToWonRate, MetricTarget::min(2.0, "Lead → Won", Percent)),
            (MetricKey::ClickThroughRate, MetricTarget::min(1.0, "Click-through rate", Percent)),
            (MetricKey::ClickToLeadRate, MetricTarget::min(5.0, "Click → Lead", Percent)),
            (MetricKey::CostPerClick, MetricTarget::max(3.0, "Cost per click", Currency)),
            (MetricKey::CostPerLead, MetricTarget::max(80.0, "Cost per lead", Currency)),
            (MetricKey::CostPerOpportunity, MetricTarget::max(400.0, "Cost per opportunity", Currency)),
            (MetricKey::CostPerDeal, MetricTarget::max(2000.0, "Cost per deal", Currency)),
            (MetricKey::ReturnOnAdSpend, MetricTarget::min(3.0, "Return on ad spend", Ratio)),
            (MetricKey::FirstTouchMinutes, MetricTarget::max(15.0, "Time to first touch", Minutes)),
            (MetricKey::ConnectRate, MetricTarget::min(60.0, "Connect rate", Percent)),
            (MetricKey::SalesCycleDays, MetricTarget::max(45.0, "Sales cycle", Days)),
            (MetricKey::DiscountRate, MetricTarget::max(15.0, "Average discount", Percent)),
        ];

        Self {
            targets: entries.into_iter().collect(),
        }
    }

    /// Default registry with an industry benchmark's target values applied.
    pub fn for_profile(profile: BenchmarkProfile) -> Self {
        let overrides: &[(MetricKey, f64)] = match profile {
            BenchmarkProfile::Default => &[],
            BenchmarkProfile::B2bSaas => &[
                (MetricKey::LeadToQualifiedRate, 30.0),
                (MetricKey::QualifiedToSalesQualifiedRate, 45.0),
                (MetricKey::SalesQualifiedToOpportunityRate, 55.0),
                (MetricKey::OpportunityToWonRate, 22.0),
                (MetricKey::CostPerLead, 150.0),
                (MetricKey::CostPerDeal, 5000.0),
                (MetricKey::SalesCycleDays, 60.0),
            ],
            BenchmarkProfile::Ecommerce => &[
                (MetricKey::LeadToQualifiedRate, 15.0),
                (MetricKey::OpportunityToWonRate, 30.0),
                (MetricKey::ClickThroughRate, 1.5),
                (MetricKey::CostPerLead, 30.0),
                (MetricKey::CostPerDeal, 150.0),
                (MetricKey::FirstTouchMinutes, 5.0),
                (MetricKey::SalesCycleDays, 7.0),
            ],
            BenchmarkProfile::ProfessionalServices => &[
                (MetricKey::LeadToQualifiedRate, 35.0),
                (MetricKey::OpportunityToWonRate, 30.0),
                (MetricKey::CostPerLead, 120.0),
                (MetricKey::SalesCycleDays, 30.0),
            ],
        };

        Self::default_registry().with_values(overrides.iter().copied())
    }

    pub fn get(&self, key: MetricKey) -> Option<&MetricTarget> {
        self.targets.get(&key)
    }

    pub fn contains(&self, key: MetricKey) -> bool {
        self.targets.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricKey, &MetricTarget)> {
        self.targets.iter()
    }

    /// Returns a copy with `key` replaced by `target`.
    pub fn with_target(&self, key: MetricKey, target: MetricTarget) -> Self {
        let mut next = self.clone();
        next.targets.insert(key, target);
        next
    }

    /// Returns a copy with the target values of existing keys replaced.
    /// Direction and display metadata are kept; unknown keys are ignored.
    pub fn with_values(&self, values: impl IntoIterator<Item = (MetricKey, f64)>) -> Self {
        let mut next = self.clone();
        for (key, value) in values {
            if let Some(target) = next.targets.get_mut(&key) {
                target.value = value;
            }
        }
        next
    }

    /// Returns a copy with every entry of `overrides` layered on top.
    pub fn merged(&self, overrides: &TargetSet) -> Self {
        let mut next = self.clone();
        for (key, target) in &overrides.targets {
            next.targets.insert(*key, target.clone());
        }
        next
    }

    /// Every metric a stage grades must have a target.
    pub fn validate_stages(&self, stages: &[StageDefinition]) -> DiagnosticResult<()> {
        for stage in stages {
            for metric in stage.graded_metrics() {
                if !self.contains(metric) {
                    return Err(DiagnosticError::MissingTarget {
                        metric: metric.to_string(),
                        stage: stage.id.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for TargetSet {
    fn default() -> Self {
        Self::default_registry()
    }
}

// ─── Stages ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    LeadToQualified,
    QualifiedToSalesQualified,
    SalesQualifiedToOpportunity,
    OpportunityToWon,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::LeadToQualified => "lead_to_qualified",
            StageId::QualifiedToSalesQualified => "qualified_to_sales_qualified",
            StageId::SalesQualifiedToOpportunity => "sales_qualified_to_opportunity",
            StageId::OpportunityToWon => "opportunity_to_won",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the funnel. Stage order is significant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDefinition {
    pub id: StageId,
    pub name: String,
    pub numerator: Counter,
    pub denominator: Counter,
    pub main_metric: MetricKey,
    /// Process metrics graded alongside the main conversion rate.
    pub member_metrics: Vec<MetricKey>,
    /// Severity multiplier; earlier stages weigh slightly more.
    pub weight: f64,
}

impl StageDefinition {
    /// Main metric first, then members in declaration order.
    pub fn graded_metrics(&self) -> impl Iterator<Item = MetricKey> + '_ {
        std::iter::once(self.main_metric).chain(self.member_metrics.iter().copied())
    }
}

pub fn default_stages() -> Vec<StageDefinition> {
    vec![
        StageDefinition {
            id: StageId::LeadToQualified,
            name: "Lead → Qualified".to_string(),
            numerator: Counter::Qualified,
            denominator: Counter::Leads,
            main_metric: MetricKey::LeadToQualifiedRate,
            member_metrics: vec![MetricKey::FirstTouchMinutes],
            weight: 1.3,
        },
        StageDefinition {
            id: StageId::QualifiedToSalesQualified,
            name: "Qualified → Sales Qualified".to_string(),
            numerator: Counter::SalesQualified,
            denominator: Counter::Qualified,
            main_metric: MetricKey::QualifiedToSalesQualifiedRate,
            member_metrics: vec![MetricKey::ConnectRate],
            weight: 1.2,
        },
        StageDefinition {
            id: StageId::SalesQualifiedToOpportunity,
            name: "Sales Qualified → Opportunity".to_string(),
            numerator: Counter::Opportunities,
            denominator: Counter::SalesQualified,
            main_metric: MetricKey::SalesQualifiedToOpportunityRate,
            member_metrics: vec![],
            weight: 1.1,
        },
        StageDefinition {
            id: StageId::OpportunityToWon,
            name: "Opportunity → Won".to_string(),
            numerator: Counter::Deals,
            denominator: Counter::Opportunities,
            main_metric: MetricKey::OpportunityToWonRate,
            member_metrics: vec![MetricKey::SalesCycleDays, MetricKey::DiscountRate],
            weight: 1.0,
        },
    ]
}

// ─── Sample-size thresholds ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityThreshold {
    pub stage: StageId,
    pub denominator: Counter,
    pub min_sample_size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequiredField {
    pub counter: Counter,
    pub min: f64,
}

/// Gate for a rate-based media metric; every required field must clear
/// its own minimum, checked in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetricThreshold {
    pub metric: MetricKey,
    pub required: Vec<RequiredField>,
}

/// Sample-size tables consumed by the eligibility gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTables {
    pub stages: Vec<EligibilityThreshold>,
    pub media: Vec<MediaMetricThreshold>,
}

impl ThresholdTables {
    pub fn stage(&self, stage: StageId) -> Option<&EligibilityThreshold> {
        self.stages.iter().find(|t| t.stage == stage)
    }

    pub fn media(&self, metric: MetricKey) -> Option<&MediaMetricThreshold> {
        self.media.iter().find(|t| t.metric == metric)
    }

    /// Every stage needs a threshold, and every media gate must name a
    /// metric the target set can grade.
    pub fn validate(&self, stages: &[StageDefinition], targets: &TargetSet) -> DiagnosticResult<()> {
        for stage in stages {
            if self.stage(stage.id).is_none() {
                return Err(DiagnosticError::MissingThreshold {
                    stage: stage.id.to_string(),
                });
            }
        }
        for gate in &self.media {
            if !targets.contains(gate.metric) {
                return Err(DiagnosticError::UnknownMediaMetric {
                    metric: gate.metric.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for ThresholdTables {
    fn default() -> Self {
        let field = |counter, min| RequiredField { counter, min };
        let media = |metric, required| MediaMetricThreshold { metric, required };

        Self {
            stages: vec![
                EligibilityThreshold {
                    stage: StageId::LeadToQualified,
                    denominator: Counter::Leads,
                    min_sample_size: 30.0,
                },
                EligibilityThreshold {
                    stage: StageId::QualifiedToSalesQualified,
                    denominator: Counter::Qualified,
                    min_sample_size: 20.0,
                },
                EligibilityThreshold {
                    stage: StageId::SalesQualifiedToOpportunity,
                    denominator: Counter::SalesQualified,
                    min_sample_size: 15.0,
                },
                EligibilityThreshold {
                    stage: StageId::OpportunityToWon,
                    denominator: Counter::Opportunities,
                    min_sample_size: 10.0,
                },
            ],
            media: vec![
                media(
                    MetricKey::ClickThroughRate,
                    vec![field(Counter::Impressions, 1000.0), field(Counter::Clicks, 20.0)],
                ),
                media(
                    MetricKey::ClickToLeadRate,
                    vec![field(Counter::Clicks, 50.0), field(Counter::Leads, 10.0)],
                ),
                // Spend gates only on presence; zero spend has no cost to grade.
                media(
                    MetricKey::CostPerClick,
                    vec![field(Counter::Clicks, 50.0), field(Counter::Spend, 0.0)],
                ),
                media(
                    MetricKey::CostPerLead,
                    vec![field(Counter::Leads, 20.0), field(Counter::Spend, 0.0)],
                ),
                media(
                    MetricKey::CostPerOpportunity,
                    vec![field(Counter::Opportunities, 10.0), field(Counter::Spend, 0.0)],
                ),
                media(
                    MetricKey::CostPerDeal,
                    vec![field(Counter::Deals, 3.0), field(Counter::Spend, 0.0)],
                ),
                media(
                    MetricKey::ReturnOnAdSpend,
                    vec![
                        field(Counter::Deals, 3.0),
                        field(Counter::Spend, 0.0),
                        field(Counter::Revenue, 0.0),
                    ],
                ),
            ],
        }
    }
}
