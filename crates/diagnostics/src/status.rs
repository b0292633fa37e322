//! Status evaluator: grades a metric against its target with a tolerance
//! buffer and folds member grades into a stage status.

use crate::eligibility::{check_media_threshold, Eligibility};
use crate::rates::DerivedMetrics;
use crate::registry::{MetricKey, MetricTarget, TargetDirection, TargetSet, ThresholdTables};
use funnel_core::FunnelSnapshot;
use serde::{Deserialize, Serialize};

/// Fraction of the target value that separates `warn` from `fail`.
pub const TOLERANCE_FRACTION: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Pass,
    Warn,
    Fail,
    NoData,
}

impl MetricStatus {
    /// Higher is better: pass > warn > fail. `NoData` has no rank.
    pub fn rank(&self) -> Option<u8> {
        match self {
            MetricStatus::Pass => Some(2),
            MetricStatus::Warn => Some(1),
            MetricStatus::Fail => Some(0),
            MetricStatus::NoData => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Warn,
    Critical,
    NoData,
    LowSample,
}

/// Grade `value` against `target`.
///
/// The buffer is applied to the raw value; rounding for display happens
/// later and never influences the grade.
pub fn evaluate_metric_status(value: Option<f64>, target: Option<&MetricTarget>) -> MetricStatus {
    let (Some(value), Some(target)) = (value, target) else {
        return MetricStatus::NoData;
    };
    let buffer = target.value * TOLERANCE_FRACTION;

    match target.direction {
        TargetDirection::Min => {
            if value >= target.value {
                MetricStatus::Pass
            } else if value >= target.value - buffer {
                MetricStatus::Warn
            } else {
                MetricStatus::Fail
            }
        }
        TargetDirection::Max => {
            if value <= target.value {
                MetricStatus::Pass
            } else if value <= target.value + buffer {
                MetricStatus::Warn
            } else {
                MetricStatus::Fail
            }
        }
    }
}

/// Fold member grades into one stage status. Every member is inspected.
pub fn aggregate_stage_status(statuses: &[MetricStatus]) -> StageStatus {
    let mut any_data = false;
    let mut any_fail = false;
    let mut any_warn = false;

    for status in statuses {
        match status {
            MetricStatus::NoData => {}
            MetricStatus::Fail => {
                any_data = true;
                any_fail = true;
            }
            MetricStatus::Warn => {
                any_data = true;
                any_warn = true;
            }
            MetricStatus::Pass => any_data = true,
        }
    }

    if !any_data {
        StageStatus::NoData
    } else if any_fail {
        StageStatus::Critical
    } else if any_warn {
        StageStatus::Warn
    } else {
        StageStatus::Ok
    }
}

/// One graded metric, surfaced to the user alongside the stage status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricGrade {
    pub metric: MetricKey,
    pub value: Option<f64>,
    pub target: Option<f64>,
    pub status: MetricStatus,
}

impl MetricGrade {
    pub fn evaluate(metric: MetricKey, value: Option<f64>, targets: &TargetSet) -> Self {
        let target = targets.get(metric);
        Self {
            metric,
            value,
            target: target.map(|t| t.value),
            status: evaluate_metric_status(value, target),
        }
    }

    /// Grade `metric` using its derived value.
    pub fn from_derived(metric: MetricKey, derived: &DerivedMetrics, targets: &TargetSet) -> Self {
        Self::evaluate(metric, derived.get(metric), targets)
    }
}

/// A media metric grade with the sample-size gate applied first. Ineligible
/// metrics carry no value and grade as `NoData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetricGrade {
    pub eligibility: Eligibility,
    #[serde(flatten)]
    pub grade: MetricGrade,
}

/// Grade every gated media metric, in table order.
pub fn grade_media_metrics(
    tables: &ThresholdTables,
    snapshot: &FunnelSnapshot,
    derived: &DerivedMetrics,
    targets: &TargetSet,
) -> Vec<MediaMetricGrade> {
    tables
        .media
        .iter()
        .map(|gate| {
            let eligibility = check_media_threshold(gate, snapshot);
            let value = if eligibility.is_eligible() {
                derived.get(gate.metric)
            } else {
                None
            };
            MediaMetricGrade {
                eligibility,
                grade: MetricGrade::evaluate(gate.metric, value, targets),
            }
        })
        .collect()
}
