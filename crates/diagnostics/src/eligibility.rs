//! Eligibility gate: decides whether a sample is large enough for a rate
//! computed from it to mean anything.

use crate::registry::{
    EligibilityThreshold, MediaMetricThreshold, MetricKey, RequiredField, StageDefinition, StageId,
    ThresholdTables,
};
use funnel_core::{Counter, DiagnosticError, DiagnosticResult, FunnelSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    NoData,
    LowSample,
}

/// Outcome of a sample-size check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    /// The gating field is absent or zero.
    NoData { field: Counter },
    /// The gating field is present but below its minimum. Carries both
    /// values for user-facing messaging.
    LowSample {
        field: Counter,
        current: f64,
        required: f64,
    },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    pub fn reason(&self) -> Option<IneligibleReason> {
        match self {
            Eligibility::Eligible => None,
            Eligibility::NoData { .. } => Some(IneligibleReason::NoData),
            Eligibility::LowSample { .. } => Some(IneligibleReason::LowSample),
        }
    }

    /// Short explanation, e.g. "needs at least 30 leads (have 12)".
    pub fn describe(&self) -> Option<String> {
        match self {
            Eligibility::Eligible => None,
            Eligibility::NoData { field } => Some(format!("no {field} reported")),
            Eligibility::LowSample {
                field,
                current,
                required,
            } => Some(format!("needs at least {required:.0} {field} (have {current:.0})")),
        }
    }
}

fn check_field(snapshot: &FunnelSnapshot, field: Counter, min: f64) -> Eligibility {
    match snapshot.get(field) {
        None => Eligibility::NoData { field },
        Some(v) if v == 0.0 => Eligibility::NoData { field },
        Some(current) if current < min => Eligibility::LowSample {
            field,
            current,
            required: min,
        },
        Some(_) => Eligibility::Eligible,
    }
}

/// Gate a stage on its denominator.
pub fn check_threshold(threshold: &EligibilityThreshold, snapshot: &FunnelSnapshot) -> Eligibility {
    check_field(snapshot, threshold.denominator, threshold.min_sample_size)
}

/// Gate a media metric on all of its required fields, in declaration order.
/// The first failing field decides the reason.
pub fn check_media_threshold(gate: &MediaMetricThreshold, snapshot: &FunnelSnapshot) -> Eligibility {
    gate.required
        .iter()
        .map(|&RequiredField { counter, min }| check_field(snapshot, counter, min))
        .find(|e| !e.is_eligible())
        .unwrap_or(Eligibility::Eligible)
}

/// A stage paired with its sample-size threshold, resolved once at startup
/// so per-request evaluation cannot hit a missing table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct GatedStage {
    pub definition: StageDefinition,
    pub threshold: EligibilityThreshold,
}

impl GatedStage {
    pub fn check(&self, snapshot: &FunnelSnapshot) -> Eligibility {
        check_threshold(&self.threshold, snapshot)
    }
}

/// Table-backed gate.
#[derive(Debug, Clone, Default)]
pub struct EligibilityGate {
    tables: ThresholdTables,
}

impl EligibilityGate {
    pub fn new(tables: ThresholdTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &ThresholdTables {
        &self.tables
    }

    /// A stage with no registered threshold is a configuration error.
    pub fn check_stage_eligibility(
        &self,
        stage: StageId,
        snapshot: &FunnelSnapshot,
    ) -> DiagnosticResult<Eligibility> {
        let threshold = self.tables.stage(stage).ok_or_else(|| {
            DiagnosticError::MissingThreshold {
                stage: stage.to_string(),
            }
        })?;
        Ok(check_threshold(threshold, snapshot))
    }

    /// Pair every stage with its threshold, failing on the first stage the
    /// tables do not cover.
    pub fn resolve_stages(&self, stages: &[StageDefinition]) -> DiagnosticResult<Vec<GatedStage>> {
        stages
            .iter()
            .map(|definition| {
                let threshold = self.tables.stage(definition.id).ok_or_else(|| {
                    DiagnosticError::MissingThreshold {
                        stage: definition.id.to_string(),
                    }
                })?;
                Ok(GatedStage {
                    definition: definition.clone(),
                    threshold: threshold.clone(),
                })
            })
            .collect()
    }

    /// `None` when `metric` is not media-gated.
    pub fn check_media_metric_eligibility(
        &self,
        metric: MetricKey,
        snapshot: &FunnelSnapshot,
    ) -> Option<Eligibility> {
        self.tables
            .media(metric)
            .map(|gate| check_media_threshold(gate, snapshot))
    }
}
