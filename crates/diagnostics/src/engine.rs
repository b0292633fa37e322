//! Funnel diagnostic engine: composes the rate calculator, eligibility
//! gate, status evaluator, confidence scorer, bottleneck ranker and action
//! rules into a single `diagnose` call.

use crate::actions::{ActionInputs, ActionItem, ActionRecommender};
use crate::bottleneck::{assess_stages, rank_bottlenecks, BottleneckRanking, StageImpact};
use crate::confidence::{ConfidenceResult, ConfidenceScorer};
use crate::eligibility::{EligibilityGate, GatedStage};
use crate::rates::DerivedMetrics;
use crate::registry::{default_stages, TargetSet, ThresholdTables};
use crate::status::{grade_media_metrics, MediaMetricGrade};
use funnel_core::{DiagnosticContext, DiagnosticResult, EngineConfig, FunnelSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Everything one diagnosis produces. Plain data, safe to persist or
/// forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelDiagnosis {
    pub derived: DerivedMetrics,
    pub stages: Vec<StageImpact>,
    pub media: Vec<MediaMetricGrade>,
    pub confidence: ConfidenceResult,
    pub bottlenecks: BottleneckRanking,
    pub actions: Vec<ActionItem>,
    pub questions: Vec<String>,
    pub checklist: Vec<ActionItem>,
}

/// Validated, immutable engine configuration.
///
/// Registry drift is caught in the constructors, so `diagnose` itself
/// cannot fail.
#[derive(Debug, Clone)]
pub struct FunnelDiagnosticEngine {
    targets: TargetSet,
    tables: ThresholdTables,
    stages: Vec<GatedStage>,
    scorer: ConfidenceScorer,
    recommender: ActionRecommender,
}

impl FunnelDiagnosticEngine {
    pub fn new(
        targets: TargetSet,
        thresholds: ThresholdTables,
        config: EngineConfig,
    ) -> DiagnosticResult<Self> {
        let stages = match Self::validate(&targets, &thresholds) {
            Ok(stages) => stages,
            Err(err) => {
                error!(detail = %err.detail(), "diagnostic configuration rejected");
                return Err(err);
            }
        };

        info!(
            targets = targets.len(),
            stages = stages.len(),
            media_gates = thresholds.media.len(),
            profile = ?config.benchmark_profile,
            "funnel diagnostic engine ready"
        );

        Ok(Self {
            targets,
            tables: thresholds,
            stages,
            scorer: ConfidenceScorer::new(config.confidence),
            recommender: ActionRecommender::new(config.actions),
        })
    }

    fn validate(targets: &TargetSet, thresholds: &ThresholdTables) -> DiagnosticResult<Vec<GatedStage>> {
        let definitions = default_stages();
        targets.validate_stages(&definitions)?;
        thresholds.validate(&definitions, targets)?;
        EligibilityGate::new(thresholds.clone()).resolve_stages(&definitions)
    }

    /// Default registry, default thresholds, default scoring.
    pub fn with_defaults() -> DiagnosticResult<Self> {
        Self::new(
            TargetSet::default_registry(),
            ThresholdTables::default(),
            EngineConfig::default(),
        )
    }

    /// Targets come from the configured benchmark profile.
    pub fn from_config(config: EngineConfig) -> DiagnosticResult<Self> {
        let targets = TargetSet::for_profile(config.benchmark_profile);
        Self::new(targets, ThresholdTables::default(), config)
    }

    /// A new engine with `overrides` layered over the current targets. The
    /// merged set is validated again.
    pub fn with_target_overrides(&self, overrides: &TargetSet) -> DiagnosticResult<Self> {
        let targets = self.targets.merged(overrides);
        let stages = match Self::validate(&targets, &self.tables) {
            Ok(stages) => stages,
            Err(err) => {
                error!(detail = %err.detail(), "target overrides rejected");
                return Err(err);
            }
        };
        debug!(overrides = overrides.len(), "target overrides applied");
        Ok(Self {
            targets,
            stages,
            ..self.clone()
        })
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    pub fn thresholds(&self) -> &ThresholdTables {
        &self.tables
    }

    pub fn diagnose(&self, snapshot: &FunnelSnapshot, context: &DiagnosticContext) -> FunnelDiagnosis {
        let derived = DerivedMetrics::from_snapshot(snapshot);
        let stages = assess_stages(&self.stages, snapshot, &derived, &self.targets);
        let media = grade_media_metrics(&self.tables, snapshot, &derived, &self.targets);
        let confidence = self.scorer.score_confidence(snapshot);
        let bottlenecks = rank_bottlenecks(&stages);

        let actions = self.recommender.generate_actions(&ActionInputs {
            snapshot,
            derived: &derived,
            stages: &stages,
            media: &media,
            ranking: &bottlenecks,
            confidence: &confidence,
            targets: &self.targets,
            context,
        });
        let questions = self.recommender.missing_data_questions(snapshot, context);
        let checklist = self.recommender.daily_checklist(&actions, &confidence);

        debug!(
            eligible_stages = stages.iter().filter(|s| s.is_eligible()).count(),
            primary = ?bottlenecks.primary.as_ref().map(|b| b.stage),
            score = confidence.score,
            tier = ?confidence.tier,
            actions = actions.len(),
            checklist = checklist.len(),
            "funnel diagnosed"
        );

        FunnelDiagnosis {
            derived,
            stages,
            media,
            confidence,
            bottlenecks,
            actions,
            questions,
            checklist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MetricKey, MetricTarget, MetricUnit, StageId};
    use funnel_core::config::BenchmarkProfile;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_engine_is_send_sync() {
        assert_send_sync::<FunnelDiagnosticEngine>();
    }

    #[test]
    fn test_defaults_construct() {
        let engine = FunnelDiagnosticEngine::with_defaults().unwrap();
        assert_eq!(engine.targets().len(), 16);
        assert_eq!(engine.stages.len(), 4);
    }

    #[test]
    fn test_missing_target_fails_at_construction() {
        let mut targets = TargetSet::empty();
        for (key, target) in TargetSet::default_registry().iter() {
            if *key != MetricKey::ConnectRate {
                targets = targets.with_target(*key, target.clone());
            }
        }
        let err = FunnelDiagnosticEngine::new(targets, ThresholdTables::default(), EngineConfig::default())
            .unwrap_err();
        assert!(err.is_misconfiguration());
        assert_eq!(err.to_string(), "diagnostic engine misconfigured");
        assert!(err.detail().contains("connect_rate"));
    }

    #[test]
    fn test_missing_threshold_fails_at_construction() {
        let mut tables = ThresholdTables::default();
        tables.stages.pop();
        let err = FunnelDiagnosticEngine::new(TargetSet::default_registry(), tables, EngineConfig::default())
            .unwrap_err();
        assert!(err.is_misconfiguration());
    }

    #[test]
    fn test_profile_from_config() {
        let engine = FunnelDiagnosticEngine::from_config(EngineConfig {
            benchmark_profile: BenchmarkProfile::Ecommerce,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(engine.targets().get(MetricKey::LeadToQualifiedRate).unwrap().value, 15.0);
    }

    #[test]
    fn test_overrides_leave_original_untouched() {
        let engine = FunnelDiagnosticEngine::with_defaults().unwrap();
        let overrides = TargetSet::empty().with_target(
            MetricKey::LeadToQualifiedRate,
            MetricTarget::min(35.0, "Lead → Qualified", MetricUnit::Percent),
        );
        let tuned = engine.with_target_overrides(&overrides).unwrap();

        let snapshot = FunnelSnapshot {
            leads: Some(100.0),
            qualified: Some(30.0),
            ..Default::default()
        };
        let context = DiagnosticContext::default();
        let stage = |d: &FunnelDiagnosis| {
            d.stages
                .iter()
                .find(|s| s.stage == StageId::LeadToQualified)
                .map(|s| s.status)
        };
        use crate::status::StageStatus;
        assert_eq!(stage(&engine.diagnose(&snapshot, &context)), Some(StageStatus::Ok));
        assert_eq!(stage(&tuned.diagnose(&snapshot, &context)), Some(StageStatus::Critical));
    }

    #[test]
    fn test_diagnose_is_deterministic() {
        let engine = FunnelDiagnosticEngine::with_defaults().unwrap();
        let snapshot = FunnelSnapshot {
            leads: Some(800.0),
            qualified: Some(150.0),
            sales_qualified: Some(50.0),
            opportunities: Some(20.0),
            deals: Some(3.0),
            spend: Some(60_000.0),
            ..Default::default()
        };
        let context = DiagnosticContext::default();
        assert_eq!(engine.diagnose(&snapshot, &context), engine.diagnose(&snapshot, &context));
    }

    #[test]
    fn test_diagnosis_serializes() {
        let engine = FunnelDiagnosticEngine::with_defaults().unwrap();
        let snapshot = FunnelSnapshot::new();
        let diagnosis = engine.diagnose(&snapshot, &DiagnosticContext::default());
        let json = serde_json::to_value(&diagnosis).unwrap();
        assert_eq!(json["stages"][0]["status"], "no_data");
        assert_eq!(json["stages"][0]["eligibility"]["status"], "no_data");
        assert_eq!(json["questions"].as_array().unwrap().len(), 3);
        assert_eq!(json["confidence"]["top_penalties"][0]["reason"], "leads missing");
        assert_eq!(json["confidence"]["top_penalties"].as_array().unwrap().len(), 2);
    }
}
