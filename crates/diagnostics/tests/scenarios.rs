//! End-to-end diagnosis scenarios through the public engine API.

#[cfg(test)]
mod tests {
    use funnel_core::{AcquisitionChannel, DiagnosticContext, FunnelSnapshot};
    use funnel_diagnostics::actions::{ActionCategory, ActionSource};
    use funnel_diagnostics::confidence::PenaltyCategory;
    use funnel_diagnostics::registry::MetricUnit;
    use funnel_diagnostics::*;

    fn engine() -> FunnelDiagnosticEngine {
        FunnelDiagnosticEngine::with_defaults().unwrap()
    }

    fn stage(diagnosis: &FunnelDiagnosis, id: StageId) -> &StageImpact {
        diagnosis.stages.iter().find(|s| s.stage == id).unwrap()
    }

    #[test]
    fn test_zero_leads() {
        let snapshot = FunnelSnapshot {
            leads: Some(0.0),
            ..Default::default()
        };
        let diagnosis = engine().diagnose(&snapshot, &DiagnosticContext::default());

        assert!(diagnosis
            .stages
            .iter()
            .all(|s| s.status == StageStatus::NoData && !s.is_eligible()));
        assert!(diagnosis.bottlenecks.ranked.is_empty());
        assert!(diagnosis.bottlenecks.primary.is_none());

        let missing_leads = diagnosis
            .confidence
            .penalties
            .iter()
            .find(|p| p.reason == "leads missing")
            .unwrap();
        assert_eq!(missing_leads.points, 40.0);
        assert!(diagnosis.confidence.score <= 60.0);

        let top: Vec<(&str, f64)> = diagnosis
            .confidence
            .top_penalties
            .iter()
            .map(|p| (p.reason.as_str(), p.points))
            .collect();
        assert_eq!(top, vec![("leads missing", 40.0), ("qualified missing", 20.0)]);
    }

    #[test]
    fn test_rate_above_target_passes() {
        let snapshot = FunnelSnapshot {
            leads: Some(100.0),
            qualified: Some(30.0),
            ..Default::default()
        };
        let diagnosis = engine().diagnose(&snapshot, &DiagnosticContext::default());
        let first = stage(&diagnosis, StageId::LeadToQualified);
        assert_eq!(first.current_rate, Some(30.0));
        assert_eq!(first.metrics[0].status, MetricStatus::Pass);
        assert_eq!(first.status, StageStatus::Ok);
        assert_eq!(diagnosis.bottlenecks.best_stage, Some(StageId::LeadToQualified));
    }

    #[test]
    fn test_rate_below_buffer_fails() {
        let snapshot = FunnelSnapshot {
            leads: Some(100.0),
            qualified: Some(22.0),
            ..Default::default()
        };
        let diagnosis = engine().diagnose(&snapshot, &DiagnosticContext::default());
        let first = stage(&diagnosis, StageId::LeadToQualified);
        assert_eq!(first.current_rate, Some(22.0));
        assert_eq!(first.metrics[0].status, MetricStatus::Fail);
        assert_eq!(first.status, StageStatus::Critical);
        assert_eq!(
            diagnosis.bottlenecks.primary.as_ref().map(|b| b.stage),
            Some(StageId::LeadToQualified)
        );
    }

    #[test]
    fn test_qualified_exceeding_leads_is_flagged() {
        let engine = engine();
        let context = DiagnosticContext::default();
        let consistent = FunnelSnapshot {
            leads: Some(100.0),
            qualified: Some(100.0),
            ..Default::default()
        };
        let inconsistent = FunnelSnapshot {
            qualified: Some(150.0),
            ..consistent.clone()
        };

        let before = engine.diagnose(&consistent, &context).confidence;
        let after = engine.diagnose(&inconsistent, &context).confidence;

        assert!(!before.has_inconsistency);
        assert!(after.has_inconsistency);
        assert_eq!(before.score - after.score, 25.0);
        assert!(after
            .penalties
            .iter()
            .any(|p| p.category == PenaltyCategory::Consistency));
    }

    #[test]
    fn test_inconsistent_data_still_produces_full_diagnosis() {
        let snapshot = FunnelSnapshot {
            leads: Some(100.0),
            qualified: Some(150.0),
            ..Default::default()
        };
        let diagnosis = engine().diagnose(&snapshot, &DiagnosticContext::default());
        assert_eq!(diagnosis.stages.len(), 4);
        assert_eq!(diagnosis.actions[0].id, "data_inconsistency");
    }

    #[test]
    fn test_impact_propagates_to_deals() {
        let overrides = TargetSet::empty().with_target(
            MetricKey::SalesQualifiedToOpportunityRate,
            MetricTarget::min(30.0, "Sales Qualified → Opportunity", MetricUnit::Percent),
        );
        let engine = engine().with_target_overrides(&overrides).unwrap();
        let snapshot = FunnelSnapshot {
            sales_qualified: Some(100.0),
            opportunities: Some(20.0),
            deals: Some(8.0),
            ..Default::default()
        };
        let diagnosis = engine.diagnose(&snapshot, &DiagnosticContext::default());

        let impact = stage(&diagnosis, StageId::SalesQualifiedToOpportunity)
            .impact
            .clone()
            .unwrap();
        assert_eq!(impact.extra_numerator_units, 10);
        assert_eq!(impact.final_outcome, FinalOutcome::Trusted { units: 4 });
    }

    #[test]
    fn test_ineligible_downstream_never_uses_observed_rate() {
        // Opportunities 5 is below the minimum of 10; its observed 80% must
        // not be used.
        let snapshot = FunnelSnapshot {
            leads: Some(1000.0),
            qualified: Some(300.0),
            sales_qualified: Some(60.0),
            opportunities: Some(5.0),
            deals: Some(4.0),
            ..Default::default()
        };
        let diagnosis = engine().diagnose(&snapshot, &DiagnosticContext::default());
        for stage in &diagnosis.stages {
            let Some(impact) = &stage.impact else { continue };
            match &impact.final_outcome {
                FinalOutcome::Trusted { .. } => {
                    assert_eq!(stage.stage, StageId::OpportunityToWon);
                }
                FinalOutcome::Estimated { fallback_stages, .. } => {
                    assert!(fallback_stages.contains(&StageId::OpportunityToWon));
                }
                FinalOutcome::Unavailable { .. } => {}
            }
        }
        let sql = stage(&diagnosis, StageId::SalesQualifiedToOpportunity);
        // 60 × 50% − 5 = 25 extra opportunities, 25 × 20% target = 5 deals.
        let impact = sql.impact.clone().unwrap();
        assert_eq!(impact.extra_numerator_units, 25);
        assert_eq!(impact.extra_final_outcome_units(), 5);
    }

    #[test]
    fn test_low_confidence_empties_checklist() {
        let confidence = ConfidenceResult {
            score: 45.0,
            tier: ConfidenceTier::Low,
            penalties: vec![],
            top_penalties: vec![],
            has_inconsistency: false,
        };
        let item = |id: &str| ActionItem {
            id: id.to_string(),
            category: ActionCategory::Process,
            stage: None,
            priority: ActionPriority::High,
            title: id.to_string(),
            next_step: String::new(),
            metric_to_watch: None,
            source: ActionSource::Rules,
        };
        let actions = vec![item("one"), item("two"), item("three")];
        assert!(ActionRecommender::default()
            .daily_checklist(&actions, &confidence)
            .is_empty());
    }

    #[test]
    fn test_low_confidence_diagnosis_has_actions_but_no_checklist() {
        let snapshot = FunnelSnapshot {
            leads: Some(40.0),
            qualified: Some(5.0),
            ..Default::default()
        };
        let diagnosis = engine().diagnose(&snapshot, &DiagnosticContext::default());
        assert_eq!(diagnosis.confidence.tier, ConfidenceTier::Low);
        assert!(diagnosis
            .actions
            .iter()
            .any(|a| a.priority == ActionPriority::High));
        assert!(diagnosis.checklist.is_empty());
    }

    #[test]
    fn test_action_list_is_capped() {
        let snapshot = FunnelSnapshot {
            leads: Some(1000.0),
            qualified: Some(100.0),
            sales_qualified: Some(20.0),
            opportunities: Some(10.0),
            deals: Some(12.0),
            spend: Some(150_000.0),
            impressions: Some(200_000.0),
            clicks: Some(1000.0),
            first_touch_minutes: Some(240.0),
            connect_rate: Some(20.0),
            sales_cycle_days: Some(120.0),
            discount_rate: Some(30.0),
            ..Default::default()
        };
        let context = DiagnosticContext {
            channel: Some(AcquisitionChannel::PaidSearch),
            live_chat_integrated: Some(false),
            ..Default::default()
        };
        let diagnosis = engine().diagnose(&snapshot, &context);
        assert_eq!(diagnosis.actions.len(), 6);
        assert!(diagnosis
            .actions
            .windows(2)
            .all(|w| w[0].priority <= w[1].priority));
        assert!(diagnosis.questions.is_empty());
    }
}
