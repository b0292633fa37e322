//! Action recommendations: an ordered table of independent trigger rules.
//!
//! Each rule looks at the computed diagnosis and emits at most one action.
//! Rules are not mutually exclusive. The merged list is stably sorted by
//! priority, so rules earlier in the table win ties, then capped.

use crate::bottleneck::{BottleneckRanking, StageImpact};
use crate::confidence::{ConfidenceResult, ConfidenceTier};
use crate::rates::DerivedMetrics;
use crate::registry::{MetricKey, StageId, TargetSet};
use crate::status::{MediaMetricGrade, MetricGrade, MetricStatus, StageStatus};
use funnel_core::config::ActionsConfig;
use funnel_core::{DiagnosticContext, FunnelSnapshot};
use serde::{Deserialize, Serialize};

// ─── Types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Media,
    Process,
}

/// Declaration order is sort order: `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    High,
    Medium,
    Low,
}

/// Where an action came from. Hosts merging items from an external
/// narrative service tag them `Narrative`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    #[default]
    Rules,
    Narrative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    pub category: ActionCategory,
    pub stage: Option<StageId>,
    pub priority: ActionPriority,
    pub title: String,
    pub next_step: String,
    pub metric_to_watch: Option<MetricKey>,
    pub source: ActionSource,
}

/// Everything a rule may inspect.
#[derive(Debug, Clone, Copy)]
pub struct ActionInputs<'a> {
    pub snapshot: &'a FunnelSnapshot,
    pub derived: &'a DerivedMetrics,
    pub stages: &'a [StageImpact],
    pub media: &'a [MediaMetricGrade],
    pub ranking: &'a BottleneckRanking,
    pub confidence: &'a ConfidenceResult,
    pub targets: &'a TargetSet,
    pub context: &'a DiagnosticContext,
}

impl<'a> ActionInputs<'a> {
    fn stage(&self, id: StageId) -> Option<&'a StageImpact> {
        self.stages.iter().find(|s| s.stage == id)
    }

    fn is_critical(&self, id: StageId) -> bool {
        self.stage(id)
            .is_some_and(|s| s.is_eligible() && s.status == StageStatus::Critical)
    }

    fn stage_metric(&self, metric: MetricKey) -> Option<&'a MetricGrade> {
        self.stages
            .iter()
            .flat_map(|s| s.metrics.iter())
            .find(|m| m.metric == metric)
    }

    fn media_metric(&self, metric: MetricKey) -> Option<&'a MetricGrade> {
        self.media
            .iter()
            .map(|m| &m.grade)
            .find(|m| m.metric == metric)
    }

    fn format(&self, metric: MetricKey, value: Option<f64>) -> String {
        match (value, self.targets.get(metric)) {
            (Some(v), Some(target)) => target.format_value(v),
            (Some(v), None) => format!("{v:.1}"),
            (None, _) => "n/a".to_string(),
        }
    }

    fn target(&self, metric: MetricKey) -> String {
        self.targets
            .get(metric)
            .map(|t| t.format_value(t.value))
            .unwrap_or_else(|| "n/a".to_string())
    }
}

// ─── Rules ───────────────────────────────────────────────────────────

struct ActionRule {
    id: &'static str,
    evaluate: fn(&ActionInputs<'_>) -> Option<Draft>,
}

/// Rule output before the id and source are attached.
struct Draft {
    category: ActionCategory,
    stage: Option<StageId>,
    priority: ActionPriority,
    title: String,
    next_step: String,
    metric_to_watch: Option<MetricKey>,
}

fn fail_or_warn(status: MetricStatus) -> Option<ActionPriority> {
    match status {
        MetricStatus::Fail => Some(ActionPriority::High),
        MetricStatus::Warn => Some(ActionPriority::Medium),
        _ => None,
    }
}

const RULES: &[ActionRule] = &[
    ActionRule {
        id: "data_inconsistency",
        evaluate: data_inconsistency,
    },
    ActionRule {
        id: "slow_first_touch",
        evaluate: slow_first_touch,
    },
    ActionRule {
        id: "low_connect_rate",
        evaluate: low_connect_rate,
    },
    ActionRule {
        id: "lead_quality",
        evaluate: lead_quality,
    },
    ActionRule {
        id: "qualification_follow_up",
        evaluate: qualification_follow_up,
    },
    ActionRule {
        id: "discovery_quality",
        evaluate: discovery_quality,
    },
    ActionRule {
        id: "closing_process",
        evaluate: closing_process,
    },
    ActionRule {
        id: "high_cost_per_lead",
        evaluate: high_cost_per_lead,
    },
    ActionRule {
        id: "low_click_through",
        evaluate: low_click_through,
    },
    ActionRule {
        id: "excessive_discounting",
        evaluate: excessive_discounting,
    },
    ActionRule {
        id: "long_sales_cycle",
        evaluate: long_sales_cycle,
    },
    ActionRule {
        id: "live_chat_integration",
        evaluate: live_chat_integration,
    },
    ActionRule {
        id: "record_spend",
        evaluate: record_spend,
    },
];

fn data_inconsistency(inputs: &ActionInputs<'_>) -> Option<Draft> {
    if !inputs.confidence.has_inconsistency {
        return None;
    }
    let violation = inputs
        .confidence
        .penalties
        .iter()
        .find(|p| p.category == crate::confidence::PenaltyCategory::Consistency)
        .map(|p| p.reason.clone())
        .unwrap_or_default();
    Some(Draft {
        category: ActionCategory::Process,
        stage: None,
        priority: ActionPriority::High,
        title: "Fix funnel data entry before acting on conversion rates".to_string(),
        next_step: format!(
            "Audit CRM stage definitions and reporting filters: {violation}, which a \
             sequential funnel cannot produce."
        ),
        metric_to_watch: None,
    })
}

fn slow_first_touch(inputs: &ActionInputs<'_>) -> Option<Draft> {
    let grade = inputs.stage_metric(MetricKey::FirstTouchMinutes)?;
    let priority = fail_or_warn(grade.status)?;
    Some(Draft {
        category: ActionCategory::Process,
        stage: Some(StageId::LeadToQualified),
        priority,
        title: "Respond to new leads faster".to_string(),
        next_step: format!(
            "First touch takes {} against a target of {}; route new leads to an on-duty rep \
             with an alert and a callback SLA.",
            inputs.format(MetricKey::FirstTouchMinutes, grade.value),
            inputs.target(MetricKey::FirstTouchMinutes)
        ),
        metric_to_watch: Some(MetricKey::FirstTouchMinutes),
    })
}

fn low_connect_rate(inputs: &ActionInputs<'_>) -> Option<Draft> {
    let grade = inputs.stage_metric(MetricKey::ConnectRate)?;
    let priority = fail_or_warn(grade.status)?;
    Some(Draft {
        category: ActionCategory::Process,
        stage: Some(StageId::QualifiedToSalesQualified),
        priority,
        title: "Raise the share of calls that reach the lead".to_string(),
        next_step: format!(
            "Connect rate is {} (target {}); add a multi-attempt cadence across phone, \
             email and messaging within the first 48 hours.",
            inputs.format(MetricKey::ConnectRate, grade.value),
            inputs.target(MetricKey::ConnectRate)
        ),
        metric_to_watch: Some(MetricKey::ConnectRate),
    })
}

/// Shared body for the four stage-critical rules. Only a failing main
/// conversion rate triggers them.
fn stage_draft(
    inputs: &ActionInputs<'_>,
    id: StageId,
    category: ActionCategory,
    priority: ActionPriority,
    title: &str,
    advice: &str,
) -> Option<Draft> {
    if !inputs.is_critical(id) {
        return None;
    }
    let stage = inputs.stage(id)?;
    // Member failures have their own rules; these fire on the conversion rate.
    let main = stage.metrics.first()?;
    if main.status != MetricStatus::Fail {
        return None;
    }
    let metric = main.metric;
    let impact = stage
        .impact
        .as_ref()
        .map(|i| format!(" {}.", i.description))
        .unwrap_or_default();
    Some(Draft {
        category,
        stage: Some(id),
        priority,
        title: title.to_string(),
        next_step: format!(
            "{} converts at {} against {}.{impact} {advice}",
            stage.name,
            inputs.format(metric, stage.current_rate),
            inputs.target(metric)
        ),
        metric_to_watch: Some(metric),
    })
}

fn lead_quality(inputs: &ActionInputs<'_>) -> Option<Draft> {
    stage_draft(
        inputs,
        StageId::LeadToQualified,
        ActionCategory::Media,
        ActionPriority::High,
        "Tighten lead targeting and qualification criteria",
        "Review which campaigns and audiences produce unqualified leads and shift budget away from them.",
    )
}

fn qualification_follow_up(inputs: &ActionInputs<'_>) -> Option<Draft> {
    stage_draft(
        inputs,
        StageId::QualifiedToSalesQualified,
        ActionCategory::Process,
        ActionPriority::High,
        "Enforce follow-up on marketing-qualified leads",
        "Agree an MQL hand-off SLA with sales and review untouched leads daily.",
    )
}

fn discovery_quality(inputs: &ActionInputs<'_>) -> Option<Draft> {
    stage_draft(
        inputs,
        StageId::SalesQualifiedToOpportunity,
        ActionCategory::Process,
        ActionPriority::Medium,
        "Improve discovery calls",
        "Standardise the discovery script and require a documented pain point before creating an opportunity.",
    )
}

fn closing_process(inputs: &ActionInputs<'_>) -> Option<Draft> {
    let is_primary = inputs
        .ranking
        .primary
        .as_ref()
        .is_some_and(|b| b.stage == StageId::OpportunityToWon);
    let priority = if is_primary {
        ActionPriority::High
    } else {
        ActionPriority::Medium
    };
    stage_draft(
        inputs,
        StageId::OpportunityToWon,
        ActionCategory::Process,
        priority,
        "Strengthen the closing process",
        "Run a loss review on the last ten lost opportunities and add a mutual close plan to every proposal.",
    )
}

fn high_cost_per_lead(inputs: &ActionInputs<'_>) -> Option<Draft> {
    let grade = inputs.media_metric(MetricKey::CostPerLead)?;
    let priority = fail_or_warn(grade.status)?;
    Some(Draft {
        category: ActionCategory::Media,
        stage: None,
        priority,
        title: "Bring cost per lead back under target".to_string(),
        next_step: format!(
            "Cost per lead is {} against a ceiling of {}; pause the highest-CPL ad sets and \
             reallocate to the best performers.",
            inputs.format(MetricKey::CostPerLead, grade.value),
            inputs.target(MetricKey::CostPerLead)
        ),
        metric_to_watch: Some(MetricKey::CostPerLead),
    })
}

fn low_click_through(inputs: &ActionInputs<'_>) -> Option<Draft> {
    let grade = inputs.media_metric(MetricKey::ClickThroughRate)?;
    if grade.status != MetricStatus::Fail {
        return None;
    }
    Some(Draft {
        category: ActionCategory::Media,
        stage: None,
        priority: ActionPriority::Medium,
        title: "Refresh creatives with low click-through".to_string(),
        next_step: format!(
            "Click-through is {} (target {}); test new hooks and tighten audience targeting.",
            inputs.format(MetricKey::ClickThroughRate, grade.value),
            inputs.target(MetricKey::ClickThroughRate)
        ),
        metric_to_watch: Some(MetricKey::ClickThroughRate),
    })
}

fn excessive_discounting(inputs: &ActionInputs<'_>) -> Option<Draft> {
    let grade = inputs.stage_metric(MetricKey::DiscountRate)?;
    if grade.status != MetricStatus::Fail {
        return None;
    }
    Some(Draft {
        category: ActionCategory::Process,
        stage: Some(StageId::OpportunityToWon),
        priority: ActionPriority::Medium,
        title: "Put guardrails on discounting".to_string(),
        next_step: format!(
            "Average discount is {} against a ceiling of {}; require manager approval above the ceiling.",
            inputs.format(MetricKey::DiscountRate, grade.value),
            inputs.target(MetricKey::DiscountRate)
        ),
        metric_to_watch: Some(MetricKey::DiscountRate),
    })
}

fn long_sales_cycle(inputs: &ActionInputs<'_>) -> Option<Draft> {
    let grade = inputs.stage_metric(MetricKey::SalesCycleDays)?;
    if grade.status != MetricStatus::Fail {
        return None;
    }
    Some(Draft {
        category: ActionCategory::Process,
        stage: Some(StageId::OpportunityToWon),
        priority: ActionPriority::Low,
        title: "Shorten the sales cycle".to_string(),
        next_step: format!(
            "Deals take {} to close (target {}); set a next step with a date on every open opportunity.",
            inputs.format(MetricKey::SalesCycleDays, grade.value),
            inputs.target(MetricKey::SalesCycleDays)
        ),
        metric_to_watch: Some(MetricKey::SalesCycleDays),
    })
}

fn live_chat_integration(inputs: &ActionInputs<'_>) -> Option<Draft> {
    if inputs.context.live_chat_integrated != Some(false) {
        return None;
    }
    Some(Draft {
        category: ActionCategory::Process,
        stage: Some(StageId::LeadToQualified),
        priority: ActionPriority::Low,
        title: "Connect website live chat to the CRM".to_string(),
        next_step: "Create leads automatically from chat conversations so they enter the same \
                    follow-up queue."
            .to_string(),
        metric_to_watch: Some(MetricKey::FirstTouchMinutes),
    })
}

fn record_spend(inputs: &ActionInputs<'_>) -> Option<Draft> {
    let paid = inputs.context.channel.is_some_and(|c| c.is_paid());
    if !paid || inputs.snapshot.spend.is_some() {
        return None;
    }
    Some(Draft {
        category: ActionCategory::Media,
        stage: None,
        priority: ActionPriority::Medium,
        title: "Record media spend for paid channels".to_string(),
        next_step: "Import spend from the ad platforms so cost per lead and cost per deal can be graded."
            .to_string(),
        metric_to_watch: Some(MetricKey::CostPerLead),
    })
}

// ─── Recommender ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ActionRecommender {
    config: ActionsConfig,
}

impl ActionRecommender {
    pub fn new(config: ActionsConfig) -> Self {
        Self { config }
    }

    /// Run every rule in order, stably sort by priority, and cap.
    pub fn generate_actions(&self, inputs: &ActionInputs<'_>) -> Vec<ActionItem> {
        let mut actions: Vec<ActionItem> = RULES
            .iter()
            .filter_map(|rule| {
                let draft = (rule.evaluate)(inputs)?;
                Some(ActionItem {
                    id: match draft.stage {
                        Some(stage) => format!("{}:{stage}", rule.id),
                        None => rule.id.to_string(),
                    },
                    category: draft.category,
                    stage: draft.stage,
                    priority: draft.priority,
                    title: draft.title,
                    next_step: draft.next_step,
                    metric_to_watch: draft.metric_to_watch,
                    source: ActionSource::Rules,
                })
            })
            .collect();

        let fired = actions.len();
        actions.sort_by_key(|a| a.priority);
        actions.truncate(self.config.max_actions);

        tracing::debug!(fired, kept = actions.len(), "action rules evaluated");
        actions
    }

    /// Up to `max_questions` clarifying questions for missing optional
    /// inputs, in a fixed order.
    pub fn missing_data_questions(
        &self,
        snapshot: &FunnelSnapshot,
        context: &DiagnosticContext,
    ) -> Vec<String> {
        let checks: [(bool, &str); 4] = [
            (
                snapshot.first_touch_minutes.is_none(),
                "How many minutes does it take, on average, for sales to first contact a new lead?",
            ),
            (
                context.live_chat_integrated.is_none(),
                "Does your website live chat create leads in your CRM?",
            ),
            (
                snapshot.connect_rate.is_none(),
                "What share of call attempts actually reach the lead?",
            ),
            (
                snapshot.spend.is_none(),
                "How much was spent on media in this period?",
            ),
        ];

        checks
            .into_iter()
            .filter(|(missing, _)| *missing)
            .map(|(_, question)| question.to_string())
            .take(self.config.max_questions)
            .collect()
    }

    /// Daily checklist: empty below the minimum score, high-priority items
    /// only at medium confidence, the full list at high confidence.
    pub fn daily_checklist(
        &self,
        actions: &[ActionItem],
        confidence: &ConfidenceResult,
    ) -> Vec<ActionItem> {
        if confidence.score < self.config.min_checklist_score {
            return Vec::new();
        }
        match confidence.tier {
            ConfidenceTier::High => actions.to_vec(),
            _ => actions
                .iter()
                .filter(|a| a.priority == ActionPriority::High)
                .cloned()
                .collect(),
        }
    }
}
