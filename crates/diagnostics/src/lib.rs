//! Sales funnel diagnostics: stage conversion grading, sample-size gating,
//! confidence scoring, bottleneck ranking with downstream impact, and
//! rule-based action recommendations.
//!
//! Every entry point is a pure function of its explicit inputs; the engine
//! holds only immutable configuration and can be shared across threads.

pub mod actions;
pub mod bottleneck;
pub mod confidence;
pub mod eligibility;
pub mod engine;
pub mod rates;
pub mod registry;
pub mod status;

pub use actions::{ActionItem, ActionPriority, ActionRecommender};
pub use bottleneck::{BottleneckRanking, FinalOutcome, ImpactEstimate, StageImpact};
pub use confidence::{ConfidenceResult, ConfidenceScorer, ConfidenceTier};
pub use eligibility::{Eligibility, EligibilityGate, IneligibleReason};
pub use engine::{FunnelDiagnosis, FunnelDiagnosticEngine};
pub use rates::DerivedMetrics;
pub use registry::{MetricKey, MetricTarget, StageId, TargetDirection, TargetSet};
pub use status::{MetricStatus, StageStatus};
