use serde::{Deserialize, Deserializer};
use std::path::Path;

/// Root engine configuration. Loaded from environment variables with the
/// prefix `FUNNEL_DIAGNOSTICS__` and an optional TOML file.
///
/// Loaded once at process start and treated as immutable afterwards.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub benchmark_profile: BenchmarkProfile,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
}

/// Industry benchmark used as the base target set.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkProfile {
    #[default]
    Default,
    B2bSaas,
    Ecommerce,
    ProfessionalServices,
}

impl BenchmarkProfile {
    /// Maps a free-form segment label from the host context to a profile.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "default" => Some(Self::Default),
            "b2b_saas" | "saas" => Some(Self::B2bSaas),
            "ecommerce" | "e_commerce" | "retail" => Some(Self::Ecommerce),
            "professional_services" | "services" | "agency" => Some(Self::ProfessionalServices),
            _ => None,
        }
    }
}

/// Three-tier sample penalty for one stage denominator.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct SamplePenaltyConfig {
    /// Applied when the count is absent or zero.
    pub missing: f64,
    pub small: f64,
    pub small_below: f64,
    pub moderate: f64,
    pub moderate_below: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConfidenceConfig {
    #[serde(default = "default_leads_penalty", deserialize_with = "leads_penalty")]
    pub leads: SamplePenaltyConfig,
    #[serde(default = "default_qualified_penalty", deserialize_with = "qualified_penalty")]
    pub qualified: SamplePenaltyConfig,
    #[serde(default = "default_sales_qualified_penalty", deserialize_with = "sales_qualified_penalty")]
    pub sales_qualified: SamplePenaltyConfig,
    #[serde(default = "default_opportunities_penalty", deserialize_with = "opportunities_penalty")]
    pub opportunities: SamplePenaltyConfig,
    #[serde(default = "default_missing_spend")]
    pub missing_spend: f64,
    #[serde(default = "default_missing_first_touch")]
    pub missing_first_touch: f64,
    #[serde(default = "default_spend_without_media")]
    pub spend_without_media: f64,
    #[serde(default = "default_consistency_violation")]
    pub consistency_violation: f64,
    /// Scores strictly below this are `low`.
    #[serde(default = "default_medium_from")]
    pub medium_from: f64,
    /// Scores at or above this are `high`.
    #[serde(default = "default_high_from")]
    pub high_from: f64,
}

/// Partial sample penalty as written in a config file. Absent fields keep
/// the stage's default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SamplePenaltyOverride {
    missing: Option<f64>,
    small: Option<f64>,
    small_below: Option<f64>,
    moderate: Option<f64>,
    moderate_below: Option<f64>,
}

impl SamplePenaltyOverride {
    fn over(self, base: SamplePenaltyConfig) -> SamplePenaltyConfig {
        SamplePenaltyConfig {
            missing: self.missing.unwrap_or(base.missing),
            small: self.small.unwrap_or(base.small),
            small_below: self.small_below.unwrap_or(base.small_below),
            moderate: self.moderate.unwrap_or(base.moderate),
            moderate_below: self.moderate_below.unwrap_or(base.moderate_below),
        }
    }
}

fn penalty_over<'de, D: Deserializer<'de>>(
    base: SamplePenaltyConfig,
    deserializer: D,
) -> Result<SamplePenaltyConfig, D::Error> {
    SamplePenaltyOverride::deserialize(deserializer).map(|o| o.over(base))
}

fn leads_penalty<'de, D: Deserializer<'de>>(d: D) -> Result<SamplePenaltyConfig, D::Error> {
    penalty_over(default_leads_penalty(), d)
}
fn qualified_penalty<'de, D: Deserializer<'de>>(d: D) -> Result<SamplePenaltyConfig, D::Error> {
    penalty_over(default_qualified_penalty(), d)
}
fn sales_qualified_penalty<'de, D: Deserializer<'de>>(d: D) -> Result<SamplePenaltyConfig, D::Error> {
    penalty_over(default_sales_qualified_penalty(), d)
}
fn opportunities_penalty<'de, D: Deserializer<'de>>(d: D) -> Result<SamplePenaltyConfig, D::Error> {
    penalty_over(default_opportunities_penalty(), d)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ActionsConfig {
    #[serde(default = "default_max_actions")]
    pub max_actions: usize,
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
    /// Below this confidence score the daily checklist is empty.
    #[serde(default = "default_min_checklist_score")]
    pub min_checklist_score: f64,
}

// Default functions
fn default_leads_penalty() -> SamplePenaltyConfig {
    SamplePenaltyConfig {
        missing: 40.0,
        small: 25.0,
        small_below: 50.0,
        moderate: 10.0,
        moderate_below: 200.0,
    }
}
fn default_qualified_penalty() -> SamplePenaltyConfig {
    SamplePenaltyConfig {
        missing: 20.0,
        small: 15.0,
        small_below: 30.0,
        moderate: 7.0,
        moderate_below: 100.0,
    }
}
fn default_sales_qualified_penalty() -> SamplePenaltyConfig {
    SamplePenaltyConfig {
        missing: 15.0,
        small: 10.0,
        small_below: 20.0,
        moderate: 5.0,
        moderate_below: 60.0,
    }
}
fn default_opportunities_penalty() -> SamplePenaltyConfig {
    SamplePenaltyConfig {
        missing: 10.0,
        small: 8.0,
        small_below: 10.0,
        moderate: 4.0,
        moderate_below: 30.0,
    }
}
fn default_missing_spend() -> f64 {
    10.0
}
fn default_missing_first_touch() -> f64 {
    5.0
}
fn default_spend_without_media() -> f64 {
    8.0
}
fn default_consistency_violation() -> f64 {
    25.0
}
fn default_medium_from() -> f64 {
    50.0
}
fn default_high_from() -> f64 {
    80.0
}
fn default_max_actions() -> usize {
    6
}
fn default_max_questions() -> usize {
    3
}
fn default_min_checklist_score() -> f64 {
    50.0
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            leads: default_leads_penalty(),
            qualified: default_qualified_penalty(),
            sales_qualified: default_sales_qualified_penalty(),
            opportunities: default_opportunities_penalty(),
            missing_spend: default_missing_spend(),
            missing_first_touch: default_missing_first_touch(),
            spend_without_media: default_spend_without_media(),
            consistency_violation: default_consistency_violation(),
            medium_from: default_medium_from(),
            high_from: default_high_from(),
        }
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            max_actions: default_max_actions(),
            max_questions: default_max_questions(),
            min_checklist_score: default_min_checklist_score(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            benchmark_profile: BenchmarkProfile::default(),
            confidence: ConfidenceConfig::default(),
            actions: ActionsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("FUNNEL_DIAGNOSTICS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let loaded: Self = config.try_deserialize()?;
        tracing::debug!(profile = ?loaded.benchmark_profile, "engine configuration loaded");
        Ok(loaded)
    }
}
