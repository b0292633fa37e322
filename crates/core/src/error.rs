use thiserror::Error;

pub type DiagnosticResult<T> = Result<T, DiagnosticError>;

/// Failures the diagnostic engine can raise.
///
/// Data-quality conditions (missing counters, small samples, inconsistent
/// counts) are never errors; they travel through the result types. Only a
/// registry that has drifted out of sync with the stage or media definitions
/// ends up here. The `Display` text of the registry variants is
/// generic so it can be shown to end users; the `detail()` string is for logs.
#[derive(Error, Debug)]
pub enum DiagnosticError {
    #[error("diagnostic engine misconfigured")]
    MissingTarget { metric: String, stage: String },

    #[error("diagnostic engine misconfigured")]
    MissingThreshold { stage: String },

    #[error("diagnostic engine misconfigured")]
    UnknownMediaMetric { metric: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiagnosticError {
    /// Operator-facing description with the offending keys.
    pub fn detail(&self) -> String {
        match self {
            Self::MissingTarget { metric, stage } => {
                format!("no target registered for metric `{metric}` graded by stage `{stage}`")
            }
            Self::MissingThreshold { stage } => {
                format!("no eligibility threshold registered for stage `{stage}`")
            }
            Self::UnknownMediaMetric { metric } => {
                format!("media threshold references unregistered metric `{metric}`")
            }
            other => other.to_string(),
        }
    }

    /// True for registry drift, as opposed to I/O or parse failures.
    pub fn is_misconfiguration(&self) -> bool {
        matches!(
            self,
            Self::MissingTarget { .. } | Self::MissingThreshold { .. } | Self::UnknownMediaMetric { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_errors_have_generic_display() {
        let err = DiagnosticError::MissingTarget {
            metric: "opportunity_to_won_rate".to_string(),
            stage: "opportunity_to_won".to_string(),
        };
        assert_eq!(err.to_string(), "diagnostic engine misconfigured");
        assert!(err.detail().contains("opportunity_to_won_rate"));
        assert!(err.is_misconfiguration());
    }

    #[test]
    fn test_serialization_error_is_not_misconfiguration() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DiagnosticError::from(parse_err);
        assert!(!err.is_misconfiguration());
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
