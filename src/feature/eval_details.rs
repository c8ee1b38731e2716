use serde::{Deserialize, Serialize};

use super::{FeatureResult, Timestamp};

/// Why a feature evaluation ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureEvaluationCode {
    /// A rule produced the value.
    Match,
    /// Rules were evaluated but none matched.
    NoRuleMatched,
    /// No configuration is available yet.
    ConfigurationMissing,
    /// Feature is not present in the configuration.
    FeatureNotFound,
    /// Feature definition failed to parse. This usually means the engine is older than the
    /// configuration format.
    FeatureParseError,
    /// Feature has no settings for the requested environment.
    EnvironmentNotFound,
    /// Feature is disabled in the requested environment.
    EnvironmentDisabled,
}

/// Outcome of a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvaluationCode {
    /// The rule produced the value.
    Match,
    /// Rule is disabled.
    Disabled,
    /// Rule schedule is not active.
    ScheduleInactive,
    /// A prerequisite feature did not have the required value.
    PrerequisiteUnsatisfied,
    /// Prerequisites depend on the feature being evaluated.
    PrerequisiteCycle,
    /// Targeting condition did not match (or is malformed).
    ConditionFailed,
    /// Saved-group targeting did not match.
    SavedGroupFailed,
    /// Unit does not have the hash attribute.
    HashAttributeMissing,
    /// Unit is outside of the experiment's namespace range.
    NamespaceMiss,
    /// Unit is outside of the rollout coverage.
    RolloutMiss,
    /// Unit is outside of the experiment traffic.
    TrafficMiss,
    /// Referenced experiment is not running (draft, stopped without a released variation, or has
    /// no phases).
    ExperimentNotRunning,
    /// Referenced experiment does not exist.
    UnknownExperiment,
    /// Rule value cannot be converted to the feature's value type.
    InvalidValue,
    /// Rule failed to parse, most likely because its type is not supported.
    UnknownRuleType,
    /// Rule was not evaluated because a previous rule matched.
    Unevaluated,
}

/// Details about a feature evaluation, for debugging targeting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetails {
    #[allow(missing_docs)]
    pub feature_key: String,
    #[allow(missing_docs)]
    pub environment: String,
    /// Time the evaluation was performed at (used for schedules).
    pub timestamp: Timestamp,
    /// When the configuration was published. `None` if unknown or configuration is missing.
    pub config_published_at: Option<Timestamp>,
    #[allow(missing_docs)]
    pub feature_evaluation_code: FeatureEvaluationCode,
    #[allow(missing_docs)]
    pub result: FeatureResult,
    /// One entry per rule of the environment, in declared order.
    pub rules: Vec<RuleEvaluationDetails>,
}

/// Outcome of a single rule, see [`EvaluationDetails::rules`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvaluationDetails {
    /// 1-based position of the rule.
    pub order_position: usize,
    #[allow(missing_docs)]
    pub rule_id: Option<String>,
    /// Value of the rule's `type` field, if any.
    pub rule_type: Option<String>,
    #[allow(missing_docs)]
    pub evaluation_code: EvaluationCode,
}
