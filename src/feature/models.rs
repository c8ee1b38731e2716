use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::{sharder::HashVersion, Condition, SavedGroupTargeting, TryParse};

use super::ValueType;

#[allow(missing_docs)]
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A feature and its per-environment rules. Immutable per revision.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Type all values of this feature are coerced to.
    pub value_type: ValueType,
    /// Value served when no rule matches (unless the environment overrides it).
    pub default_value: Value,
    /// Rules and switches per environment name.
    #[serde(default)]
    pub environment_settings: HashMap<String, FeatureEnvironment>,
}

/// Feature settings for a single environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureEnvironment {
    /// Disabled environments serve the default value without looking at rules.
    pub enabled: bool,
    /// Overrides [`Feature::default_value`] in this environment.
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Rules in evaluation order: first match wins.
    ///
    /// Rules of unknown type fail to parse and are skipped at evaluation time.
    #[serde(default)]
    pub rules: Vec<TryParse<FeatureRule>>,
    /// Staged but unpublished settings. Never evaluated.
    #[serde(default)]
    pub draft: Option<Box<FeatureEnvironment>>,
}

/// A rule of a feature. Rule type is discriminated by the `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FeatureRule {
    /// Serve a fixed value.
    Force(ForceRule),
    /// Serve a value to a percentage of units.
    Rollout(RolloutRule),
    /// Split units between inline variations.
    Experiment(ExperimentRule),
    /// Split units between the variations of an externally defined [`Experiment`].
    ExperimentRef(ExperimentRefRule),
    /// Two-arm gradual rollout with an operator-controlled lifecycle.
    SafeRollout(SafeRolloutRule),
}

impl FeatureRule {
    /// Fields shared by all rule types.
    pub fn common(&self) -> &RuleCommon {
        match self {
            FeatureRule::Force(rule) => &rule.common,
            FeatureRule::Rollout(rule) => &rule.common,
            FeatureRule::Experiment(rule) => &rule.common,
            FeatureRule::ExperimentRef(rule) => &rule.common,
            FeatureRule::SafeRollout(rule) => &rule.common,
        }
    }

    /// Wire name of the rule type.
    pub fn kind(&self) -> &'static str {
        match self {
            FeatureRule::Force(_) => "force",
            FeatureRule::Rollout(_) => "rollout",
            FeatureRule::Experiment(_) => "experiment",
            FeatureRule::ExperimentRef(_) => "experiment-ref",
            FeatureRule::SafeRollout(_) => "safe-rollout",
        }
    }
}

/// Fields shared by all rule types. All of them are optional on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCommon {
    /// Rule id, reported back in evaluation results.
    #[serde(default)]
    pub id: Option<String>,
    #[allow(missing_docs)]
    #[serde(default)]
    pub description: String,
    /// Disabled rules are skipped.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Targeting condition on unit attributes.
    #[serde(default)]
    pub condition: Option<Condition>,
    /// Saved-group requirements; all entries must pass.
    #[serde(default)]
    pub saved_group_targeting: Vec<SavedGroupTargeting>,
    /// Features this rule depends on; all must be satisfied.
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    /// Enable/disable schedule. Empty means always active.
    #[serde(default)]
    pub schedule_rules: Vec<ScheduleRule>,
}

fn default_enabled() -> bool {
    true
}

fn default_hash_attribute() -> String {
    "id".to_owned()
}

fn default_coverage() -> f64 {
    1.0
}

/// A dependency on another feature's evaluated value.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prerequisite {
    /// Key of the feature this rule depends on.
    #[serde(alias = "id")]
    pub feature_id: String,
    /// Condition tested against `{"value": <evaluated value of feature_id>}`.
    pub condition: Condition,
}

/// One entry of a rule's enable/disable schedule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRule {
    /// State of the rule from `timestamp` on.
    pub enabled: bool,
    /// `None` means "apply immediately".
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRule {
    #[serde(flatten)]
    pub common: RuleCommon,
    pub value: Value,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutRule {
    #[serde(flatten)]
    pub common: RuleCommon,
    pub value: Value,
    /// Fraction of units receiving `value`.
    pub coverage: f64,
    #[serde(default = "default_hash_attribute")]
    pub hash_attribute: String,
    /// Hash seed. Defaults to the feature key.
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub hash_version: HashVersion,
}

/// Sticky-bucketing and hashing settings shared by [`ExperimentRule`] and [`Experiment`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketingSettings {
    /// Attribute identifying the unit.
    #[serde(default = "default_hash_attribute")]
    pub hash_attribute: String,
    /// Used when `hash_attribute` is absent and sticky bucketing is active.
    #[serde(default)]
    pub fallback_attribute: Option<String>,
    #[allow(missing_docs)]
    #[serde(default)]
    pub hash_version: HashVersion,
    /// Bumping the bucket version re-randomizes units.
    #[serde(default)]
    pub bucket_version: u32,
    /// Sticky assignments recorded under a lower bucket version are ignored.
    #[serde(default)]
    pub min_bucket_version: u32,
    #[allow(missing_docs)]
    #[serde(default)]
    pub disable_sticky_bucketing: bool,
}

/// Mutually exclusive slice of the hash space shared by several experiments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    /// Namespace id; the namespace hash is seeded with it.
    #[serde(alias = "name")]
    pub id: String,
    /// Half-open `[lo, hi)` slice of the namespace hash this experiment occupies.
    pub range: (f64, f64),
    #[allow(missing_docs)]
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRule {
    #[serde(flatten)]
    pub common: RuleCommon,
    /// Experiment key reported in exposures. Defaults to the feature key.
    #[serde(default)]
    pub tracking_key: Option<String>,
    /// Hash seed. Defaults to the tracking key.
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default = "default_coverage")]
    pub coverage: f64,
    #[serde(default)]
    pub namespace: Option<Namespace>,
    pub values: Vec<ExperimentValue>,
    #[serde(flatten)]
    pub bucketing: BucketingSettings,
}

/// Inline experiment variation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentValue {
    #[allow(missing_docs)]
    pub value: Value,
    /// Fraction of the hash space; weights of a rule should sum to at most 1.
    pub weight: f64,
    #[allow(missing_docs)]
    #[serde(default)]
    pub name: String,
    /// Variation id. Defaults to the variation's index.
    #[serde(default)]
    pub key: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRefRule {
    #[serde(flatten)]
    pub common: RuleCommon,
    pub experiment_id: String,
    /// Maps experiment variations to feature values.
    pub variations: Vec<ExperimentRefVariation>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRefVariation {
    pub variation_id: String,
    pub value: Value,
}

/// Lifecycle of a safe rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SafeRolloutStatus {
    /// Units are split between control and variation by hash.
    Running,
    /// Everyone gets the variation value.
    Released,
    /// Everyone gets the control value.
    RolledBack,
    /// Everyone gets the control value.
    Stopped,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeRolloutRule {
    #[serde(flatten)]
    pub common: RuleCommon,
    /// Experiment key reported in exposures. Defaults to `<feature key>-<rule id>`.
    #[serde(default)]
    pub tracking_key: Option<String>,
    #[serde(default)]
    pub seed: Option<String>,
    pub control_value: Value,
    pub variation_value: Value,
    pub status: SafeRolloutStatus,
    #[serde(default = "default_coverage")]
    pub coverage: f64,
    #[serde(flatten)]
    pub bucketing: BucketingSettings,
}

/// Externally defined experiment referenced by `experiment-ref` rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    #[allow(missing_docs)]
    pub id: String,
    /// Experiment key reported in exposures. Defaults to `id`.
    #[serde(default)]
    pub tracking_key: Option<String>,
    #[allow(missing_docs)]
    pub status: ExperimentStatus,
    #[allow(missing_docs)]
    pub variations: Vec<ExperimentVariation>,
    /// Phases in chronological order; the last one is current.
    #[serde(default)]
    pub phases: Vec<ExperimentPhase>,
    /// Variation served to everyone once a stopped experiment has been released.
    #[serde(default)]
    pub released_variation_id: Option<String>,
    #[serde(flatten)]
    #[allow(missing_docs)]
    pub bucketing: BucketingSettings,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Stopped,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentVariation {
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
}

/// Traffic settings of one experiment phase.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentPhase {
    #[allow(missing_docs)]
    #[serde(default = "default_coverage")]
    pub coverage: f64,
    /// Weight per experiment variation, in variation order.
    pub variation_weights: Vec<f64>,
    #[allow(missing_docs)]
    #[serde(default)]
    pub namespace: Option<Namespace>,
    /// Hash seed. Defaults to the experiment's tracking key.
    #[serde(default)]
    pub seed: Option<String>,
    /// Additional targeting applied on top of the rule's own.
    #[serde(default)]
    pub condition: Option<Condition>,
    #[allow(missing_docs)]
    #[serde(default)]
    pub saved_group_targeting: Vec<SavedGroupTargeting>,
    #[allow(missing_docs)]
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
}
