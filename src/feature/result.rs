use serde::{Deserialize, Serialize};

use super::FeatureValue;

/// What produced the value of a [`FeatureResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvaluationSource {
    /// No rule matched (or the feature/environment is missing or disabled).
    DefaultValue,
    /// A `force` rule, or an experiment/safe rollout whose outcome has been fixed by its status.
    Force,
    /// A unit was bucketed into a live experiment or safe rollout.
    Experiment,
    /// A unit was included by a `rollout` rule.
    Rollout,
}

/// Result of evaluating one feature for one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureResult {
    #[allow(missing_docs)]
    pub value: FeatureValue,
    #[allow(missing_docs)]
    pub source: EvaluationSource,
    /// Id of the rule that produced the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Present if the unit was bucketed into an experiment. Callers should forward it to their
    /// analytics pipeline as an exposure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_result: Option<ExperimentResult>,
}

impl FeatureResult {
    pub(crate) fn default_value(value: FeatureValue) -> FeatureResult {
        FeatureResult {
            value,
            source: EvaluationSource::DefaultValue,
            rule_id: None,
            experiment_result: None,
        }
    }

    /// Return `true` if the served value is truthy. See [`FeatureValue::is_truthy`].
    pub fn is_on(&self) -> bool {
        self.value.is_truthy()
    }
}

/// Experiment assignment of a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResult {
    /// Tracking key of the experiment.
    pub experiment_key: String,
    /// Id of the assigned variation.
    pub variation_id: String,
    #[allow(missing_docs)]
    pub variation_name: String,
    /// Attribute that identified the unit (the fallback attribute if it was used).
    pub hash_attribute: String,
    /// Value of `hash_attribute`.
    pub hash_value: String,
    /// Hash that selected the variation. `None` if the variation came from the sticky-bucket
    /// store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<f64>,
    /// Whether the variation came from the sticky-bucket store.
    pub sticky_bucket_used: bool,
}
