//! Feature definitions and their evaluation.
//!
//! [`evaluate_feature`] resolves the value of one feature for one unit against an explicit
//! [`Configuration`] snapshot. It is a pure function of its inputs (plus the optional
//! sticky-bucket store), takes no locks and can run concurrently over the same snapshot.
mod eval;
mod eval_details;
mod eval_details_builder;
mod eval_visitor;
mod experiment;
mod models;
mod prerequisites;
mod result;
mod schedule;
mod value;

pub use eval_details::{
    EvaluationCode, EvaluationDetails, FeatureEvaluationCode, RuleEvaluationDetails,
};
pub use models::*;
pub use result::{EvaluationSource, ExperimentResult, FeatureResult};
pub use value::{FeatureValue, ValueType};

use crate::{
    sharder::{Fnv32Sharder, Sharder},
    sticky_bucket::StickyBucketStore,
    Attributes, Configuration,
};

use self::{
    eval::EvalContext,
    eval_details_builder::EvalDetailsBuilder,
    eval_visitor::{EvalVisitor, NoopEvalVisitor},
};

/// Evaluate `feature_key` for a unit described by `attributes`, using the rules of `environment`.
///
/// `now` is the time schedules are checked against. If `sticky_bucket_store` is provided,
/// experiment assignments are read from and persisted to it (unless a rule disables sticky
/// bucketing).
///
/// Evaluation never fails. Unknown features evaluate to [`FeatureValue::Null`]; any problem with a
/// rule makes the rule not match.
///
/// ```
/// # use std::collections::HashMap;
/// # use feature_rules::{feature::{evaluate_feature, EvaluationSource}, Configuration};
/// let configuration = Configuration::from_json(r#"{
///   "features": {
///     "dark-mode": {
///       "valueType": "boolean",
///       "defaultValue": false,
///       "environmentSettings": {
///         "production": {"enabled": true, "rules": [{"type": "force", "value": true}]}
///       }
///     }
///   }
/// }"#).unwrap();
///
/// let result = evaluate_feature(
///     &configuration,
///     "production",
///     "dark-mode",
///     &HashMap::new(),
///     None,
///     chrono::Utc::now(),
/// );
/// assert!(result.is_on());
/// assert_eq!(result.source, EvaluationSource::Force);
/// ```
pub fn evaluate_feature(
    configuration: &Configuration,
    environment: &str,
    feature_key: &str,
    attributes: &Attributes,
    sticky_bucket_store: Option<&dyn StickyBucketStore>,
    now: Timestamp,
) -> FeatureResult {
    evaluate_with_visitor(
        &mut NoopEvalVisitor,
        &Fnv32Sharder,
        configuration,
        environment,
        feature_key,
        attributes,
        sticky_bucket_store,
        now,
    )
}

/// Same as [`evaluate_feature`] but additionally reports what happened to each rule.
pub fn evaluate_feature_details(
    configuration: &Configuration,
    environment: &str,
    feature_key: &str,
    attributes: &Attributes,
    sticky_bucket_store: Option<&dyn StickyBucketStore>,
    now: Timestamp,
) -> (FeatureResult, EvaluationDetails) {
    let mut builder = EvalDetailsBuilder::new(feature_key.to_owned(), environment.to_owned(), now);
    let result = evaluate_with_visitor(
        &mut builder,
        &Fnv32Sharder,
        configuration,
        environment,
        feature_key,
        attributes,
        sticky_bucket_store,
        now,
    );
    let details = builder.build(&result);
    (result, details)
}

/// Result and details reported when no configuration is available.
pub(crate) fn missing_configuration(
    feature_key: &str,
    environment: &str,
    now: Timestamp,
) -> (FeatureResult, EvaluationDetails) {
    let result = FeatureResult::default_value(FeatureValue::Null);
    let details = EvalDetailsBuilder::new(feature_key.to_owned(), environment.to_owned(), now)
        .build(&result);
    (result, details)
}

#[allow(clippy::too_many_arguments)]
fn evaluate_with_visitor<V: EvalVisitor>(
    visitor: &mut V,
    sharder: &impl Sharder,
    configuration: &Configuration,
    environment: &str,
    feature_key: &str,
    attributes: &Attributes,
    sticky_bucket_store: Option<&dyn StickyBucketStore>,
    now: Timestamp,
) -> FeatureResult {
    let evaluated = EvalContext::new(
        configuration,
        environment,
        attributes,
        sticky_bucket_store,
        sharder,
        now,
    )
    .eval_feature(visitor, feature_key);

    log::trace!(target: "feature_rules",
                feature_key,
                environment,
                source:serde = evaluated.result.source,
                rule_id:serde = evaluated.result.rule_id,
                value:serde = evaluated.result.value;
                "evaluated a feature");

    evaluated.result
}
