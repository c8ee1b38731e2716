use crate::{Configuration, TryParse};

use super::{
    eval_details::{EvaluationCode, FeatureEvaluationCode},
    FeatureEnvironment, FeatureResult, FeatureRule,
};

pub(super) trait EvalVisitor {
    /// Called when (if) evaluation gets configuration.
    #[allow(unused_variables)]
    #[inline]
    fn on_configuration(&mut self, configuration: &Configuration) {}

    /// Called once the environment settings of the feature have been resolved.
    #[allow(unused_variables)]
    #[inline]
    fn on_feature_environment(&mut self, environment: &FeatureEnvironment) {}

    /// Called for each rule that was evaluated. `index` is the 0-based rule position.
    #[allow(unused_variables)]
    #[inline]
    fn on_rule_result(&mut self, index: usize, rule: &TryParse<FeatureRule>, code: EvaluationCode) {
    }

    /// Called with evaluation result.
    #[allow(unused_variables)]
    #[inline]
    fn on_result(&mut self, code: FeatureEvaluationCode, result: &FeatureResult) {}
}

/// Dummy visitor that does nothing.
///
/// It is designed so that all calls to it are optimized away (zero-cost).
pub(super) struct NoopEvalVisitor;

impl EvalVisitor for NoopEvalVisitor {}
