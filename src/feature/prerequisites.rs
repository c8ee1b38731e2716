use crate::{sharder::Sharder, Attributes};

use super::{
    eval::EvalContext, eval_details::EvaluationCode, eval_visitor::NoopEvalVisitor, Prerequisite,
};

impl<S: Sharder> EvalContext<'_, S> {
    /// Check that every prerequisite feature currently evaluates to a value its condition accepts.
    ///
    /// Prerequisite features are evaluated with the same attributes. Reaching a feature that is
    /// already on the evaluation path (directly or through another prerequisite) is a cycle. Every
    /// feature on the cycle stops at the rule that reached it and serves its default value. The
    /// cycle is reported up to the feature it closes at; features depending on the cycle from
    /// outside see that feature's default like any other value.
    /// Prerequisite evaluations never produce exposures.
    pub(super) fn check_prerequisites(
        &mut self,
        prerequisites: &[Prerequisite],
    ) -> Result<(), EvaluationCode> {
        for prerequisite in prerequisites {
            let parent_key = prerequisite.feature_id.as_str();

            if self.is_evaluating(parent_key) {
                log::warn!(target: "feature_rules",
                           prerequisite = parent_key;
                           "cyclic prerequisite detected, rule will not match");
                self.enter_cycle(parent_key);
                return Err(EvaluationCode::PrerequisiteCycle);
            }

            let parent = self.eval_feature(&mut NoopEvalVisitor, parent_key);
            if parent.cyclic {
                return Err(EvaluationCode::PrerequisiteCycle);
            }

            let attributes: Attributes = [("value".to_owned(), parent.result.value.to_json())].into();
            if !prerequisite
                .condition
                .eval(&attributes, &self.configuration.saved_groups)
            {
                return Err(EvaluationCode::PrerequisiteUnsatisfied);
            }
        }
        Ok(())
    }
}
