use crate::{Configuration, TryParse};

use super::{
    eval_details::*, eval_visitor::EvalVisitor, FeatureEnvironment, FeatureResult, FeatureRule,
    Timestamp,
};

pub(super) struct EvalDetailsBuilder {
    feature_key: String,
    environment: String,
    now: Timestamp,

    config_published_at: Option<Timestamp>,

    feature_evaluation_code: FeatureEvaluationCode,
    result: Option<FeatureResult>,

    rules: Vec<RuleEvaluationDetails>,
}

impl EvalDetailsBuilder {
    pub fn new(feature_key: String, environment: String, now: Timestamp) -> EvalDetailsBuilder {
        EvalDetailsBuilder {
            feature_key,
            environment,
            now,
            config_published_at: None,
            feature_evaluation_code: FeatureEvaluationCode::ConfigurationMissing,
            result: None,
            rules: Vec::new(),
        }
    }

    /// Finish building. `fallback` is used as the result if evaluation never reported one.
    pub fn build(self, fallback: &FeatureResult) -> EvaluationDetails {
        EvaluationDetails {
            feature_key: self.feature_key,
            environment: self.environment,
            timestamp: self.now,
            config_published_at: self.config_published_at,
            feature_evaluation_code: self.feature_evaluation_code,
            result: self.result.unwrap_or_else(|| fallback.clone()),
            rules: self.rules,
        }
    }
}

impl EvalVisitor for EvalDetailsBuilder {
    fn on_configuration(&mut self, configuration: &Configuration) {
        self.config_published_at = configuration.created_at;
    }

    fn on_feature_environment(&mut self, environment: &FeatureEnvironment) {
        self.rules = environment
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| RuleEvaluationDetails {
                order_position: i + 1,
                rule_id: rule_id(rule),
                rule_type: rule_type(rule),
                evaluation_code: EvaluationCode::Unevaluated,
            })
            .collect();
    }

    fn on_rule_result(&mut self, index: usize, _rule: &TryParse<FeatureRule>, code: EvaluationCode) {
        if let Some(details) = self.rules.get_mut(index) {
            details.evaluation_code = code;
        }
    }

    fn on_result(&mut self, code: FeatureEvaluationCode, result: &FeatureResult) {
        self.feature_evaluation_code = code;
        self.result = Some(result.clone());
    }
}

fn rule_id(rule: &TryParse<FeatureRule>) -> Option<String> {
    match rule {
        TryParse::Parsed(rule) => rule.common().id.clone(),
        TryParse::ParseFailed(raw) => raw.get("id").and_then(|id| id.as_str()).map(str::to_owned),
    }
}

fn rule_type(rule: &TryParse<FeatureRule>) -> Option<String> {
    match rule {
        TryParse::Parsed(rule) => Some(rule.kind().to_owned()),
        TryParse::ParseFailed(raw) => raw
            .get("type")
            .and_then(|ty| ty.as_str())
            .map(str::to_owned),
    }
}
