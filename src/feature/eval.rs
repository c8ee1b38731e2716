use std::collections::HashSet;

use serde_json::Value;

use crate::{
    attributes::{get_path, to_hash_value},
    saved_group::eval_targeting,
    sharder::{clamp_unit, Sharder},
    sticky_bucket::StickyBucketStore,
    Attributes, Condition, Configuration, SavedGroupTargeting, TryParse,
};

use super::{
    eval_details::{EvaluationCode, FeatureEvaluationCode},
    eval_visitor::EvalVisitor,
    experiment::Bucketing,
    schedule, EvaluationSource, ExperimentRefRule, ExperimentResult, ExperimentRule,
    ExperimentStatus, Feature, FeatureEnvironment, FeatureResult, FeatureRule, FeatureValue,
    Prerequisite, RolloutRule, SafeRolloutRule, SafeRolloutStatus, Timestamp,
};

/// State of one top-level evaluation, shared with the prerequisite evaluations it triggers.
pub(super) struct EvalContext<'a, S> {
    pub(super) configuration: &'a Configuration,
    environment: &'a str,
    attributes: &'a Attributes,
    sticky_bucket_store: Option<&'a dyn StickyBucketStore>,
    sharder: &'a S,
    now: Timestamp,
    /// Features on the current prerequisite path.
    evaluating: HashSet<String>,
    /// Features at which a detected prerequisite cycle closes. Each of them is on the current path
    /// until its own evaluation unwinds.
    cycle_entries: HashSet<String>,
}

/// Outcome of evaluating one feature.
pub(super) struct Evaluated {
    pub result: FeatureResult,
    pub code: FeatureEvaluationCode,
    /// The feature is part of a prerequisite cycle that closes further up the current path. Its
    /// value is not its own and must not satisfy anything.
    pub cyclic: bool,
}

struct RuleMatch {
    value: FeatureValue,
    source: EvaluationSource,
    experiment_result: Option<ExperimentResult>,
}

impl RuleMatch {
    fn new(value: FeatureValue, source: EvaluationSource) -> RuleMatch {
        RuleMatch {
            value,
            source,
            experiment_result: None,
        }
    }
}

impl<'a, S: Sharder> EvalContext<'a, S> {
    pub fn new(
        configuration: &'a Configuration,
        environment: &'a str,
        attributes: &'a Attributes,
        sticky_bucket_store: Option<&'a dyn StickyBucketStore>,
        sharder: &'a S,
        now: Timestamp,
    ) -> Self {
        EvalContext {
            configuration,
            environment,
            attributes,
            sticky_bucket_store,
            sharder,
            now,
            evaluating: HashSet::new(),
            cycle_entries: HashSet::new(),
        }
    }

    pub(super) fn is_evaluating(&self, feature_key: &str) -> bool {
        self.evaluating.contains(feature_key)
    }

    /// Record that a prerequisite cycle closes at `feature_key`, which is on the current path.
    pub(super) fn enter_cycle(&mut self, feature_key: &str) {
        self.cycle_entries.insert(feature_key.to_owned());
    }

    /// Walk the rules of the feature in the active environment and return the first value a rule
    /// produces, or the default value.
    pub fn eval_feature<V: EvalVisitor>(&mut self, visitor: &mut V, feature_key: &str) -> Evaluated {
        let configuration = self.configuration;
        visitor.on_configuration(configuration);

        let evaluated = match configuration.get_feature(feature_key) {
            None => default_result(FeatureValue::Null, FeatureEvaluationCode::FeatureNotFound),
            Some(TryParse::ParseFailed(_)) => {
                log::warn!(target: "feature_rules",
                           feature_key;
                           "feature definition failed to parse, serving null");
                default_result(FeatureValue::Null, FeatureEvaluationCode::FeatureParseError)
            }
            Some(TryParse::Parsed(feature)) => self.eval_parsed_feature(visitor, feature_key, feature),
        };

        visitor.on_result(evaluated.code, &evaluated.result);
        evaluated
    }

    fn eval_parsed_feature<V: EvalVisitor>(
        &mut self,
        visitor: &mut V,
        feature_key: &str,
        feature: &'a Feature,
    ) -> Evaluated {
        let Some(environment) = feature.environment_settings.get(self.environment) else {
            return default_result(
                default_value(feature_key, feature, None),
                FeatureEvaluationCode::EnvironmentNotFound,
            );
        };
        if !environment.enabled {
            return default_result(
                default_value(feature_key, feature, Some(environment)),
                FeatureEvaluationCode::EnvironmentDisabled,
            );
        }

        visitor.on_feature_environment(environment);

        self.evaluating.insert(feature_key.to_owned());

        let mut cycle_hit = false;
        let mut matched = None;
        for (index, rule) in environment.rules.iter().enumerate() {
            let outcome = match rule {
                TryParse::Parsed(rule) => self.eval_rule(feature_key, feature, rule),
                TryParse::ParseFailed(_) => Err(EvaluationCode::UnknownRuleType),
            };

            visitor.on_rule_result(
                index,
                rule,
                outcome.as_ref().err().copied().unwrap_or(EvaluationCode::Match),
            );

            match outcome {
                Ok(rule_match) => {
                    let rule_id = rule.parsed().and_then(|rule| rule.common().id.clone());
                    matched = Some(FeatureResult {
                        value: rule_match.value,
                        source: rule_match.source,
                        rule_id,
                        experiment_result: rule_match.experiment_result,
                    });
                    break;
                }
                Err(EvaluationCode::PrerequisiteCycle) => {
                    log::warn!(target: "feature_rules",
                               feature_key,
                               rule_index = index;
                               "feature is part of a prerequisite cycle, serving default value");
                    cycle_hit = true;
                    break;
                }
                Err(code) => {
                    log::debug!(target: "feature_rules",
                                feature_key,
                                rule_index = index,
                                reason:serde = code;
                                "skipping rule");
                }
            }
        }

        self.evaluating.remove(feature_key);
        // A cycle closing here is resolved: callers see this feature's default like anyone else.
        self.cycle_entries.remove(feature_key);
        let cyclic = cycle_hit && !self.cycle_entries.is_empty();

        match matched {
            Some(result) => Evaluated {
                result,
                code: FeatureEvaluationCode::Match,
                cyclic,
            },
            None => Evaluated {
                cyclic,
                ..default_result(
                    default_value(feature_key, feature, Some(environment)),
                    FeatureEvaluationCode::NoRuleMatched,
                )
            },
        }
    }

    fn eval_rule(
        &mut self,
        feature_key: &str,
        feature: &'a Feature,
        rule: &'a FeatureRule,
    ) -> Result<RuleMatch, EvaluationCode> {
        let common = rule.common();
        if !common.enabled {
            return Err(EvaluationCode::Disabled);
        }
        if !schedule::is_active(&common.schedule_rules, self.now) {
            return Err(EvaluationCode::ScheduleInactive);
        }
        self.check_targeting(
            &common.prerequisites,
            common.condition.as_ref(),
            &common.saved_group_targeting,
        )?;

        match rule {
            FeatureRule::Force(rule) => Ok(RuleMatch::new(
                coerce(feature_key, feature, &rule.value)?,
                EvaluationSource::Force,
            )),
            FeatureRule::Rollout(rule) => self.eval_rollout(feature_key, feature, rule),
            FeatureRule::Experiment(rule) => self.eval_experiment(feature_key, feature, rule),
            FeatureRule::ExperimentRef(rule) => self.eval_experiment_ref(feature_key, feature, rule),
            FeatureRule::SafeRollout(rule) => self.eval_safe_rollout(feature_key, feature, rule),
        }
    }

    /// Prerequisites, then condition, then saved groups.
    fn check_targeting(
        &mut self,
        prerequisites: &'a [Prerequisite],
        condition: Option<&'a Condition>,
        saved_group_targeting: &'a [SavedGroupTargeting],
    ) -> Result<(), EvaluationCode> {
        self.check_prerequisites(prerequisites)?;

        let saved_groups = &self.configuration.saved_groups;
        if condition.is_some_and(|condition| !condition.eval(self.attributes, saved_groups)) {
            return Err(EvaluationCode::ConditionFailed);
        }
        if !eval_targeting(saved_group_targeting, self.attributes, saved_groups) {
            return Err(EvaluationCode::SavedGroupFailed);
        }
        Ok(())
    }

    fn eval_rollout(
        &self,
        feature_key: &str,
        feature: &Feature,
        rule: &RolloutRule,
    ) -> Result<RuleMatch, EvaluationCode> {
        let hash_value = get_path(self.attributes, &rule.hash_attribute)
            .and_then(to_hash_value)
            .ok_or(EvaluationCode::HashAttributeMissing)?;
        let seed = rule.seed.as_deref().unwrap_or(feature_key);

        let h = self.sharder.hash(seed, &hash_value, rule.hash_version);
        if h < clamp_unit(rule.coverage) {
            Ok(RuleMatch::new(
                coerce(feature_key, feature, &rule.value)?,
                EvaluationSource::Rollout,
            ))
        } else {
            Err(EvaluationCode::RolloutMiss)
        }
    }

    fn eval_experiment(
        &self,
        feature_key: &str,
        feature: &Feature,
        rule: &ExperimentRule,
    ) -> Result<RuleMatch, EvaluationCode> {
        let mut values = rule
            .values
            .iter()
            .map(|v| coerce(feature_key, feature, &v.value))
            .collect::<Result<Vec<_>, _>>()?;
        let weights: Vec<f64> = rule.values.iter().map(|v| v.weight).collect();
        let variation_ids: Vec<String> = rule
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| v.key.clone().unwrap_or_else(|| i.to_string()))
            .collect();
        let variation_names: Vec<String> = rule.values.iter().map(|v| v.name.clone()).collect();

        let experiment_key = rule.tracking_key.as_deref().unwrap_or(feature_key);
        let assignment = Bucketing {
            experiment_key,
            seed: rule.seed.as_deref().unwrap_or(experiment_key),
            coverage: rule.coverage,
            weights: &weights,
            variation_ids: &variation_ids,
            variation_names: &variation_names,
            namespace: rule.namespace.as_ref(),
            settings: &rule.bucketing,
        }
        .assign(self.attributes, self.sharder, self.sticky_bucket_store)?;

        Ok(RuleMatch {
            value: values.swap_remove(assignment.index),
            source: EvaluationSource::Experiment,
            experiment_result: Some(assignment.result),
        })
    }

    fn eval_experiment_ref(
        &mut self,
        feature_key: &str,
        feature: &'a Feature,
        rule: &'a ExperimentRefRule,
    ) -> Result<RuleMatch, EvaluationCode> {
        let configuration = self.configuration;
        let Some(experiment) = configuration.get_experiment(&rule.experiment_id) else {
            log::warn!(target: "feature_rules",
                       feature_key,
                       experiment_id = rule.experiment_id.as_str();
                       "rule references unknown experiment");
            return Err(EvaluationCode::UnknownExperiment);
        };

        let mapped_value = |variation_id: &str| -> Result<FeatureValue, EvaluationCode> {
            let value = rule
                .variations
                .iter()
                .find(|v| v.variation_id == variation_id)
                .map(|v| &v.value)
                .ok_or_else(|| {
                    log::warn!(target: "feature_rules",
                               feature_key,
                               experiment_id = rule.experiment_id.as_str(),
                               variation_id;
                               "experiment variation has no value mapped");
                    EvaluationCode::InvalidValue
                })?;
            coerce(feature_key, feature, value)
        };

        match experiment.status {
            ExperimentStatus::Draft => return Err(EvaluationCode::ExperimentNotRunning),
            ExperimentStatus::Stopped => {
                let released = experiment
                    .released_variation_id
                    .as_deref()
                    .ok_or(EvaluationCode::ExperimentNotRunning)?;
                return Ok(RuleMatch::new(mapped_value(released)?, EvaluationSource::Force));
            }
            ExperimentStatus::Running => {}
        }

        let phase = experiment
            .phases
            .last()
            .ok_or(EvaluationCode::ExperimentNotRunning)?;
        self.check_targeting(
            &phase.prerequisites,
            phase.condition.as_ref(),
            &phase.saved_group_targeting,
        )?;

        let mut values = experiment
            .variations
            .iter()
            .map(|v| mapped_value(&v.id))
            .collect::<Result<Vec<_>, _>>()?;
        let weights: Vec<f64> = (0..experiment.variations.len())
            .map(|i| phase.variation_weights.get(i).copied().unwrap_or(0.0))
            .collect();
        let variation_ids: Vec<String> = experiment.variations.iter().map(|v| v.id.clone()).collect();
        let variation_names: Vec<String> = experiment
            .variations
            .iter()
            .map(|v| if v.name.is_empty() { v.key.clone() } else { v.name.clone() })
            .collect();

        let experiment_key = experiment.tracking_key.as_deref().unwrap_or(&experiment.id);
        let assignment = Bucketing {
            experiment_key,
            seed: phase.seed.as_deref().unwrap_or(experiment_key),
            coverage: phase.coverage,
            weights: &weights,
            variation_ids: &variation_ids,
            variation_names: &variation_names,
            namespace: phase.namespace.as_ref(),
            settings: &experiment.bucketing,
        }
        .assign(self.attributes, self.sharder, self.sticky_bucket_store)?;

        Ok(RuleMatch {
            value: values.swap_remove(assignment.index),
            source: EvaluationSource::Experiment,
            experiment_result: Some(assignment.result),
        })
    }

    fn eval_safe_rollout(
        &self,
        feature_key: &str,
        feature: &Feature,
        rule: &SafeRolloutRule,
    ) -> Result<RuleMatch, EvaluationCode> {
        let control = coerce(feature_key, feature, &rule.control_value)?;
        let variation = coerce(feature_key, feature, &rule.variation_value)?;

        match rule.status {
            SafeRolloutStatus::RolledBack | SafeRolloutStatus::Stopped => {
                return Ok(RuleMatch::new(control, EvaluationSource::Force));
            }
            SafeRolloutStatus::Released => {
                return Ok(RuleMatch::new(variation, EvaluationSource::Force));
            }
            SafeRolloutStatus::Running => {}
        }

        let experiment_key = match (&rule.tracking_key, &rule.common.id) {
            (Some(tracking_key), _) => tracking_key.clone(),
            (None, Some(rule_id)) => format!("{feature_key}-{rule_id}"),
            (None, None) => feature_key.to_owned(),
        };
        let variation_ids = ["0".to_owned(), "1".to_owned()];
        let variation_names = ["control".to_owned(), "variation".to_owned()];

        let assignment = Bucketing {
            experiment_key: &experiment_key,
            seed: rule.seed.as_deref().unwrap_or(&experiment_key),
            coverage: rule.coverage,
            weights: &[0.5, 0.5],
            variation_ids: &variation_ids,
            variation_names: &variation_names,
            namespace: None,
            settings: &rule.bucketing,
        }
        .assign(self.attributes, self.sharder, self.sticky_bucket_store)?;

        Ok(RuleMatch {
            value: if assignment.index == 0 { control } else { variation },
            source: EvaluationSource::Experiment,
            experiment_result: Some(assignment.result),
        })
    }
}

fn default_result(value: FeatureValue, code: FeatureEvaluationCode) -> Evaluated {
    Evaluated {
        result: FeatureResult::default_value(value),
        code,
        cyclic: false,
    }
}

/// Default value of the environment (falling back to the feature's). A default that does not
/// match the value type is still served, as raw JSON.
fn default_value(
    feature_key: &str,
    feature: &Feature,
    environment: Option<&FeatureEnvironment>,
) -> FeatureValue {
    let raw = environment
        .and_then(|env| env.default_value.as_ref())
        .unwrap_or(&feature.default_value);
    if raw.is_null() {
        return FeatureValue::Null;
    }
    feature.value_type.coerce(raw).unwrap_or_else(|| {
        log::warn!(target: "feature_rules",
                   feature_key,
                   value_type:serde = feature.value_type;
                   "default value does not match the feature value type");
        FeatureValue::Json(raw.clone())
    })
}

fn coerce(feature_key: &str, feature: &Feature, value: &Value) -> Result<FeatureValue, EvaluationCode> {
    feature.value_type.coerce(value).ok_or_else(|| {
        log::warn!(target: "feature_rules",
                   feature_key,
                   value_type:serde = feature.value_type;
                   "rule value does not match the feature value type, skipping rule");
        EvaluationCode::InvalidValue
    })
}
