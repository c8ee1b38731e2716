use std::{collections::HashMap, sync::Arc};

use chrono::Utc;

use crate::{
    events::{EventMetaData, ExposureEvent},
    feature::{self, EvaluationDetails, FeatureResult},
    Attributes, Configuration, ConfigurationStore, EvaluatorConfig,
};

/// Evaluates features against the current configuration and forwards exposures.
///
/// In order to create an evaluator instance, first create [`EvaluatorConfig`].
///
/// # Examples
/// ```
/// # use feature_rules::{Evaluator, EvaluatorConfig};
/// Evaluator::new(EvaluatorConfig::new("production"));
/// ```
pub struct Evaluator<'a> {
    config: EvaluatorConfig<'a>,
}

impl<'a> Evaluator<'a> {
    /// Create a new `Evaluator` using the specified configuration.
    ///
    /// ```
    /// # use feature_rules::{EvaluatorConfig, Evaluator};
    /// let evaluator = Evaluator::new(EvaluatorConfig::new("production"));
    /// ```
    pub fn new(config: EvaluatorConfig<'a>) -> Self {
        Evaluator { config }
    }

    /// Store holding the configuration snapshot used for evaluation.
    pub fn configuration_store(&self) -> &Arc<ConfigurationStore> {
        &self.config.configuration_store
    }

    /// Replace the configuration snapshot. Evaluations in flight finish with the old one.
    pub fn set_configuration(&self, configuration: Configuration) {
        self.config.configuration_store.set_configuration(configuration);
    }

    /// Replace the configuration snapshot unless the current one was published later. Returns
    /// whether `configuration` was installed. See
    /// [`ConfigurationStore::set_configuration_if_newer`].
    pub fn update_configuration(&self, configuration: Configuration) -> bool {
        self.config
            .configuration_store
            .set_configuration_if_newer(configuration)
    }

    /// Evaluate a feature for a unit. If the unit gets bucketed into an experiment, the exposure is
    /// passed to the exposure logger.
    ///
    /// Before a configuration is set, every feature evaluates to
    /// [`FeatureValue::Null`](crate::FeatureValue::Null).
    pub fn evaluate_feature(&self, feature_key: &str, attributes: &Attributes) -> FeatureResult {
        let Some(configuration) = self.config.configuration_store.get_configuration() else {
            log::warn!(target: "feature_rules",
                       feature_key;
                       "evaluating a feature before configuration has been set");
            return FeatureResult::default_value(feature::FeatureValue::Null);
        };

        let now = Utc::now();
        let result = feature::evaluate_feature(
            &configuration,
            &self.config.environment,
            feature_key,
            attributes,
            self.config.sticky_bucket_store.as_deref(),
            now,
        );
        self.log_exposure(feature_key, &result, now);
        result
    }

    /// Same as [`Evaluator::evaluate_feature`] but additionally reports what happened to each rule.
    pub fn evaluate_feature_details(
        &self,
        feature_key: &str,
        attributes: &Attributes,
    ) -> (FeatureResult, EvaluationDetails) {
        let now = Utc::now();
        let Some(configuration) = self.config.configuration_store.get_configuration() else {
            log::warn!(target: "feature_rules",
                       feature_key;
                       "evaluating a feature before configuration has been set");
            return feature::missing_configuration(feature_key, &self.config.environment, now);
        };

        let (result, details) = feature::evaluate_feature_details(
            &configuration,
            &self.config.environment,
            feature_key,
            attributes,
            self.config.sticky_bucket_store.as_deref(),
            now,
        );
        self.log_exposure(feature_key, &result, now);
        (result, details)
    }

    /// Evaluate every feature of the current configuration. Exposures are logged for each feature
    /// that bucketed the unit into an experiment.
    pub fn evaluate_all(&self, attributes: &Attributes) -> HashMap<String, FeatureResult> {
        let Some(configuration) = self.config.configuration_store.get_configuration() else {
            log::warn!(target: "feature_rules",
                       "evaluating features before configuration has been set");
            return HashMap::new();
        };

        let now = Utc::now();
        configuration
            .features
            .keys()
            .map(|feature_key| {
                let result = feature::evaluate_feature(
                    &configuration,
                    &self.config.environment,
                    feature_key,
                    attributes,
                    self.config.sticky_bucket_store.as_deref(),
                    now,
                );
                self.log_exposure(feature_key, &result, now);
                (feature_key.clone(), result)
            })
            .collect()
    }

    /// Return `true` if the feature evaluates to a truthy value.
    pub fn is_on(&self, feature_key: &str, attributes: &Attributes) -> bool {
        self.evaluate_feature(feature_key, attributes).is_on()
    }

    fn log_exposure(&self, feature_key: &str, result: &FeatureResult, now: chrono::DateTime<Utc>) {
        let Some(experiment) = &result.experiment_result else {
            return;
        };

        let event = ExposureEvent::new(
            feature_key,
            result.rule_id.clone(),
            experiment.clone(),
            now,
            EventMetaData::from(&self.config.sdk_metadata),
        );
        log::trace!(target: "feature_rules",
                    event:serde;
                    "logging exposure");
        self.config.exposure_logger.log_exposure(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use crate::{
        feature::{EvaluationSource, FeatureEvaluationCode},
        Attributes, Configuration, EvaluatorConfig, ExposureEvent, FeatureValue,
        InMemoryStickyBucketStore, SdkMetadata,
    };

    fn configuration() -> Configuration {
        serde_json::from_value(json!({
            "features": {
                "dark-mode": {
                    "valueType": "boolean",
                    "defaultValue": false,
                    "environmentSettings": {
                        "production": {"enabled": true, "rules": [
                            {"type": "force", "condition": {"beta": true}, "value": true}
                        ]}
                    }
                },
                "pricing": {
                    "valueType": "string",
                    "defaultValue": "standard",
                    "environmentSettings": {
                        "production": {"enabled": true, "rules": [{
                            "type": "experiment",
                            "id": "pricing-exp",
                            "trackingKey": "pricing",
                            "values": [
                                {"value": "standard", "weight": 0.5, "name": "Control"},
                                {"value": "discount", "weight": 0.5, "name": "Discount"}
                            ]
                        }]}
                    }
                }
            }
        }))
        .unwrap()
    }

    fn attributes(value: serde_json::Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn returns_null_without_configuration() {
        let evaluator = EvaluatorConfig::new("production").to_evaluator();

        let result = evaluator.evaluate_feature("dark-mode", &Attributes::new());
        assert_eq!(result.value, FeatureValue::Null);
        assert_eq!(result.source, EvaluationSource::DefaultValue);

        let (_, details) = evaluator.evaluate_feature_details("dark-mode", &Attributes::new());
        assert_eq!(details.feature_evaluation_code, FeatureEvaluationCode::ConfigurationMissing);
        assert!(details.rules.is_empty());

        assert!(evaluator.evaluate_all(&Attributes::new()).is_empty());
    }

    #[test]
    fn evaluates_current_configuration() {
        let evaluator = EvaluatorConfig::new("production").to_evaluator();
        evaluator.set_configuration(configuration());

        assert!(evaluator.is_on("dark-mode", &attributes(json!({"beta": true}))));
        assert!(!evaluator.is_on("dark-mode", &attributes(json!({"beta": false}))));

        let all = evaluator.evaluate_all(&attributes(json!({"id": "alice", "beta": true})));
        assert_eq!(all.len(), 2);
        assert!(all["dark-mode"].is_on());
        assert_eq!(all["pricing"].source, EvaluationSource::Experiment);
    }

    #[test]
    fn logs_exposures() {
        let events = Arc::new(Mutex::new(Vec::<ExposureEvent>::new()));
        let evaluator = {
            let events = events.clone();
            EvaluatorConfig::new("production")
                .exposure_logger(move |event: ExposureEvent| events.lock().unwrap().push(event))
                .sdk_metadata(SdkMetadata {
                    name: "test",
                    version: "0.0.1",
                })
                .to_evaluator()
        };
        evaluator.set_configuration(configuration());

        evaluator.evaluate_feature("dark-mode", &attributes(json!({"id": "alice", "beta": true})));
        assert!(events.lock().unwrap().is_empty());

        let result = evaluator.evaluate_feature("pricing", &attributes(json!({"id": "alice"})));
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.feature_key, "pricing");
        assert_eq!(event.rule_id.as_deref(), Some("pricing-exp"));
        assert_eq!(event.experiment_key, "pricing");
        assert_eq!(event.hash_value, "alice");
        assert_eq!(event.meta_data.sdk_name, "test");
        assert_eq!(
            Some(&event.variation_id),
            result.experiment_result.as_ref().map(|it| &it.variation_id)
        );
    }

    #[test]
    fn sticky_bucket_store_is_used() {
        let store = Arc::new(InMemoryStickyBucketStore::new());
        let evaluator = EvaluatorConfig::new("production")
            .sticky_bucket_store(store.clone())
            .to_evaluator();
        evaluator.set_configuration(configuration());

        let first = evaluator.evaluate_feature("pricing", &attributes(json!({"id": "alice"})));
        assert_eq!(store.len(), 1);

        let second = evaluator.evaluate_feature("pricing", &attributes(json!({"id": "alice"})));
        assert_eq!(first.value, second.value);
        assert!(second.experiment_result.unwrap().sticky_bucket_used);
    }

    #[test]
    fn stale_configuration_does_not_replace_newer() {
        let evaluator = EvaluatorConfig::new("production").to_evaluator();
        let mut newer = configuration();
        newer.created_at = "2026-05-02T00:00:00Z".parse().ok();
        let mut older = Configuration::from_json(r#"{"features": {}}"#).unwrap();
        older.created_at = "2026-05-01T00:00:00Z".parse().ok();

        assert!(evaluator.update_configuration(newer));
        assert!(!evaluator.update_configuration(older));
        assert!(evaluator.is_on("dark-mode", &attributes(json!({"beta": true}))));
    }

    #[test]
    fn shares_configuration_store() {
        let store = Arc::new(crate::ConfigurationStore::new());
        let evaluator = EvaluatorConfig::new("production")
            .configuration_store(store.clone())
            .to_evaluator();

        store.set_configuration(configuration());
        assert!(evaluator.is_on("dark-mode", &attributes(json!({"beta": true}))));
        assert!(Arc::ptr_eq(evaluator.configuration_store(), &store));
    }
}
