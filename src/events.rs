use serde::Serialize;

use crate::{
    feature::{ExperimentResult, Timestamp},
    SdkMetadata,
};

/// Exposure of a unit to an experiment variation. Forward it to your analytics pipeline to analyze
/// the experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureEvent {
    /// Feature that was evaluated.
    pub feature_key: String,
    /// Rule that bucketed the unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Tracking key of the experiment.
    pub experiment_key: String,
    /// Id of the assigned variation.
    pub variation_id: String,
    #[allow(missing_docs)]
    pub variation_name: String,
    /// Attribute that identified the unit.
    pub hash_attribute: String,
    /// Value of `hash_attribute`.
    pub hash_value: String,
    /// Hash that selected the variation. Absent for sticky assignments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<f64>,
    #[allow(missing_docs)]
    pub sticky_bucket_used: bool,
    /// When the unit was exposed.
    pub timestamp: Timestamp,
    /// SDK language and version.
    pub meta_data: EventMetaData,
}

impl ExposureEvent {
    pub(crate) fn new(
        feature_key: &str,
        rule_id: Option<String>,
        experiment: ExperimentResult,
        timestamp: Timestamp,
        meta_data: EventMetaData,
    ) -> ExposureEvent {
        ExposureEvent {
            feature_key: feature_key.to_owned(),
            rule_id,
            experiment_key: experiment.experiment_key,
            variation_id: experiment.variation_id,
            variation_name: experiment.variation_name,
            hash_attribute: experiment.hash_attribute,
            hash_value: experiment.hash_value,
            bucket: experiment.bucket,
            sticky_bucket_used: experiment.sticky_bucket_used,
            timestamp,
            meta_data,
        }
    }
}

/// SDK information attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetaData {
    #[allow(missing_docs)]
    pub sdk_name: &'static str,
    #[allow(missing_docs)]
    pub sdk_version: &'static str,
    /// Version of this crate.
    pub core_version: &'static str,
}

impl From<SdkMetadata> for EventMetaData {
    fn from(sdk: SdkMetadata) -> EventMetaData {
        (&sdk).into()
    }
}

impl From<&SdkMetadata> for EventMetaData {
    fn from(sdk: &SdkMetadata) -> EventMetaData {
        EventMetaData {
            sdk_name: sdk.name,
            sdk_version: sdk.version,
            core_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Receives exposures produced by [`Evaluator`](crate::Evaluator).
///
/// Closures taking an [`ExposureEvent`] implement this trait.
pub trait ExposureLogger {
    /// Log an exposure. Called synchronously from evaluation, so implementations should hand the
    /// event off (e.g., to a channel) rather than perform blocking I/O.
    fn log_exposure(&self, event: ExposureEvent);
}

pub(crate) struct NoopExposureLogger;

impl ExposureLogger for NoopExposureLogger {
    fn log_exposure(&self, _event: ExposureEvent) {}
}

impl<T: Fn(ExposureEvent)> ExposureLogger for T {
    fn log_exposure(&self, event: ExposureEvent) {
        self(event);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{EventMetaData, ExposureEvent};
    use crate::{feature::ExperimentResult, SdkMetadata};

    #[test]
    fn serialize_exposure() {
        let event = ExposureEvent::new(
            "checkout-button",
            Some("fr_1".to_owned()),
            ExperimentResult {
                experiment_key: "pricing".to_owned(),
                variation_id: "1".to_owned(),
                variation_name: "Treatment".to_owned(),
                hash_attribute: "id".to_owned(),
                hash_value: "alice".to_owned(),
                bucket: None,
                sticky_bucket_used: true,
            },
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            EventMetaData::from(SdkMetadata {
                name: "rust",
                version: "1.2.3",
            }),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["featureKey"], json!("checkout-button"));
        assert_eq!(value["ruleId"], json!("fr_1"));
        assert_eq!(value["variationId"], json!("1"));
        assert_eq!(value["stickyBucketUsed"], json!(true));
        assert_eq!(value["timestamp"], json!("2026-01-01T00:00:00Z"));
        assert_eq!(value["metaData"]["sdkName"], json!("rust"));
        assert_eq!(value["metaData"]["coreVersion"], json!(env!("CARGO_PKG_VERSION")));
        assert!(value.get("bucket").is_none());
    }
}
