use std::sync::Arc;

use crate::{
    events::NoopExposureLogger, ConfigurationStore, Evaluator, ExposureLogger, StickyBucketStore,
};

/// Identifies the SDK that embeds the engine. Stamped on every exposure event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkMetadata {
    /// SDK name (usually, the language).
    pub name: &'static str,
    #[allow(missing_docs)]
    pub version: &'static str,
}

/// Configuration for [`Evaluator`].
pub struct EvaluatorConfig<'a> {
    pub(crate) environment: String,
    pub(crate) configuration_store: Arc<ConfigurationStore>,
    pub(crate) exposure_logger: Box<dyn ExposureLogger + Send + Sync + 'a>,
    pub(crate) sticky_bucket_store: Option<Arc<dyn StickyBucketStore + 'a>>,
    pub(crate) sdk_metadata: SdkMetadata,
}

impl<'a> EvaluatorConfig<'a> {
    /// Create a default configuration evaluating rules of the given environment.
    ///
    /// ```
    /// # use feature_rules::EvaluatorConfig;
    /// EvaluatorConfig::new("production");
    /// ```
    pub fn new(environment: impl Into<String>) -> Self {
        EvaluatorConfig {
            environment: environment.into(),
            configuration_store: Arc::new(ConfigurationStore::new()),
            exposure_logger: Box::new(NoopExposureLogger),
            sticky_bucket_store: None,
            sdk_metadata: EvaluatorConfig::DEFAULT_SDK_METADATA,
        }
    }

    /// SDK metadata used unless overridden.
    pub const DEFAULT_SDK_METADATA: SdkMetadata = SdkMetadata {
        name: "rust",
        version: env!("CARGO_PKG_VERSION"),
    };

    /// Set exposure logger to pass experiment exposures to your data warehouse.
    ///
    /// ```
    /// # use feature_rules::{EvaluatorConfig, ExposureEvent};
    /// EvaluatorConfig::new("production").exposure_logger(|event: ExposureEvent| {
    ///   println!("{:?}", event);
    /// });
    /// ```
    pub fn exposure_logger(
        mut self,
        exposure_logger: impl ExposureLogger + Send + Sync + 'a,
    ) -> Self {
        self.exposure_logger = Box::new(exposure_logger);
        self
    }

    /// Keep experiment assignments sticky through `store`.
    pub fn sticky_bucket_store(mut self, store: Arc<dyn StickyBucketStore + 'a>) -> Self {
        self.sticky_bucket_store = Some(store);
        self
    }

    /// Share a configuration store with other components (e.g., whatever downloads
    /// configurations). By default, the evaluator creates its own, empty store.
    pub fn configuration_store(mut self, configuration_store: Arc<ConfigurationStore>) -> Self {
        self.configuration_store = configuration_store;
        self
    }

    /// Override SDK metadata stamped on exposure events.
    pub fn sdk_metadata(mut self, sdk_metadata: SdkMetadata) -> Self {
        self.sdk_metadata = sdk_metadata;
        self
    }

    /// Create a new [`Evaluator`] using the specified configuration.
    ///
    /// ```
    /// # use feature_rules::{EvaluatorConfig, Evaluator};
    /// let evaluator: Evaluator = EvaluatorConfig::new("production").to_evaluator();
    /// ```
    pub fn to_evaluator(self) -> Evaluator<'a> {
        Evaluator::new(self)
    }
}
