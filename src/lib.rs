//! A deterministic evaluation engine for feature flags, percentage rollouts and experiments.
//!
//! # Overview
//!
//! A [`Configuration`] is an immutable snapshot of everything the engine needs: feature
//! definitions with their per-environment rule lists, saved groups and externally defined
//! experiments. It is produced by whatever system publishes feature definitions and consumed here
//! unmodified.
//!
//! Evaluation of a feature for a unit (usually a user, identified by its attributes) walks the
//! rules of the active environment in order and returns the first value a rule produces, or the
//! default value. When the matching rule is an experiment, the result additionally carries an
//! [`ExperimentResult`] describing the assigned variation. The same inputs always produce the same
//! output: bucketing relies on a versioned hash (see [`sharder`]) that is stable across processes
//! and languages.
//!
//! [`feature::evaluate_feature`] is a pure function over an explicit snapshot. [`Evaluator`] is a
//! convenience wrapper that reads the current snapshot from a [`ConfigurationStore`], forwards
//! exposures to an [`ExposureLogger`] and optionally keeps assignments sticky through a
//! [`StickyBucketStore`].
//!
//! # Error Handling
//!
//! Evaluation never fails. Malformed conditions, missing hash attributes, cyclic prerequisites and
//! unknown rule types all cause the affected rule to be skipped. Use
//! [`Evaluator::evaluate_feature_details`] to find out why a rule did not match.
//!
//! Loading a configuration can fail and returns [`Error`].
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with structured key-value
//! records under the `feature_rules` target. Configuration defects are logged at `warn` level.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod feature;
pub mod sharder;

mod attributes;
mod condition;
mod config;
mod configuration;
mod configuration_store;
mod error;
mod evaluator;
mod events;
mod saved_group;
mod sticky_bucket;

pub use attributes::{AttributeValue, Attributes};
pub use condition::Condition;
pub use config::{EvaluatorConfig, SdkMetadata};
pub use configuration::{Configuration, TryParse};
pub use configuration_store::ConfigurationStore;
pub use error::{Error, Result};
pub use evaluator::Evaluator;
pub use events::{EventMetaData, ExposureEvent, ExposureLogger};
pub use feature::{EvaluationSource, ExperimentResult, FeatureResult, FeatureValue};
pub use saved_group::{MatchType, SavedGroup, SavedGroupTargeting};
pub use sticky_bucket::{
    InMemoryStickyBucketStore, StickyBucketKey, StickyBucketStore, StickyBucketStoreError,
};
