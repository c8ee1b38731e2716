use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    feature::{Experiment, Feature, Timestamp},
    saved_group::SavedGroups,
    Result,
};

/// Immutable snapshot of feature definitions that evaluation reads from.
///
/// A snapshot is never mutated after it's created. To pick up new definitions, build a new
/// `Configuration` and swap it in through [`ConfigurationStore`](crate::ConfigurationStore);
/// evaluations in flight keep using the snapshot they started with.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// When the snapshot was published, if known.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    /// Features keyed by feature key.
    ///
    /// Value is wrapped in `TryParse` so that if we fail to parse one feature (e.g., new server
    /// format), we can still serve other features.
    pub features: HashMap<String, TryParse<Feature>>,
    /// Saved groups referenced by rules.
    #[serde(default)]
    pub saved_groups: SavedGroups,
    /// Experiments referenced by `experiment-ref` rules, keyed by experiment id.
    #[serde(default)]
    pub experiments: HashMap<String, TryParse<Experiment>>,
}

impl Configuration {
    /// Parse a configuration from its JSON representation.
    pub fn from_json(json: impl AsRef<[u8]>) -> Result<Configuration> {
        let configuration = serde_json::from_slice(json.as_ref())?;
        Ok(configuration)
    }

    /// Get a set of all feature keys. Note that this includes features that failed to parse.
    pub fn feature_keys(&self) -> HashSet<String> {
        self.features.keys().cloned().collect()
    }

    pub(crate) fn get_feature(&self, feature_key: &str) -> Option<&TryParse<Feature>> {
        self.features.get(feature_key)
    }

    pub(crate) fn get_experiment(&self, experiment_id: &str) -> Option<&Experiment> {
        self.experiments
            .get(experiment_id)
            .and_then(TryParse::parsed)
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
///
/// This can be helpful to isolate errors in a subtree. e.g., if configuration for one feature
/// parses, the rest of the features are still usable.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> TryParse<T> {
    /// Reference to the parsed value, if parsing succeeded.
    pub fn parsed(&self) -> Option<&T> {
        match self {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl<T> From<T> for TryParse<T> {
    fn from(value: T) -> TryParse<T> {
        TryParse::Parsed(value)
    }
}
