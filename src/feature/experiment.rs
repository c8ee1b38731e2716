use crate::{
    attributes::{get_path, to_hash_value},
    sharder::{bucket_ranges, choose_variation, HashVersion, Sharder},
    sticky_bucket::{StickyBucketKey, StickyBucketStore},
    Attributes,
};

use super::{eval_details::EvaluationCode, BucketingSettings, ExperimentResult, Namespace};

/// Everything needed to assign a unit to one of the variations of an experiment-like rule.
pub(super) struct Bucketing<'a> {
    pub experiment_key: &'a str,
    pub seed: &'a str,
    pub coverage: f64,
    /// One weight per variation.
    pub weights: &'a [f64],
    pub variation_ids: &'a [String],
    pub variation_names: &'a [String],
    pub namespace: Option<&'a Namespace>,
    pub settings: &'a BucketingSettings,
}

/// Variation a unit has been assigned to.
pub(super) struct Assignment {
    pub index: usize,
    pub result: ExperimentResult,
}

impl Bucketing<'_> {
    /// Assign a unit to a variation.
    ///
    /// Order of checks: hash attribute, namespace, sticky-bucket store, hash ranges. A variation
    /// found in the sticky-bucket store bypasses coverage and weights, so a unit keeps its
    /// variation when traffic is reallocated. A unit first bucketed on the fallback attribute keeps
    /// that assignment once its primary attribute shows up. Store failures are logged and
    /// evaluation falls back to hashing.
    pub fn assign(
        &self,
        attributes: &Attributes,
        sharder: &impl Sharder,
        sticky_bucket_store: Option<&dyn StickyBucketStore>,
    ) -> Result<Assignment, EvaluationCode> {
        let sticky_bucket_store =
            sticky_bucket_store.filter(|_| !self.settings.disable_sticky_bucketing);

        let (hash_attribute, hash_value) = self
            .hash_attribute(attributes, sticky_bucket_store.is_some())
            .ok_or(EvaluationCode::HashAttributeMissing)?;

        if let Some(namespace) = self.namespace.filter(|ns| ns.enabled) {
            if !in_namespace(namespace, &hash_value, sharder) {
                return Err(EvaluationCode::NamespaceMiss);
            }
        }

        let sticky_key = self.sticky_key(hash_attribute, &hash_value);

        if let Some(store) = sticky_bucket_store {
            let fallback_key = self.fallback_sticky_key(attributes, hash_attribute);
            if let Some((index, from_fallback)) =
                self.lookup_sticky(store, &sticky_key, fallback_key.as_ref())
            {
                if from_fallback {
                    // Move the assignment over to the primary attribute, so that it outlives
                    // the fallback value.
                    self.persist(store, &sticky_key, index);
                }
                return Ok(self.assignment(index, hash_attribute, hash_value, None, true));
            }
        }

        let weight_sum: f64 = self.weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
        if weight_sum > 1.0 + 1e-9 {
            log::warn!(target: "feature_rules",
                       experiment_key = self.experiment_key,
                       weight_sum;
                       "experiment weights sum to more than 1, truncating");
        }

        let h = sharder.hash(self.seed, &hash_value, self.settings.hash_version);
        let ranges = bucket_ranges(self.weights, self.coverage);
        let index = choose_variation(h, &ranges)
            .filter(|&i| i < self.variation_ids.len())
            .ok_or(EvaluationCode::TrafficMiss)?;

        if let Some(store) = sticky_bucket_store {
            self.persist(store, &sticky_key, index);
        }

        Ok(self.assignment(index, hash_attribute, hash_value, Some(h), false))
    }

    /// Resolve the attribute identifying the unit. The fallback attribute is only used when sticky
    /// bucketing is active: without a store, hashing on a fallback would let a unit change
    /// variation as soon as the primary attribute becomes available.
    fn hash_attribute<'b>(
        &'b self,
        attributes: &Attributes,
        sticky: bool,
    ) -> Option<(&'b str, String)> {
        let primary = self.settings.hash_attribute.as_str();
        if let Some(value) = get_path(attributes, primary).and_then(to_hash_value) {
            return Some((primary, value));
        }

        let fallback = self.settings.fallback_attribute.as_deref().filter(|_| sticky)?;
        let value = get_path(attributes, fallback).and_then(to_hash_value)?;
        Some((fallback, value))
    }

    fn sticky_key(&self, attribute_key: &str, attribute_value: &str) -> StickyBucketKey {
        StickyBucketKey {
            attribute_key: attribute_key.to_owned(),
            attribute_value: attribute_value.to_owned(),
            experiment_key: self.experiment_key.to_owned(),
            bucket_version: self.settings.bucket_version,
        }
    }

    /// Key of the assignment a unit got before its primary attribute was known. `None` if the unit
    /// is already identified by the fallback attribute or has no fallback value.
    fn fallback_sticky_key(
        &self,
        attributes: &Attributes,
        hash_attribute: &str,
    ) -> Option<StickyBucketKey> {
        let fallback = self
            .settings
            .fallback_attribute
            .as_deref()
            .filter(|fallback| *fallback != hash_attribute)?;
        let value = get_path(attributes, fallback).and_then(to_hash_value)?;
        Some(self.sticky_key(fallback, &value))
    }

    /// Look up a stored assignment, first under the attribute identifying the unit, then under the
    /// fallback attribute. Returns the variation index and whether it was found under the fallback.
    fn lookup_sticky(
        &self,
        store: &dyn StickyBucketStore,
        key: &StickyBucketKey,
        fallback_key: Option<&StickyBucketKey>,
    ) -> Option<(usize, bool)> {
        if self.settings.bucket_version < self.settings.min_bucket_version {
            return None;
        }

        if let Some(index) = self.read_sticky(store, key) {
            return Some((index, false));
        }
        fallback_key
            .and_then(|fallback_key| self.read_sticky(store, fallback_key))
            .map(|index| (index, true))
    }

    fn read_sticky(&self, store: &dyn StickyBucketStore, key: &StickyBucketKey) -> Option<usize> {
        let variation_id = match store.get(key) {
            Ok(variation_id) => variation_id?,
            Err(err) => {
                log::warn!(target: "feature_rules",
                           experiment_key = self.experiment_key;
                           "failed to read sticky bucket assignment: {err}");
                return None;
            }
        };

        let index = self.variation_ids.iter().position(|id| *id == variation_id);
        if index.is_none() {
            log::debug!(target: "feature_rules",
                        experiment_key = self.experiment_key,
                        variation_id = variation_id.as_str();
                        "ignoring sticky bucket assignment to a variation that no longer exists");
        }
        index
    }

    fn persist(&self, store: &dyn StickyBucketStore, key: &StickyBucketKey, index: usize) {
        if let Err(err) = store.put(key, &self.variation_ids[index]) {
            log::warn!(target: "feature_rules",
                       experiment_key = self.experiment_key;
                       "failed to persist sticky bucket assignment: {err}");
        }
    }

    fn assignment(
        &self,
        index: usize,
        hash_attribute: &str,
        hash_value: String,
        bucket: Option<f64>,
        sticky_bucket_used: bool,
    ) -> Assignment {
        Assignment {
            index,
            result: ExperimentResult {
                experiment_key: self.experiment_key.to_owned(),
                variation_id: self.variation_ids[index].clone(),
                variation_name: self.variation_names.get(index).cloned().unwrap_or_default(),
                hash_attribute: hash_attribute.to_owned(),
                hash_value,
                bucket,
                sticky_bucket_used,
            },
        }
    }
}

/// Namespace membership is decided by a separate hash of the unit, so experiments sharing a
/// namespace with disjoint ranges never share units.
fn in_namespace(namespace: &Namespace, hash_value: &str, sharder: &impl Sharder) -> bool {
    let n = sharder.hash(&format!("__{}", namespace.id), hash_value, HashVersion::V1);
    let (lo, hi) = namespace.range;
    lo <= n && n < hi
}
