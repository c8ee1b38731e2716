//! Persistence of experiment assignments.
use std::{collections::HashMap, sync::RwLock};

use serde::{Deserialize, Serialize};

/// Identifies a sticky assignment of one unit in one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyBucketKey {
    /// Attribute that identified the unit (e.g., `id` or `deviceId`).
    pub attribute_key: String,
    /// Value of the attribute.
    pub attribute_value: String,
    /// Tracking key of the experiment.
    pub experiment_key: String,
    /// Bucket version the assignment was made under.
    pub bucket_version: u32,
}

impl StickyBucketKey {
    /// Stable document id for stores that need a flat string key.
    ///
    /// ```
    /// # use feature_rules::StickyBucketKey;
    /// let key = StickyBucketKey {
    ///     attribute_key: "id".to_owned(),
    ///     attribute_value: "alice".to_owned(),
    ///     experiment_key: "pricing".to_owned(),
    ///     bucket_version: 0,
    /// };
    /// assert_eq!(key.digest().len(), 32);
    /// ```
    pub fn digest(&self) -> String {
        let mut ctx = md5::Context::new();
        for part in [
            self.attribute_key.as_str(),
            self.attribute_value.as_str(),
            self.experiment_key.as_str(),
        ] {
            // Length-prefixed so that ("ab", "c") and ("a", "bc") don't collide.
            ctx.consume(part.len().to_string());
            ctx.consume(":");
            ctx.consume(part);
        }
        ctx.consume(self.bucket_version.to_string());
        format!("{:x}", ctx.compute())
    }
}

/// Error returned by [`StickyBucketStore`] implementations.
///
/// The engine never propagates it: a failing store degrades evaluation to pure hash-based
/// assignment.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum StickyBucketStoreError {
    /// The backing store could not be reached.
    #[error("sticky bucket store is unavailable: {0}")]
    Unavailable(String),
    /// A stored document is not readable.
    #[error("invalid sticky bucket document: {0}")]
    InvalidDocument(String),
}

/// Storage for sticky experiment assignments.
///
/// `put` must be an idempotent upsert: concurrent first exposures of the same unit may race, and
/// since both writers computed the same hash-derived variation, last-writer-wins is fine.
/// Implementations backed by remote storage should bound their own latency, evaluation waits for
/// both calls.
pub trait StickyBucketStore: Send + Sync {
    /// Return the variation id previously stored under `key`.
    fn get(&self, key: &StickyBucketKey) -> Result<Option<String>, StickyBucketStoreError>;

    /// Store `variation_id` under `key`.
    fn put(&self, key: &StickyBucketKey, variation_id: &str) -> Result<(), StickyBucketStoreError>;
}

/// In-process [`StickyBucketStore`]. Assignments live as long as the store.
#[derive(Debug, Default)]
pub struct InMemoryStickyBucketStore {
    assignments: RwLock<HashMap<String, String>>,
}

impl InMemoryStickyBucketStore {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored assignments.
    pub fn len(&self) -> usize {
        self.assignments.read().map(|it| it.len()).unwrap_or(0)
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StickyBucketStore for InMemoryStickyBucketStore {
    fn get(&self, key: &StickyBucketKey) -> Result<Option<String>, StickyBucketStoreError> {
        let assignments = self
            .assignments
            .read()
            .map_err(|_| StickyBucketStoreError::Unavailable("lock poisoned".to_owned()))?;
        Ok(assignments.get(&key.digest()).cloned())
    }

    fn put(&self, key: &StickyBucketKey, variation_id: &str) -> Result<(), StickyBucketStoreError> {
        // Computing the digest before requesting the lock to minimize lock span.
        let digest = key.digest();
        let mut assignments = self
            .assignments
            .write()
            .map_err(|_| StickyBucketStoreError::Unavailable("lock poisoned".to_owned()))?;
        assignments.insert(digest, variation_id.to_owned());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) struct UnavailableStickyBucketStore;

#[cfg(test)]
impl StickyBucketStore for UnavailableStickyBucketStore {
    fn get(&self, _key: &StickyBucketKey) -> Result<Option<String>, StickyBucketStoreError> {
        Err(StickyBucketStoreError::Unavailable("connection refused".to_owned()))
    }

    fn put(&self, _key: &StickyBucketKey, _variation_id: &str) -> Result<(), StickyBucketStoreError> {
        Err(StickyBucketStoreError::Unavailable("connection refused".to_owned()))
    }
}
