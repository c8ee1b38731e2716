use std::sync::{Arc, PoisonError, RwLock};

use crate::Configuration;

/// Holds the configuration snapshot evaluations read from.
///
/// Snapshots are swapped as a whole and never edited in place. A reader clones the `Arc` of the
/// snapshot that is current when it asks and keeps evaluating against it, even if a newer one is
/// installed in the meantime. The lock is only held for the pointer swap.
#[derive(Debug, Default)]
pub struct ConfigurationStore {
    current: RwLock<Option<Arc<Configuration>>>,
}

impl ConfigurationStore {
    /// Create a store with no snapshot. Evaluations serve `null` until one is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current snapshot, if any has been set.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        // The slot only ever holds a complete snapshot, so a writer that panicked mid-swap can't
        // leave it half-written and a poisoned lock is safe to read through.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `configuration` unconditionally, returning the snapshot it replaced.
    pub fn set_configuration(&self, configuration: Configuration) -> Option<Arc<Configuration>> {
        let snapshot = Arc::new(configuration);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.replace(snapshot)
    }

    /// Install `configuration` unless the current snapshot was published after it.
    ///
    /// Use this when snapshots can arrive out of order (e.g., several publishers, or retries racing
    /// a fresh download). Snapshots without `createdAt` are always installed. Returns whether the
    /// snapshot was installed.
    pub fn set_configuration_if_newer(&self, configuration: Configuration) -> bool {
        let snapshot = Arc::new(configuration);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);

        let stale = match (current.as_ref().and_then(|c| c.created_at), snapshot.created_at) {
            (Some(installed), Some(candidate)) => candidate < installed,
            _ => false,
        };
        if stale {
            log::debug!(target: "feature_rules",
                        created_at:serde = snapshot.created_at;
                        "ignoring configuration older than the installed one");
            return false;
        }

        *current = Some(snapshot);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use chrono::{TimeZone, Utc};

    use super::ConfigurationStore;
    use crate::{feature::Timestamp, Configuration};

    fn configuration(created_at: Option<Timestamp>) -> Configuration {
        Configuration {
            created_at,
            features: HashMap::new(),
            saved_groups: HashMap::new(),
            experiments: HashMap::new(),
        }
    }

    fn day(day: u32) -> Option<Timestamp> {
        Some(Utc.with_ymd_and_hms(2026, 5, day, 0, 0, 0).unwrap())
    }

    #[test]
    fn snapshot_set_from_another_thread_is_visible() {
        let store = Arc::new(ConfigurationStore::new());
        assert!(store.get_configuration().is_none());

        std::thread::scope(|scope| {
            scope.spawn(|| store.set_configuration(configuration(day(1))));
        });

        assert_eq!(store.get_configuration().unwrap().created_at, day(1));
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let store = ConfigurationStore::new();
        assert!(store.set_configuration(configuration(None)).is_none());
        let snapshot = store.get_configuration().unwrap();

        let previous = store.set_configuration(configuration(None)).unwrap();
        assert!(Arc::ptr_eq(&snapshot, &previous));
        assert!(!Arc::ptr_eq(&snapshot, &store.get_configuration().unwrap()));
    }

    #[test]
    fn out_of_order_snapshots_are_ignored() {
        let store = ConfigurationStore::new();
        assert!(store.set_configuration_if_newer(configuration(day(2))));
        assert!(!store.set_configuration_if_newer(configuration(day(1))));
        assert_eq!(store.get_configuration().unwrap().created_at, day(2));

        assert!(store.set_configuration_if_newer(configuration(day(2))));
        assert!(store.set_configuration_if_newer(configuration(day(3))));
        assert!(store.set_configuration_if_newer(configuration(None)));
        assert_eq!(store.get_configuration().unwrap().created_at, None);

        // Unconditional set still wins.
        store.set_configuration(configuration(day(1)));
        assert_eq!(store.get_configuration().unwrap().created_at, day(1));
    }
}
