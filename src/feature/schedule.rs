use super::{ScheduleRule, Timestamp};

/// Return `true` if a rule with the given schedule is active at `now`.
///
/// Entries are ordered by timestamp (stable, so equal timestamps keep their declared order, and
/// entries without a timestamp come first). The last entry whose timestamp is not after `now`
/// decides. An empty schedule is always active; a schedule whose entries all lie in the future is
/// inactive.
pub(super) fn is_active(schedule_rules: &[ScheduleRule], now: Timestamp) -> bool {
    if schedule_rules.is_empty() {
        return true;
    }

    let mut entries: Vec<&ScheduleRule> = schedule_rules.iter().collect();
    entries.sort_by_key(|entry| entry.timestamp);

    entries
        .iter()
        .rev()
        .find(|entry| entry.timestamp.map_or(true, |t| t <= now))
        .is_some_and(|entry| entry.enabled)
}
