//! Named rate-limit counters (§4.1): `firefox` (limit 3), `tdsb_connects`
//! (limit 7), `global` (limit 10). A task's kind determines which groups it
//! counts against; all of a task's groups must have room before it runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

fn limit_for(group: &str) -> u32 {
    match group {
        "firefox" => 3,
        "tdsb_connects" => 7,
        "global" => 10,
        other => {
            tracing::warn!(group = other, "unknown rate-limit group; treating as unlimited");
            u32::MAX
        }
    }
}

pub struct RateLimitGroups {
    counts: Mutex<HashMap<&'static str, AtomicU32>>,
}

impl RateLimitGroups {
    pub fn new() -> Self {
        Self { counts: Mutex::new(HashMap::new()) }
    }

    /// Atomically checks every group has room, then increments all of them.
    /// All-or-nothing: if any group is saturated, none are incremented. The
    /// map mutex is held for the whole check-then-increment so a concurrent
    /// caller can't slip in between.
    pub fn try_acquire_all(&self, groups: &[&'static str]) -> bool {
        let mut counts = self.counts.lock();
        for group in groups {
            let current = counts.get(group).map(|c| c.load(Ordering::SeqCst)).unwrap_or(0);
            if current >= limit_for(group) {
                return false;
            }
        }
        for group in groups {
            counts.entry(*group).or_insert_with(|| AtomicU32::new(0)).fetch_add(1, Ordering::SeqCst);
        }
        true
    }

    pub fn release_all(&self, groups: &[&'static str]) {
        let counts = self.counts.lock();
        for group in groups {
            if let Some(counter) = counts.get(group) {
                counter.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_saturates_at_its_limit() {
        let groups = RateLimitGroups::new();
        for _ in 0..3 {
            assert!(groups.try_acquire_all(&["firefox"]));
        }
        assert!(!groups.try_acquire_all(&["firefox"]), "firefox limit is 3");
        groups.release_all(&["firefox"]);
        assert!(groups.try_acquire_all(&["firefox"]), "should have room after release");
    }

    #[test]
    fn acquire_is_all_or_nothing_across_groups() {
        let groups = RateLimitGroups::new();
        for _ in 0..10 {
            assert!(groups.try_acquire_all(&["global"]));
        }
        // firefox has room, but global is saturated: neither should increment.
        assert!(!groups.try_acquire_all(&["firefox", "global"]));
        groups.release_all(&["global"]);
        assert!(groups.try_acquire_all(&["firefox", "global"]));
    }

    #[test]
    fn unknown_group_name_does_not_panic() {
        let groups = RateLimitGroups::new();
        assert!(groups.try_acquire_all(&["mystery"]));
    }
}
