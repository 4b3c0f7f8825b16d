//! Event counters, enabled with [`Config::counters`](crate::config::Config).
//!
//! Counters are kept per thread, like the rest of evaluation state.

use std::cell::RefCell;
use std::collections::BTreeMap;

thread_local! {
    static COUNTERS: RefCell<BTreeMap<&'static str, u64>> = const { RefCell::new(BTreeMap::new()) };
}

/// Add one to counter `name` if counters are enabled
pub fn increment(name: &'static str) {
    if crate::config::current().counters {
        COUNTERS.with(|c| *c.borrow_mut().entry(name).or_insert(0) += 1);
    }
}

/// Current value of counter `name`
#[must_use]
pub fn get(name: &str) -> u64 {
    COUNTERS.with(|c| c.borrow().get(name).copied().unwrap_or(0))
}

/// Set all counters to zero
pub fn reset_counters() {
    COUNTERS.with(|c| c.borrow_mut().clear());
}

/// Log all counters and return them
pub fn dump_counters() -> BTreeMap<&'static str, u64> {
    let counters = COUNTERS.with(|c| c.borrow().clone());
    for (name, value) in &counters {
        log::info!("Counter {name}: {value}");
    }
    counters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_counters_stay_zero() {
        crate::config::update(|c| c.counters = false);
        reset_counters();
        increment("temporary:allocate");
        assert_eq!(get("temporary:allocate"), 0);
    }

    #[test]
    fn enabled_counters_count() {
        crate::config::update(|c| c.counters = true);
        reset_counters();
        increment("gpu:h2d");
        increment("gpu:h2d");
        assert_eq!(get("gpu:h2d"), 2);
        assert_eq!(dump_counters().get("gpu:h2d"), Some(&2));
        reset_counters();
        assert_eq!(get("gpu:h2d"), 0);
    }
}
