//! Round-robin rotation over the rating provider's API keys with per-key
//! daily usage and error budgets.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

/// How a request made with a key ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Success,
    /// The provider answered without a match. Counts against the quota and
    /// the error budget.
    NoMatch,
    /// The provider said the key's quota is spent
    QuotaExceeded,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyUsage {
    day: NaiveDate,
    used: u32,
    errors: u32,
    exhausted: bool,
}

impl KeyUsage {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            day,
            used: 0,
            errors: 0,
            exhausted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyStatus {
    /// 1-based position in the rotation
    pub index: usize,
    /// First characters of the key only
    pub key_hint: String,
    pub used: u32,
    pub remaining: u32,
    pub errors: u32,
    pub exhausted: bool,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub total_keys: usize,
    pub total_remaining: u32,
    pub keys: Vec<KeyStatus>,
}

fn key_hint(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{}****", visible)
}

#[derive(Debug)]
pub struct KeyPool {
    keys: Vec<String>,
    usage: Vec<KeyUsage>,
    cursor: usize,
    daily_limit: u32,
    error_limit: u32,
}

impl KeyPool {
    pub fn new(keys: Vec<String>, daily_limit: u32, error_limit: u32, today: NaiveDate) -> Self {
        let usage = keys.iter().map(|_| KeyUsage::fresh(today)).collect();
        info!(keys = keys.len(), daily_limit, error_limit, "Rating key pool loaded");
        Self {
            keys,
            usage,
            cursor: 0,
            daily_limit,
            error_limit,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Counters belong to one UTC day; a key seen on a new day starts over
    fn roll_over(&mut self, today: NaiveDate) {
        for usage in &mut self.usage {
            if usage.day != today {
                *usage = KeyUsage::fresh(today);
            }
        }
    }

    fn is_eligible(&self, index: usize) -> bool {
        let usage = &self.usage[index];
        !usage.exhausted && usage.used < self.daily_limit && usage.errors < self.error_limit
    }

    /// The next eligible key at or after the cursor, as (index, key)
    pub fn select(&mut self, today: NaiveDate) -> Option<(usize, String)> {
        if self.is_empty() {
            warn!("No rating keys configured");
            return None;
        }
        self.roll_over(today);
        let count = self.keys.len();
        for offset in 0..count {
            let index = (self.cursor + offset) % count;
            if self.is_eligible(index) {
                self.cursor = index;
                return Some((index, self.keys[index].clone()));
            }
        }
        warn!(keys = count, "No rating key has capacity left");
        None
    }

    /// Books a finished request against the key and moves the cursor past
    /// it, whatever the outcome
    pub fn record(&mut self, index: usize, outcome: KeyOutcome, today: NaiveDate) {
        self.roll_over(today);
        let Some(usage) = self.usage.get_mut(index) else {
            return;
        };
        usage.used += 1;
        match outcome {
            KeyOutcome::Success => {}
            KeyOutcome::NoMatch => usage.errors += 1,
            KeyOutcome::QuotaExceeded => {
                usage.errors += 1;
                usage.exhausted = true;
                warn!(key = %key_hint(&self.keys[index]), "Rating key reached its daily limit");
            }
            KeyOutcome::Failure => usage.errors += 1,
        }
        self.cursor = (index + 1) % self.keys.len();
    }

    pub fn status(&mut self, today: NaiveDate) -> ProviderStatus {
        self.roll_over(today);
        let keys: Vec<KeyStatus> = self
            .keys
            .iter()
            .zip(&self.usage)
            .enumerate()
            .map(|(index, (key, usage))| KeyStatus {
                index: index + 1,
                key_hint: key_hint(key),
                used: usage.used,
                remaining: if usage.exhausted {
                    0
                } else {
                    self.daily_limit.saturating_sub(usage.used)
                },
                errors: usage.errors,
                exhausted: usage.exhausted,
                is_current: index == self.cursor,
            })
            .collect();

        ProviderStatus {
            total_keys: keys.len(),
            total_remaining: keys.iter().map(|k| k.remaining).sum(),
            keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn pool(keys: &[&str]) -> KeyPool {
        KeyPool::new(keys.iter().map(|k| k.to_string()).collect(), 1000, 10, day(1))
    }

    fn use_key(pool: &mut KeyPool, outcome: KeyOutcome, today: NaiveDate) -> Option<String> {
        let (index, key) = pool.select(today)?;
        pool.record(index, outcome, today);
        Some(key)
    }

    #[test]
    fn test_rotation_is_round_robin() {
        let mut pool = pool(&["a", "b", "c"]);
        let used: Vec<String> = (0..7)
            .filter_map(|_| use_key(&mut pool, KeyOutcome::Success, day(1)))
            .collect();
        assert_eq!(used, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn test_every_key_used_before_any_reuse() {
        let mut pool = pool(&["a", "b", "c", "d"]);
        let used: Vec<String> = (0..11)
            .filter_map(|_| use_key(&mut pool, KeyOutcome::Failure, day(1)))
            .collect();
        for key in ["a", "b", "c", "d"] {
            assert!(used.iter().filter(|k| k.as_str() == key).count() >= 11 / 4);
        }
        let first_round: std::collections::HashSet<_> = used[..4].iter().collect();
        assert_eq!(first_round.len(), 4);
    }

    #[test]
    fn test_quota_exhausts_key_until_next_day() {
        let mut pool = pool(&["a", "b"]);
        assert_eq!(use_key(&mut pool, KeyOutcome::QuotaExceeded, day(1)).as_deref(), Some("a"));

        let used: Vec<String> = (0..3)
            .filter_map(|_| use_key(&mut pool, KeyOutcome::Success, day(1)))
            .collect();
        assert_eq!(used, vec!["b", "b", "b"]);

        let status = pool.status(day(1));
        assert!(status.keys[0].exhausted);
        assert_eq!(status.keys[0].remaining, 0);
        assert_eq!(status.keys[1].remaining, 997);
        assert_eq!(status.total_remaining, 997);

        // New UTC day: the key is back
        assert_eq!(use_key(&mut pool, KeyOutcome::Success, day(2)).as_deref(), Some("a"));
        let status = pool.status(day(2));
        assert!(!status.keys[0].exhausted);
        assert_eq!(status.keys[0].used, 1);
        assert_eq!(status.keys[1].used, 0);
    }

    #[test]
    fn test_usage_and_error_caps() {
        let mut pool = KeyPool::new(vec!["a".to_string()], 3, 2, day(1));
        for _ in 0..3 {
            assert!(use_key(&mut pool, KeyOutcome::Success, day(1)).is_some());
        }
        assert!(pool.select(day(1)).is_none());

        let mut pool = KeyPool::new(vec!["a".to_string()], 1000, 2, day(1));
        assert!(use_key(&mut pool, KeyOutcome::Failure, day(1)).is_some());
        assert!(use_key(&mut pool, KeyOutcome::Failure, day(1)).is_some());
        assert!(pool.select(day(1)).is_none());
        assert_eq!(pool.status(day(1)).keys[0].errors, 2);
    }

    #[test]
    fn test_no_match_spends_error_budget() {
        let mut pool = KeyPool::new(vec!["a".to_string(), "b".to_string()], 1000, 10, day(1));
        for _ in 0..12 {
            assert!(use_key(&mut pool, KeyOutcome::NoMatch, day(1)).is_some());
        }
        let status = pool.status(day(1));
        assert_eq!(status.keys[0].used, 6);
        assert_eq!(status.keys[0].errors, 6);
        assert!(!status.keys[0].exhausted);

        // Ten misses retire a key for the day
        for _ in 0..8 {
            assert!(use_key(&mut pool, KeyOutcome::NoMatch, day(1)).is_some());
        }
        assert!(pool.select(day(1)).is_none());
        assert_eq!(pool.status(day(2)).keys[1].errors, 0);
    }

    #[test]
    fn test_empty_pool_has_no_capacity() {
        let mut pool = pool(&[]);
        assert!(pool.is_empty());
        assert!(pool.select(day(1)).is_none());
        assert_eq!(pool.status(day(1)).total_remaining, 0);
    }

    #[test]
    fn test_status_hides_keys() {
        let mut pool = pool(&["abcdef123"]);
        let status = pool.status(day(1));
        assert_eq!(status.keys[0].key_hint, "abcd****");
        assert!(status.keys[0].is_current);
    }
}
