use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;

/// Source of unique identifiers for turns and action items.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Millisecond timestamps, bumped so that ids minted in the same millisecond
/// stay distinct and increasing.
#[derive(Debug, Default)]
pub struct TimestampIds {
    last: AtomicI64,
}

impl TimestampIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for TimestampIds {
    fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next.to_string(),
                Err(actual) => prev = actual,
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Deterministic `<prefix>-1`, `<prefix>-2`, ... ids for tests and replays.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn timestamp_ids_are_strictly_increasing() {
        let ids = TimestampIds::new();
        let minted: Vec<i64> = (0..500)
            .map(|_| ids.next_id().parse().unwrap())
            .collect();
        assert!(minted.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn random_ids_do_not_repeat() {
        let ids = RandomIds;
        let minted: HashSet<String> = (0..200).map(|_| ids.next_id()).collect();
        assert_eq!(minted.len(), 200);
    }

    #[test]
    fn sequential_ids_count_from_one() {
        let ids = SequentialIds::new("item");
        assert_eq!(ids.next_id(), "item-1");
        assert_eq!(ids.next_id(), "item-2");
    }
}
