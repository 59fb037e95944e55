use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutexes keyed by canonical group label.
///
/// Serializes "compute label, check existing, mutate" across concurrent
/// tagging and merging. Multi-key acquisition always proceeds in sorted key
/// order, so two holders of overlapping key sets cannot deadlock.
#[derive(Debug, Default)]
pub struct GroupLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Guards held for a set of labels. Dropping releases all of them.
#[derive(Debug)]
pub struct LabelGuards {
    keys: BTreeSet<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LabelGuards {
    pub fn holds(&self, label: &str) -> bool {
        self.keys.contains(label)
    }
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.entry(key).lock_owned().await
    }

    pub async fn lock_many(&self, keys: &BTreeSet<String>) -> LabelGuards {
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.entry(key).lock_owned().await);
        }
        LabelGuards {
            keys: keys.clone(),
            _guards: guards,
        }
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(GroupLocks::new());
        let guard = locks.lock("dup-2v-aaaa").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("dup-2v-aaaa").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = GroupLocks::new();
        let _a = locks.lock("dup-2v-aaaa").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("dup-2v-bbbb")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_overlapping_sets_do_not_deadlock() {
        let locks = Arc::new(GroupLocks::new());
        let first: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        let second: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();

        let mut tasks = Vec::new();
        for round in 0..20 {
            let locks = locks.clone();
            let keys = if round % 2 == 0 {
                first.clone()
            } else {
                second.clone()
            };
            tasks.push(tokio::spawn(async move {
                let guards = locks.lock_many(&keys).await;
                assert!(guards.holds("a"));
                tokio::task::yield_now().await;
            }));
        }

        for task in tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_prune_keeps_held_entries() {
        let locks = GroupLocks::new();
        let held = locks.lock("held").await;
        drop(locks.lock("released").await);
        assert_eq!(locks.len(), 2);

        locks.prune();
        assert_eq!(locks.len(), 1);

        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
