use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-environment-name mutual exclusion.
///
/// A workflow acquires the lease for its environment name before its
/// first step and holds it until the last; concurrent jobs for the
/// same name wait instead of interleaving filesystem and database
/// operations. The guard releases the lease on drop, including on
/// failure paths.
#[derive(Clone, Default)]
pub struct LeaseMap {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl LeaseMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_serializes() {
        let leases = LeaseMap::new();
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let leases = leases.clone();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = leases.acquire("pr-1").await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_names_run_concurrently() {
        let leases = LeaseMap::new();

        let guard_a = leases.acquire("pr-1").await;

        // A different name must not block
        let acquired =
            tokio::time::timeout(Duration::from_millis(100), leases.acquire("pr-2")).await;
        assert!(acquired.is_ok());
        drop(guard_a);
    }
}
