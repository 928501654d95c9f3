// =============================================================================
// WorkerGroup — wait-group-equivalent for a market's pipeline tasks
// =============================================================================
//
// The source tracks its per-market goroutines with a sync.WaitGroup whose
// count callers can inspect ("count >= 4", "count 0"). tokio's idiomatic
// analogue is a JoinSet: spawning adds a handle, join_next() drains one.
// Wrapped in a Mutex so StopMarket can drain concurrently with new spawns
// from a racing StartMarket (the registry-level lock discipline in 4.A/4.G
// is what actually prevents that race; this wrapper only needs to be safe
// to call from multiple tasks).
// =============================================================================

use std::future::Future;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

#[derive(Default)]
pub struct WorkerGroup {
    tasks: Mutex<JoinSet<()>>,
}

impl WorkerGroup {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Register a future as a worker in this group and spawn it.
    pub async fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().await.spawn(fut);
    }

    /// Number of workers that have not yet completed.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Wait for every registered worker to finish. Idempotent: calling this
    /// again on an empty group returns immediately.
    pub async fn join_all(&self) {
        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn join_all_waits_for_every_spawned_task() {
        let group = WorkerGroup::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let counter = counter.clone();
            group
                .spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        assert_eq!(group.len().await, 4);
        group.join_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(group.len().await, 0);
    }

    #[tokio::test]
    async fn join_all_on_empty_group_returns_immediately() {
        let group = WorkerGroup::new();
        group.join_all().await;
        assert_eq!(group.len().await, 0);
    }
}
