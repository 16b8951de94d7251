use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Background work runner bounded to `max_concurrency` tasks at a time.
#[derive(Debug, Clone)]
pub struct InProcessQueue {
    semaphore: Arc<Semaphore>,
}

impl InProcessQueue {
    pub fn new(max_concurrency: usize) -> Self {
        let permits = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn spawn<F>(&self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                tracing::error!(task = %name, "queue closed; dropping task");
                return;
            };
            tracing::debug!(task = %name, "queued task started");
            fut.await;
        });
    }
}
