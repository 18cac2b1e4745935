// Bounded pool for CPU-bound model builds

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use matchup_models::MatchupError;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("build pool is closed")]
    Closed,

    #[error("build job panicked: {0}")]
    Panicked(String),

    #[error("build job was cancelled")]
    Cancelled,
}

impl From<PoolError> for MatchupError {
    fn from(err: PoolError) -> Self {
        MatchupError::BuildAborted { reason: err.to_string() }
    }
}

/// At most `capacity` jobs run at once on the blocking thread pool; the rest
/// wait for a permit in FIFO order.
#[derive(Debug, Clone)]
pub struct BuildPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl BuildPool {
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.permits.clone().acquire_owned().await.map_err(|_| PoolError::Closed)?;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(running, capacity = self.capacity, "🔧 build job started");

        let in_flight = self.in_flight.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _guard = InFlightGuard(in_flight);
            job()
        });

        match handle.await {
            Ok(value) => Ok(value),
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!(message = %message, "❌ build job panicked");
                Err(PoolError::Panicked(message))
            }
            Err(_) => Err(PoolError::Cancelled),
        }
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_job_and_returns_value() {
        let pool = BuildPool::new(2);
        assert_eq!(pool.run(|| 6 * 7).await, Ok(42));
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let pool = BuildPool::new(1);
        let result: Result<(), _> = pool.run(|| panic!("singular matrix")).await;
        assert_eq!(result, Err(PoolError::Panicked("singular matrix".to_string())));
        assert!(matches!(
            MatchupError::from(PoolError::Panicked("x".to_string())),
            MatchupError::BuildAborted { .. }
        ));
        // The permit came back.
        assert_eq!(pool.run(|| 1).await, Ok(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let pool = BuildPool::new(2);
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let peak = peak.clone();
            let current = current.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    current.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.in_flight(), 0);
    }
}
