//! Service lifecycle contract and the supervisor that runs it.
//!
//! Every long-running subsystem (the control-plane API, discovery,
//! connection establishment) implements [`Service`] and is registered with
//! one [`Supervisor`]. The supervisor runs each service on its own task,
//! restarts it after an unexpected failure, and stops all of them together
//! on shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

/// Delay before restarting a failed service.
const RESTART_BACKOFF: Duration = Duration::from_secs(1);

/// Uniform lifecycle contract for supervised services.
#[async_trait]
pub trait Service: Send + Sync {
    /// Runs the service until it is stopped (Ok) or fails (Err).
    async fn start(&self) -> eyre::Result<()>;

    /// Requests shutdown. Must be called at most once per service; the
    /// supervisor owns that guarantee.
    fn stop(&self);

    /// Human-readable service name for logs.
    fn describe(&self) -> String;
}

/// Runs a set of services and shuts them down together.
#[derive(Default)]
pub struct Supervisor {
    services: Vec<Arc<dyn Service>>,
}

impl Supervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: Arc<dyn Service>) {
        info!(service = %service.describe(), "registering service");
        self.services.push(service);
    }

    /// Runs all registered services until `shutdown` resolves, then stops
    /// each service exactly once and waits for their tasks to finish.
    pub async fn run_until(self, shutdown: impl Future<Output = ()> + Send) {
        let stopping = Arc::new(AtomicBool::new(false));

        let mut tasks = Vec::with_capacity(self.services.len());
        for service in &self.services {
            let service = Arc::clone(service);
            let stopping = Arc::clone(&stopping);
            tasks.push(tokio::spawn(async move {
                loop {
                    match service.start().await {
                        Ok(()) => {
                            info!(service = %service.describe(), "service stopped");
                            break;
                        }
                        Err(err) => {
                            if stopping.load(Ordering::SeqCst) {
                                break;
                            }
                            warn!(
                                service = %service.describe(),
                                error = %format!("{err:#}"),
                                "service failed, restarting"
                            );
                            tokio::time::sleep(RESTART_BACKOFF).await;
                            if stopping.load(Ordering::SeqCst) {
                                break;
                            }
                        }
                    }
                }
            }));
        }

        shutdown.await;
        info!("shutting down services");
        stopping.store(true, Ordering::SeqCst);
        for service in &self.services {
            service.stop();
        }
        for task in tasks {
            let _result = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::watch;

    use super::*;

    struct FlakyService {
        starts: AtomicUsize,
        failures_left: AtomicUsize,
        stop_tx: Mutex<Option<watch::Sender<bool>>>,
        stop_rx: watch::Receiver<bool>,
    }

    impl FlakyService {
        fn new(failures: usize) -> Self {
            let (stop_tx, stop_rx) = watch::channel(false);
            Self {
                starts: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(failures),
                stop_tx: Mutex::new(Some(stop_tx)),
                stop_rx,
            }
        }
    }

    #[async_trait]
    impl Service for FlakyService {
        async fn start(&self) -> eyre::Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                eyre::bail!("induced failure");
            }
            let mut rx = self.stop_rx.clone();
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
            Ok(())
        }

        fn stop(&self) {
            let tx = self
                .stop_tx
                .lock()
                .expect("stop lock poisoned")
                .take()
                .expect("stop invoked twice");
            let _ = tx.send(true);
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_failed_services_and_stops_once() {
        let service = Arc::new(FlakyService::new(2));
        let mut supervisor = Supervisor::new();
        supervisor.register(Arc::clone(&service) as Arc<dyn Service>);

        let (ready_tx, mut ready_rx) = watch::channel(false);
        let waiter = {
            let service = Arc::clone(&service);
            async move {
                // Shut down once the service has survived its induced
                // failures and reached the healthy state.
                loop {
                    if service.starts.load(Ordering::SeqCst) >= 3 {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                let _ = ready_tx.send(true);
            }
        };

        supervisor.run_until(waiter).await;
        assert!(*ready_rx.borrow_and_update());
        assert_eq!(service.starts.load(Ordering::SeqCst), 3);
    }
}
