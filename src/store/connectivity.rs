use super::KvStore;
use crate::error::{ChartError, ChartResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Was connected, lost the store; probing continues.
    Disconnected,
    /// Never reached the store, timed out, or was refused.
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Map one probe result onto the next state.
fn classify(result: Result<ChartResult<()>, Elapsed>, previous: &ConnectionState) -> ConnectionState {
    match result {
        Ok(Ok(())) => ConnectionState::Connected,
        Ok(Err(ChartError::Connectivity(_))) if previous.is_connected() => ConnectionState::Disconnected,
        Ok(Err(e)) => ConnectionState::Error(e.to_string()),
        Err(_) => ConnectionState::Error("connection timed out".into()),
    }
}

/// Periodically probes a store and publishes its state on a watch channel.
pub struct ConnectivityMonitor {
    store: Arc<dyn KvStore>,
    timeout: Duration,
    interval: Duration,
    tx: watch::Sender<ConnectionState>,
}

impl ConnectivityMonitor {
    pub fn new(store: Arc<dyn KvStore>, timeout: Duration, interval: Duration) -> Self {
        let (tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            store,
            timeout,
            interval,
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    /// Probe once; subscribers are notified only when the state changes.
    pub async fn check(&self) -> ConnectionState {
        let result = tokio::time::timeout(self.timeout, self.store.probe()).await;
        let next = classify(result, &self.tx.borrow());

        let changed = self.tx.send_if_modified(|cur| {
            if *cur == next {
                false
            } else {
                *cur = next.clone();
                true
            }
        });
        if changed {
            match &next {
                ConnectionState::Connected => info!("{} store connected", self.store.name()),
                other => warn!("{} store: {:?}", self.store.name(), other),
            }
        }
        next
    }

    /// Probe forever until every subscriber is gone.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.check().await;
                if self.tx.is_closed() {
                    break;
                }
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Child;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose reachability a test can flip.
    struct Switchable {
        up: AtomicBool,
    }

    #[async_trait]
    impl KvStore for Switchable {
        fn name(&self) -> &'static str {
            "switchable"
        }
        async fn read(&self, _: &str) -> ChartResult<Vec<Child>> {
            Ok(Vec::new())
        }
        async fn list_keys(&self, _: &str) -> ChartResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn exists(&self, _: &str) -> ChartResult<bool> {
            Ok(false)
        }
        async fn remove(&self, _: &str) -> ChartResult<()> {
            Ok(())
        }
        async fn push_child(&self, _: &str, _: &Value) -> ChartResult<String> {
            Ok(String::new())
        }
        async fn probe(&self) -> ChartResult<()> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ChartError::Connectivity("down".into()))
            }
        }
    }

    #[test]
    fn first_failure_is_an_error_later_failure_is_disconnect() {
        let down = || Ok(Err(ChartError::Connectivity("refused".into())));
        assert!(matches!(classify(down(), &ConnectionState::Connecting), ConnectionState::Error(_)));
        assert_eq!(classify(down(), &ConnectionState::Connected), ConnectionState::Disconnected);
        assert_eq!(classify(Ok(Ok(())), &ConnectionState::Disconnected), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let store = Arc::new(Switchable { up: AtomicBool::new(true) });
        let monitor = ConnectivityMonitor::new(store.clone(), Duration::from_secs(1), Duration::from_secs(60));
        let mut rx = monitor.subscribe();

        assert_eq!(monitor.check().await, ConnectionState::Connected);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connected);

        // Same state again does not notify.
        monitor.check().await;
        assert!(!rx.has_changed().unwrap());

        store.up.store(false, Ordering::SeqCst);
        assert_eq!(monitor.check().await, ConnectionState::Disconnected);
        assert!(rx.has_changed().unwrap());
        assert_eq!(monitor.state(), ConnectionState::Disconnected);
    }
}
