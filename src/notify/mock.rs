//! Recording notifier for tests.

use super::{ChamaEvent, NotifyError, Notifier};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct MockNotifier {
    events: Arc<Mutex<Vec<ChamaEvent>>>,
    failing: Arc<AtomicBool>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// While failing, events are rejected and not recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<ChamaEvent> {
        self.events.lock().await.clone()
    }

    /// Wait until at least `count` events arrived or `timeout` passed, then
    /// return what was recorded.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<ChamaEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let events = self.events().await;
            if events.len() >= count || tokio::time::Instant::now() >= deadline {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, event: &ChamaEvent) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("mock failure".to_string()));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
