use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation flag shared between the graph executor and running tasks.
///
/// Once triggered it stays triggered. Tasks poll [`Interrupt::is_triggered`] or await
/// [`Interrupt::triggered`] to stop early and report an interrupted status.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
}

impl Interrupt {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the interrupt has been triggered.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|value| *value).await;
    }

    /// Trigger on Ctrl-C.
    pub fn trigger_on_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Received interrupt, stopping after running tasks finish");
                interrupt.trigger();
            }
        });
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}
