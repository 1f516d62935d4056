//! Debounced reconnect timer.
//!
//! At most one reconnect is pending at any time: scheduling a new one
//! cancels the outstanding one. When the timer fires it sends a tick on the
//! channel returned by [`ReconnectTimer::new`]; the lifecycle supervisor
//! consumes those ticks and starts a session.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    tokio::{
        sync::{Mutex, mpsc},
        task::AbortHandle,
    },
    tracing::debug,
};

pub struct ReconnectTimer {
    tx: mpsc::UnboundedSender<()>,
    pending: Arc<Mutex<Option<(u64, AbortHandle)>>>,
    seq: AtomicU64,
}

impl ReconnectTimer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = Self {
            tx,
            pending: Arc::new(Mutex::new(None)),
            seq: AtomicU64::new(0),
        };
        (timer, rx)
    }

    /// Fire after `delay`, replacing any reconnect already scheduled.
    pub async fn schedule(&self, delay: Duration) {
        let id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let mut pending = self.pending.lock().await;
        if let Some((old, handle)) = pending.take() {
            debug!(old, "cancelling pending reconnect");
            handle.abort();
        }

        let slot = Arc::clone(&self.pending);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut pending = slot.lock().await;
                // Superseded while we were waiting for the lock.
                if pending.as_ref().map(|(seq, _)| *seq) != Some(id) {
                    return;
                }
                pending.take();
            }
            debug!(id, "reconnect timer fired");
            let _ = tx.send(());
        });
        *pending = Some((id, task.abort_handle()));
        debug!(id, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
    }

    /// Fire immediately, cancelling anything pending.
    pub async fn fire_now(&self) {
        self.cancel().await;
        let _ = self.tx.send(());
    }

    pub async fn cancel(&self) {
        if let Some((id, handle)) = self.pending.lock().await.take() {
            debug!(id, "reconnect cancelled");
            handle.abort();
        }
    }

    pub async fn is_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(rx: &mut mpsc::UnboundedReceiver<()>) -> usize {
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (timer, mut rx) = ReconnectTimer::new();
        timer.schedule(Duration::from_millis(1500)).await;
        assert!(timer.is_pending().await);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(drain(&mut rx).await, 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(drain(&mut rx).await, 1);
        assert!(!timer.is_pending().await);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_debounces() {
        let (timer, mut rx) = ReconnectTimer::new();
        timer.schedule(Duration::from_millis(1500)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        timer.schedule(Duration::from_millis(1500)).await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(drain(&mut rx).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let (timer, mut rx) = ReconnectTimer::new();
        timer.schedule(Duration::from_millis(300)).await;
        timer.cancel().await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(drain(&mut rx).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fire_now_replaces_pending() {
        let (timer, mut rx) = ReconnectTimer::new();
        timer.schedule(Duration::from_millis(1500)).await;
        timer.fire_now().await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(drain(&mut rx).await, 1);
    }
}
