use std::sync::Arc;

use futures::future::{select_all, BoxFuture};
use tokio::sync::watch;

use crate::error::Result;

/// Multicast change signal with replay-latest semantics. Every publish bumps
/// a generation counter; a subscriber that joins late still observes the
/// latest generation immediately.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Announce that the underlying collection changed.
    pub fn publish(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

type Eval<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// A live read: one async evaluation closure plus the change signals it
/// depends on. Consumers either pull the current value or await the next
/// re-emission; dropping the query unsubscribes.
pub struct LiveQuery<T> {
    signals: Vec<watch::Receiver<u64>>,
    eval: Eval<T>,
}

impl<T> LiveQuery<T> {
    pub fn new<F>(signals: Vec<watch::Receiver<u64>>, eval: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T>> + Send + Sync + 'static,
    {
        Self {
            signals,
            eval: Arc::new(eval),
        }
    }

    /// Evaluate against the current snapshot.
    pub async fn current(&self) -> Result<T> {
        (self.eval)().await
    }

    /// Wait until any upstream collection changes, then re-evaluate.
    /// Returns `None` once every publisher is gone.
    pub async fn changed(&mut self) -> Result<Option<T>> {
        if self.signals.is_empty() {
            return Ok(None);
        }
        let closed = {
            let waits: Vec<_> = self
                .signals
                .iter_mut()
                .map(|rx| Box::pin(rx.changed()))
                .collect();
            let (res, _, rest) = select_all(waits).await;
            drop(rest);
            res.is_err()
        };
        if closed {
            return Ok(None);
        }
        // Coalesce: mark every pending signal seen so one publish does not
        // trigger several re-evaluations.
        for rx in &mut self.signals {
            let _ = rx.borrow_and_update();
        }
        Ok(Some((self.eval)().await?))
    }
}
