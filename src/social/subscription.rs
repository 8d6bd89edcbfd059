//! Live view state fed by a snapshot stream.

use crate::firestore::{FirestoreError, SnapshotStream};
use futures::StreamExt;
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SubscriptionState<T> {
    /// No snapshot has arrived yet.
    #[default]
    Pending,
    Ready(T),
    /// The stream failed and will not be reopened. `last` is the value it
    /// held before the failure, if any.
    Failed { error: String, last: Option<T> },
}

impl<T> SubscriptionState<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            SubscriptionState::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// The value to render: the ready one, or the last one before a failure.
    pub fn value(&self) -> Option<&T> {
        match self {
            SubscriptionState::Ready(value) => Some(value),
            SubscriptionState::Failed { last, .. } => last.as_ref(),
            SubscriptionState::Pending => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SubscriptionState::Failed { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SubscriptionState::Pending)
    }
}

/// A live subscription owned by one view.
///
/// Every snapshot is projected into `T` and replaces the previous value.
/// Dropping the handle aborts the task that drives the stream; the stream is
/// dropped with it and nothing is delivered afterwards.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: watch::Receiver<SubscriptionState<T>>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawns a task that opens the stream and keeps the view state current.
    ///
    /// Must be called within a tokio runtime.
    pub fn open<S, Fut, F>(label: &'static str, open: Fut, project: F) -> Self
    where
        S: Send + 'static,
        Fut: Future<Output = Result<SnapshotStream<S>, FirestoreError>> + Send + 'static,
        F: Fn(S) -> Result<T, FirestoreError> + Send + 'static,
    {
        let (tx, rx) = watch::channel(SubscriptionState::Pending);

        let task = tokio::spawn(async move {
            let mut stream = match open.await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(subscription = label, error = %e, "failed to open subscription");
                    tx.send_replace(SubscriptionState::Failed {
                        error: e.to_string(),
                        last: None,
                    });
                    return;
                }
            };

            while let Some(item) = stream.next().await {
                match item.and_then(&project) {
                    Ok(value) => {
                        tx.send_replace(SubscriptionState::Ready(value));
                    }
                    Err(e) => {
                        error!(subscription = label, error = %e, "subscription failed");
                        tx.send_modify(|state| {
                            let last = match std::mem::replace(state, SubscriptionState::Pending) {
                                SubscriptionState::Ready(value) => Some(value),
                                _ => None,
                            };
                            *state = SubscriptionState::Failed {
                                error: e.to_string(),
                                last,
                            };
                        });
                        return;
                    }
                }
            }

            debug!(subscription = label, "subscription stream ended");
        });

        Self { rx, task }
    }

    pub fn state(&self) -> SubscriptionState<T> {
        self.rx.borrow().clone()
    }

    /// The latest projected value, kept after a failure.
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().value().cloned()
    }

    /// Waits for the next state change.
    ///
    /// Returns `None` once the stream has ended and every state has been seen.
    pub async fn changed(&mut self) -> Option<SubscriptionState<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Waits until the state satisfies `predicate`, checking the current one first.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&SubscriptionState<T>) -> bool,
    ) -> Option<SubscriptionState<T>> {
        let state = self.rx.wait_for(predicate).await.ok()?;
        Some(state.clone())
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
