//! The sequential store queue.
//!
//! Every store call from every session runs on one worker task, one call at
//! a time, in submission order. Concurrent sessions therefore never
//! interleave store mutations, and FIFO order is the only ordering promised
//! across sessions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use briar_store::SyncStore;

use crate::error::{Result, SyncError};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Task<S> = Box<dyn FnOnce(Arc<S>) -> BoxFuture + Send>;

/// Handle for submitting work to the store worker. Cheap to clone.
pub struct StoreQueue<S: ?Sized> {
    sender: mpsc::UnboundedSender<Task<S>>,
}

impl<S: ?Sized> Clone for StoreQueue<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<S: SyncStore + ?Sized + 'static> StoreQueue<S> {
    /// Spawns the worker. It exits once every handle has been dropped and
    /// the queue has drained.
    pub fn spawn(store: Arc<S>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task<S>>();
        let worker = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                task(Arc::clone(&store)).await;
            }
            debug!("store queue drained");
        });
        (Self { sender }, worker)
    }

    /// Queues `task` without waiting for it.
    pub fn submit<F, Fut>(&self, task: F) -> Result<()>
    where
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.sender
            .send(Box::new(move |store| Box::pin(task(store))))
            .map_err(|_| SyncError::QueueClosed)
    }

    /// Queues `task` and waits for its result.
    pub async fn call<F, Fut, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = briar_store::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        self.submit(move |store| async move {
            let _ = reply.send(task(store).await);
        })?;
        Ok(result.await.map_err(|_| SyncError::QueueClosed)??)
    }

    /// Waits until everything submitted before this call has run.
    pub async fn barrier(&self) -> Result<()> {
        self.call(|_| async { Ok(()) }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use briar_core::ContactId;
    use briar_store::{MemoryStore, StoreError};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_tasks_run_in_submission_order() {
        let (queue, _worker) = StoreQueue::spawn(Arc::new(MemoryStore::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..50 {
            let seen = Arc::clone(&seen);
            queue
                .submit(move |_| async move {
                    if i % 7 == 0 {
                        tokio::task::yield_now().await;
                    }
                    seen.lock().unwrap().push(i);
                })
                .unwrap();
        }
        queue.barrier().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_call_returns_store_errors() {
        let (queue, _worker) = StoreQueue::spawn(Arc::new(MemoryStore::new()));
        let result = queue
            .call(|store| async move { store.generate_ack(ContactId(3), 10).await })
            .await;
        assert!(matches!(
            result,
            Err(SyncError::Store(StoreError::UnknownContact(ContactId(3))))
        ));
    }

    #[tokio::test]
    async fn test_worker_exits_when_handles_dropped() {
        let (queue, worker) = StoreQueue::spawn(Arc::new(MemoryStore::new()));
        drop(queue);
        worker.await.unwrap();
    }
}
