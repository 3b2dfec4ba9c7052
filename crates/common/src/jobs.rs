//! Background repair jobs
//!
//! Coordinators dispatch a job whenever a write leaves some owner stale.
//! A worker (see [`crate::repair::spawn_resync_worker`]) drains the queue.

use crate::error::StoreError;
use crate::ledger::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Copy the freshest replica of an object to its stale owners
    Resync { id: ObjectId },
}

/// Cloneable handle for sending jobs from anywhere
#[derive(Debug, Clone)]
pub struct JobDispatcher {
    tx: flume::Sender<Job>,
}

impl JobDispatcher {
    /// Create a dispatcher and the receiver its worker reads from
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, JobReceiver { rx })
    }

    pub fn dispatch(&self, job: Job) -> Result<(), StoreError> {
        tracing::debug!(?job, "dispatching job");
        self.tx
            .send(job)
            .map_err(|_| StoreError::Internal("job receiver has been dropped".into()))
    }

    pub fn dispatch_resync(&self, id: ObjectId) -> Result<(), StoreError> {
        self.dispatch(Job::Resync { id })
    }
}

#[derive(Debug)]
pub struct JobReceiver {
    rx: flume::Receiver<Job>,
}

impl JobReceiver {
    /// Next job, or None once every dispatcher is dropped
    pub async fn recv(&self) -> Option<Job> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<Job> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_and_drain() {
        let (dispatcher, receiver) = JobDispatcher::new();
        let id = ObjectId::generate();
        dispatcher.dispatch_resync(id).unwrap();
        assert_eq!(receiver.len(), 1);
        assert_eq!(receiver.recv().await, Some(Job::Resync { id }));

        drop(dispatcher);
        assert_eq!(receiver.recv().await, None);
    }
}
