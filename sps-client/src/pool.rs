use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

use log::{trace, warn};
use sps_types::{
    payload::Payload,
    topic::{MessageTopic, StateTopic},
    StatePayload,
};
use thiserror::Error;
use tokio::{sync::mpsc, task::AbortHandle};

use crate::DynClient;

/// A publish request executed by a [PublishPool] worker
#[derive(Debug, Clone, PartialEq)]
pub enum PublishJob {
    Message {
        topic: MessageTopic,
        payload: Payload,
    },
    State {
        topic: StateTopic,
        payload: StatePayload,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum PoolError {
    #[error("Publish queue is full")]
    Full,
    #[error("Publish pool has shut down")]
    Closed,
}

/// A bounded pool of workers that run publishes off the message ingestion path.
///
/// Jobs are sharded over workers by key so that jobs submitted with the same key are published in submission order.
/// Submission never waits: if the shard queue is full the job is rejected with [PoolError::Full].
pub struct PublishPool {
    shards: Vec<mpsc::Sender<PublishJob>>,
    workers: Vec<AbortHandle>,
}

impl PublishPool {
    /// Spawn `workers` publish tasks, each with a queue of `queue_capacity` jobs.
    pub fn new(client: Arc<DynClient>, workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (tx, rx) = mpsc::channel(queue_capacity.max(1));
            let handle = tokio::spawn(Self::run_worker(worker, client.clone(), rx)).abort_handle();
            shards.push(tx);
            handles.push(handle);
        }
        Self {
            shards,
            workers: handles,
        }
    }

    async fn run_worker(
        worker: usize,
        client: Arc<DynClient>,
        mut rx: mpsc::Receiver<PublishJob>,
    ) {
        while let Some(job) = rx.recv().await {
            trace!("Publish worker {worker} executing {job:?}");
            let result = match job {
                PublishJob::Message { topic, payload } => {
                    client.publish_message(topic, payload).await
                }
                PublishJob::State { topic, payload } => {
                    client.publish_state_message(topic, payload).await
                }
            };
            if let Err(e) = result {
                warn!("Publish worker {worker} failed to publish: {e}");
            }
        }
    }

    fn shard_for<K: Hash + ?Sized>(&self, key: &K) -> &mpsc::Sender<PublishJob> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Queue a job on the worker owning `key`.
    pub fn submit<K: Hash + ?Sized>(&self, key: &K, job: PublishJob) -> Result<(), PoolError> {
        self.shard_for(key).try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PoolError::Full,
            mpsc::error::TrySendError::Closed(_) => PoolError::Closed,
        })
    }
}

impl Drop for PublishPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
