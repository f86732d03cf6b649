use crate::db::KeyValueStore;
use crate::error::WorkerError;
use crate::result::Result;

use std::sync::Arc;

pub struct QueueDrainer {
    store: Arc<dyn KeyValueStore>,
    queue: String,
}

impl QueueDrainer {
    pub fn new(store: Arc<dyn KeyValueStore>, queue: &str) -> QueueDrainer {
        QueueDrainer {
            store,
            queue: queue.to_owned(),
        }
    }

    /// Pops until the queue reports empty. Keys pushed while draining may or
    /// may not be picked up; nothing waits for new arrivals.
    pub async fn drain_all(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        loop {
            match self.store.pop_front(&self.queue).await {
                Ok(Some(key)) => keys.push(key),
                Ok(None) => break,
                Err(err) => {
                    return Err(WorkerError::Cycle(format!(
                        "Could not drain {} after popping {} keys {:?}: {}",
                        self.queue,
                        keys.len(),
                        keys,
                        err
                    )))
                }
            }
        }

        Ok(keys)
    }
}
