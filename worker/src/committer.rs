use crate::db::KeyValueStore;
use crate::error::WorkerError;
use crate::post::CREATED_AT_FIELD;
use crate::result::Result;

use std::sync::Arc;

pub struct ResultCommitter {
    store: Arc<dyn KeyValueStore>,
    index: String,
}

impl ResultCommitter {
    pub fn new(store: Arc<dyn KeyValueStore>, index: &str) -> ResultCommitter {
        ResultCommitter {
            store,
            index: index.to_owned(),
        }
    }

    /// Ranks `key` by `-created_at` so the index reads newest first.
    /// Committing the same post twice leaves a single entry.
    pub async fn commit(&self, key: &str, created_at: i64) -> Result<()> {
        let score = created_at.checked_neg().ok_or_else(|| {
            WorkerError::missing_record(
                key,
                &format!("{} is out of range: {}", CREATED_AT_FIELD, created_at),
            )
        })?;

        self.store.insert_ranked(&self.index, key, score).await
    }
}
