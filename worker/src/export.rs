use crate::db::KeyValueStore;
use crate::post::USERNAME_FIELD;
use crate::result::Result;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{info, warn};

/// Dumps committed posts as JSON lines, newest first, without usernames.
pub struct Exporter {
    store: Arc<dyn KeyValueStore>,
    index: String,
}

impl Exporter {
    pub fn new(store: Arc<dyn KeyValueStore>, index: &str) -> Exporter {
        Exporter {
            store,
            index: index.to_owned(),
        }
    }

    pub async fn export<W>(&self, writer: &mut W) -> Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let keys = self.store.scan_ranked(&self.index, "*").await?;
        let mut written = 0;

        for key in keys {
            let mut record = self.store.get_record(&key).await?;
            if record.is_empty() {
                warn!("Skipping {}: no record", key);
                continue;
            }
            record.remove(USERNAME_FIELD);

            let record: BTreeMap<String, String> = record.into_iter().collect();
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            written += 1;
        }

        writer.flush().await?;

        Ok(written)
    }

    pub async fn export_to_file(&self, path: &Path) -> Result<usize> {
        let file = File::create(path).await?;
        let mut writer = BufWriter::new(file);
        let written = self.export(&mut writer).await?;

        info!("Exported {} posts to {}", written, path.display());

        Ok(written)
    }
}
