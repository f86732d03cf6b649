use crate::config::RedisConfig;
use crate::db::KeyValueStore;
use crate::result::Result;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, ConnectionInfo, IntoConnectionInfo};
use std::collections::HashMap;

#[derive(Clone)]
pub struct Redis {
    connection_manager: ConnectionManager,
}

impl Redis {
    pub async fn new(config: RedisConfig) -> Result<Redis> {
        let client = Client::open(connection_info(&config)?)?;
        let connection_manager = client.get_tokio_connection_manager().await?;

        Ok(Redis { connection_manager })
    }

    fn connection(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }
}

/// Parses `config.host` and applies `config.password` unescaped on top.
pub fn connection_info(config: &RedisConfig) -> Result<ConnectionInfo> {
    let mut info = config.host.as_str().into_connection_info()?;
    if let Some(password) = &config.password {
        info.redis.password = Some(password.clone());
    }

    Ok(info)
}

#[async_trait]
impl KeyValueStore for Redis {
    async fn pop_front(&self, queue: &str) -> Result<Option<String>> {
        let key: Option<String> = self.connection().lpop(queue, None).await?;

        Ok(key)
    }

    async fn get_record(&self, key: &str) -> Result<HashMap<String, String>> {
        let fields: HashMap<String, String> = self.connection().hgetall(key).await?;

        Ok(fields)
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.connection().hset::<_, _, _, ()>(key, field, value).await?;

        Ok(())
    }

    async fn insert_ranked(&self, index: &str, key: &str, score: i64) -> Result<()> {
        self.connection().zadd::<_, _, _, ()>(index, key, score).await?;

        Ok(())
    }

    async fn scan_ranked(&self, index: &str, pattern: &str) -> Result<Vec<String>> {
        let mut connection = self.connection();
        let mut iter = connection
            .zscan_match::<_, _, (String, f64)>(index, pattern)
            .await?;

        let mut members = Vec::new();
        while let Some(member) = iter.next_item().await {
            members.push(member);
        }

        // ZSCAN only promises every member once; the index order comes from the score.
        members.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(members.into_iter().map(|(key, _)| key).collect())
    }
}
