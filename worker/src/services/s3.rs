use crate::config::S3Config;
use crate::error::WorkerError;
use crate::result::Result;
use crate::services::ImageStore;

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::debug;

const CONTENT_TYPE: &str = "image/jpeg";

pub struct S3ImageStore {
    client: Client,
    config: S3Config,
}

impl S3ImageStore {
    pub async fn new(config: S3Config) -> Result<S3ImageStore> {
        if config.bucket.is_empty() {
            return Err(WorkerError::Config("s3.bucket is not set".to_owned()));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if !config.region.is_empty() {
            loader = loader.region(Region::new(config.region.clone()));
        }
        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            loader = loader.credentials_provider(Credentials::new(
                config.access_key_id.clone(),
                config.secret_access_key.clone(),
                None,
                None,
                "worker-config",
            ));
        }

        let client = Client::new(&loader.load().await);

        Ok(S3ImageStore { client, config })
    }
}

/// Object key of an image URL: its path without the leading slash.
pub fn object_key(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|err| WorkerError::Transport(format!("Invalid image url {}: {}", url, err)))?;
    let key = parsed.path().trim_start_matches('/');

    if key.is_empty() {
        return Err(WorkerError::Transport(format!(
            "Image url has no object key: {}",
            url
        )));
    }

    Ok(key.to_owned())
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn upload(&self, content: Vec<u8>, key: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|err| WorkerError::transport(format!("s3 upload {}: {}", key, err)))?;

        Ok(self.config.object_url(key))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let key = object_key(url)?;
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| WorkerError::transport(format!("s3 delete {}: {}", key, err)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        assert_eq!(
            object_key("https://images.s3.amazonaws.com/processed/abc.jpg").unwrap(),
            "processed/abc.jpg"
        );
        assert_eq!(
            object_key("https://images.s3.amazonaws.com/uploads/a%20b.jpg?x=1").unwrap(),
            "uploads/a%20b.jpg"
        );
    }

    #[test]
    fn test_object_key_failure() {
        assert!(object_key("not a url").is_err());
        assert!(object_key("https://images.s3.amazonaws.com/").is_err());
    }

    #[tokio::test]
    async fn test_new_requires_bucket() {
        assert!(matches!(
            S3ImageStore::new(S3Config::default()).await,
            Err(WorkerError::Config(_))
        ));
    }
}
