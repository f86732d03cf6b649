pub mod openai;
pub mod s3;

pub use self::openai::OpenAI;
pub use self::s3::S3ImageStore;

use crate::result::Result;

use async_trait::async_trait;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Guesses the post a caption was derived from.
    async fn guess_original(&self, caption: &str) -> Result<String>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates an image for `prompt` and returns it JPEG encoded.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait ImageCaptioner: Send + Sync {
    /// `url` may be an http(s) URL or a `data:` URL.
    async fn caption(&self, url: &str) -> Result<String>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, content: Vec<u8>, key: &str) -> Result<String>;

    async fn delete(&self, url: &str) -> Result<()>;
}
