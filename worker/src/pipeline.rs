use crate::db::KeyValueStore;
use crate::error::WorkerError;
use crate::post::{Post, IMG_URL_FIELD, TEXT_FIELD};
use crate::result::Result;
use crate::services::{ImageCaptioner, ImageGenerator, ImageStore, LanguageModel};

use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// The external services a pipeline talks to.
#[derive(Clone)]
pub struct Services {
    pub language_model: Arc<dyn LanguageModel>,
    pub image_generator: Arc<dyn ImageGenerator>,
    pub image_captioner: Arc<dyn ImageCaptioner>,
    pub image_store: Arc<dyn ImageStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    TextTransformed,
    ImageTransformed,
    Ready,
}

pub struct TransformPipeline {
    store: Arc<dyn KeyValueStore>,
    services: Services,
    modify: bool,
}

impl TransformPipeline {
    pub fn new(store: Arc<dyn KeyValueStore>, services: Services, modify: bool) -> TransformPipeline {
        TransformPipeline {
            store,
            services,
            modify,
        }
    }

    /// Loads the post at `key` and, when modifying, runs its text and image
    /// round-trips in that order. Field writes made before a failure stay.
    #[instrument(skip(self))]
    pub async fn process(&self, key: &str) -> Result<Post> {
        let fields = self.store.get_record(key).await?;
        let mut post = Post::from_fields(key, &fields)?;
        debug!(stage = ?Stage::Loaded, created_at = post.created_at);

        if self.modify {
            if let Some(text) = post.text.clone() {
                post.text = Some(self.transform_text(key, &text).await?);
                debug!(stage = ?Stage::TextTransformed);
            }

            if let Some(img_url) = post.img_url.clone() {
                post.img_url = Some(self.transform_image(key, &img_url).await?);
                debug!(stage = ?Stage::ImageTransformed);
            }
        }

        debug!(stage = ?Stage::Ready);

        Ok(post)
    }

    async fn transform_text(&self, key: &str, text: &str) -> Result<String> {
        debug!("Text: {}", text);

        let content = self
            .services
            .image_generator
            .generate(&pictogram_prompt(text))
            .await?;
        if content.is_empty() {
            return Err(WorkerError::EmptyModelOutput("image"));
        }
        let img_url = data_url(&content);
        debug!("Image url: {} bytes", img_url.len());

        let caption = self.services.image_captioner.caption(&img_url).await?;
        let caption = require_text(caption, "caption")?;
        debug!("Caption: {}", caption);

        let guess = self.services.language_model.guess_original(&caption).await?;
        let guess = require_text(guess, "guess")?;
        debug!("New text: {}", guess);

        self.store.set_field(key, TEXT_FIELD, &guess).await?;

        Ok(guess)
    }

    async fn transform_image(&self, key: &str, img_url: &str) -> Result<String> {
        debug!("Image url: {}", img_url);

        let caption = self.services.image_captioner.caption(img_url).await?;
        let caption = require_text(caption, "caption")?;

        self.services.image_store.delete(img_url).await?;
        debug!("Caption: {}", caption);

        let content = self.services.image_generator.generate(&caption).await?;
        if content.is_empty() {
            return Err(WorkerError::EmptyModelOutput("image"));
        }

        let new_img_key = format!("processed/{}.jpg", Uuid::new_v4());
        let new_img_url = self
            .services
            .image_store
            .upload(content, &new_img_key)
            .await?;
        let new_img_url = require_text(new_img_url, "image url")?;
        debug!("New image url: {}", new_img_url);

        self.store.set_field(key, IMG_URL_FIELD, &new_img_url).await?;

        Ok(new_img_url)
    }
}

pub fn pictogram_prompt(text: &str) -> String {
    format!(
        "Create an image that visually transmits the following message:\n\
         --- BEGIN MESSAGE ---\n\
         {}\n\
         --- END MESSAGE ---\n\
         Make the message into a pictogram, a visual representation of the message.\n\
         Do not use text.",
        text
    )
}

fn data_url(content: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(content))
}

fn require_text(value: String, what: &'static str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(WorkerError::EmptyModelOutput(what));
    }

    Ok(value)
}
