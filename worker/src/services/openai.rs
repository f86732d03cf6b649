use crate::config::OpenAIConfig;
use crate::error::WorkerError;
use crate::result::Result;
use crate::services::{ImageCaptioner, ImageGenerator, LanguageModel};

use async_trait::async_trait;
use image::ImageOutputFormat;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

type Json = serde_json::Value;

const JPEG_QUALITY: u8 = 90;

const CAPTION_INSTRUCTION: &str =
    "Describe this image to a person with impaired vision. Be short and concise.";

const IMAGE_PROMPT_SUFFIX: &str = "#notext #message #animageisworthathousandwords";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Json,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    size: &'a str,
    quality: &'a str,
    n: u8,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

impl ImageResponse {
    fn into_url(self) -> Option<String> {
        self.data
            .into_iter()
            .next()
            .and_then(|data| data.url)
            .filter(|url| !url.is_empty())
    }
}

/// Client for the chat completion and image generation endpoints.
pub struct OpenAI {
    client: reqwest::Client,
    config: OpenAIConfig,
}

impl OpenAI {
    pub fn new(config: OpenAIConfig) -> Result<OpenAI> {
        if config.api_key.is_empty() {
            return Err(WorkerError::Config("openai.api_key is not set".to_owned()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(OpenAI { client, config })
    }

    async fn post<T, R>(&self, path: &str, body: &T) -> Result<R>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.config.url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(url.as_str())
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Transport(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        Ok(response.json::<R>().await?)
    }

    async fn chat(&self, model: &str, content: Json) -> Result<Option<String>> {
        let request = ChatRequest {
            model,
            max_tokens: self.config.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?;

        Ok(response.into_content())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok(bytes.to_vec())
    }

    async fn store_debug_image(&self, content: &[u8]) {
        if let Some(path) = &self.config.debug_image_path {
            if let Err(err) = tokio::fs::write(path, content).await {
                warn!("Could not store debug image at {}: {}", path.display(), err);
            }
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAI {
    async fn guess_original(&self, caption: &str) -> Result<String> {
        let guess = self
            .chat(&self.config.chat_model, Json::String(guess_prompt(caption)))
            .await?
            .ok_or(WorkerError::EmptyModelOutput("guess"))?;

        Ok(clean_guess(&guess))
    }
}

#[async_trait]
impl ImageCaptioner for OpenAI {
    async fn caption(&self, url: &str) -> Result<String> {
        let content = json!([
            { "type": "text", "text": CAPTION_INSTRUCTION },
            { "type": "image_url", "image_url": { "url": url } },
        ]);

        self.chat(&self.config.vision_model, content)
            .await?
            .ok_or(WorkerError::EmptyModelOutput("caption"))
    }
}

#[async_trait]
impl ImageGenerator for OpenAI {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let request = ImageRequest {
            model: &self.config.image_model,
            size: &self.config.image_size,
            quality: &self.config.image_quality,
            n: 1,
            prompt: format!("{}\n{}", prompt, IMAGE_PROMPT_SUFFIX),
        };

        let response: ImageResponse = self.post("images/generations", &request).await?;
        let url = response
            .into_url()
            .ok_or(WorkerError::EmptyModelOutput("image url"))?;
        debug!("Generated image url: {} bytes", url.len());

        let content = self.download(&url).await?;
        let content = encode_jpeg(&content)?;
        self.store_debug_image(&content).await;

        Ok(content)
    }
}

fn guess_prompt(caption: &str) -> String {
    format!(
        "Posts on this network are turned into pictures before anyone reads them: \
         the author's text is fed to a text-to-image model, and the picture is then \
         described by an image captioning model.\n\
         Here is the caption that came out:\n\
         --- BEGIN CAPTION ---\n\
         \"{}\"\n\
         --- END CAPTION ---\n\
         Reconstruct the post the author most likely wrote. It is probably a short, \
         casual message rather than a description of a scene. Write it in the \
         author's own voice and reply with that single line only.",
        caption
    )
}

fn clean_guess(guess: &str) -> String {
    guess.trim().trim_matches('"').to_owned()
}

/// Re-encodes any supported image format as JPEG.
pub fn encode_jpeg(content: &[u8]) -> Result<Vec<u8>> {
    let image = image::load_from_memory(content)?;
    let image = image::DynamicImage::ImageRgb8(image.to_rgb8());

    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;

    Ok(buffer.into_inner())
}
