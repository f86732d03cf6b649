mod committer;
mod config;
mod db;
mod dispatcher;
mod drainer;
mod error;
mod export;
mod options;
mod pipeline;
mod post;
mod result;
mod services;
mod worker;

pub use committer::ResultCommitter;
pub use config::{Config, DEFAULT_CONFIG_PATH};
pub use db::{KeyValueStore, MemoryStore, Redis};
pub use dispatcher::{ConcurrentDispatcher, CycleSummary, DispatchReport, Outcome};
pub use drainer::QueueDrainer;
pub use error::WorkerError;
pub use export::Exporter;
pub use options::RunOptions;
pub use pipeline::{Services, TransformPipeline};
pub use post::Post;
pub use result::Result;
pub use services::{ImageCaptioner, ImageGenerator, ImageStore, LanguageModel, OpenAI, S3ImageStore};
pub use worker::{RunSummary, Worker};
