use crate::committer::ResultCommitter;
use crate::config::{Config, WorkerConfig};
use crate::db::{KeyValueStore, Redis};
use crate::dispatcher::{ConcurrentDispatcher, CycleSummary};
use crate::drainer::QueueDrainer;
use crate::options::RunOptions;
use crate::pipeline::{Services, TransformPipeline};
use crate::result::Result;
use crate::services::{OpenAI, S3ImageStore};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub totals: CycleSummary,
}

pub struct Worker {
    drainer: QueueDrainer,
    dispatcher: ConcurrentDispatcher,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(config: &WorkerConfig, store: Arc<dyn KeyValueStore>, services: Services) -> Worker {
        let drainer = QueueDrainer::new(store.clone(), &config.pending_queue);
        let pipeline = TransformPipeline::new(store.clone(), services, config.modify);
        let committer = ResultCommitter::new(store, &config.posts_index);
        let dispatcher = ConcurrentDispatcher::new(
            Arc::new(pipeline),
            Arc::new(committer),
            config.max_concurrency,
        );

        Worker {
            drainer,
            dispatcher,
            poll_interval: config.poll_interval(),
        }
    }

    /// Connects to redis, OpenAI and S3 as configured.
    pub async fn from_config(config: &Config) -> Result<Worker> {
        let store = Redis::new(config.redis.clone()).await?;
        let openai = Arc::new(OpenAI::new(config.openai.clone())?);
        let s3 = S3ImageStore::new(config.s3.clone()).await?;

        let services = Services {
            language_model: openai.clone(),
            image_generator: openai.clone(),
            image_captioner: openai,
            image_store: Arc::new(s3),
        };

        Ok(Worker::new(&config.worker, Arc::new(store), services))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Worker {
        self.poll_interval = poll_interval;
        self
    }

    /// One drain and dispatch. Per-post failures are part of the summary;
    /// only a failed drain is an error.
    pub async fn cycle(&self) -> Result<CycleSummary> {
        let keys = self.drainer.drain_all().await?;
        if keys.is_empty() {
            return Ok(CycleSummary::default());
        }

        info!("Processing {} pending posts", keys.len());
        let report = self.dispatcher.dispatch(&keys).await;
        let summary = report.summary();
        if summary.failed > 0 {
            debug!("Failed posts: {:?}", report.failed_keys());
        }

        Ok(summary)
    }

    pub async fn run(&self, options: RunOptions) -> RunSummary {
        self.run_until(options, std::future::pending::<()>()).await
    }

    /// Polls until `options.max_cycles` is reached or `shutdown` resolves.
    /// Shutdown is only observed between cycles.
    pub async fn run_until<F>(&self, options: RunOptions, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut run = RunSummary::default();

        loop {
            match self.cycle().await {
                Ok(summary) => {
                    if summary.drained > 0 {
                        info!("Cycle finished: {}", summary);
                    }
                    run.totals.drained += summary.drained;
                    run.totals.succeeded += summary.succeeded;
                    run.totals.failed += summary.failed;
                }
                Err(err) => {
                    error!("Error processing pending posts: {}", err);
                    run.failed_cycles += 1;
                }
            }
            run.cycles += 1;

            if options.max_cycles.is_some_and(|max_cycles| run.cycles >= max_cycles) {
                break;
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = &mut shutdown => {
                    info!("Shutting down after {} cycles", run.cycles);
                    break;
                }
            }
        }

        run
    }
}
