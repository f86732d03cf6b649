use crate::committer::ResultCommitter;
use crate::error::WorkerError;
use crate::pipeline::TransformPipeline;
use crate::result::Result;

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// What happened to one drained key.
#[derive(Debug)]
pub struct Outcome {
    pub key: String,
    pub result: Result<()>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub drained: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl Display for CycleSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} drained, {} succeeded, {} failed",
            self.drained, self.succeeded, self.failed
        )
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<Outcome>,
}

impl DispatchReport {
    pub fn summary(&self) -> CycleSummary {
        let succeeded = self
            .outcomes
            .iter()
            .filter(|outcome| outcome.result.is_ok())
            .count();

        CycleSummary {
            drained: self.outcomes.len(),
            succeeded,
            failed: self.outcomes.len() - succeeded,
        }
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .map(|outcome| outcome.key.as_str())
            .collect()
    }
}

pub struct ConcurrentDispatcher {
    pipeline: Arc<TransformPipeline>,
    committer: Arc<ResultCommitter>,
    semaphore: Arc<Semaphore>,
}

impl ConcurrentDispatcher {
    pub fn new(
        pipeline: Arc<TransformPipeline>,
        committer: Arc<ResultCommitter>,
        max_concurrency: usize,
    ) -> ConcurrentDispatcher {
        ConcurrentDispatcher {
            pipeline,
            committer,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Runs every key to completion, at most `max_concurrency` at a time.
    /// Outcomes come back in the order of `keys`.
    pub async fn dispatch(&self, keys: &[String]) -> DispatchReport {
        let outcomes = join_all(keys.iter().map(|key| self.dispatch_one(key))).await;

        DispatchReport { outcomes }
    }

    async fn dispatch_one(&self, key: &str) -> Outcome {
        let result = match self.semaphore.acquire().await {
            Ok(_permit) => AssertUnwindSafe(self.process_and_commit(key))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(WorkerError::Panic(panic_message(panic)))),
            Err(err) => Err(WorkerError::Cycle(format!(
                "Dispatcher semaphore closed: {}",
                err
            ))),
        };

        match &result {
            Ok(()) => debug!("Processed {}", key),
            Err(err) => error!("Error processing {}: {}", key, err),
        }

        Outcome {
            key: key.to_owned(),
            result,
        }
    }

    async fn process_and_commit(&self, key: &str) -> Result<()> {
        let post = self.pipeline.process(key).await?;
        self.committer.commit(key, post.created_at).await
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{KeyValueStore, MemoryStore};
    use crate::test::helpers::{seed_text_posts, Fakes, FlakyStore};
    use std::time::Duration;

    fn dispatcher(
        store: Arc<dyn KeyValueStore>,
        fakes: &Fakes,
        modify: bool,
        max_concurrency: usize,
    ) -> ConcurrentDispatcher {
        let pipeline = TransformPipeline::new(store.clone(), fakes.services(), modify);
        let committer = ResultCommitter::new(store, "posts");
        ConcurrentDispatcher::new(Arc::new(pipeline), Arc::new(committer), max_concurrency)
    }

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|key| key.to_string()).collect()
    }

    #[tokio::test]
    async fn test_dispatch_commits_successes() {
        let store = Arc::new(MemoryStore::new());
        seed_text_posts(&store, "pending", &[("p1", 100), ("p2", 200)]).await;
        let fakes = Fakes::new();

        let report = dispatcher(store.clone(), &fakes, true, 4)
            .dispatch(&keys(&["p1", "p2"]))
            .await;

        assert_eq!(
            report.summary(),
            CycleSummary {
                drained: 2,
                succeeded: 2,
                failed: 0
            }
        );
        assert_eq!(store.ranked_score("posts", "p1").await, Some(-100));
        assert_eq!(
            store.scan_ranked("posts", "*").await.unwrap(),
            vec!["p2", "p1"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_isolates_failures() {
        let store = Arc::new(MemoryStore::new());
        seed_text_posts(&store, "pending", &[("p1", 100), ("bad", 150), ("p2", 200)]).await;
        store.insert_record("ghost", &[("text", "no timestamp")]).await;
        let fakes = Fakes::new().failing_prompt_containing("text of bad");

        let report = dispatcher(store.clone(), &fakes, true, 2)
            .dispatch(&keys(&["p1", "bad", "ghost", "p2"]))
            .await;

        assert_eq!(report.summary().succeeded, 2);
        assert_eq!(report.summary().failed, 2);
        assert_eq!(report.failed_keys(), vec!["bad", "ghost"]);
        assert!(matches!(
            report.outcomes[2].result,
            Err(WorkerError::MissingRecord { .. })
        ));
        assert_eq!(store.ranked_score("posts", "bad").await, None);
        assert_eq!(store.ranked_score("posts", "ghost").await, None);
        assert_eq!(store.ranked_score("posts", "p1").await, Some(-100));
        assert_eq!(store.ranked_score("posts", "p2").await, Some(-200));
    }

    #[tokio::test]
    async fn test_dispatch_commit_failure_is_key_failure() {
        let store = FlakyStore::new().failing_insert_for("p2");
        seed_text_posts(&store.inner, "pending", &[("p1", 100), ("p2", 200)]).await;
        let store = Arc::new(store);
        let fakes = Fakes::new();

        let report = dispatcher(store.clone(), &fakes, false, 4)
            .dispatch(&keys(&["p1", "p2"]))
            .await;

        assert_eq!(report.failed_keys(), vec!["p2"]);
        assert_eq!(store.inner.ranked_score("posts", "p1").await, Some(-100));
    }

    #[tokio::test]
    async fn test_dispatch_unrankable_post_spares_siblings() {
        let store = Arc::new(MemoryStore::new());
        seed_text_posts(&store, "pending", &[("p1", 100), ("weird", i64::MIN)]).await;
        let fakes = Fakes::new();

        let report = dispatcher(store.clone(), &fakes, false, 4)
            .dispatch(&keys(&["p1", "weird"]))
            .await;

        assert_eq!(report.failed_keys(), vec!["weird"]);
        assert!(matches!(
            report.outcomes[1].result,
            Err(WorkerError::MissingRecord { .. })
        ));
        assert_eq!(store.ranked_score("posts", "p1").await, Some(-100));
        assert_eq!(store.ranked_score("posts", "weird").await, None);
    }

    #[tokio::test]
    async fn test_dispatch_contains_panics() {
        let store = Arc::new(MemoryStore::new());
        seed_text_posts(&store, "pending", &[("p1", 100), ("boom", 150), ("p2", 200)]).await;
        let fakes = Fakes::new().panicking_prompt_containing("text of boom");

        let report = dispatcher(store.clone(), &fakes, true, 1)
            .dispatch(&keys(&["p1", "boom", "p2"]))
            .await;

        assert_eq!(report.summary().succeeded, 2);
        assert_eq!(report.failed_keys(), vec!["boom"]);
        assert!(matches!(
            report.outcomes[1].result,
            Err(WorkerError::Panic(ref message)) if message.contains("text of boom")
        ));
        assert_eq!(store.ranked_score("posts", "boom").await, None);
        assert_eq!(store.ranked_score("posts", "p2").await, Some(-200));
    }

    #[tokio::test]
    async fn test_dispatch_without_modify_makes_no_calls() {
        let store = Arc::new(MemoryStore::new());
        seed_text_posts(&store, "pending", &[("p1", 100)]).await;
        let fakes = Fakes::new();

        let report = dispatcher(store.clone(), &fakes, false, 4)
            .dispatch(&keys(&["p1"]))
            .await;

        assert_eq!(report.summary().succeeded, 1);
        assert!(fakes.steps().is_empty());
        assert_eq!(
            store.get_record("p1").await.unwrap().get("text").map(String::as_str),
            Some("text of p1")
        );
        assert_eq!(store.ranked_score("posts", "p1").await, Some(-100));
    }

    #[tokio::test]
    async fn test_dispatch_bounds_concurrency() {
        let store = Arc::new(MemoryStore::new());
        let posts: Vec<(String, i64)> = (0..10).map(|i| (format!("p{}", i), i)).collect();
        let posts: Vec<(&str, i64)> = posts.iter().map(|(key, ts)| (key.as_str(), *ts)).collect();
        seed_text_posts(&store, "pending", &posts).await;
        let fakes = Fakes::new().with_delay(Duration::from_millis(20));

        let all_keys: Vec<String> = posts.iter().map(|(key, _)| key.to_string()).collect();
        let report = dispatcher(store.clone(), &fakes, true, 3)
            .dispatch(&all_keys)
            .await;

        assert_eq!(report.summary().succeeded, 10);
        assert!(fakes.max_in_flight() <= 3);
        assert!(fakes.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_dispatch_empty() {
        let store = Arc::new(MemoryStore::new());
        let fakes = Fakes::new();

        let report = dispatcher(store, &fakes, true, 4).dispatch(&[]).await;

        assert_eq!(report.summary(), CycleSummary::default());
    }
}
