use crate::db::KeyValueStore;
use crate::result::Result;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, VecDeque<String>>,
    records: HashMap<String, HashMap<String, String>>,
    indexes: HashMap<String, HashMap<String, i64>>,
}

/// Process-local store with the same semantics as the Redis one. Backs the
/// unit tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub async fn push_back(&self, queue: &str, key: &str) {
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(queue.to_owned())
            .or_default()
            .push_back(key.to_owned());
    }

    pub async fn insert_record(&self, key: &str, fields: &[(&str, &str)]) {
        let mut state = self.state.lock().await;
        let record = state.records.entry(key.to_owned()).or_default();
        for (field, value) in fields {
            record.insert(field.to_string(), value.to_string());
        }
    }

    pub async fn queue_len(&self, queue: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(queue).map_or(0, VecDeque::len)
    }

    pub async fn ranked_score(&self, index: &str, key: &str) -> Option<i64> {
        let state = self.state.lock().await;
        state
            .indexes
            .get(index)
            .and_then(|index| index.get(key))
            .copied()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn pop_front(&self, queue: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().await;

        Ok(state.queues.get_mut(queue).and_then(VecDeque::pop_front))
    }

    async fn get_record(&self, key: &str) -> Result<HashMap<String, String>> {
        let state = self.state.lock().await;

        Ok(state.records.get(key).cloned().unwrap_or_default())
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .records
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value.to_owned());

        Ok(())
    }

    async fn insert_ranked(&self, index: &str, key: &str, score: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .indexes
            .entry(index.to_owned())
            .or_default()
            .insert(key.to_owned(), score);

        Ok(())
    }

    async fn scan_ranked(&self, index: &str, pattern: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let mut members: Vec<(&String, &i64)> = match state.indexes.get(index) {
            Some(index) => index
                .iter()
                .filter(|(key, _)| glob_match(pattern.as_bytes(), key.as_bytes()))
                .collect(),
            None => return Ok(Vec::new()),
        };

        // Same tie-break as a sorted set: equal scores order by member.
        members.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));

        Ok(members.into_iter().map(|(key, _)| key.clone()).collect())
    }
}

/// Subset of the Redis glob syntax: `*` and `?`.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first().copied(), text.first().copied()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], text) || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => glob_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}
