//! In-process poll store.
//!
//! Keeps records in the same flattened field layout the Redis adapter uses and
//! applies each operation under one write lock, which gives it the same
//! single-record atomicity. Used for local development and as the fake store
//! in tests, where [`StoreFault`] injection simulates an unreliable backend.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use votebot_common::{AppError, AppResult};

use super::{PollFilter, PollStore, ScanCursor, VoteOutcome, fetch_matching};
use crate::entities::Poll;
use crate::tuple::{self, ACTIVE, INACTIVE, TupleField};

type Record = HashMap<String, String>;

/// A failure the memory store will report for one operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreFault {
    /// Behave like a timed-out or disconnected backend.
    Unavailable,
    /// Behave like a primary-key collision.
    Conflict,
    /// Apply a mutation, then report an outage as if the reply timed out.
    LostReply,
}

/// Poll store backed by a map in process memory.
#[derive(Default)]
pub struct MemoryPollStore {
    records: RwLock<HashMap<String, Record>>,
    faults: Mutex<VecDeque<StoreFault>>,
    operations: AtomicUsize,
}

impl MemoryPollStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next operations fail, one queued fault per operation.
    pub async fn inject_faults(&self, faults: impl IntoIterator<Item = StoreFault>) {
        self.faults.lock().await.extend(faults);
    }

    /// Store raw fields under `poll_id`, bypassing validation.
    pub async fn insert_raw(&self, poll_id: &str, fields: Vec<(String, String)>) {
        self.records
            .write()
            .await
            .insert(poll_id.to_string(), fields.into_iter().collect());
    }

    /// How many store operations have been attempted, including failed ones.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Count the operation and consume the next fault. Returns whether the
    /// reply is to be lost.
    async fn begin(&self, op: &'static str) -> AppResult<bool> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        match self.faults.lock().await.pop_front() {
            None => Ok(false),
            Some(StoreFault::Unavailable) => {
                debug!(op, "Injected store outage");
                Err(outage(op))
            }
            Some(StoreFault::Conflict) => {
                debug!(op, "Injected store conflict");
                Err(AppError::Conflict(format!("{op}: injected conflict")))
            }
            Some(StoreFault::LostReply) => {
                debug!(op, "Injected lost reply");
                Ok(true)
            }
        }
    }

    async fn begin_read(&self, op: &'static str) -> AppResult<()> {
        if self.begin(op).await? {
            return Err(outage(op));
        }
        Ok(())
    }

    /// Apply one mutation under the write lock.
    async fn mutate<T>(
        &self,
        op: &'static str,
        apply: impl FnOnce(&mut HashMap<String, Record>) -> AppResult<T> + Send,
    ) -> AppResult<T> {
        let lost = self.begin(op).await?;
        let result = apply(&mut *self.records.write().await);
        match result {
            Ok(_) if lost => Err(outage(op)),
            result => result,
        }
    }
}

fn outage(op: &str) -> AppError {
    AppError::StoreUnavailable(format!("{op}: injected outage"))
}

fn missing(poll_id: &str) -> AppError {
    AppError::PollNotFound(poll_id.to_string())
}

fn read_count(record: &Record, field: &str) -> AppResult<i64> {
    record.get(field).map_or(Ok(0), |raw| {
        raw.parse()
            .map_err(|_| AppError::CorruptRecord(format!("count {raw:?} in {field:?}")))
    })
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn insert(&self, poll: &Poll) -> AppResult<()> {
        self.mutate("insert", |records| {
            if records.contains_key(&poll.id) {
                return Err(AppError::Conflict(format!("poll id {} already exists", poll.id)));
            }
            records.insert(poll.id.clone(), tuple::encode(poll).into_iter().collect());
            Ok(())
        })
        .await
    }

    async fn fetch(&self, poll_id: &str) -> AppResult<Poll> {
        self.begin_read("fetch").await?;
        let fields = self
            .records
            .read()
            .await
            .get(poll_id)
            .cloned()
            .unwrap_or_default();
        tuple::decode(poll_id, fields)
    }

    async fn increment_option(&self, poll_id: &str, label: &str, delta: i64) -> AppResult<u64> {
        self.mutate("increment_option", |records| {
            let record = records.get_mut(poll_id).ok_or_else(|| missing(poll_id))?;
            let field = TupleField::Options.member(label);
            if !record.contains_key(&field) {
                return Err(AppError::UnknownOption {
                    label: label.to_string(),
                    valid: Vec::new(),
                });
            }
            let next = read_count(record, &field)? + delta;
            if next < 0 {
                return Err(AppError::Conflict(format!("count for {label:?} would go negative")));
            }
            record.insert(field, next.to_string());
            Ok(next as u64)
        })
        .await
    }

    async fn add_voter(&self, poll_id: &str, user_id: &str) -> AppResult<bool> {
        self.mutate("add_voter", |records| {
            let record = records.get_mut(poll_id).ok_or_else(|| missing(poll_id))?;
            let field = TupleField::VotedUsers.member(user_id);
            if record.contains_key(&field) {
                return Ok(false);
            }
            record.insert(field, "1".to_string());
            Ok(true)
        })
        .await
    }

    async fn record_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        label: &str,
    ) -> AppResult<VoteOutcome> {
        self.mutate("record_vote", |records| {
            let record = records.get_mut(poll_id).ok_or_else(|| missing(poll_id))?;

            if record.get(&TupleField::Active.key()).map(String::as_str) != Some(ACTIVE) {
                return Ok(VoteOutcome::Closed);
            }
            let option = TupleField::Options.member(label);
            if !record.contains_key(&option) {
                return Ok(VoteOutcome::UnknownOption);
            }
            let voter = TupleField::VotedUsers.member(user_id);
            if record.contains_key(&voter) {
                return Ok(VoteOutcome::AlreadyVoted);
            }

            let count = read_count(record, &option)? + 1;
            record.insert(voter, "1".to_string());
            record.insert(option, count.to_string());
            Ok(VoteOutcome::Recorded {
                count: count as u64,
            })
        })
        .await
    }

    async fn set_active(&self, poll_id: &str, active: bool) -> AppResult<()> {
        self.mutate("set_active", |records| {
            let record = records.get_mut(poll_id).ok_or_else(|| missing(poll_id))?;
            let field = TupleField::Active.key();
            if active && record.get(&field).map(String::as_str) == Some(INACTIVE) {
                return Err(AppError::Conflict(format!("poll {poll_id} cannot be reopened")));
            }
            record.insert(field, if active { ACTIVE } else { INACTIVE }.to_string());
            Ok(())
        })
        .await
    }

    async fn remove(&self, poll_id: &str) -> AppResult<()> {
        self.mutate("remove", |records| {
            records.remove(poll_id).map(|_| ()).ok_or_else(|| missing(poll_id))
        })
        .await
    }

    fn scan(&self, filter: PollFilter, limit: usize) -> BoxStream<'_, AppResult<Poll>> {
        let index_filter = filter.clone();
        let ids = stream::once(async move {
            if let Err(e) = self.begin_read("scan").await {
                return stream::iter(vec![Err(e)]);
            }
            let records = self.records.read().await;
            let active_only = index_filter.active == Some(true);
            let mut index: Vec<ScanCursor> = records
                .iter()
                .filter(|(_, record)| {
                    !active_only
                        || record.get(&TupleField::Active.key()).map(String::as_str) == Some(ACTIVE)
                })
                .map(|(id, record)| ScanCursor {
                    created_at: record
                        .get(&TupleField::CreatedAt.key())
                        .and_then(|raw| raw.parse().ok())
                        .unwrap_or_default(),
                    poll_id: id.clone(),
                })
                .filter(|cursor| index_filter.after.as_ref().is_none_or(|after| cursor > after))
                .collect();
            index.sort();
            stream::iter(index.into_iter().map(|cursor| Ok(cursor.poll_id)).collect::<Vec<_>>())
        })
        .flatten();

        fetch_matching(self, ids, filter, limit)
    }

    async fn close(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn poll(id: &str, created_at: i64) -> Poll {
        let options = vec!["red".to_string(), "blue".to_string()];
        Poll::validate_create(id, "Colour?", &options, "creator", created_at).unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_fetch() {
        let store = MemoryPollStore::new();
        store.insert(&poll("p1", 1)).await.unwrap();

        let fetched = store.fetch("p1").await.unwrap();
        assert_eq!(fetched, poll("p1", 1));
    }

    #[tokio::test]
    async fn test_insert_existing_id_conflicts() {
        let store = MemoryPollStore::new();
        store.insert(&poll("p1", 1)).await.unwrap();
        let result = store.insert(&poll("p1", 2)).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(store.fetch("p1").await.unwrap().created_at, 1);
    }

    #[tokio::test]
    async fn test_mutations_never_create_records() {
        let store = MemoryPollStore::new();
        assert!(matches!(store.fetch("nope").await, Err(AppError::PollNotFound(_))));
        assert!(matches!(
            store.increment_option("nope", "red", 1).await,
            Err(AppError::PollNotFound(_))
        ));
        assert!(matches!(store.add_voter("nope", "u1").await, Err(AppError::PollNotFound(_))));
        assert!(matches!(
            store.record_vote("nope", "u1", "red").await,
            Err(AppError::PollNotFound(_))
        ));
        assert!(matches!(store.set_active("nope", false).await, Err(AppError::PollNotFound(_))));
        assert!(matches!(store.remove("nope").await, Err(AppError::PollNotFound(_))));
        assert!(matches!(store.fetch("nope").await, Err(AppError::PollNotFound(_))));
    }

    #[tokio::test]
    async fn test_add_voter_reports_existing_member() {
        let store = MemoryPollStore::new();
        store.insert(&poll("p1", 1)).await.unwrap();

        assert!(store.add_voter("p1", "u1").await.unwrap());
        assert!(!store.add_voter("p1", "u1").await.unwrap());
        assert_eq!(store.increment_option("p1", "red", 1).await.unwrap(), 1);

        let fetched = store.fetch("p1").await.unwrap();
        assert_eq!(fetched.voter_count(), 1);
        assert_eq!(fetched.options.get("red"), Some(&1));
    }

    #[tokio::test]
    async fn test_record_vote_outcomes() {
        let store = MemoryPollStore::new();
        store.insert(&poll("p1", 1)).await.unwrap();

        assert_eq!(
            store.record_vote("p1", "u1", "red").await.unwrap(),
            VoteOutcome::Recorded { count: 1 }
        );
        assert_eq!(
            store.record_vote("p1", "u1", "blue").await.unwrap(),
            VoteOutcome::AlreadyVoted
        );
        assert_eq!(
            store.record_vote("p1", "u2", "green").await.unwrap(),
            VoteOutcome::UnknownOption
        );

        store.set_active("p1", false).await.unwrap();
        assert_eq!(store.record_vote("p1", "u3", "red").await.unwrap(), VoteOutcome::Closed);

        let fetched = store.fetch("p1").await.unwrap();
        assert_eq!(fetched.options.get("red"), Some(&1));
        assert_eq!(fetched.options.get("blue"), Some(&0));
        assert_eq!(fetched.voter_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_poll_cannot_be_reopened() {
        let store = MemoryPollStore::new();
        store.insert(&poll("p1", 1)).await.unwrap();

        store.set_active("p1", false).await.unwrap();
        store.set_active("p1", false).await.unwrap();
        assert!(matches!(store.set_active("p1", true).await, Err(AppError::Conflict(_))));
        assert!(!store.fetch("p1").await.unwrap().active);
    }

    #[tokio::test]
    async fn test_scan_filters_orders_and_limits() {
        let store = MemoryPollStore::new();
        store.insert(&poll("c", 3)).await.unwrap();
        store.insert(&poll("a", 1)).await.unwrap();
        store.insert(&poll("b", 2)).await.unwrap();
        store.insert(&poll("d", 4)).await.unwrap();
        store.set_active("b", false).await.unwrap();

        let ids: Vec<String> = store
            .scan(PollFilter::active(), 2)
            .map(|p| p.unwrap().id)
            .collect()
            .await;
        assert_eq!(ids, vec!["a".to_string(), "c".to_string()]);

        // Restartable: a second scan sees the same data again.
        let all: Vec<String> = store
            .scan(PollFilter::all(), 10)
            .map(|p| p.unwrap().id)
            .collect()
            .await;
        assert_eq!(all, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_scan_resumes_after_cursor() {
        let store = MemoryPollStore::new();
        store.insert(&poll("b", 5)).await.unwrap();
        store.insert(&poll("a", 5)).await.unwrap();
        store.insert(&poll("c", 6)).await.unwrap();

        let after = ScanCursor::of(&poll("a", 5));
        let ids: Vec<String> = store
            .scan(PollFilter::all().after(Some(after)), 10)
            .map(|p| p.unwrap().id)
            .collect()
            .await;
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_active_scan_skips_closed_polls_without_reading_them() {
        let store = MemoryPollStore::new();
        for i in 0..200 {
            store.insert(&poll(&format!("p{i:03}"), i)).await.unwrap();
        }
        for i in 0..197 {
            store.set_active(&format!("p{i:03}"), false).await.unwrap();
        }

        let before = store.operation_count();
        let ids: Vec<String> = store
            .scan(PollFilter::active(), 10)
            .map(|p| p.unwrap().id)
            .collect()
            .await;
        assert_eq!(ids, vec!["p197", "p198", "p199"]);
        // One index read plus one fetch per open poll.
        assert_eq!(store.operation_count() - before, 4);
    }

    #[tokio::test]
    async fn test_scan_reports_index_outage() {
        let store = MemoryPollStore::new();
        store.insert(&poll("a", 1)).await.unwrap();
        store.inject_faults([StoreFault::Unavailable]).await;

        let items: Vec<AppResult<Poll>> = store.scan(PollFilter::active(), 10).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(AppError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_in_order() {
        let store = MemoryPollStore::new();
        store
            .inject_faults([StoreFault::Unavailable, StoreFault::Conflict])
            .await;

        assert!(matches!(
            store.insert(&poll("p1", 1)).await,
            Err(AppError::StoreUnavailable(_))
        ));
        assert!(matches!(store.insert(&poll("p1", 1)).await, Err(AppError::Conflict(_))));
        store.insert(&poll("p1", 1)).await.unwrap();
        assert_eq!(store.operation_count(), 3);
    }

    #[tokio::test]
    async fn test_lost_reply_applies_the_write() {
        let store = MemoryPollStore::new();
        store.inject_faults([StoreFault::LostReply]).await;

        assert!(matches!(
            store.insert(&poll("p1", 1)).await,
            Err(AppError::StoreUnavailable(_))
        ));
        assert_eq!(store.fetch("p1").await.unwrap(), poll("p1", 1));
    }

    #[tokio::test]
    async fn test_corrupt_raw_record_is_reported() {
        let store = MemoryPollStore::new();
        store
            .insert_raw("bad", vec![("0".into(), "bad".into()), ("5".into(), "maybe".into())])
            .await;
        assert!(matches!(store.fetch("bad").await, Err(AppError::CorruptRecord(_))));
    }
}
