//! Poll service.
//!
//! Runs the read-validate-write cycle for every poll command. The read gives
//! early, specific errors; the write is a single atomic store operation that
//! re-checks everything it depends on, so concurrent commands on the same poll
//! never need an in-process lock.

use std::collections::BTreeMap;

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use votebot_common::{AppError, AppResult, IdGenerator};
use votebot_db::entities::Poll;
use votebot_db::{DynPollStore, PollFilter, ScanCursor, VoteOutcome};

use super::retry::{RetryPolicy, StoreAccess};

/// Confirmation of an accepted vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub poll_id: String,
    /// The option voted for.
    pub label: String,
    /// That option's count including this vote.
    pub count: u64,
}

/// Read-only projection of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResults {
    pub poll_id: String,
    pub question: String,
    pub options: BTreeMap<String, u64>,
    pub voter_count: usize,
    pub active: bool,
}

impl From<Poll> for PollResults {
    fn from(poll: Poll) -> Self {
        Self {
            voter_count: poll.voter_count(),
            poll_id: poll.id,
            question: poll.question,
            options: poll.options,
            active: poll.active,
        }
    }
}

/// One line of the active poll listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub poll_id: String,
    pub question: String,
}

/// Progress of one active poll listing.
struct Listing<'a> {
    scan: BoxStream<'a, AppResult<Poll>>,
    after: Option<ScanCursor>,
    remaining: usize,
    attempt: u32,
}

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    store: DynPollStore,
    id_gen: IdGenerator,
    retry: RetryPolicy,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub const fn new(store: DynPollStore, retry: RetryPolicy) -> Self {
        Self {
            store,
            id_gen: IdGenerator::new(),
            retry,
        }
    }

    async fn fetch(&self, poll_id: &str) -> AppResult<Poll> {
        self.retry
            .run("fetch", StoreAccess::Read, || self.store.fetch(poll_id))
            .await
    }

    /// Create a poll owned by `creator`.
    ///
    /// An id collision is retried once with a fresh id. A collision right
    /// after a retried outage is first checked against the stored record, since
    /// the timed-out insert may have landed.
    pub async fn create_poll(
        &self,
        question: &str,
        options: &[String],
        creator: &str,
    ) -> AppResult<Poll> {
        let created_at = Utc::now().timestamp();
        let mut poll = Poll::validate_create(self.id_gen.generate(), question, options, creator, created_at)?;

        for attempt in 0..2 {
            let mut calls = 0;
            let result = self
                .retry
                .run("insert", StoreAccess::Write, || {
                    calls += 1;
                    self.store.insert(&poll)
                })
                .await;
            match result {
                Ok(()) => {
                    tracing::info!(
                        poll_id = %poll.id,
                        creator = creator,
                        options = poll.options.len(),
                        "Poll created"
                    );
                    return Ok(poll);
                }
                Err(AppError::Conflict(detail)) => {
                    if calls > 1 && self.landed(&poll).await? {
                        tracing::info!(poll_id = %poll.id, creator = creator, "Timed-out insert had landed");
                        return Ok(poll);
                    }
                    if attempt > 0 {
                        return Err(AppError::StoreWriteFailed(format!(
                            "repeated id collision: {detail}"
                        )));
                    }
                    tracing::warn!(poll_id = %poll.id, detail = %detail, "Poll id collision, regenerating");
                    poll.id = self.id_gen.generate();
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::StoreWriteFailed("poll id allocation failed".to_string()))
    }

    /// Whether the record stored under `poll.id` was created from `poll`.
    async fn landed(&self, poll: &Poll) -> AppResult<bool> {
        match self.fetch(&poll.id).await {
            Ok(stored) => Ok(stored.creator == poll.creator
                && stored.created_at == poll.created_at
                && stored.question == poll.question
                && stored.labels() == poll.labels()),
            Err(AppError::PollNotFound(_) | AppError::CorruptRecord(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Cast `user_id`'s single vote for `label`.
    ///
    /// Surrounding whitespace in `label` is ignored, as it is at creation.
    pub async fn cast_vote(&self, poll_id: &str, user_id: &str, label: &str) -> AppResult<VoteReceipt> {
        let label = label.trim();
        let poll = self.fetch(poll_id).await?;
        poll.validate_vote(user_id, label)?;

        let outcome = self
            .retry
            .run("record_vote", StoreAccess::Write, || {
                self.store.record_vote(poll_id, user_id, label)
            })
            .await?;

        match outcome {
            VoteOutcome::Recorded { count } => {
                tracing::info!(poll_id, user_id, option = label, count, "Vote recorded");
                Ok(VoteReceipt {
                    poll_id: poll_id.to_string(),
                    label: label.to_string(),
                    count,
                })
            }
            VoteOutcome::AlreadyVoted => Err(AppError::AlreadyVoted(poll_id.to_string())),
            VoteOutcome::Closed => Err(AppError::PollClosed(poll_id.to_string())),
            VoteOutcome::UnknownOption => Err(AppError::UnknownOption {
                label: label.to_string(),
                valid: poll.labels(),
            }),
        }
    }

    /// Close a poll. Returns `false` if it was already closed.
    pub async fn close_poll(&self, poll_id: &str, user_id: &str) -> AppResult<bool> {
        let poll = self.fetch(poll_id).await?;
        poll.validate_creator_action(user_id)?;
        if !poll.active {
            return Ok(false);
        }

        self.retry
            .run("set_active", StoreAccess::Write, || {
                self.store.set_active(poll_id, false)
            })
            .await?;
        tracing::info!(poll_id, user_id, "Poll closed");
        Ok(true)
    }

    /// Delete a poll.
    pub async fn delete_poll(&self, poll_id: &str, user_id: &str) -> AppResult<()> {
        let poll = self.fetch(poll_id).await?;
        poll.validate_creator_action(user_id)?;

        self.retry
            .run("remove", StoreAccess::Write, || self.store.remove(poll_id))
            .await?;
        tracing::info!(poll_id, user_id, "Poll deleted");
        Ok(())
    }

    /// Current tally of a poll.
    pub async fn get_results(&self, poll_id: &str) -> AppResult<PollResults> {
        self.fetch(poll_id).await.map(PollResults::from)
    }

    /// Stream up to `limit` open polls, oldest first.
    ///
    /// Corrupt records are logged and skipped. A store outage is retried like
    /// any other read, resuming after the last poll yielded. Once retries run
    /// out the failure is logged and ends the stream. Each call starts a fresh
    /// scan.
    pub fn list_active_polls(&self, limit: usize) -> BoxStream<'_, PollSummary> {
        let listing = Listing {
            scan: self.store.scan(PollFilter::active(), limit),
            after: None,
            remaining: limit,
            attempt: 0,
        };

        stream::unfold(listing, move |mut listing| async move {
            while listing.remaining > 0 {
                match listing.scan.next().await? {
                    Ok(poll) => {
                        listing.after = Some(ScanCursor::of(&poll));
                        listing.remaining -= 1;
                        listing.attempt = 0;
                        let summary = PollSummary {
                            poll_id: poll.id,
                            question: poll.question,
                        };
                        return Some((summary, listing));
                    }
                    Err(AppError::CorruptRecord(detail)) => {
                        tracing::error!(detail = %detail, "Skipping corrupt poll record");
                        listing.remaining -= 1;
                    }
                    Err(err) if self.retry.should_retry(listing.attempt, &err) => {
                        tracing::warn!(attempt = listing.attempt, error = %err, "Poll listing interrupted, resuming");
                        listing.attempt += 1;
                        self.retry.pause().await;
                        let filter = PollFilter::active().after(listing.after.clone());
                        listing.scan = self.store.scan(filter, listing.remaining);
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "Poll listing aborted");
                        return None;
                    }
                }
            }
            None
        })
        .boxed()
    }

    /// Collect [`PollService::list_active_polls`].
    pub async fn active_polls(&self, limit: usize) -> Vec<PollSummary> {
        self.list_active_polls(limit).collect().await
    }
}
