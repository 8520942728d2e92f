//! Poll store adapters.
//!
//! [`PollStore`] is the only way the rest of the system touches stored polls.
//! Every mutation is a single atomic operation on one record; none of them is
//! a read-modify-write of the whole record.

mod memory;
mod redis;

pub use memory::{MemoryPollStore, StoreFault};
pub use redis::RedisPollStore;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use votebot_common::{AppError, AppResult};

use crate::entities::Poll;

/// Result of the fused atomic vote operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The voter was added and the option incremented.
    Recorded {
        /// The option's count after this vote.
        count: u64,
    },
    /// The user was already in the voter set. Nothing changed.
    AlreadyVoted,
    /// The poll was closed. Nothing changed.
    Closed,
    /// The poll has no such option. Nothing changed.
    UnknownOption,
}

/// Position of a poll in the creation index: creation time, then id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScanCursor {
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// Poll id, breaking ties between polls created in the same second.
    pub poll_id: String,
}

impl ScanCursor {
    /// The cursor just at `poll`.
    #[must_use]
    pub fn of(poll: &Poll) -> Self {
        Self {
            created_at: poll.created_at,
            poll_id: poll.id.clone(),
        }
    }

    /// Index member that sorts lexically in cursor order for non-negative
    /// creation times.
    ///
    /// The creation time is left-padded with zeros to 20 characters. The
    /// Redis index scripts build the same member from the stored field.
    #[must_use]
    pub fn index_member(&self) -> String {
        format!("{:0>20}:{}", self.created_at, self.poll_id)
    }

    /// Parse an index member built by [`ScanCursor::index_member`].
    pub fn from_index_member(member: &str) -> AppResult<Self> {
        member
            .split_once(':')
            .and_then(|(created_at, poll_id)| {
                Some(Self {
                    created_at: created_at.parse().ok()?,
                    poll_id: poll_id.to_string(),
                })
            })
            .ok_or_else(|| AppError::CorruptRecord(format!("index member {member:?}")))
    }
}

/// Which polls a scan yields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollFilter {
    /// Only polls whose `active` flag matches.
    pub active: Option<bool>,
    /// Only polls strictly after this position.
    pub after: Option<ScanCursor>,
}

impl PollFilter {
    /// Match every poll.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match open polls only.
    #[must_use]
    pub fn active() -> Self {
        Self {
            active: Some(true),
            ..Self::default()
        }
    }

    /// Resume after `cursor`.
    #[must_use]
    pub fn after(mut self, cursor: Option<ScanCursor>) -> Self {
        self.after = cursor;
        self
    }

    /// Whether `poll` passes the filter.
    #[must_use]
    pub fn matches(&self, poll: &Poll) -> bool {
        self.active.is_none_or(|active| poll.active == active)
            && self
                .after
                .as_ref()
                .is_none_or(|after| ScanCursor::of(poll) > *after)
    }
}

/// Atomic single-record operations on the poll tuple store.
///
/// Implementations must be safe to share between concurrently running
/// commands. A mutation on a missing record fails with
/// [`AppError::PollNotFound`] and never creates the record.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Insert a new poll. Fails with [`AppError::Conflict`] if the id exists.
    async fn insert(&self, poll: &Poll) -> AppResult<()>;

    /// Read one poll.
    async fn fetch(&self, poll_id: &str) -> AppResult<Poll>;

    /// Atomically add `delta` to one option's count and return the new count.
    ///
    /// Keeping the tally equal to the voter count is the caller's job; the
    /// vote path uses [`PollStore::record_vote`] instead.
    async fn increment_option(&self, poll_id: &str, label: &str, delta: i64) -> AppResult<u64>;

    /// Atomically insert a voter. Returns `false` if they were already present.
    async fn add_voter(&self, poll_id: &str, user_id: &str) -> AppResult<bool>;

    /// Atomically re-check the poll and apply one vote.
    ///
    /// The voter insert and the option increment happen in the same store
    /// operation, together with the `active` and option checks, so a vote that
    /// raced a close or a duplicate vote changes nothing.
    async fn record_vote(&self, poll_id: &str, user_id: &str, label: &str)
    -> AppResult<VoteOutcome>;

    /// Set the `active` flag. Reopening a closed poll is refused with
    /// [`AppError::Conflict`].
    async fn set_active(&self, poll_id: &str, active: bool) -> AppResult<()>;

    /// Delete a poll.
    async fn remove(&self, poll_id: &str) -> AppResult<()>;

    /// Stream up to `limit` polls matching `filter`, oldest first.
    ///
    /// The stream is lazy: records are read as it is polled. Dropping it and
    /// calling `scan` again starts over, or picks up at `filter.after`.
    /// Open polls are listed from an index of open polls only, so closed
    /// polls cost nothing to skip.
    fn scan(&self, filter: PollFilter, limit: usize) -> BoxStream<'_, AppResult<Poll>>;

    /// Release the underlying connection.
    async fn close(&self) -> AppResult<()>;
}

/// Shared handle to a poll store.
pub type DynPollStore = Arc<dyn PollStore>;

/// Turn a stream of ids into a filtered, bounded stream of polls.
///
/// Records deleted between listing and fetching are skipped. Any other error
/// is passed through.
fn fetch_matching<'a, S, I>(
    store: &'a S,
    ids: I,
    filter: PollFilter,
    limit: usize,
) -> BoxStream<'a, AppResult<Poll>>
where
    S: PollStore + ?Sized,
    I: Stream<Item = AppResult<String>> + Send + 'a,
{
    ids.then(move |id| async move {
        match id {
            Ok(id) => store.fetch(&id).await,
            Err(e) => Err(e),
        }
    })
    .filter_map(move |poll| {
        let keep = match &poll {
            Ok(poll) => filter.matches(poll),
            Err(AppError::PollNotFound(_)) => false,
            Err(_) => true,
        };
        async move { keep.then_some(poll) }
    })
    .take(limit)
    .boxed()
}

/// A stream over one or more pages of ids, stopping after the first error.
fn flatten_pages<'a, P>(pages: P) -> impl Stream<Item = AppResult<String>> + Send + 'a
where
    P: Stream<Item = AppResult<Vec<AppResult<String>>>> + Send + 'a,
{
    pages.flat_map(|page| match page {
        Ok(ids) => stream::iter(ids).left_stream(),
        Err(e) => stream::once(async move { Err(e) }).right_stream(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cursor(created_at: i64, poll_id: &str) -> ScanCursor {
        ScanCursor {
            created_at,
            poll_id: poll_id.to_string(),
        }
    }

    #[test]
    fn test_index_member_layout() {
        let member = cursor(1_700_000_000, "abc").index_member();
        assert_eq!(member, "00000000001700000000:abc");
        assert_eq!(ScanCursor::from_index_member(&member).unwrap(), cursor(1_700_000_000, "abc"));
        assert!(matches!(
            ScanCursor::from_index_member("garbage"),
            Err(AppError::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_index_members_sort_like_cursors() {
        let mut cursors = vec![cursor(20, "a"), cursor(9, "z"), cursor(20, "0"), cursor(100, "b")];
        let mut members: Vec<String> = cursors.iter().map(ScanCursor::index_member).collect();
        cursors.sort();
        members.sort();
        let expected: Vec<String> = cursors.iter().map(ScanCursor::index_member).collect();
        assert_eq!(members, expected);
    }

    #[test]
    fn test_filter_after_is_exclusive() {
        let options = vec!["yes".to_string()];
        let poll = Poll::validate_create("b", "q", &options, "u", 10).unwrap();

        assert!(PollFilter::all().after(Some(cursor(10, "a"))).matches(&poll));
        assert!(!PollFilter::all().after(Some(cursor(10, "b"))).matches(&poll));
        assert!(!PollFilter::all().after(Some(cursor(11, "a"))).matches(&poll));
    }
}
