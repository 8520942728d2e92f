//! Redis poll store.
//!
//! One hash per poll at `{prefix}:poll:{id}`, laid out as described in
//! [`crate::tuple`]. Two lexically ordered sorted sets index the polls by
//! [`ScanCursor::index_member`]: `{prefix}:polls` holds every poll and
//! `{prefix}:polls:active` only the open ones. Every mutation is a Lua script
//! so Redis applies the checks, the write and the index update as one atomic
//! step.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use fred::clients::Client as RedisClient;
use fred::error::{Error as RedisError, ErrorKind as RedisErrorKind};
use fred::interfaces::{ClientLike, HashesInterface, LuaInterface, SortedSetsInterface};
use fred::types::config::Config as FredConfig;
use fred::types::sorted_sets::{ZRange, ZRangeBound, ZRangeKind};
use futures::stream::{self, BoxStream};
use tracing::{debug, info, warn};
use votebot_common::config::{RedisConfig, StoreConfig};
use votebot_common::{AppError, AppResult};

use super::{PollFilter, PollStore, ScanCursor, VoteOutcome, fetch_matching, flatten_pages};
use crate::entities::Poll;
use crate::tuple::{self, ACTIVE, INACTIVE, TupleField};

/// Ids fetched from the index per round trip while scanning.
const SCAN_PAGE_SIZE: i64 = 50;

// Script status codes. Non-negative results are payloads.
const NOT_FOUND: i64 = -1;
const CLOSED: i64 = -2;
const UNKNOWN_OPTION: i64 = -3;
const ALREADY_VOTED: i64 = -4;
const REOPEN_REFUSED: i64 = -5;
const BAD_COUNT: i64 = -6;
const NEGATIVE_COUNT: i64 = -7;

/// KEYS: poll, index, active index. ARGV: index member, active flag, active
/// value, field/value pairs...
const INSERT_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
redis.call('HSET', KEYS[1], unpack(ARGV, 4))
redis.call('ZADD', KEYS[2], 0, ARGV[1])
if ARGV[2] == ARGV[3] then redis.call('ZADD', KEYS[3], 0, ARGV[1]) end
return 1
";

/// KEYS: poll. ARGV: option field, delta.
const INCREMENT_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then return -1 end
local raw = redis.call('HGET', KEYS[1], ARGV[1])
if not raw then return -3 end
if not string.match(raw, '^%d+$') then return -6 end
local next = tonumber(raw) + tonumber(ARGV[2])
if next < 0 then return -7 end
redis.call('HSET', KEYS[1], ARGV[1], next)
return next
";

/// KEYS: poll. ARGV: voter field.
const ADD_VOTER_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then return -1 end
return redis.call('HSETNX', KEYS[1], ARGV[1], '1')
";

/// KEYS: poll. ARGV: active field, active value, option field, voter field.
const RECORD_VOTE_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then return -1 end
if redis.call('HGET', KEYS[1], ARGV[1]) ~= ARGV[2] then return -2 end
local raw = redis.call('HGET', KEYS[1], ARGV[3])
if not raw then return -3 end
if not string.match(raw, '^%d+$') then return -6 end
if redis.call('HSETNX', KEYS[1], ARGV[4], '1') == 0 then return -4 end
return redis.call('HINCRBY', KEYS[1], ARGV[3], 1)
";

/// KEYS: poll, active index. ARGV: active field, new value, inactive value,
/// created-at field, id.
///
/// The index member padding must match [`ScanCursor::index_member`].
const SET_ACTIVE_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then return -1 end
if ARGV[2] ~= ARGV[3] and redis.call('HGET', KEYS[1], ARGV[1]) == ARGV[3] then return -5 end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
local created = redis.call('HGET', KEYS[1], ARGV[4]) or ''
local member = string.rep('0', 20 - #created) .. created .. ':' .. ARGV[5]
if ARGV[2] == ARGV[3] then
  redis.call('ZREM', KEYS[2], member)
else
  redis.call('ZADD', KEYS[2], 0, member)
end
return 1
";

/// KEYS: poll, index, active index. ARGV: created-at field, id.
const REMOVE_SCRIPT: &str = r"
local created = redis.call('HGET', KEYS[1], ARGV[1]) or ''
local member = string.rep('0', 20 - #created) .. created .. ':' .. ARGV[2]
local removed = redis.call('DEL', KEYS[1])
redis.call('ZREM', KEYS[2], member)
redis.call('ZREM', KEYS[3], member)
if removed == 0 then return -1 end
return 1
";

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

/// Key of the hash holding one poll.
fn poll_key(prefix: &str, poll_id: &str) -> String {
    format!("{prefix}:poll:{poll_id}")
}

/// Key of the index of every poll.
fn index_key(prefix: &str) -> String {
    format!("{prefix}:polls")
}

/// Key of the index of open polls.
fn active_index_key(prefix: &str) -> String {
    format!("{prefix}:polls:active")
}

/// Lower bound of the index page following `after`.
fn page_start(after: Option<String>) -> ZRange {
    match after {
        Some(member) => ZRange {
            kind: ZRangeKind::Exclusive,
            range: ZRangeBound::Lex(member),
        },
        None => ZRange {
            kind: ZRangeKind::Inclusive,
            range: ZRangeBound::NegInfinityLex,
        },
    }
}

fn classify(op: &str, access: Access, err: &RedisError) -> AppError {
    match err.kind() {
        RedisErrorKind::IO
        | RedisErrorKind::Timeout
        | RedisErrorKind::Canceled
        | RedisErrorKind::Backpressure
        | RedisErrorKind::Routing
        | RedisErrorKind::Cluster
        | RedisErrorKind::Sentinel => AppError::StoreUnavailable(format!("{op}: {err}")),
        RedisErrorKind::Parse => AppError::CorruptRecord(format!("{op}: {err}")),
        _ => match access {
            Access::Read => AppError::StoreReadFailed(format!("{op}: {err}")),
            Access::Write => AppError::StoreWriteFailed(format!("{op}: {err}")),
        },
    }
}

fn unexpected(op: &str, poll_id: &str, code: i64) -> AppError {
    match code {
        NOT_FOUND => AppError::PollNotFound(poll_id.to_string()),
        BAD_COUNT => AppError::CorruptRecord(format!("{op}: poll {poll_id} has a malformed count")),
        _ => AppError::StoreWriteFailed(format!("{op}: unexpected script result {code}")),
    }
}

/// Poll store backed by Redis hashes.
pub struct RedisPollStore {
    client: RedisClient,
    prefix: String,
    timeout: Duration,
}

impl RedisPollStore {
    /// Connect to the Redis server in `redis`.
    ///
    /// Fails with [`AppError::Config`] on a malformed URL and with
    /// [`AppError::StoreUnavailable`] if the server cannot be reached within
    /// the store timeout.
    pub async fn connect(redis: &RedisConfig, store: &StoreConfig) -> AppResult<Self> {
        let fred_config = FredConfig::from_url(&redis.url)
            .map_err(|e| AppError::Config(format!("invalid Redis URL: {e}")))?;
        let client = RedisClient::new(fred_config, None, None, None);
        client.connect();

        let timeout = store.timeout();
        match tokio::time::timeout(timeout, client.wait_for_connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(classify("connect", Access::Read, &e)),
            Err(_) => {
                return Err(AppError::StoreUnavailable(format!(
                    "connect: no connection within {timeout:?}"
                )));
            }
        }

        info!(prefix = %redis.prefix, "Connected to Redis poll store");
        Ok(Self {
            client,
            prefix: redis.prefix.clone(),
            timeout,
        })
    }

    async fn call<R, F>(&self, op: &'static str, access: Access, fut: F) -> AppResult<R>
    where
        F: Future<Output = Result<R, RedisError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| classify(op, access, &e)),
            Err(_) => {
                warn!(op, timeout = ?self.timeout, "Store call timed out");
                Err(AppError::StoreUnavailable(format!(
                    "{op}: timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    async fn script(
        &self,
        op: &'static str,
        source: &'static str,
        keys: Vec<String>,
        args: Vec<String>,
    ) -> AppResult<i64> {
        self.call(op, Access::Write, self.client.eval(source, keys, args))
            .await
    }

    /// Index members strictly after `after`, at most one page.
    async fn page(&self, index: &str, after: Option<String>) -> AppResult<Vec<String>> {
        let end = ZRange {
            kind: ZRangeKind::Inclusive,
            range: ZRangeBound::InfiniteLex,
        };
        self.call(
            "scan",
            Access::Read,
            self.client
                .zrangebylex(index, page_start(after), end, Some((0, SCAN_PAGE_SIZE))),
        )
        .await
    }
}

#[async_trait]
impl PollStore for RedisPollStore {
    async fn insert(&self, poll: &Poll) -> AppResult<()> {
        let mut args = vec![
            ScanCursor::of(poll).index_member(),
            if poll.active { ACTIVE } else { INACTIVE }.to_string(),
            ACTIVE.to_string(),
        ];
        for (field, value) in tuple::encode(poll) {
            args.push(field);
            args.push(value);
        }
        let keys = vec![
            poll_key(&self.prefix, &poll.id),
            index_key(&self.prefix),
            active_index_key(&self.prefix),
        ];

        match self.script("insert", INSERT_SCRIPT, keys, args).await? {
            1 => {
                debug!(poll_id = %poll.id, "Inserted poll");
                Ok(())
            }
            0 => Err(AppError::Conflict(format!("poll id {} already exists", poll.id))),
            code => Err(unexpected("insert", &poll.id, code)),
        }
    }

    async fn fetch(&self, poll_id: &str) -> AppResult<Poll> {
        let key = poll_key(&self.prefix, poll_id);
        let fields: HashMap<String, String> = self
            .call("fetch", Access::Read, self.client.hgetall(key))
            .await?;
        tuple::decode(poll_id, fields)
    }

    async fn increment_option(&self, poll_id: &str, label: &str, delta: i64) -> AppResult<u64> {
        let keys = vec![poll_key(&self.prefix, poll_id)];
        let args = vec![TupleField::Options.member(label), delta.to_string()];

        match self.script("increment_option", INCREMENT_SCRIPT, keys, args).await? {
            count if count >= 0 => Ok(count as u64),
            UNKNOWN_OPTION => Err(AppError::UnknownOption {
                label: label.to_string(),
                valid: Vec::new(),
            }),
            NEGATIVE_COUNT => Err(AppError::Conflict(format!(
                "count for {label:?} would go negative"
            ))),
            code => Err(unexpected("increment_option", poll_id, code)),
        }
    }

    async fn add_voter(&self, poll_id: &str, user_id: &str) -> AppResult<bool> {
        let keys = vec![poll_key(&self.prefix, poll_id)];
        let args = vec![TupleField::VotedUsers.member(user_id)];

        match self.script("add_voter", ADD_VOTER_SCRIPT, keys, args).await? {
            1 => Ok(true),
            0 => Ok(false),
            code => Err(unexpected("add_voter", poll_id, code)),
        }
    }

    async fn record_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        label: &str,
    ) -> AppResult<VoteOutcome> {
        let keys = vec![poll_key(&self.prefix, poll_id)];
        let args = vec![
            TupleField::Active.key(),
            ACTIVE.to_string(),
            TupleField::Options.member(label),
            TupleField::VotedUsers.member(user_id),
        ];

        match self.script("record_vote", RECORD_VOTE_SCRIPT, keys, args).await? {
            count if count > 0 => Ok(VoteOutcome::Recorded {
                count: count as u64,
            }),
            CLOSED => Ok(VoteOutcome::Closed),
            UNKNOWN_OPTION => Ok(VoteOutcome::UnknownOption),
            ALREADY_VOTED => Ok(VoteOutcome::AlreadyVoted),
            code => Err(unexpected("record_vote", poll_id, code)),
        }
    }

    async fn set_active(&self, poll_id: &str, active: bool) -> AppResult<()> {
        let keys = vec![
            poll_key(&self.prefix, poll_id),
            active_index_key(&self.prefix),
        ];
        let args = vec![
            TupleField::Active.key(),
            if active { ACTIVE } else { INACTIVE }.to_string(),
            INACTIVE.to_string(),
            TupleField::CreatedAt.key(),
            poll_id.to_string(),
        ];

        match self.script("set_active", SET_ACTIVE_SCRIPT, keys, args).await? {
            1 => Ok(()),
            REOPEN_REFUSED => Err(AppError::Conflict(format!(
                "poll {poll_id} cannot be reopened"
            ))),
            code => Err(unexpected("set_active", poll_id, code)),
        }
    }

    async fn remove(&self, poll_id: &str) -> AppResult<()> {
        let keys = vec![
            poll_key(&self.prefix, poll_id),
            index_key(&self.prefix),
            active_index_key(&self.prefix),
        ];
        let args = vec![TupleField::CreatedAt.key(), poll_id.to_string()];

        match self.script("remove", REMOVE_SCRIPT, keys, args).await? {
            1 => Ok(()),
            code => Err(unexpected("remove", poll_id, code)),
        }
    }

    fn scan(&self, filter: PollFilter, limit: usize) -> BoxStream<'_, AppResult<Poll>> {
        let index = if filter.active == Some(true) {
            active_index_key(&self.prefix)
        } else {
            index_key(&self.prefix)
        };
        let start = filter.after.as_ref().map(ScanCursor::index_member);

        // Each page resumes after the last member seen, so polls removed
        // between pages never shift the window.
        let pages = stream::unfold(Some(start), move |after| {
            let index = index.clone();
            async move {
                let after = after?;
                match self.page(&index, after).await {
                    Ok(members) => {
                        let next = (members.len() as i64 == SCAN_PAGE_SIZE)
                            .then(|| members.last().cloned());
                        let ids = members
                            .iter()
                            .map(|member| ScanCursor::from_index_member(member).map(|c| c.poll_id))
                            .collect::<Vec<_>>();
                        Some((Ok(ids), next))
                    }
                    Err(e) => Some((Err(e), None)),
                }
            }
        });

        fetch_matching(self, flatten_pages(pages), filter, limit)
    }

    async fn close(&self) -> AppResult<()> {
        self.call("close", Access::Write, self.client.quit()).await?;
        info!("Closed Redis poll store connection");
        Ok(())
    }
}
