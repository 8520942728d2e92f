//! Wire layout of a stored poll record.
//!
//! A poll is one tuple with fixed field positions:
//!
//! | pos | field        | encoding                              |
//! |-----|--------------|---------------------------------------|
//! | 0   | id           | `"0"` → id                            |
//! | 1   | question     | `"1"` → text                          |
//! | 2   | options      | `"2:<label>"` → decimal count         |
//! | 3   | voted users  | `"3:<user id>"` → `"1"`               |
//! | 4   | creator      | `"4"` → user id                       |
//! | 5   | active       | `"5"` → `"1"` or `"0"`                |
//! | 6   | created at   | `"6"` → decimal unix seconds          |
//!
//! Map and set positions are flattened to one hash field per member, so the
//! store can increment a single count or insert a single voter atomically
//! without rewriting the record. Store scripts get their field names from
//! [`TupleField`]; nothing else hardcodes a position.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use votebot_common::{AppError, AppResult};

use crate::entities::Poll;

/// Encoded value of `active = true`.
pub const ACTIVE: &str = "1";

/// Encoded value of `active = false`.
pub const INACTIVE: &str = "0";

/// A field position in the poll tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TupleField {
    /// Poll identifier.
    Id = 0,
    /// Question text.
    Question = 1,
    /// Option label to count map.
    Options = 2,
    /// Set of voters.
    VotedUsers = 3,
    /// Creator user id.
    Creator = 4,
    /// Open/closed flag.
    Active = 5,
    /// Creation timestamp.
    CreatedAt = 6,
}

impl TupleField {
    /// Tuple position of this field.
    #[must_use]
    pub const fn position(self) -> usize {
        self as usize
    }

    /// Hash field name of a scalar position.
    #[must_use]
    pub fn key(self) -> String {
        self.position().to_string()
    }

    /// Hash field name of one member of a map or set position.
    #[must_use]
    pub fn member(self, member: &str) -> String {
        format!("{}:{member}", self.position())
    }
}

/// Flatten a poll into hash field/value pairs.
#[must_use]
pub fn encode(poll: &Poll) -> Vec<(String, String)> {
    let mut fields = Vec::with_capacity(5 + poll.options.len() + poll.voted_users.len());
    fields.push((TupleField::Id.key(), poll.id.clone()));
    fields.push((TupleField::Question.key(), poll.question.clone()));
    for (label, count) in &poll.options {
        fields.push((TupleField::Options.member(label), count.to_string()));
    }
    for user in &poll.voted_users {
        fields.push((TupleField::VotedUsers.member(user), "1".to_string()));
    }
    fields.push((TupleField::Creator.key(), poll.creator.clone()));
    fields.push((
        TupleField::Active.key(),
        if poll.active { ACTIVE } else { INACTIVE }.to_string(),
    ));
    fields.push((TupleField::CreatedAt.key(), poll.created_at.to_string()));
    fields
}

/// Rebuild a poll from its hash fields.
///
/// An empty map means the record does not exist. Anything else that does not
/// fit the layout is a [`AppError::CorruptRecord`].
pub fn decode(poll_id: &str, fields: HashMap<String, String>) -> AppResult<Poll> {
    if fields.is_empty() {
        return Err(AppError::PollNotFound(poll_id.to_string()));
    }

    let corrupt = |what: &str| AppError::CorruptRecord(format!("poll {poll_id}: {what}"));

    let mut id = None;
    let mut question = None;
    let mut creator = None;
    let mut active = None;
    let mut created_at = None;
    let mut options = BTreeMap::new();
    let mut voted_users = BTreeSet::new();

    for (name, value) in fields {
        let (position, member) = match name.split_once(':') {
            Some((position, member)) => (position, Some(member)),
            None => (name.as_str(), None),
        };
        let position: usize = position
            .parse()
            .map_err(|_| corrupt(&format!("unexpected field {name:?}")))?;

        match (position, member) {
            (p, None) if p == TupleField::Id.position() => id = Some(value),
            (p, None) if p == TupleField::Question.position() => question = Some(value),
            (p, None) if p == TupleField::Creator.position() => creator = Some(value),
            (p, None) if p == TupleField::Active.position() => {
                active = Some(match value.as_str() {
                    ACTIVE => true,
                    INACTIVE => false,
                    _ => return Err(corrupt(&format!("active flag {value:?}"))),
                });
            }
            (p, None) if p == TupleField::CreatedAt.position() => {
                created_at = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| corrupt(&format!("timestamp {value:?}")))?,
                );
            }
            (p, Some(label)) if p == TupleField::Options.position() => {
                if label.is_empty() {
                    return Err(corrupt("empty option label"));
                }
                let count = value
                    .parse::<u64>()
                    .map_err(|_| corrupt(&format!("count {value:?} for option {label:?}")))?;
                options.insert(label.to_string(), count);
            }
            (p, Some(user)) if p == TupleField::VotedUsers.position() => {
                voted_users.insert(user.to_string());
            }
            _ => return Err(corrupt(&format!("unexpected field {name:?}"))),
        }
    }

    let poll = Poll {
        id: id.ok_or_else(|| corrupt("missing id"))?,
        question: question.ok_or_else(|| corrupt("missing question"))?,
        options,
        voted_users,
        creator: creator.ok_or_else(|| corrupt("missing creator"))?,
        active: active.ok_or_else(|| corrupt("missing active flag"))?,
        created_at: created_at.ok_or_else(|| corrupt("missing timestamp"))?,
    };

    if poll.options.is_empty() {
        return Err(corrupt("no options"));
    }
    if poll.id != poll_id {
        return Err(corrupt(&format!("stored id {:?}", poll.id)));
    }
    if poll.total_votes() != poll.voter_count() as u64 {
        return Err(corrupt(&format!(
            "{} votes counted for {} voters",
            poll.total_votes(),
            poll.voter_count()
        )));
    }

    Ok(poll)
}
