//! Poll entity.
//!
//! The in-memory shape of a poll record plus the pure rules that guard its
//! invariants. Nothing here performs I/O; the store adapter persists whatever
//! these functions approve.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use votebot_common::{AppError, AppResult};

/// Maximum number of options a poll may offer.
pub const MAX_OPTIONS: usize = 25;

/// Maximum length of a single option label, in characters.
pub const MAX_OPTION_LEN: usize = 100;

/// Maximum length of the question, in characters.
pub const MAX_QUESTION_LEN: usize = 500;

/// A multiple-choice poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    /// Store primary key.
    pub id: String,
    /// The prompt shown to voters.
    pub question: String,
    /// Option label to vote count. The label set never changes.
    pub options: BTreeMap<String, u64>,
    /// Users who have voted. Grow-only.
    pub voted_users: BTreeSet<String>,
    /// User allowed to close and delete the poll.
    pub creator: String,
    /// False once the poll has been closed.
    pub active: bool,
    /// Creation time, unix seconds.
    pub created_at: i64,
}

impl Poll {
    /// Validate creation input and build a fresh, active poll.
    ///
    /// The question and labels are trimmed. Duplicate labels are rejected
    /// rather than collapsed so the voter always sees exactly the options they
    /// typed.
    pub fn validate_create(
        id: impl Into<String>,
        question: &str,
        option_labels: &[String],
        creator: &str,
        created_at: i64,
    ) -> AppResult<Self> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidArguments(
                "Poll question cannot be empty".to_string(),
            ));
        }
        if question.chars().count() > MAX_QUESTION_LEN {
            return Err(AppError::InvalidArguments(format!(
                "Poll question is too long (max {MAX_QUESTION_LEN} chars)"
            )));
        }
        if creator.is_empty() {
            return Err(AppError::InvalidArguments(
                "Poll creator is required".to_string(),
            ));
        }
        if option_labels.is_empty() {
            return Err(AppError::InvalidArguments(
                "Poll must have at least 1 option".to_string(),
            ));
        }
        if option_labels.len() > MAX_OPTIONS {
            return Err(AppError::InvalidArguments(format!(
                "Poll cannot have more than {MAX_OPTIONS} options"
            )));
        }

        let mut seen = HashSet::with_capacity(option_labels.len());
        for label in option_labels.iter().map(|l| l.trim()) {
            if label.is_empty() {
                return Err(AppError::InvalidArguments(
                    "Poll options cannot be empty".to_string(),
                ));
            }
            if label.chars().count() > MAX_OPTION_LEN {
                return Err(AppError::InvalidArguments(format!(
                    "Poll option is too long (max {MAX_OPTION_LEN} chars)"
                )));
            }
            if !seen.insert(label) {
                return Err(AppError::InvalidArguments(format!(
                    "Duplicate poll option: {label}"
                )));
            }
        }

        Ok(Self {
            id: id.into(),
            question: question.to_string(),
            options: seen.into_iter().map(|l| (l.to_string(), 0)).collect(),
            voted_users: BTreeSet::new(),
            creator: creator.to_string(),
            active: true,
            created_at,
        })
    }

    /// Check whether `user_id` may vote for `label` right now.
    pub fn validate_vote(&self, user_id: &str, label: &str) -> AppResult<()> {
        if !self.active {
            return Err(AppError::PollClosed(self.id.clone()));
        }
        if !self.options.contains_key(label) {
            return Err(AppError::UnknownOption {
                label: label.to_string(),
                valid: self.labels(),
            });
        }
        if self.voted_users.contains(user_id) {
            return Err(AppError::AlreadyVoted(self.id.clone()));
        }
        Ok(())
    }

    /// The state after `user_id` votes for `label`.
    ///
    /// Assumes [`Poll::validate_vote`] passed. Persisting the result is the
    /// caller's job, and must go through the store's atomic vote operation.
    #[must_use]
    pub fn apply_vote(&self, user_id: &str, label: &str) -> Self {
        let mut next = self.clone();
        if let Some(count) = next.options.get_mut(label) {
            *count += 1;
        }
        next.voted_users.insert(user_id.to_string());
        next
    }

    /// Check that `user_id` created this poll. Used by close and delete.
    pub fn validate_creator_action(&self, user_id: &str) -> AppResult<()> {
        if self.creator == user_id {
            Ok(())
        } else {
            Err(AppError::NotCreator)
        }
    }

    /// Option labels in display order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.options.keys().cloned().collect()
    }

    /// Number of users who have voted.
    #[must_use]
    pub fn voter_count(&self) -> usize {
        self.voted_users.len()
    }

    /// Sum of all option counts.
    #[must_use]
    pub fn total_votes(&self) -> u64 {
        self.options.values().sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn colors() -> Poll {
        Poll::validate_create("p1", "Favorite color?", &labels(&["red", "blue"]), "u0", 1_700_000_000)
            .unwrap()
    }

    #[test]
    fn test_validate_create_builds_active_empty_poll() {
        let poll = colors();
        assert!(poll.active);
        assert_eq!(poll.question, "Favorite color?");
        assert_eq!(poll.options.get("red"), Some(&0));
        assert_eq!(poll.options.get("blue"), Some(&0));
        assert!(poll.voted_users.is_empty());
        assert_eq!(poll.creator, "u0");
    }

    #[test]
    fn test_validate_create_rejects_bad_input() {
        let empty_question = Poll::validate_create("p", "   ", &labels(&["a"]), "u", 0);
        assert!(matches!(empty_question, Err(AppError::InvalidArguments(_))));

        let no_options = Poll::validate_create("p", "q", &[], "u", 0);
        assert!(matches!(no_options, Err(AppError::InvalidArguments(_))));

        let empty_label = Poll::validate_create("p", "q", &labels(&["a", ""]), "u", 0);
        assert!(matches!(empty_label, Err(AppError::InvalidArguments(_))));

        let no_creator = Poll::validate_create("p", "q", &labels(&["a"]), "", 0);
        assert!(matches!(no_creator, Err(AppError::InvalidArguments(_))));

        let too_many: Vec<String> = (0..=MAX_OPTIONS).map(|i| format!("o{i}")).collect();
        let result = Poll::validate_create("p", "q", &too_many, "u", 0);
        assert!(matches!(result, Err(AppError::InvalidArguments(_))));
    }

    #[test]
    fn test_validate_create_rejects_duplicate_labels() {
        let result = Poll::validate_create("p", "q", &labels(&["yes", "no", "yes"]), "u", 0);
        assert!(matches!(result, Err(AppError::InvalidArguments(msg)) if msg.contains("yes")));
    }

    #[test]
    fn test_labels_are_trimmed() {
        let poll = Poll::validate_create("p", "q", &labels(&[" pizza ", "sushi"]), "u", 0).unwrap();
        assert_eq!(poll.labels(), labels(&["pizza", "sushi"]));

        let blank = Poll::validate_create("p", "q", &labels(&["a", "   "]), "u", 0);
        assert!(matches!(blank, Err(AppError::InvalidArguments(_))));

        let padded_duplicate = Poll::validate_create("p", "q", &labels(&["a ", "a"]), "u", 0);
        assert!(matches!(padded_duplicate, Err(AppError::InvalidArguments(msg)) if msg.contains("Duplicate")));
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        let poll = Poll::validate_create("p", "q", &labels(&["Yes", "yes"]), "u", 0).unwrap();
        assert_eq!(poll.options.len(), 2);
        assert!(matches!(
            poll.validate_vote("u1", "YES"),
            Err(AppError::UnknownOption { .. })
        ));
    }

    #[test]
    fn test_single_option_poll_is_allowed() {
        let poll = Poll::validate_create("p", "Pizza Friday?", &labels(&["yes"]), "u", 0).unwrap();
        assert_eq!(poll.labels(), vec!["yes".to_string()]);
    }

    #[test]
    fn test_validate_vote_checks_in_order() {
        let mut poll = colors();
        poll.voted_users.insert("u1".into());
        poll.active = false;

        // Closed wins over everything else.
        assert!(matches!(poll.validate_vote("u1", "green"), Err(AppError::PollClosed(_))));

        poll.active = true;
        match poll.validate_vote("u1", "green") {
            Err(AppError::UnknownOption { label, valid }) => {
                assert_eq!(label, "green");
                assert_eq!(valid, vec!["blue".to_string(), "red".to_string()]);
            }
            other => panic!("expected UnknownOption, got {other:?}"),
        }

        assert!(matches!(poll.validate_vote("u1", "red"), Err(AppError::AlreadyVoted(_))));
        assert!(poll.validate_vote("u2", "red").is_ok());
    }

    #[test]
    fn test_apply_vote_keeps_tally_consistent() {
        let poll = colors();
        let poll = poll.apply_vote("u1", "red");
        let poll = poll.apply_vote("u2", "red");
        let poll = poll.apply_vote("u3", "blue");

        assert_eq!(poll.options.get("red"), Some(&2));
        assert_eq!(poll.options.get("blue"), Some(&1));
        assert_eq!(poll.total_votes(), poll.voter_count() as u64);
    }

    #[test]
    fn test_apply_vote_leaves_original_untouched() {
        let poll = colors();
        let next = poll.apply_vote("u1", "red");
        assert_eq!(poll.total_votes(), 0);
        assert_eq!(next.total_votes(), 1);
    }

    #[test]
    fn test_validate_creator_action() {
        let poll = colors();
        assert!(poll.validate_creator_action("u0").is_ok());
        assert!(matches!(poll.validate_creator_action("u1"), Err(AppError::NotCreator)));
    }
}
