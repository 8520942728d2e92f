//! Chat command parsing.
//!
//! A command is `[trigger] <verb> [args...]`. Arguments are separated by
//! whitespace; double quotes group words into one argument and `""` is an
//! empty argument.

/// A parsed chat command.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `create <question> <option>...`
    Create {
        question: String,
        options: Vec<String>,
    },
    /// `vote <poll id> <option words...>`
    Vote { poll_id: String, label: String },
    /// `results <poll id>`
    Results { poll_id: String },
    /// `close <poll id>`
    Close { poll_id: String },
    /// `delete <poll id>`
    Delete { poll_id: String },
    /// `list`
    List,
    /// `help`, or anything that did not parse.
    Help,
}

/// Split `input` into arguments.
///
/// Quote characters toggle grouping and are trimmed from the ends of each
/// argument.
#[must_use]
pub fn tokenize(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut buffer = String::new();
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                buffer.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !buffer.is_empty() {
                    args.push(buffer.trim_matches('"').to_string());
                    buffer.clear();
                }
            }
            c => buffer.push(c),
        }
    }
    if !buffer.is_empty() {
        args.push(buffer.trim_matches('"').to_string());
    }

    args
}

/// Return what follows `trigger` if `text` starts with it as a whole word.
#[must_use]
pub fn strip_trigger<'a>(text: &'a str, trigger: &str) -> Option<&'a str> {
    let rest = text.trim_start().strip_prefix(trigger)?;
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(rest)
}

impl Command {
    /// Parse the text after the trigger word.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let args = tokenize(text);
        let Some((verb, rest)) = args.split_first() else {
            return Self::Help;
        };

        match (verb.to_lowercase().as_str(), rest) {
            ("create", [question, options @ ..]) if !options.is_empty() => Self::Create {
                question: question.clone(),
                options: options.to_vec(),
            },
            ("vote", [poll_id, label @ ..]) if !label.is_empty() => Self::Vote {
                poll_id: poll_id.clone(),
                label: label.join(" "),
            },
            ("results", [poll_id, ..]) => Self::Results {
                poll_id: poll_id.clone(),
            },
            ("close", [poll_id, ..]) => Self::Close {
                poll_id: poll_id.clone(),
            },
            ("delete", [poll_id, ..]) => Self::Delete {
                poll_id: poll_id.clone(),
            },
            ("list", _) => Self::List,
            _ => Self::Help,
        }
    }

    /// Verb name, for logging.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Vote { .. } => "vote",
            Self::Results { .. } => "results",
            Self::Close { .. } => "close",
            Self::Delete { .. } => "delete",
            Self::List => "list",
            Self::Help => "help",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_tokenize_groups_quoted_words() {
        assert_eq!(
            tokenize(r#"create "Where to eat?" pizza "thai food""#),
            strings(&["create", "Where to eat?", "pizza", "thai food"])
        );
    }

    #[test]
    fn test_tokenize_collapses_whitespace() {
        assert_eq!(tokenize("  vote\t abc   red  "), strings(&["vote", "abc", "red"]));
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_tokenize_keeps_explicit_empty_token() {
        assert_eq!(tokenize(r#"vote abc """#), strings(&["vote", "abc", ""]));
    }

    #[test]
    fn test_strip_trigger() {
        assert_eq!(strip_trigger("/vote create q a", "/vote"), Some(" create q a"));
        assert_eq!(strip_trigger("  /vote", "/vote"), Some(""));
        assert_eq!(strip_trigger("/voter create", "/vote"), None);
        assert_eq!(strip_trigger("hello /vote", "/vote"), None);
    }

    #[test]
    fn test_parse_create() {
        assert_eq!(
            Command::parse(r#"create "Lunch?" pizza sushi"#),
            Command::Create {
                question: "Lunch?".into(),
                options: strings(&["pizza", "sushi"]),
            }
        );
        // A question alone is not a poll.
        assert_eq!(Command::parse("create Lunch?"), Command::Help);
    }

    #[test]
    fn test_parse_vote_joins_remaining_words() {
        assert_eq!(
            Command::parse("vote abc light blue"),
            Command::Vote {
                poll_id: "abc".into(),
                label: "light blue".into(),
            }
        );
        assert_eq!(Command::parse("vote abc"), Command::Help);
    }

    #[test]
    fn test_parse_verbs_are_case_insensitive() {
        assert_eq!(
            Command::parse("RESULTS abc"),
            Command::Results { poll_id: "abc".into() }
        );
        assert_eq!(Command::parse("Close abc"), Command::Close { poll_id: "abc".into() });
        assert_eq!(Command::parse("delete abc"), Command::Delete { poll_id: "abc".into() });
        assert_eq!(Command::parse("List"), Command::List);
    }

    #[test]
    fn test_parse_malformed_is_help() {
        assert_eq!(Command::parse(""), Command::Help);
        assert_eq!(Command::parse("results"), Command::Help);
        assert_eq!(Command::parse("frobnicate abc"), Command::Help);
        assert_eq!(Command::parse("help"), Command::Help);
    }
}
