//! Chat command grammar for polls.
//!
//! Start: `!poll <question>?[ opt1, opt2, ...]`. Vote: `!<token>` or a bare `<token>`.

use crate::state::poll::PollOption;

const POLL_KEYWORD: &str = "!poll";
const DEFAULT_OPTIONS: [&str; 2] = ["Yes", "No"];

/// A parsed `!poll` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    /// Question including its terminating `?` when present.
    pub question: String,
    /// Distinct option labels, at least two.
    pub options: Vec<String>,
}

/// A chat message resolved to one option of the active poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    /// Index into the poll's options.
    pub option_index: usize,
    /// Chat login of the voter.
    pub voter: String,
}

/// Parse a poll start command, returning `None` for anything that is not a valid one.
pub fn parse_poll_command(text: &str) -> Option<PollRequest> {
    let trimmed = text.trim();
    let keyword = trimmed.get(..POLL_KEYWORD.len())?;
    if !keyword.eq_ignore_ascii_case(POLL_KEYWORD) {
        return None;
    }

    let rest = &trimmed[POLL_KEYWORD.len()..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim();

    let (question, tail) = match rest.find('?') {
        Some(index) => (rest[..=index].trim(), &rest[index + 1..]),
        None => (rest, ""),
    };
    if question.trim_end_matches('?').trim().is_empty() {
        return None;
    }

    let mut options: Vec<String> = Vec::new();
    for token in tail.split(',') {
        let label = token.trim();
        if label.is_empty() {
            continue;
        }
        let lowered = label.to_lowercase();
        if options.iter().any(|known| known.to_lowercase() == lowered) {
            continue;
        }
        options.push(label.to_string());
    }

    match options.len() {
        0 => options = DEFAULT_OPTIONS.iter().map(|label| label.to_string()).collect(),
        // A lone option cannot be a poll.
        1 => return None,
        _ => {}
    }

    Some(PollRequest {
        question: question.to_string(),
        options,
    })
}

/// Resolve a chat message to a vote on `options`.
///
/// Matching is exact and case-insensitive; Yes/No polls additionally accept `y` and `n`.
pub fn parse_vote(text: &str, options: &[PollOption], voter: &str) -> Option<Vote> {
    let trimmed = text.trim();
    let token = trimmed
        .strip_prefix('!')
        .unwrap_or(trimmed)
        .trim()
        .to_lowercase();
    if token.is_empty() {
        return None;
    }

    let option_index = match yes_no_indices(options) {
        Some((yes, no)) => match token.as_str() {
            "yes" | "y" => Some(yes),
            "no" | "n" => Some(no),
            _ => None,
        },
        None => options
            .iter()
            .position(|option| option.label.to_lowercase() == token),
    }?;

    Some(Vote {
        option_index,
        voter: voter.to_string(),
    })
}

/// Indices of the "yes" and "no" options when the poll is exactly a Yes/No pair.
fn yes_no_indices(options: &[PollOption]) -> Option<(usize, usize)> {
    let [first, second] = options else {
        return None;
    };
    match (
        first.label.trim().to_lowercase().as_str(),
        second.label.trim().to_lowercase().as_str(),
    ) {
        ("yes", "no") => Some((0, 1)),
        ("no", "yes") => Some((1, 0)),
        _ => None,
    }
}

/// Whether the question or any option contains an entry of `blocked`.
///
/// Entries match whole words (or whole word sequences), case-insensitively.
pub fn poll_contains_blocked_content(question: &str, options: &[String], blocked: &[String]) -> bool {
    let phrases: Vec<Vec<String>> = blocked
        .iter()
        .map(|entry| words(entry))
        .filter(|phrase| !phrase.is_empty())
        .collect();
    if phrases.is_empty() {
        return false;
    }

    std::iter::once(question)
        .chain(options.iter().map(String::as_str))
        .any(|text| {
            let text_words = words(text);
            phrases.iter().any(|phrase| {
                text_words
                    .windows(phrase.len())
                    .any(|window| window == phrase.as_slice())
            })
        })
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(labels: &[&str]) -> Vec<PollOption> {
        labels.iter().map(|label| PollOption::new(*label)).collect()
    }

    #[test]
    fn parses_question_and_options() {
        let request = parse_poll_command("!poll Pizza or tacos? Pizza, Tacos").unwrap();
        assert_eq!(request.question, "Pizza or tacos?");
        assert_eq!(request.options, vec!["Pizza", "Tacos"]);
    }

    #[test]
    fn keyword_is_case_insensitive() {
        let request = parse_poll_command("!POLL Best map? Dust, Inferno").unwrap();
        assert_eq!(request.question, "Best map?");
    }

    #[test]
    fn missing_options_default_to_yes_no() {
        let request = parse_poll_command("!poll Should we raid?").unwrap();
        assert_eq!(request.options, vec!["Yes", "No"]);

        let request = parse_poll_command("!poll play another round").unwrap();
        assert_eq!(request.question, "play another round");
        assert_eq!(request.options, vec!["Yes", "No"]);
    }

    #[test]
    fn only_the_first_question_mark_splits() {
        let request = parse_poll_command("!poll Why? Because?, Why not").unwrap();
        assert_eq!(request.question, "Why?");
        assert_eq!(request.options, vec!["Because?", "Why not"]);
    }

    #[test]
    fn rejects_empty_questions_and_other_commands() {
        assert!(parse_poll_command("!poll").is_none());
        assert!(parse_poll_command("!poll   ").is_none());
        assert!(parse_poll_command("!poll ? a, b").is_none());
        assert!(parse_poll_command("!polls are fun? a, b").is_none());
        assert!(parse_poll_command("poll something? a, b").is_none());
        assert!(parse_poll_command("!vote yes").is_none());
    }

    #[test]
    fn drops_blank_and_duplicate_options() {
        let request = parse_poll_command("!poll Color? Red, , red, Blue,").unwrap();
        assert_eq!(request.options, vec!["Red", "Blue"]);
    }

    #[test]
    fn single_option_is_rejected() {
        assert!(parse_poll_command("!poll Ready? Yes").is_none());
    }

    #[test]
    fn yes_no_aliases_follow_labels_not_positions() {
        let reversed = options(&["No", "Yes"]);

        assert_eq!(parse_vote("!y", &reversed, "a").unwrap().option_index, 1);
        assert_eq!(parse_vote("yes", &reversed, "a").unwrap().option_index, 1);
        assert_eq!(parse_vote("!N", &reversed, "a").unwrap().option_index, 0);
        assert_eq!(parse_vote("no", &reversed, "a").unwrap().option_index, 0);
        assert!(parse_vote("!maybe", &reversed, "a").is_none());
    }

    #[test]
    fn labels_match_exactly_ignoring_case() {
        let opts = options(&["Pizza", "Tacos"]);

        let vote = parse_vote("  !TACOS ", &opts, "viewer").unwrap();
        assert_eq!(vote.option_index, 1);
        assert_eq!(vote.voter, "viewer");
        assert_eq!(parse_vote("pizza", &opts, "viewer").unwrap().option_index, 0);

        assert!(parse_vote("!piz", &opts, "viewer").is_none());
        assert!(parse_vote("!pizza please", &opts, "viewer").is_none());
        assert!(parse_vote("!", &opts, "viewer").is_none());
        // Aliases only exist for Yes/No polls.
        assert!(parse_vote("!y", &opts, "viewer").is_none());
    }

    #[test]
    fn blocked_content_matches_whole_words() {
        let blocked = vec!["badword".to_string(), "very bad".to_string()];

        assert!(poll_contains_blocked_content(
            "Is this a BADWORD?",
            &[],
            &blocked
        ));
        assert!(poll_contains_blocked_content(
            "Pick one?",
            &["fine".into(), "very   bad".into()],
            &blocked
        ));
        assert!(!poll_contains_blocked_content(
            "Is this badwordy?",
            &["very".into(), "bad".into()],
            &blocked
        ));
        assert!(!poll_contains_blocked_content("Anything?", &[], &[]));
    }
}
