use indexmap::IndexMap;

use crate::state::poll::{PollOption, PollResult, TopVoter};

/// Compute the chat announcement for a finished poll.
///
/// Pure and deterministic: racing triggers tallying the same poll get the same answer.
pub fn compute_poll_result(question: &str, options: &[PollOption]) -> PollResult {
    let (winners, max_votes) = leading_options(options);
    let top_voter = top_voter(options);

    let mut winner_message = if max_votes == 0 {
        format!("Poll \"{question}\" ended with no votes.")
    } else {
        format!(
            "Poll \"{question}\" — {} wins! ({max_votes} {})",
            winners.join(" and "),
            vote_noun(max_votes)
        )
    };

    if let Some(top) = &top_voter {
        winner_message.push_str(&format!(
            " Top voter: {} ({} {})",
            top.username,
            top.count,
            vote_noun(top.count)
        ));
    }

    PollResult {
        winner_message,
        top_voter,
    }
}

/// Compact winner line for the overlay, e.g. `A & B wins (3)`.
pub fn overlay_winner_text(options: &[PollOption]) -> String {
    let (winners, max_votes) = leading_options(options);
    if max_votes == 0 {
        return "No votes".to_string();
    }
    format!("{} wins ({max_votes})", winners.join(" & "))
}

/// Labels tied at the highest vote count, and that count.
fn leading_options(options: &[PollOption]) -> (Vec<&str>, u32) {
    let mut max_votes = 0;
    let mut leaders = Vec::new();

    for option in options {
        if option.votes > max_votes {
            max_votes = option.votes;
            leaders.clear();
            leaders.push(option.label.as_str());
        } else if option.votes == max_votes && max_votes > 0 {
            leaders.push(option.label.as_str());
        }
    }

    (leaders, max_votes)
}

/// The chatter with strictly the most votes, if that is more than one vote.
fn top_voter(options: &[PollOption]) -> Option<TopVoter> {
    let mut totals: IndexMap<&str, u32> = IndexMap::new();
    for option in options {
        for (voter, count) in &option.voters {
            *totals.entry(voter.as_str()).or_insert(0) += count;
        }
    }

    let mut best: Option<(&str, u32)> = None;
    let mut tied = false;
    for (voter, count) in totals {
        match best {
            Some((_, best_count)) if count < best_count => {}
            Some((_, best_count)) if count == best_count => tied = true,
            _ => {
                best = Some((voter, count));
                tied = false;
            }
        }
    }

    match best {
        Some((username, count)) if count > 1 && !tied => Some(TopVoter {
            username: username.to_string(),
            count,
        }),
        _ => None,
    }
}

fn vote_noun(count: u32) -> &'static str {
    if count == 1 { "vote" } else { "votes" }
}
