use std::cmp::Ordering;
use std::collections::HashMap;

use crate::dao::models::ScoreEntity;
use crate::dto::leaderboard::LeaderboardEntry;
use crate::error::ServiceError;
use crate::services::reconciler;
use crate::state::SharedState;

/// Produce the ranked leaderboard for an event from whatever submissions are
/// reachable (remote when available, local otherwise).
pub async fn rank(
    state: &SharedState,
    event_id: &str,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let submissions = reconciler::load_scores(state, event_id).await?;
    Ok(rank_submissions(submissions))
}

/// Ordering between two submissions: higher score first; on equal score a
/// lower time wins and an entry with a time beats one without.
fn compare(a: &ScoreEntity, b: &ScoreEntity) -> Ordering {
    b.score.cmp(&a.score).then_with(|| match (a.time_ms, b.time_ms) {
        (Some(a_time), Some(b_time)) => a_time.cmp(&b_time),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

/// Pure ranking core: keep each user's best submission, order by the
/// tie-break law, and assign dense 1-based ranks. Deterministic for a fixed
/// input; entries that compare equal keep their original submission order
/// and share a rank number.
pub fn rank_submissions(submissions: Vec<ScoreEntity>) -> Vec<LeaderboardEntry> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, ScoreEntity> = HashMap::new();

    for submission in submissions {
        match best.get(&submission.user_id) {
            None => {
                order.push(submission.user_id.clone());
                best.insert(submission.user_id.clone(), submission);
            }
            Some(current) => {
                // Strictly better replaces; an equal submission keeps the
                // earlier one so ordering stays stable.
                if compare(&submission, current) == Ordering::Less {
                    best.insert(submission.user_id.clone(), submission);
                }
            }
        }
    }

    let mut entries: Vec<ScoreEntity> = order
        .into_iter()
        .filter_map(|user_id| best.remove(&user_id))
        .collect();
    // Stable sort: original submission order breaks remaining ties.
    entries.sort_by(compare);

    let mut ranked = Vec::with_capacity(entries.len());
    let mut rank = 0u32;
    let mut previous: Option<ScoreEntity> = None;
    for entry in entries {
        let tied = previous
            .as_ref()
            .is_some_and(|prev| compare(prev, &entry) == Ordering::Equal);
        if !tied {
            rank += 1;
        }
        ranked.push(LeaderboardEntry {
            rank,
            user_id: entry.user_id.clone(),
            username: entry.username.clone(),
            score: entry.score,
            time_ms: entry.time_ms,
        });
        previous = Some(entry);
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn submission(user: &str, score: u64, time_ms: Option<u64>) -> ScoreEntity {
        ScoreEntity {
            event_id: "e1".into(),
            user_id: user.into(),
            username: user.to_uppercase(),
            score,
            time_ms,
            submitted_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn lower_time_wins_equal_scores() {
        let entries = rank_submissions(vec![
            submission("a", 100, Some(30_000)),
            submission("b", 100, Some(25_000)),
            submission("c", 80, None),
        ]);

        let order: Vec<(&str, u32)> = entries
            .iter()
            .map(|e| (e.user_id.as_str(), e.rank))
            .collect();
        assert_eq!(order, vec![("b", 1), ("a", 2), ("c", 3)]);
    }

    #[test]
    fn timed_entry_beats_untimed_at_equal_score() {
        let entries = rank_submissions(vec![
            submission("a", 100, None),
            submission("b", 100, Some(90_000)),
        ]);
        assert_eq!(entries[0].user_id, "b");
        assert_eq!(entries[1].user_id, "a");
    }

    #[test]
    fn exact_ties_keep_submission_order_and_share_rank() {
        let entries = rank_submissions(vec![
            submission("a", 50, None),
            submission("b", 50, None),
            submission("c", 40, None),
        ]);
        assert_eq!(entries[0].user_id, "a");
        assert_eq!(entries[1].user_id, "b");
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[1].rank, 1);
        assert_eq!(entries[2].rank, 2);
    }

    #[test]
    fn only_each_users_best_survives() {
        let entries = rank_submissions(vec![
            submission("a", 10, None),
            submission("a", 90, None),
            submission("a", 40, None),
            submission("b", 50, None),
        ]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user_id, "a");
        assert_eq!(entries[0].score, 90);
    }

    #[test]
    fn best_for_timed_event_prefers_lower_time() {
        let entries = rank_submissions(vec![
            submission("a", 100, Some(40_000)),
            submission("a", 100, Some(35_000)),
        ]);
        assert_eq!(entries[0].time_ms, Some(35_000));
    }

    #[test]
    fn ranking_is_idempotent() {
        let input = vec![
            submission("a", 100, Some(30_000)),
            submission("b", 100, Some(25_000)),
            submission("c", 80, None),
            submission("d", 80, None),
        ];
        let first = rank_submissions(input.clone());
        let second = rank_submissions(input);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(rank_submissions(Vec::new()).is_empty());
    }
}
