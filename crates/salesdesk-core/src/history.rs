//! Flattening of chat-log entries into a per-day conversation transcript.

use chrono::NaiveDate;

use crate::models::{ChatLogEntry, ChatTurn, Role};

/// Turns for every entry whose UTC date is `day`, in log order. Each entry
/// contributes the user's question followed by the assistant's answer.
pub fn history_for_day(entries: &[ChatLogEntry], day: NaiveDate) -> Vec<ChatTurn> {
    entries
        .iter()
        .filter(|e| e.timestamp.date_naive() == day)
        .flat_map(|e| {
            [
                ChatTurn {
                    role: Role::User,
                    text: e.question.clone(),
                },
                ChatTurn {
                    role: Role::Assistant,
                    text: e.answer.clone(),
                },
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use chrono::{TimeZone, Utc};

    fn entry(q: &str, a: &str, y: i32, m: u32, d: u32, h: u32) -> ChatLogEntry {
        ChatLogEntry {
            question: q.to_string(),
            answer: a.to_string(),
            source: Source::Model,
            username: None,
            timestamp: Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_history_pairs_in_order() {
        let entries = vec![
            entry("q1", "a1", 2025, 3, 10, 9),
            entry("old", "old", 2025, 3, 9, 23),
            entry("q2", "a2", 2025, 3, 10, 18),
        ];
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let turns = history_for_day(&entries, day);
        let flat: Vec<(Role, &str)> = turns.iter().map(|t| (t.role, t.text.as_str())).collect();
        assert_eq!(
            flat,
            vec![
                (Role::User, "q1"),
                (Role::Assistant, "a1"),
                (Role::User, "q2"),
                (Role::Assistant, "a2"),
            ]
        );
    }

    #[test]
    fn test_history_empty_for_other_day() {
        let entries = vec![entry("q", "a", 2025, 1, 1, 0)];
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert!(history_for_day(&entries, day).is_empty());
    }
}
