//! Bounded in-memory log of completed filter passes.

use crate::config::{FilterSettings, DEFAULT_HISTORY_CAPACITY};
use crate::filter::ActionRecord;
use crate::policy::{Policy, UNKNOWN_CREATOR};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub subject: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub email: EmailSummary,
    pub policy_creator: String,
    pub rules: Vec<RuleSummary>,
    pub actions: Vec<ActionRecord>,
    pub settings: FilterSettings,
}

impl HistoryEntry {
    pub fn new(
        email: EmailSummary,
        policy: Option<&Policy>,
        actions: Vec<ActionRecord>,
        settings: FilterSettings,
    ) -> Self {
        let (policy_creator, rules) = match policy {
            Some(policy) => (
                policy.creator.clone(),
                policy
                    .rules
                    .iter()
                    .map(|rule| RuleSummary {
                        id: rule.id.clone(),
                        description: rule.description.clone(),
                    })
                    .collect(),
            ),
            None => (UNKNOWN_CREATOR.to_string(), Vec::new()),
        };

        HistoryEntry {
            timestamp: Utc::now(),
            email,
            policy_creator,
            rules,
            actions,
            settings,
        }
    }
}

/// FIFO that drops its oldest entry once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct PolicyHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for PolicyHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl PolicyHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        PolicyHistory {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Up to `count` entries, newest first.
    pub fn recent(&self, count: usize) -> Vec<HistoryEntry> {
        self.entries.iter().rev().take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ActionKind, Rule};

    fn entry(subject: &str) -> HistoryEntry {
        HistoryEntry::new(
            EmailSummary {
                id: subject.to_string(),
                subject: subject.to_string(),
                from: "test@example.com".to_string(),
            },
            None,
            Vec::new(),
            FilterSettings::default(),
        )
    }

    #[test]
    fn test_history_is_capped_at_100() {
        let mut history = PolicyHistory::default();
        for i in 0..100 {
            history.push(entry(&format!("email {i}")));
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.entries()[0].email.subject, "email 0");

        history.push(entry("email 100"));
        let entries = history.entries();
        assert_eq!(entries.len(), 100);
        assert_eq!(entries[0].email.subject, "email 1");
        assert_eq!(entries[99].email.subject, "email 100");
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut history = PolicyHistory::with_capacity(5);
        for i in 0..8 {
            history.push(entry(&format!("email {i}")));
        }

        let subjects: Vec<String> = history
            .recent(3)
            .into_iter()
            .map(|e| e.email.subject)
            .collect();
        assert_eq!(subjects, vec!["email 7", "email 6", "email 5"]);
        assert_eq!(history.recent(50).len(), 5);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut history = PolicyHistory::with_capacity(0);
        history.push(entry("a"));
        history.push(entry("b"));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.entries()[0].email.subject, "b");
    }

    #[test]
    fn test_clear() {
        let mut history = PolicyHistory::default();
        history.push(entry("a"));
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_entry_from_policy() {
        let mut policy = Policy::new("hr@company.com");
        policy.add_rule(Rule::new(
            "no-forward",
            "Warn about forwarding",
            ActionKind::Warn,
            "Do not forward this email",
        ));

        let e = HistoryEntry::new(entry("x").email, Some(&policy), Vec::new(), FilterSettings::default());
        assert_eq!(e.policy_creator, "hr@company.com");
        assert_eq!(
            e.rules,
            vec![RuleSummary {
                id: "no-forward".to_string(),
                description: "Warn about forwarding".to_string(),
            }]
        );

        assert_eq!(entry("y").policy_creator, "unknown");
        assert!(entry("y").rules.is_empty());
    }
}
