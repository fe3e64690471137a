//! # Recommendation History
//!
//! A bounded FIFO of recently recommended recipe IDs, used to keep the
//! curator from serving the same recipes over and over.
//!
//! The stored form is two parallel arrays (IDs and timestamps) plus a
//! version counter used for optimistic concurrency: a write only succeeds
//! when the version it was derived from is still current.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// A single recommended recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recipe_id: String,
    pub recommended_at: DateTime<Utc>,
}

/// Stored shape of a user's history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(rename = "recommendedRecipes", default)]
    pub ids: Vec<String>,
    #[serde(rename = "recommendedRecipeTimes", default)]
    pub timestamps: Vec<DateTime<Utc>>,
    /// Time of the last successful recommendation cycle
    #[serde(rename = "recommendedAt", default)]
    pub recommended_at: Option<DateTime<Utc>>,
    /// Incremented by every successful write
    #[serde(default)]
    pub version: u64,
}

/// Bounded, insertion-ordered history with oldest-first eviction
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    version: u64,
}

impl RecommendationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            version: 0,
        }
    }

    /// Rebuild a history from its stored form
    ///
    /// Mismatched array lengths are tolerated: the pairs are zipped and the
    /// surplus dropped. Stored histories longer than `capacity` are trimmed
    /// from the front.
    pub fn from_record(record: &HistoryRecord, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        history.version = record.version;
        for (id, at) in record.ids.iter().zip(record.timestamps.iter()) {
            history.push(id.clone(), *at);
        }
        history
    }

    /// Stored form of the history, stamped with `recommended_at`
    ///
    /// The version is the one this history was read at; the store compares
    /// it against the current one.
    pub fn to_record(&self, recommended_at: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            ids: self.ids(),
            timestamps: self.entries.iter().map(|e| e.recommended_at).collect(),
            recommended_at: Some(recommended_at),
            version: self.version,
        }
    }

    /// Append an entry, evicting the oldest ones beyond capacity
    pub fn push(&mut self, recipe_id: String, recommended_at: DateTime<Utc>) {
        self.entries.push_back(HistoryEntry {
            recipe_id,
            recommended_at,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Append several IDs sharing one timestamp
    pub fn extend<I>(&mut self, recipe_ids: I, recommended_at: DateTime<Utc>)
    where
        I: IntoIterator<Item = String>,
    {
        for id in recipe_ids {
            self.push(id, recommended_at);
        }
    }

    pub fn contains(&self, recipe_id: &str) -> bool {
        self.entries.iter().any(|e| e.recipe_id == recipe_id)
    }

    pub fn id_set(&self) -> HashSet<&str> {
        self.entries.iter().map(|e| e.recipe_id.as_str()).collect()
    }

    /// IDs oldest first
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.recipe_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
