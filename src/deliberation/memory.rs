//! Lessons-learned lookup used by researchers, judges and the trader.
//!
//! A [`MemoryStore`] maps a free-text description of the current situation to recommendations
//! recorded for similar past situations. Lookups never fail: a store with nothing to say
//! returns an empty list.

use crate::deliberation::state::AnalystReports;
use std::collections::HashSet;
use std::sync::RwLock;

/// One recommendation matched against the current situation.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMatch {
    pub matched_situation: String,
    pub recommendation: String,
    /// Similarity in `[0, 1]`, higher is closer.
    pub similarity_score: f64,
}

/// Source of past recommendations.
///
/// ```rust
/// use deliberation::memory::{MemoryMatch, MemoryStore};
///
/// struct Pinned;
///
/// impl MemoryStore for Pinned {
///     fn get_memories(&self, situation: &str, _n_matches: usize) -> Vec<MemoryMatch> {
///         vec![MemoryMatch {
///             matched_situation: situation.to_string(),
///             recommendation: "Trim exposure before earnings.".into(),
///             similarity_score: 1.0,
///         }]
///     }
/// }
/// ```
pub trait MemoryStore: Send + Sync {
    /// Return at most `n_matches` recommendations, best first.
    fn get_memories(&self, situation: &str, n_matches: usize) -> Vec<MemoryMatch>;
}

/// A memory that never remembers anything, used when no store is configured.
pub struct NoopMemory;

impl MemoryStore for NoopMemory {
    fn get_memories(&self, _situation: &str, _n_matches: usize) -> Vec<MemoryMatch> {
        log::debug!("NoopMemory::get_memories: memory disabled, returning no matches");
        Vec::new()
    }
}

/// In-process situation memory ranked by word overlap (Jaccard similarity).
///
/// ```rust
/// use deliberation::memory::{MemoryStore, SituationMemory};
///
/// let memory = SituationMemory::new("bull_memory");
/// memory.add_situations(vec![(
///     "high inflation rising rates tech selloff".to_string(),
///     "Favour defensive sectors.".to_string(),
/// )]);
/// let matches = memory.get_memories("tech selloff with rising rates", 1);
/// assert_eq!(matches[0].recommendation, "Favour defensive sectors.");
/// ```
pub struct SituationMemory {
    name: String,
    entries: RwLock<Vec<(String, String)>>,
}

impl SituationMemory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record `(situation, recommendation)` pairs.
    pub fn add_situations(&self, situations: Vec<(String, String)>) {
        match self.entries.write() {
            Ok(mut entries) => entries.extend(situations),
            Err(_) => log::warn!(
                "SituationMemory::add_situations({}): store poisoned, dropping {} entries",
                self.name,
                situations.len()
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

impl MemoryStore for SituationMemory {
    fn get_memories(&self, situation: &str, n_matches: usize) -> Vec<MemoryMatch> {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        if entries.is_empty() || n_matches == 0 {
            return Vec::new();
        }

        let query = tokens(situation);
        let mut scored: Vec<MemoryMatch> = entries
            .iter()
            .map(|(stored, recommendation)| MemoryMatch {
                matched_situation: stored.clone(),
                recommendation: recommendation.clone(),
                similarity_score: jaccard(&query, &tokens(stored)),
            })
            .collect();
        // stable sort keeps insertion order between equal scores
        scored.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(n_matches);
        scored
    }
}

/// The situation text used for every lookup: the four reports separated by blank lines.
pub fn current_situation(reports: &AnalystReports) -> String {
    format!(
        "{}\n\n{}\n\n{}\n\n{}",
        reports.market_report,
        reports.sentiment_report,
        reports.news_report,
        reports.fundamentals_report
    )
}

/// Look up memories for the current reports and join the recommendations with blank lines.
/// Empty when the store has nothing.
pub fn situation_memories(
    memory: &dyn MemoryStore,
    reports: &AnalystReports,
    n_matches: usize,
) -> String {
    memory
        .get_memories(&current_situation(reports), n_matches)
        .into_iter()
        .map(|m| m.recommendation)
        .collect::<Vec<_>>()
        .join("\n\n")
}
