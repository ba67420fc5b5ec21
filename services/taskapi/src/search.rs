use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;

pub const CATEGORIES: [&str; 4] = ["development", "operations", "testing", "security"];

const TITLES: [&str; 10] = [
    "Configure CI/CD pipeline",
    "Learn AWS CloudFormation",
    "Write unit tests",
    "Optimize database queries",
    "Deploy to production",
    "Code review",
    "Performance tuning",
    "Security hardening",
    "Configure monitoring alerts",
    "Set up log collection",
];

const PRIORITIES: [&str; 3] = ["HIGH", "MEDIUM", "LOW"];

const CORPUS_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchDocument {
    pub id: u64,
    pub title: &'static str,
    pub category: &'static str,
    pub priority: &'static str,
    pub score: f64,
}

/// Static in-memory corpus. Category, priority and score come from a fixed
/// seed so every process sees the same documents.
#[derive(Debug, Clone)]
pub struct SearchCorpus {
    documents: Vec<SearchDocument>,
}

impl SearchCorpus {
    pub fn seeded() -> Self {
        let mut rng = StdRng::seed_from_u64(CORPUS_SEED);
        let documents = TITLES
            .into_iter()
            .enumerate()
            .map(|(index, title)| SearchDocument {
                id: index as u64 + 1,
                title,
                category: CATEGORIES[rng.gen_range(0..CATEGORIES.len())],
                priority: PRIORITIES[rng.gen_range(0..PRIORITIES.len())],
                score: rng.gen_range(0.0..1.0),
            })
            .collect();
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Case-insensitive substring match on titles. A query that matches
    /// nothing returns the whole corpus.
    pub fn matching(&self, query: &str) -> Vec<&SearchDocument> {
        let needle = query.to_lowercase();
        let hits: Vec<&SearchDocument> = self
            .documents
            .iter()
            .filter(|doc| doc.title.to_lowercase().contains(&needle))
            .collect();
        if hits.is_empty() {
            self.documents.iter().collect()
        } else {
            hits
        }
    }

    pub fn suggest(&self, prefix: &str) -> Vec<&'static str> {
        let needle = prefix.to_lowercase();
        self.documents
            .iter()
            .filter(|doc| doc.title.to_lowercase().contains(&needle))
            .map(|doc| doc.title)
            .collect()
    }
}

/// One-based page of `hits`; pages past the end are empty.
pub fn page_of<T: Clone>(hits: &[T], page: usize, size: usize) -> Vec<T> {
    let start = page.saturating_sub(1).saturating_mul(size).min(hits.len());
    let end = start.saturating_add(size).min(hits.len());
    hits[start..end].to_vec()
}
