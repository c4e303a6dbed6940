//! Edit distance for fuzzy term matching.
//!
//! The memory backend matches `term~` clauses against document tokens that
//! are at most [`DEFAULT_MAX_EDITS`] single-character edits away.

use std::cmp::min;

/// Default number of edits a fuzzy clause tolerates.
pub const DEFAULT_MAX_EDITS: usize = 2;

/// Number of insertions, deletions and substitutions turning `a` into `b`.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = min(min(prev[j + 1] + 1, curr[j] + 1), prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Edit distance, or `None` as soon as it is known to exceed `max_edits`.
pub fn bounded_edit_distance(a: &str, b: &str, max_edits: usize) -> Option<usize> {
    let b: Vec<char> = b.chars().collect();
    if a.chars().count().abs_diff(b.len()) > max_edits {
        return None;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = min(min(prev[j + 1] + 1, curr[j] + 1), prev[j] + cost);
            row_min = min(row_min, curr[j + 1]);
        }
        if row_min > max_edits {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    Some(prev[b.len()]).filter(|distance| *distance <= max_edits)
}

/// A lowercased fuzzy term matched against many candidates.
#[derive(Debug, Clone)]
pub struct FuzzyTerm {
    term: String,
    max_edits: usize,
}

impl FuzzyTerm {
    pub fn new(term: &str) -> Self {
        FuzzyTerm {
            term: term.to_lowercase(),
            max_edits: DEFAULT_MAX_EDITS,
        }
    }

    pub fn with_max_edits(mut self, max_edits: usize) -> Self {
        self.max_edits = max_edits;
        self
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// Whether `candidate` is close enough to the term, ignoring case.
    pub fn matches(&self, candidate: &str) -> bool {
        bounded_edit_distance(&self.term, &candidate.to_lowercase(), self.max_edits).is_some()
    }
}
