use crate::error::EngineError;
use crate::models::{Candidate, ScanResult};
use serde::Serialize;
use std::cmp::Ordering;

/// Default shortlist capacity
pub const DEFAULT_SHORTLIST_SIZE: usize = 5;

/// Anything that can be ranked by (effective score, score)
pub trait Ranked {
    fn effective_score(&self) -> f64;
    fn score(&self) -> f64;
}

impl Ranked for ScanResult {
    fn effective_score(&self) -> f64 {
        self.effective_score
    }

    fn score(&self) -> f64 {
        self.score
    }
}

impl Ranked for Candidate {
    fn effective_score(&self) -> f64 {
        self.effective_score
    }

    fn score(&self) -> f64 {
        self.score
    }
}

/// Descending by effective score, then by score. Equal keys compare equal,
/// so a stable sort keeps scan order for full ties.
fn by_rank<T: Ranked>(a: &T, b: &T) -> Ordering {
    b.effective_score()
        .total_cmp(&a.effective_score())
        .then_with(|| b.score().total_cmp(&a.score()))
}

/// Stable in-place ranking
pub fn rank<T: Ranked>(items: &mut [T]) {
    items.sort_by(by_rank);
}

/// Reduce candidates to the top `k` by rank
///
/// Fewer than `k` inputs yields all of them; empty input yields an empty
/// shortlist.
pub fn select(candidates: &[Candidate], k: usize) -> Shortlist {
    let mut ranked = candidates.to_vec();
    rank(&mut ranked);
    ranked.truncate(k);

    Shortlist {
        candidates: ranked,
        capacity: k,
    }
}

/// Ranked, bounded set of candidates under consideration
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Shortlist {
    candidates: Vec<Candidate>,
    capacity: usize,
}

impl Shortlist {
    pub fn empty(capacity: usize) -> Self {
        Self {
            candidates: Vec::new(),
            capacity,
        }
    }

    /// Build a shortlist from explicit members
    ///
    /// Members are ranked; more members than `capacity` is rejected.
    pub fn new(mut candidates: Vec<Candidate>, capacity: usize) -> Result<Self, EngineError> {
        if candidates.len() > capacity {
            return Err(EngineError::ShortlistOverCapacity {
                len: candidates.len(),
                capacity,
            });
        }

        rank(&mut candidates);
        Ok(Self {
            candidates,
            capacity,
        })
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn instruments(&self) -> Vec<String> {
        self.candidates
            .iter()
            .map(|c| c.instrument.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.candidates.len() >= self.capacity
    }

    pub fn contains(&self, instrument: &str) -> bool {
        self.candidates.iter().any(|c| c.instrument == instrument)
    }

    /// Lowest effective score among members
    pub fn min_effective_score(&self) -> Option<f64> {
        self.candidates
            .iter()
            .map(|c| c.effective_score)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Whether `candidate` qualifies for the replacement path: the shortlist
    /// is full and the candidate outranks its weakest member.
    pub fn admits(&self, candidate: &Candidate) -> bool {
        if !self.is_full() || self.contains(&candidate.instrument) {
            return false;
        }

        match self.min_effective_score() {
            Some(min) => candidate.effective_score > min,
            None => false,
        }
    }

    /// Replace `exiting` with `entering`
    ///
    /// When `exiting` is not a member, the weakest member is removed instead.
    /// Returns the removed candidate.
    pub fn swap(&mut self, exiting: &str, entering: Candidate) -> Option<Candidate> {
        let removed = match self.candidates.iter().position(|c| c.instrument == exiting) {
            Some(idx) => Some(self.candidates.remove(idx)),
            None if self.is_full() => self.candidates.pop(),
            None => None,
        };

        self.candidates.push(entering);
        rank(&mut self.candidates);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskProfile, SignalStrength, TimingCategory};

    fn create_test_candidate(instrument: &str, effective_score: f64, score: f64) -> Candidate {
        Candidate {
            instrument: instrument.to_string(),
            score,
            effective_score,
            timing: TimingCategory::Watch,
            strength: SignalStrength::Medium,
            timing_reason: String::new(),
            risk_profile: RiskProfile::HighRisk,
        }
    }

    #[test]
    fn test_select_top_five_with_tie_break() {
        let candidates = vec![
            create_test_candidate("A", 0.9, 0.5),
            create_test_candidate("B", 0.9, 0.7),
            create_test_candidate("C", 0.8, 0.8),
            create_test_candidate("D", 0.7, 0.7),
            create_test_candidate("E", 0.6, 0.6),
            create_test_candidate("F", 0.5, 0.5),
            create_test_candidate("G", 0.4, 0.4),
        ];

        let shortlist = select(&candidates, DEFAULT_SHORTLIST_SIZE);

        assert_eq!(shortlist.len(), 5);
        // Tied 0.9 pair ordered by score desc
        assert_eq!(shortlist.instruments(), vec!["B", "A", "C", "D", "E"]);
    }

    #[test]
    fn test_select_is_stable_on_full_ties() {
        let candidates = vec![
            create_test_candidate("first", 0.5, 0.5),
            create_test_candidate("second", 0.5, 0.5),
            create_test_candidate("third", 0.5, 0.5),
        ];

        let shortlist = select(&candidates, 5);
        assert_eq!(shortlist.instruments(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_select_fewer_than_k() {
        let candidates = vec![
            create_test_candidate("A", -0.2, -0.2),
            create_test_candidate("B", 0.3, 0.1),
        ];

        let shortlist = select(&candidates, 5);
        assert_eq!(shortlist.len(), 2);
        assert_eq!(shortlist.instruments(), vec!["B", "A"]);
        assert!(!shortlist.is_full());
    }

    #[test]
    fn test_select_empty() {
        let shortlist = select(&[], 5);
        assert!(shortlist.is_empty());
        assert_eq!(shortlist.min_effective_score(), None);
    }

    #[test]
    fn test_rank_scan_results() {
        let mut scans = vec![
            ScanResult {
                instrument: "low".to_string(),
                score: 0.9,
                effective_score: 0.2,
            },
            ScanResult {
                instrument: "high".to_string(),
                score: 0.1,
                effective_score: 0.8,
            },
        ];

        rank(&mut scans);
        assert_eq!(scans[0].instrument, "high");
    }

    #[test]
    fn test_new_rejects_over_capacity() {
        let candidates = (0..6)
            .map(|i| create_test_candidate(&format!("C{}", i), 0.5, 0.5))
            .collect();

        let result = Shortlist::new(candidates, 5);
        assert_eq!(
            result,
            Err(EngineError::ShortlistOverCapacity {
                len: 6,
                capacity: 5
            })
        );
    }

    #[test]
    fn test_admits_only_when_full_and_better() {
        let members = (0..5)
            .map(|i| create_test_candidate(&format!("C{}", i), 0.5 + i as f64 * 0.1, 0.5))
            .collect();
        let shortlist = Shortlist::new(members, 5).unwrap();

        assert!(shortlist.admits(&create_test_candidate("NEW", 0.55, 0.5)));
        assert!(!shortlist.admits(&create_test_candidate("NEW", 0.5, 0.5)));
        assert!(!shortlist.admits(&create_test_candidate("C4", 0.99, 0.5)));

        let partial = Shortlist::new(vec![create_test_candidate("A", 0.5, 0.5)], 5).unwrap();
        assert!(!partial.admits(&create_test_candidate("NEW", 0.9, 0.9)));
    }

    #[test]
    fn test_swap_removes_exiting_member() {
        let members = vec![
            create_test_candidate("A", 0.9, 0.9),
            create_test_candidate("B", 0.6, 0.6),
        ];
        let mut shortlist = Shortlist::new(members, 2).unwrap();

        let removed = shortlist.swap("A", create_test_candidate("N", 0.7, 0.7));

        assert_eq!(removed.unwrap().instrument, "A");
        assert_eq!(shortlist.instruments(), vec!["N", "B"]);
    }

    #[test]
    fn test_swap_falls_back_to_weakest() {
        let members = vec![
            create_test_candidate("A", 0.9, 0.9),
            create_test_candidate("B", 0.6, 0.6),
        ];
        let mut shortlist = Shortlist::new(members, 2).unwrap();

        let removed = shortlist.swap("HELD", create_test_candidate("N", 0.7, 0.7));

        assert_eq!(removed.unwrap().instrument, "B");
        assert_eq!(shortlist.instruments(), vec!["A", "N"]);
        assert_eq!(shortlist.len(), 2);
    }
}
