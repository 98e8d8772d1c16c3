//! Weighted similarity ranking.
//!
//! Every entity kind has a fixed table of classifiers, each a named scoring
//! function with a weight and the strictness levels it applies to. Ranking
//! accumulates weighted scores per candidate and drops a candidate as soon as
//! its accumulated mismatch can no longer reach the acceptance threshold.

pub mod class;
pub mod field;
pub(crate) mod insn;
pub mod method;
pub mod potential;
pub mod similarity;
pub mod var;

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::config::Thresholds;
use crate::graph::ClassGraph;
use crate::matching::MatchTable;

pub use self::potential::PotentialEq;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClassifierLevel {
    Initial,
    Intermediate,
    Full,
    Extra,
}

impl ClassifierLevel {
    pub const ALL: [ClassifierLevel; 4] = [
        ClassifierLevel::Initial,
        ClassifierLevel::Intermediate,
        ClassifierLevel::Full,
        ClassifierLevel::Extra,
    ];
}

pub(crate) const ALL_LEVELS: &[ClassifierLevel] = &ClassifierLevel::ALL;
pub(crate) const INTERMEDIATE_UP: &[ClassifierLevel] = &[
    ClassifierLevel::Intermediate,
    ClassifierLevel::Full,
    ClassifierLevel::Extra,
];
pub(crate) const FULL_UP: &[ClassifierLevel] = &[ClassifierLevel::Full, ClassifierLevel::Extra];

/// Read-only view handed to classifiers and ranking units.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    pub graph: &'a ClassGraph,
    pub matches: &'a MatchTable,
    pub cache: &'a Cache,
    /// When set, a name obfuscated on one side is assumed obfuscated on the other.
    pub assume_both: bool,
}

pub type ScoreFn<T> = fn(&Env<'_>, T, T) -> f64;

pub struct Classifier<T> {
    pub name: &'static str,
    pub weight: f64,
    pub levels: &'static [ClassifierLevel],
    pub score: ScoreFn<T>,
}

impl<T> Classifier<T> {
    pub fn applies(&self, level: ClassifierLevel) -> bool {
        self.levels.contains(&level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierResult {
    pub name: &'static str,
    pub weight: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankResult<T> {
    pub subject: T,
    /// Sum of weighted classifier scores.
    pub score: f64,
    pub results: Vec<ClassifierResult>,
}

pub fn max_score<T>(table: &[Classifier<T>], level: ClassifierLevel) -> f64 {
    table
        .iter()
        .filter(|c| c.applies(level))
        .map(|c| c.weight)
        .sum()
}

/// Largest weighted mismatch a candidate may accumulate and still pass [`check_rank`].
pub fn max_mismatch(max_score: f64, thresholds: Thresholds) -> f64 {
    max_score - (thresholds.absolute * (1.0 - thresholds.relative)).sqrt() * max_score
}

/// Normalized score of a raw ranking score; the square penalizes marginal leads.
pub fn normalized_score(raw: f64, max_score: f64) -> f64 {
    if max_score <= 0.0 {
        return 0.0;
    }
    let ratio = raw / max_score;
    ratio * ratio
}

/// Scores `candidates` against `src` with the classifiers applicable at `level`.
///
/// Candidates failing potential equality are skipped, candidates whose
/// mismatch reaches `max_mismatch` are dropped without a partial result, and
/// the survivors are sorted by descending score (stable for ties).
pub fn rank<T: PotentialEq>(
    env: &Env<'_>,
    src: T,
    candidates: &[T],
    table: &[Classifier<T>],
    level: ClassifierLevel,
    max_mismatch: f64,
) -> Vec<RankResult<T>> {
    let mut ranking = Vec::new();

    'candidates: for &dst in candidates {
        if !T::potentially_equal(env, src, dst) {
            continue;
        }

        let mut score = 0.0;
        let mut mismatch = 0.0;
        let mut results = Vec::with_capacity(table.len());
        for classifier in table.iter().filter(|c| c.applies(level)) {
            let raw = (classifier.score)(env, src, dst);
            debug_assert!(
                (-1e-6..=1.0 + 1e-6).contains(&raw),
                "classifier {} produced {raw}",
                classifier.name
            );
            let weighted = raw * classifier.weight;
            mismatch += classifier.weight - weighted;
            if mismatch >= max_mismatch {
                continue 'candidates;
            }
            score += weighted;
            results.push(ClassifierResult {
                name: classifier.name,
                weight: classifier.weight,
                score: raw,
            });
        }

        ranking.push(RankResult {
            subject: dst,
            score,
            results,
        });
    }

    ranking.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranking
}

/// Accepts the top candidate if it clears the absolute threshold and beats the runner-up by the relative margin.
pub fn check_rank<T>(ranking: &[RankResult<T>], thresholds: Thresholds, max_score: f64) -> bool {
    let Some(top) = ranking.first() else {
        return false;
    };
    let score = normalized_score(top.score, max_score);
    if score < thresholds.absolute {
        return false;
    }
    match ranking.get(1) {
        None => true,
        Some(next) => normalized_score(next.score, max_score) < score * (1.0 - thresholds.relative),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f64) -> RankResult<u32> {
        RankResult {
            subject: 0,
            score,
            results: Vec::new(),
        }
    }

    const T: Thresholds = Thresholds::new(0.8, 0.08);

    #[test]
    fn unique_candidate_above_threshold_is_accepted() {
        assert!(check_rank(&[result(9.5)], T, 10.0));
        // 0.89^2 = 0.7921
        assert!(!check_rank(&[result(8.9)], T, 10.0));
        assert!(!check_rank::<u32>(&[], T, 10.0));
    }

    #[test]
    fn close_runner_up_rejects_the_top_candidate() {
        // 1.0 vs 0.96^2 = 0.9216 which is >= 0.92
        assert!(!check_rank(&[result(10.0), result(9.6)], T, 10.0));
        // 0.95^2 = 0.9025 < 0.92
        assert!(check_rank(&[result(10.0), result(9.5)], T, 10.0));
    }

    #[test]
    fn max_mismatch_matches_threshold_geometry() {
        let mm = max_mismatch(10.0, T);
        let expected = 10.0 - (0.8f64 * 0.92).sqrt() * 10.0;
        assert!((mm - expected).abs() < 1e-12);
        assert!(mm > 0.0 && mm < 10.0);
    }

    #[test]
    fn max_score_sums_applicable_weights() {
        fn one(_: &Env<'_>, _: u32, _: u32) -> f64 {
            1.0
        }
        let table = [
            Classifier { name: "a", weight: 2.0, levels: ALL_LEVELS, score: one },
            Classifier { name: "b", weight: 3.0, levels: FULL_UP, score: one },
        ];
        assert_eq!(max_score(&table, ClassifierLevel::Initial), 2.0);
        assert_eq!(max_score(&table, ClassifierLevel::Extra), 5.0);
    }
}
