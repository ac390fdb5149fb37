use std::cmp::Reverse;

use crate::models::answer::Answer;
use crate::models::question::TraitGroup;
use crate::models::result::{HollandCode, TraitScores};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoring {
    pub scores: TraitScores,
    pub total: i32,
    pub code: HollandCode,
}

impl Scoring {
    pub fn characteristics_code(&self) -> String {
        self.code.characteristics_code()
    }
}

pub struct ScoringService;

impl ScoringService {
    pub fn tally(answers: &[Answer]) -> TraitScores {
        let mut scores = TraitScores::default();
        for answer in answers {
            scores.add(answer.trait_group, answer.value.score());
        }
        scores
    }

    /// All six groups, highest total first; equal totals keep R > I > A > S > E > C.
    pub fn rank(scores: &TraitScores) -> [TraitGroup; 6] {
        let mut ranked = TraitGroup::ALL;
        ranked.sort_by_key(|g| (Reverse(scores.get(*g)), *g));
        ranked
    }

    pub fn score(answers: &[Answer]) -> Scoring {
        let scores = Self::tally(answers);
        let ranked = Self::rank(&scores);
        Scoring {
            scores,
            total: scores.total(),
            code: HollandCode::from_ranking(&ranked),
        }
    }
}
