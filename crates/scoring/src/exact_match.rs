use crate::AnswerSet;
use perspectiva_catalog::{PerspectiveSlot, Scenario};
use perspectiva_core::{round1, SIMILARITY_MAX};
use serde::{Deserialize, Serialize};

/// Secondary report comparing raw option indices instead of tag vectors.
/// Never mixed into [`crate::ScoreResult`].
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ExactMatchScores {
    pub alignment: f64,
    pub empathy: f64,
    pub relationship_health: f64,
}

/// Question ids for each slot, taken from well-formed scenarios only.
struct SlotQuestions<'c> {
    rows: Vec<[&'c str; 4]>,
}

impl<'c> SlotQuestions<'c> {
    fn new(scenarios: &'c [Scenario]) -> Self {
        let rows = scenarios
            .iter()
            .filter(|s| s.has_slot_layout())
            .map(|s| PerspectiveSlot::ALL.map(|slot| s.questions[slot.index()].id.as_str()))
            .collect();
        Self { rows }
    }

    fn ids(&self, slot: PerspectiveSlot) -> impl Iterator<Item = &'c str> + '_ {
        self.rows.iter().map(move |row| row[slot.index()])
    }

    fn answered(&self, answers: &AnswerSet, slot: PerspectiveSlot) -> usize {
        self.ids(slot).filter(|id| answers.contains(id)).count()
    }

    /// Questions in `slot` where both sides answered with the same index.
    fn same_answer(&self, a: &AnswerSet, b: &AnswerSet, slot: PerspectiveSlot) -> usize {
        self.ids(slot)
            .filter(|id| matches!((a.get(id), b.get(id)), (Some(x), Some(y)) if x == y))
            .count()
    }

    /// Scenarios where `guesser`'s slot-2 answer equals `target`'s slot-1 answer.
    fn correct_guesses(&self, guesser: &AnswerSet, target: &AnswerSet) -> usize {
        self.rows
            .iter()
            .filter(|row| {
                let guess = guesser.get(row[PerspectiveSlot::PerceivedPartnerDesire.index()]);
                let actual = target.get(row[PerspectiveSlot::SelfDesire.index()]);
                matches!((guess, actual), (Some(x), Some(y)) if x == y)
            })
            .count()
    }
}

fn percent(hits: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let value = hits as f64 / total as f64 * SIMILARITY_MAX;
    round1(value.min(SIMILARITY_MAX))
}

pub fn score_exact_match(
    scenarios: &[Scenario],
    answers_a: &AnswerSet,
    answers_b: &AnswerSet,
) -> ExactMatchScores {
    use PerspectiveSlot::*;

    let slots = SlotQuestions::new(scenarios);
    let a_desire = slots.answered(answers_a, SelfDesire);
    let a_guess = slots.answered(answers_a, PerceivedPartnerDesire);
    let a_fairness = slots.answered(answers_a, FairnessView);
    let a_partner_fairness = slots.answered(answers_a, PerceivedPartnerFairness);

    let alignment = if slots.answered(answers_b, SelfDesire) == 0 {
        0.0
    } else {
        percent(
            slots.same_answer(answers_a, answers_b, SelfDesire),
            a_desire,
        )
    };

    let empathy = if a_desire == 0 || a_guess == 0 {
        0.0
    } else {
        let correct = slots.correct_guesses(answers_a, answers_b)
            + slots.correct_guesses(answers_b, answers_a);
        percent(correct, a_guess * 2)
    };

    let relationship_health = if a_fairness == 0 || a_partner_fairness == 0 {
        0.0
    } else {
        let matching = slots.same_answer(answers_a, answers_b, FairnessView)
            + slots.same_answer(answers_a, answers_b, PerceivedPartnerFairness);
        percent(matching, a_fairness * 2)
    };

    ExactMatchScores {
        alignment,
        empathy,
        relationship_health,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perspectiva_catalog::Catalog;

    fn answers(pairs: &[(&str, i64)]) -> AnswerSet {
        pairs.iter().map(|(id, idx)| (id.to_string(), *idx)).collect()
    }

    #[test]
    fn identical_full_answers_score_full() {
        let catalog = Catalog::classic();
        let all: AnswerSet = catalog
            .scenarios
            .iter()
            .flat_map(|s| s.questions.iter().map(|q| (q.id.clone(), 1)))
            .collect();
        let scores = score_exact_match(&catalog.scenarios, &all, &all);
        assert_eq!(
            scores,
            ExactMatchScores {
                alignment: 100.0,
                empathy: 100.0,
                relationship_health: 100.0,
            }
        );
    }

    #[test]
    fn partial_matches() {
        let catalog = Catalog::classic();
        let a = answers(&[
            ("q1_1", 0),
            ("q1_2", 2),
            ("q1_3", 1),
            ("q1_4", 1),
            ("q2_1", 3),
            ("q2_2", 0),
            ("q2_3", 2),
            ("q2_4", 0),
            ("q3_1", 1),
        ]);
        let b = answers(&[
            ("q1_1", 2),
            ("q1_2", 0),
            ("q1_3", 1),
            ("q1_4", 3),
            ("q2_1", 3),
            ("q2_2", 1),
            ("q2_3", 0),
            ("q2_4", 0),
            ("q3_1", 2),
        ]);
        let scores = score_exact_match(&catalog.scenarios, &a, &b);
        // slot 1: only q2_1 matches, out of 3
        assert_eq!(scores.alignment, 33.3);
        // a guessed q1 right, b guessed q1 right; 2 / (2 * 2)
        assert_eq!(scores.empathy, 50.0);
        // q1_3 and q2_4 match; 2 / (2 * 2)
        assert_eq!(scores.relationship_health, 50.0);
    }

    #[test]
    fn missing_prerequisite_slots_score_zero() {
        let catalog = Catalog::classic();
        let a = answers(&[("q1_1", 0), ("q1_3", 0)]);
        let b = answers(&[("q1_1", 0), ("q1_3", 0), ("q1_4", 0)]);
        let scores = score_exact_match(&catalog.scenarios, &a, &b);
        assert_eq!(scores.alignment, 100.0);
        assert_eq!(scores.empathy, 0.0);
        assert_eq!(scores.relationship_health, 0.0);
    }

    #[test]
    fn capped_when_partner_answered_more() {
        let catalog = Catalog::classic();
        let a = answers(&[
            ("q1_1", 0),
            ("q1_2", 0),
            ("q1_3", 0),
            ("q1_4", 0),
            ("q2_1", 1),
            ("q2_4", 0),
        ]);
        let b = answers(&[
            ("q1_1", 0),
            ("q1_2", 0),
            ("q1_3", 0),
            ("q1_4", 0),
            ("q2_2", 1),
            ("q2_4", 0),
        ]);
        let scores = score_exact_match(&catalog.scenarios, &a, &b);
        assert_eq!(scores.empathy, 100.0);
        assert_eq!(scores.relationship_health, 100.0);
    }
}
