use crate::resolver::{resolve_tags, ResolveError};
use crate::AnswerSet;
use perspectiva_catalog::{PerspectiveSlot, Scenario, ScenarioId};
use perspectiva_core::{round_to, tag_similarity, TagVector};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Respondent {
    A,
    B,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    MalformedScenario {
        question_count: usize,
    },
    MissingAnswer {
        respondent: Respondent,
        question_id: String,
    },
    OutOfRangeAnswer {
        respondent: Respondent,
        question_id: String,
        index: i64,
        option_count: usize,
    },
}

impl ExclusionReason {
    fn from_resolve(respondent: Respondent, err: ResolveError) -> Self {
        match err {
            ResolveError::MissingAnswer { question_id } => ExclusionReason::MissingAnswer {
                respondent,
                question_id,
            },
            ResolveError::OutOfRangeAnswer {
                question_id,
                index,
                option_count,
            } => ExclusionReason::OutOfRangeAnswer {
                respondent,
                question_id,
                index,
                option_count,
            },
        }
    }
}

/// A scenario left out of every dimension average.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioExclusion {
    pub scenario_id: ScenarioId,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScenarioComponents {
    pub empathy_a_to_b: f64,
    pub empathy_b_to_a: f64,
    pub balance_a: f64,
    pub balance_b: f64,
}

/// Unrounded per-scenario values; aggregation averages these.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScenarioScores {
    pub empathy: f64,
    pub fairness_consensus: f64,
    pub desire_alignment: f64,
    pub personal_relational_balance: f64,
    pub components: ScenarioComponents,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScenarioBreakdown {
    pub scenario_id: ScenarioId,
    pub scenario_title: String,
    pub empathy: f64,
    pub fairness_consensus: f64,
    pub desire_alignment: f64,
    pub personal_relational_balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<ScenarioComponents>,
}

impl ScenarioScores {
    pub fn breakdown(
        &self,
        scenario: &Scenario,
        digits: u32,
        with_components: bool,
    ) -> ScenarioBreakdown {
        let round = |value: f64| round_to(value, digits);
        ScenarioBreakdown {
            scenario_id: scenario.id,
            scenario_title: scenario.title.clone(),
            empathy: round(self.empathy),
            fairness_consensus: round(self.fairness_consensus),
            desire_alignment: round(self.desire_alignment),
            personal_relational_balance: round(self.personal_relational_balance),
            components: with_components.then(|| ScenarioComponents {
                empathy_a_to_b: round(self.components.empathy_a_to_b),
                empathy_b_to_a: round(self.components.empathy_b_to_a),
                balance_a: round(self.components.balance_a),
                balance_b: round(self.components.balance_b),
            }),
        }
    }
}

/// Slot 1..=3 tag vectors of one respondent.
struct Perspective<'c> {
    desire: &'c TagVector,
    partner_guess: &'c TagVector,
    fairness: &'c TagVector,
}

fn perspective<'c>(
    scenario: &'c Scenario,
    answers: &AnswerSet,
    respondent: Respondent,
) -> Result<Perspective<'c>, ExclusionReason> {
    let slot = |slot: PerspectiveSlot| -> Result<&'c TagVector, ExclusionReason> {
        let question = scenario
            .question(slot)
            .ok_or(ExclusionReason::MalformedScenario {
                question_count: scenario.questions.len(),
            })?;
        resolve_tags(question, answers).map_err(|err| ExclusionReason::from_resolve(respondent, err))
    };

    Ok(Perspective {
        desire: slot(PerspectiveSlot::SelfDesire)?,
        partner_guess: slot(PerspectiveSlot::PerceivedPartnerDesire)?,
        fairness: slot(PerspectiveSlot::FairnessView)?,
    })
}

/// Four dimension scores for one scenario, or the reason it must be excluded.
pub fn score_scenario(
    scenario: &Scenario,
    answers_a: &AnswerSet,
    answers_b: &AnswerSet,
) -> Result<ScenarioScores, ExclusionReason> {
    if !scenario.has_slot_layout() {
        return Err(ExclusionReason::MalformedScenario {
            question_count: scenario.questions.len(),
        });
    }

    let a = perspective(scenario, answers_a, Respondent::A)?;
    let b = perspective(scenario, answers_b, Respondent::B)?;

    let empathy_a_to_b = tag_similarity(a.partner_guess, b.desire);
    let empathy_b_to_a = tag_similarity(b.partner_guess, a.desire);
    let balance_a = tag_similarity(a.desire, a.fairness);
    let balance_b = tag_similarity(b.desire, b.fairness);

    Ok(ScenarioScores {
        empathy: (empathy_a_to_b + empathy_b_to_a) / 2.0,
        fairness_consensus: tag_similarity(a.fairness, b.fairness),
        desire_alignment: tag_similarity(a.desire, b.desire),
        personal_relational_balance: (balance_a + balance_b) / 2.0,
        components: ScenarioComponents {
            empathy_a_to_b,
            empathy_b_to_a,
            balance_a,
            balance_b,
        },
    })
}
