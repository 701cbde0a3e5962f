use crate::dimensions::{score_scenario, ScenarioBreakdown, ScenarioExclusion};
use crate::{default_scoring_config, AnswerSet, ScoringConfig};
use perspectiva_catalog::Scenario;
use perspectiva_core::{mean, round_to};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreResult {
    pub empathy: f64,
    pub fairness_consensus: f64,
    pub desire_alignment: f64,
    pub personal_relational_balance: f64,
    pub global_score: f64,
    pub per_scenario: Vec<ScenarioBreakdown>,
    #[serde(default)]
    pub excluded: Vec<ScenarioExclusion>,
}

impl ScoreResult {
    pub fn scored_scenarios(&self) -> usize {
        self.per_scenario.len()
    }
}

pub fn score_couple(
    scenarios: &[Scenario],
    answers_a: &AnswerSet,
    answers_b: &AnswerSet,
) -> ScoreResult {
    score_couple_with(scenarios, answers_a, answers_b, &default_scoring_config())
}

pub fn score_couple_with(
    scenarios: &[Scenario],
    answers_a: &AnswerSet,
    answers_b: &AnswerSet,
    config: &ScoringConfig,
) -> ScoreResult {
    if answers_a.is_empty() || answers_b.is_empty() {
        tracing::debug!(
            answers_a = answers_a.len(),
            answers_b = answers_b.len(),
            "empty answer set; returning zero scores"
        );
        return ScoreResult::default();
    }

    let mut empathy = Vec::with_capacity(scenarios.len());
    let mut fairness = Vec::with_capacity(scenarios.len());
    let mut desire = Vec::with_capacity(scenarios.len());
    let mut balance = Vec::with_capacity(scenarios.len());
    let mut per_scenario = Vec::with_capacity(scenarios.len());
    let mut excluded = Vec::new();

    for scenario in scenarios {
        match score_scenario(scenario, answers_a, answers_b) {
            Ok(scores) => {
                empathy.push(scores.empathy);
                fairness.push(scores.fairness_consensus);
                desire.push(scores.desire_alignment);
                balance.push(scores.personal_relational_balance);
                per_scenario.push(scores.breakdown(
                    scenario,
                    config.round_digits,
                    config.report_components,
                ));
            }
            Err(reason) => {
                tracing::debug!(scenario_id = scenario.id, ?reason, "scenario excluded");
                excluded.push(ScenarioExclusion {
                    scenario_id: scenario.id,
                    reason,
                });
            }
        }
    }

    let empathy = mean(&empathy).unwrap_or(0.0);
    let fairness = mean(&fairness).unwrap_or(0.0);
    let desire = mean(&desire).unwrap_or(0.0);
    let balance = mean(&balance).unwrap_or(0.0);
    let global = (empathy + fairness + desire + balance) / 4.0;

    let digits = config.round_digits;
    ScoreResult {
        empathy: round_to(empathy, digits),
        fairness_consensus: round_to(fairness, digits),
        desire_alignment: round_to(desire, digits),
        personal_relational_balance: round_to(balance, digits),
        global_score: round_to(global, digits),
        per_scenario,
        excluded,
    }
}
