use crate::resolver::option_at;
use crate::AnswerSet;
use perspectiva_catalog::Scenario;
use perspectiva_core::round1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TagAverage {
    pub tag: String,
    pub value: f64,
    pub samples: usize,
}

/// Per-tag averages over every option one respondent chose.
///
/// Answers to unknown questions and out-of-range indices are skipped. Sorted
/// by value descending, ties broken by tag name.
pub fn tag_profile(scenarios: &[Scenario], answers: &AnswerSet) -> Vec<TagAverage> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();

    let questions = scenarios.iter().flat_map(|s| s.questions.iter());
    for question in questions {
        let Some(index) = answers.get(&question.id) else {
            continue;
        };
        let Some(option) = option_at(question, index) else {
            tracing::debug!(question_id = %question.id, index, "skipping out-of-range answer");
            continue;
        };
        for (tag, value) in &option.tags {
            let entry = sums.entry(tag.as_str()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    let mut profile: Vec<TagAverage> = sums
        .into_iter()
        .map(|(tag, (sum, samples))| TagAverage {
            tag: tag.to_string(),
            value: round1(sum / samples as f64),
            samples,
        })
        .collect();
    profile.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.tag.cmp(&b.tag)));
    profile
}
