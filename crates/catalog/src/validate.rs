use crate::{Catalog, ScenarioId, SLOT_COUNT};
use perspectiva_core::out_of_range_tags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    EmptyCatalog,
    DuplicateScenarioId,
    DuplicateQuestionId,
    WrongQuestionCount { actual: usize },
    NoOptions,
    EmptyTagVector,
    TagOutOfRange { tag: String, value: f64 },
}

/// A data-quality finding. Scoring tolerates every one of these.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CatalogIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<ScenarioId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_index: Option<usize>,
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut location = Vec::new();
        if let Some(id) = self.scenario_id {
            location.push(format!("scenario={}", id));
        }
        if let Some(id) = &self.question_id {
            location.push(format!("question={}", id));
        }
        if let Some(idx) = self.option_index {
            location.push(format!("option={}", idx));
        }
        let location = if location.is_empty() {
            "catalog".to_string()
        } else {
            location.join(" ")
        };

        match &self.kind {
            IssueKind::EmptyCatalog => write!(f, "{}: catalog has no scenarios", location),
            IssueKind::DuplicateScenarioId => write!(f, "{}: duplicate scenario id", location),
            IssueKind::DuplicateQuestionId => write!(f, "{}: duplicate question id", location),
            IssueKind::WrongQuestionCount { actual } => write!(
                f,
                "{}: expected {} questions, found {}",
                location, SLOT_COUNT, actual
            ),
            IssueKind::NoOptions => write!(f, "{}: question has no options", location),
            IssueKind::EmptyTagVector => write!(f, "{}: option has no tags", location),
            IssueKind::TagOutOfRange { tag, value } => {
                write!(f, "{}: tag {:?}={} outside [0, 10]", location, tag, value)
            }
        }
    }
}

pub fn validate_catalog(catalog: &Catalog) -> Vec<CatalogIssue> {
    let mut issues = Vec::new();
    if catalog.scenarios.is_empty() {
        issues.push(CatalogIssue {
            scenario_id: None,
            question_id: None,
            option_index: None,
            kind: IssueKind::EmptyCatalog,
        });
        return issues;
    }

    let mut scenario_ids = BTreeSet::new();
    let mut question_ids = BTreeSet::new();

    for scenario in &catalog.scenarios {
        if !scenario_ids.insert(scenario.id) {
            issues.push(CatalogIssue {
                scenario_id: Some(scenario.id),
                question_id: None,
                option_index: None,
                kind: IssueKind::DuplicateScenarioId,
            });
        }
        if scenario.questions.len() != SLOT_COUNT {
            issues.push(CatalogIssue {
                scenario_id: Some(scenario.id),
                question_id: None,
                option_index: None,
                kind: IssueKind::WrongQuestionCount {
                    actual: scenario.questions.len(),
                },
            });
        }

        for question in &scenario.questions {
            let at_question = |option_index: Option<usize>, kind: IssueKind| CatalogIssue {
                scenario_id: Some(scenario.id),
                question_id: Some(question.id.clone()),
                option_index,
                kind,
            };

            if !question_ids.insert(question.id.as_str()) {
                issues.push(at_question(None, IssueKind::DuplicateQuestionId));
            }
            if question.options.is_empty() {
                issues.push(at_question(None, IssueKind::NoOptions));
            }

            for (option_index, option) in question.options.iter().enumerate() {
                if option.tags.is_empty() {
                    issues.push(at_question(Some(option_index), IssueKind::EmptyTagVector));
                    continue;
                }
                for (tag, value) in out_of_range_tags(&option.tags) {
                    issues.push(at_question(
                        Some(option_index),
                        IssueKind::TagOutOfRange {
                            tag: tag.to_string(),
                            value,
                        },
                    ));
                }
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnswerOption, Question, Scenario};
    use perspectiva_core::TagVector;

    fn option(tags: &[(&str, f64)]) -> AnswerOption {
        AnswerOption {
            text: "opt".to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<TagVector>(),
        }
    }

    fn question(id: &str, options: Vec<AnswerOption>) -> Question {
        Question {
            id: id.to_string(),
            text: "?".to_string(),
            options,
        }
    }

    fn scenario(id: ScenarioId, questions: Vec<Question>) -> Scenario {
        Scenario {
            id,
            title: format!("s{}", id),
            description: String::new(),
            questions,
        }
    }

    fn catalog(scenarios: Vec<Scenario>) -> Catalog {
        Catalog {
            catalog_id: "test".to_string(),
            revision: "0".to_string(),
            scenarios,
        }
    }

    fn four(prefix: &str) -> Vec<Question> {
        (1..=4)
            .map(|n| question(&format!("{}_{}", prefix, n), vec![option(&[("x", 5.0)])]))
            .collect()
    }

    #[test]
    fn empty_catalog_is_flagged() {
        let issues = validate_catalog(&catalog(Vec::new()));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::EmptyCatalog);
    }

    #[test]
    fn wrong_question_count_is_flagged() {
        let mut questions = four("q1");
        questions.pop();
        let issues = validate_catalog(&catalog(vec![scenario(1, questions)]));
        assert_eq!(issues, vec![CatalogIssue {
            scenario_id: Some(1),
            question_id: None,
            option_index: None,
            kind: IssueKind::WrongQuestionCount { actual: 3 },
        }]);
    }

    #[test]
    fn duplicates_are_flagged() {
        let issues = validate_catalog(&catalog(vec![
            scenario(1, four("q1")),
            scenario(1, four("q1")),
        ]));
        let kinds: Vec<&IssueKind> = issues.iter().map(|i| &i.kind).collect();
        assert_eq!(kinds.iter().filter(|k| ***k == IssueKind::DuplicateScenarioId).count(), 1);
        assert_eq!(kinds.iter().filter(|k| ***k == IssueKind::DuplicateQuestionId).count(), 4);
    }

    #[test]
    fn tag_problems_are_located() {
        let mut questions = four("q1");
        questions[2] = question("q1_3", vec![option(&[("x", 12.0), ("y", 3.0)]), option(&[])]);
        questions[3] = question("q1_4", Vec::new());
        let issues = validate_catalog(&catalog(vec![scenario(1, questions)]));

        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].question_id.as_deref(), Some("q1_3"));
        assert_eq!(issues[0].option_index, Some(0));
        assert_eq!(
            issues[0].kind,
            IssueKind::TagOutOfRange {
                tag: "x".to_string(),
                value: 12.0
            }
        );
        assert_eq!(issues[1].kind, IssueKind::EmptyTagVector);
        assert_eq!(issues[1].option_index, Some(1));
        assert_eq!(issues[2].kind, IssueKind::NoOptions);
    }

    #[test]
    fn issue_serializes_with_code() {
        let issue = CatalogIssue {
            scenario_id: Some(2),
            question_id: None,
            option_index: None,
            kind: IssueKind::WrongQuestionCount { actual: 5 },
        };
        let value = serde_json::to_value(&issue).expect("serialize");
        assert_eq!(value["code"], "WRONG_QUESTION_COUNT");
        assert_eq!(value["actual"], 5);
        assert_eq!(value["scenario_id"], 2);
        assert_eq!(
            issue.to_string(),
            "scenario=2: expected 4 questions, found 5"
        );
    }
}
