use crate::AnswerSet;
use perspectiva_catalog::{AnswerOption, Question};
use perspectiva_core::TagVector;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no answer for question {question_id}")]
    MissingAnswer { question_id: String },
    #[error("answer {index} for question {question_id} is outside 0..{option_count}")]
    OutOfRangeAnswer {
        question_id: String,
        index: i64,
        option_count: usize,
    },
}

pub(crate) fn option_at(question: &Question, index: i64) -> Option<&AnswerOption> {
    usize::try_from(index)
        .ok()
        .and_then(|idx| question.options.get(idx))
}

/// Tag vector of the option at `index`.
pub fn resolve_answer(question: &Question, index: i64) -> Result<&TagVector, ResolveError> {
    option_at(question, index)
        .map(|option| &option.tags)
        .ok_or_else(|| ResolveError::OutOfRangeAnswer {
            question_id: question.id.clone(),
            index,
            option_count: question.options.len(),
        })
}

/// Tag vector of the option `answers` selected for `question`.
pub fn resolve_tags<'c>(
    question: &'c Question,
    answers: &AnswerSet,
) -> Result<&'c TagVector, ResolveError> {
    let index = answers
        .get(&question.id)
        .ok_or_else(|| ResolveError::MissingAnswer {
            question_id: question.id.clone(),
        })?;
    resolve_answer(question, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perspectiva_catalog::Catalog;

    fn first_question() -> Question {
        Catalog::classic().scenarios[0].questions[0].clone()
    }

    #[test]
    fn resolves_valid_index() {
        let question = first_question();
        let tags = resolve_answer(&question, 1).expect("valid");
        assert_eq!(tags, &question.options[1].tags);
    }

    #[test]
    fn negative_and_past_end_are_out_of_range() {
        let question = first_question();
        let count = question.options.len();
        for index in [-1, count as i64, i64::MAX, i64::MIN] {
            assert_eq!(
                resolve_answer(&question, index),
                Err(ResolveError::OutOfRangeAnswer {
                    question_id: question.id.clone(),
                    index,
                    option_count: count,
                })
            );
        }
    }

    #[test]
    fn missing_answer_is_reported() {
        let question = first_question();
        let err = resolve_tags(&question, &AnswerSet::new()).expect_err("missing");
        assert_eq!(
            err,
            ResolveError::MissingAnswer {
                question_id: "q1_1".to_string()
            }
        );
        assert_eq!(err.to_string(), "no answer for question q1_1");
    }
}
