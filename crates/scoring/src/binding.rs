use crate::{blake3_hex, jcs_bytes, AnswerSet, HashError};
use serde::Serialize;

#[derive(Serialize)]
struct CanonicalInputs<'a> {
    v: u8,
    answers_a: &'a AnswerSet,
    answers_b: &'a AnswerSet,
}

/// Hash binding a result to the exact pair of answer sets it was computed from.
pub fn compute_inputs_hash(answers_a: &AnswerSet, answers_b: &AnswerSet) -> Result<String, HashError> {
    let canonical = CanonicalInputs {
        v: 1,
        answers_a,
        answers_b,
    };
    Ok(blake3_hex(&jcs_bytes(&canonical)?))
}

#[derive(Serialize)]
struct CanonicalAnswers<'a> {
    v: u8,
    answers: &'a AnswerSet,
}

/// Single-respondent counterpart of [`compute_inputs_hash`].
pub fn compute_answers_hash(answers: &AnswerSet) -> Result<String, HashError> {
    Ok(blake3_hex(&jcs_bytes(&CanonicalAnswers { v: 1, answers })?))
}
