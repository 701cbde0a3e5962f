use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One respondent's answers: question id to zero-based option index.
///
/// Indices are signed so that negative values read from storage can be carried
/// through and rejected by the resolver instead of failing deserialization.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AnswerSet(BTreeMap<String, i64>);

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, question_id: &str) -> Option<i64> {
        self.0.get(question_id).copied()
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.0.contains_key(question_id)
    }

    /// Records an answer, replacing any previous one for the same question.
    pub fn insert(&mut self, question_id: impl Into<String>, index: i64) -> Option<i64> {
        self.0.insert(question_id.into(), index)
    }

    pub fn remove(&mut self, question_id: &str) -> Option<i64> {
        self.0.remove(question_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(id, index)| (id.as_str(), *index))
    }
}

impl<K: Into<String>> FromIterator<(K, i64)> for AnswerSet {
    fn from_iter<I: IntoIterator<Item = (K, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(id, index)| (id.into(), index)).collect())
    }
}
