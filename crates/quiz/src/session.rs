use perspectiva_catalog::{Catalog, Question, Scenario};
use perspectiva_scoring::AnswerSet;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub scenario: usize,
    pub question: usize,
}

/// Outcome of a navigation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Moved(Position),
    /// `next` on the last question; the session is now complete.
    Completed,
    /// Nothing to move to, e.g. `previous` on the first question.
    Stayed,
}

/// Navigation state for answering a catalog one question at a time.
#[derive(Clone, Debug)]
pub struct QuizSession {
    layout: Vec<usize>,
    position: Position,
    answers: AnswerSet,
    completed: bool,
}

impl QuizSession {
    /// `layout` is the question count of each scenario, in catalog order.
    pub fn new(layout: Vec<usize>) -> Self {
        let position = Position {
            scenario: layout.iter().position(|count| *count > 0).unwrap_or(0),
            question: 0,
        };
        Self {
            layout,
            position,
            answers: AnswerSet::new(),
            completed: false,
        }
    }

    pub fn for_catalog(catalog: &Catalog) -> Self {
        Self::new(catalog.layout())
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    pub fn into_answers(self) -> AnswerSet {
        self.answers
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn total_questions(&self) -> usize {
        self.layout.iter().sum()
    }

    pub fn answer(&mut self, question_id: impl Into<String>, index: i64) {
        self.answers.insert(question_id, index);
    }

    pub fn next(&mut self) -> Transition {
        if self.completed {
            return Transition::Completed;
        }
        let Some(count) = self.layout.get(self.position.scenario).copied() else {
            self.completed = true;
            return Transition::Completed;
        };

        if self.position.question + 1 < count {
            self.position.question += 1;
            return Transition::Moved(self.position);
        }

        let following = (self.position.scenario + 1..self.layout.len())
            .find(|idx| self.layout[*idx] > 0);
        match following {
            Some(scenario) => {
                self.position = Position {
                    scenario,
                    question: 0,
                };
                Transition::Moved(self.position)
            }
            None => {
                tracing::debug!(answered = self.answers.len(), "quiz completed");
                self.completed = true;
                Transition::Completed
            }
        }
    }

    /// Steps back one question. On a completed session this reopens it at the
    /// last question instead of moving.
    pub fn previous(&mut self) -> Transition {
        if self.completed {
            self.completed = false;
            return Transition::Moved(self.position);
        }
        if self.position.question > 0 {
            self.position.question -= 1;
            return Transition::Moved(self.position);
        }

        let preceding = (0..self.position.scenario)
            .rev()
            .find(|idx| self.layout[*idx] > 0);
        match preceding {
            Some(scenario) => {
                self.position = Position {
                    scenario,
                    question: self.layout[scenario] - 1,
                };
                Transition::Moved(self.position)
            }
            None => Transition::Stayed,
        }
    }

    pub fn can_go_back(&self) -> bool {
        self.completed
            || self.position.question > 0
            || self.layout[..self.position.scenario.min(self.layout.len())]
                .iter()
                .any(|count| *count > 0)
    }

    /// Answered share of all questions, rounded down.
    pub fn progress_percent(&self) -> u8 {
        let total = self.total_questions();
        if total == 0 {
            return 0;
        }
        let answered = self.answers.len().min(total);
        (answered * 100 / total) as u8
    }

    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.layout));
    }

    pub fn current<'c>(&self, catalog: &'c Catalog) -> Option<(&'c Scenario, &'c Question)> {
        let scenario = catalog.scenarios.get(self.position.scenario)?;
        let question = scenario.questions.get(self.position.question)?;
        Some((scenario, question))
    }
}
