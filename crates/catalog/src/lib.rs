use once_cell::sync::Lazy;
use perspectiva_core::TagVector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

mod validate;

pub use validate::{validate_catalog, CatalogIssue, IssueKind};

pub const CLASSIC_CATALOG_ID: &str = "classic";
pub const SLOT_COUNT: usize = 4;

const CLASSIC_CATALOG_JSON: &str = include_str!("../data/classic.json");

static CLASSIC: Lazy<Catalog> = Lazy::new(|| {
    serde_json::from_str(CLASSIC_CATALOG_JSON).expect("embedded classic catalog must parse")
});

pub type ScenarioId = u32;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AnswerOption {
    pub text: String,
    #[serde(default)]
    pub tags: TagVector,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<AnswerOption>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub id: ScenarioId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<Question>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    pub catalog_id: String,
    pub revision: String,
    pub scenarios: Vec<Scenario>,
}

/// Fixed question roles inside a scenario, in catalog order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PerspectiveSlot {
    SelfDesire,
    PerceivedPartnerDesire,
    FairnessView,
    PerceivedPartnerFairness,
}

impl PerspectiveSlot {
    pub const ALL: [PerspectiveSlot; SLOT_COUNT] = [
        PerspectiveSlot::SelfDesire,
        PerspectiveSlot::PerceivedPartnerDesire,
        PerspectiveSlot::FairnessView,
        PerspectiveSlot::PerceivedPartnerFairness,
    ];

    pub fn index(self) -> usize {
        match self {
            PerspectiveSlot::SelfDesire => 0,
            PerspectiveSlot::PerceivedPartnerDesire => 1,
            PerspectiveSlot::FairnessView => 2,
            PerspectiveSlot::PerceivedPartnerFairness => 3,
        }
    }

    /// 1-based slot number as shown to respondents.
    pub fn number(self) -> usize {
        self.index() + 1
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn question_of(self, scenario: &Scenario) -> Option<&Question> {
        scenario.question(self)
    }

    pub fn label(self) -> &'static str {
        match self {
            PerspectiveSlot::SelfDesire => "self desire",
            PerspectiveSlot::PerceivedPartnerDesire => "perceived partner desire",
            PerspectiveSlot::FairnessView => "fairness view",
            PerspectiveSlot::PerceivedPartnerFairness => "perceived partner fairness view",
        }
    }
}

impl Scenario {
    pub fn has_slot_layout(&self) -> bool {
        self.questions.len() == SLOT_COUNT
    }

    /// The question occupying `slot`, or `None` when the scenario is malformed.
    pub fn question(&self, slot: PerspectiveSlot) -> Option<&Question> {
        if !self.has_slot_layout() {
            return None;
        }
        self.questions.get(slot.index())
    }
}

impl Catalog {
    pub fn classic() -> Self {
        CLASSIC.clone()
    }

    pub fn question_count(&self) -> usize {
        self.scenarios.iter().map(|s| s.questions.len()).sum()
    }

    /// Question counts per scenario, in order.
    pub fn layout(&self) -> Vec<usize> {
        self.scenarios.iter().map(|s| s.questions.len()).collect()
    }

    pub fn scenario(&self, id: ScenarioId) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    pub fn find_question(&self, question_id: &str) -> Option<(&Scenario, &Question)> {
        self.scenarios.iter().find_map(|scenario| {
            scenario
                .questions
                .iter()
                .find(|q| q.id == question_id)
                .map(|q| (scenario, q))
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog at {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("invalid catalog JSON: {message}")]
    Parse { message: String },
}

pub fn load_catalog_json(input: &str) -> Result<Catalog, CatalogError> {
    serde_json::from_str(input).map_err(|err| CatalogError::Parse {
        message: err.to_string(),
    })
}

pub fn load_catalog_file(path: &Path) -> Result<Catalog, CatalogError> {
    let raw = fs::read_to_string(path).map_err(|err| CatalogError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    load_catalog_json(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_catalog_parses() {
        let catalog = Catalog::classic();
        assert_eq!(catalog.catalog_id, CLASSIC_CATALOG_ID);
        assert_eq!(catalog.scenarios.len(), 3);
        assert!(catalog.scenarios.iter().all(Scenario::has_slot_layout));
        assert_eq!(catalog.question_count(), 12);
        assert_eq!(catalog.layout(), vec![4, 4, 4]);
    }

    #[test]
    fn classic_catalog_is_clean() {
        assert!(validate_catalog(&Catalog::classic()).is_empty());
    }

    #[test]
    fn slots_follow_catalog_order() {
        let catalog = Catalog::classic();
        let scenario = catalog.scenario(2).expect("finances scenario");
        let fairness = scenario
            .question(PerspectiveSlot::FairnessView)
            .expect("slot 3");
        assert_eq!(fairness.id, "q2_3");
        assert_eq!(PerspectiveSlot::FairnessView.number(), 3);
        assert_eq!(
            PerspectiveSlot::from_index(3),
            Some(PerspectiveSlot::PerceivedPartnerFairness)
        );
        assert_eq!(PerspectiveSlot::from_index(4), None);
    }

    #[test]
    fn malformed_scenario_has_no_slots() {
        let scenario = Scenario {
            id: 9,
            title: "short".to_string(),
            description: String::new(),
            questions: vec![Question {
                id: "q9_1".to_string(),
                text: "only one".to_string(),
                options: Vec::new(),
            }],
        };
        assert!(scenario.question(PerspectiveSlot::SelfDesire).is_none());
    }

    #[test]
    fn find_question_by_id() {
        let catalog = Catalog::classic();
        let (scenario, question) = catalog.find_question("q3_2").expect("q3_2");
        assert_eq!(scenario.id, 3);
        assert_eq!(question.options.len(), 4);
        assert!(catalog.find_question("q7_1").is_none());
    }

    #[test]
    fn load_rejects_unknown_fields() {
        let raw = r#"{"catalog_id":"x","revision":"1","scenarios":[],"extra":true}"#;
        assert!(matches!(
            load_catalog_json(raw),
            Err(CatalogError::Parse { .. })
        ));
    }

    #[test]
    fn option_without_tags_defaults_to_empty() {
        let raw = r#"{"catalog_id":"x","revision":"1","scenarios":[
            {"id":1,"title":"t","questions":[{"id":"q1_1","text":"?","options":[{"text":"a"}]}]}
        ]}"#;
        let catalog = load_catalog_json(raw).expect("parse");
        assert!(catalog.scenarios[0].questions[0].options[0].tags.is_empty());
        assert_eq!(catalog.scenarios[0].description, "");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_catalog_file(Path::new("/nonexistent/perspectiva/catalog.json"))
            .expect_err("must fail");
        assert!(matches!(err, CatalogError::Io { .. }));
    }
}
