use std::path::PathBuf;

use crate::forest::ForestParams;

pub const DATA_FILE: &str = "StudentData.csv";
pub const AUTOGEN_FILE: &str = "StudentData_autogen.csv";
pub const MODEL_FILE: &str = "job_model.json";
pub const HISTORY_FILE: &str = "prediction_history.jsonl";

/// File locations used by training, prediction and history.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_file: PathBuf,
    pub autogen_file: PathBuf,
    pub model_file: PathBuf,
    pub history_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DATA_FILE),
            autogen_file: PathBuf::from(AUTOGEN_FILE),
            model_file: PathBuf::from(MODEL_FILE),
            history_file: PathBuf::from(HISTORY_FILE),
        }
    }
}

impl Settings {
    /// Defaults overridden by `PLACEMENT_DATA_FILE`, `PLACEMENT_AUTOGEN_FILE`,
    /// `PLACEMENT_MODEL_FILE` and `PLACEMENT_HISTORY_FILE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };

        Self {
            data_file: path("PLACEMENT_DATA_FILE", DATA_FILE),
            autogen_file: path("PLACEMENT_AUTOGEN_FILE", AUTOGEN_FILE),
            model_file: path("PLACEMENT_MODEL_FILE", MODEL_FILE),
            history_file: path("PLACEMENT_HISTORY_FILE", HISTORY_FILE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub forest: ForestParams,
    /// Share of rows held out for evaluation.
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            test_ratio: 0.2,
            seed: 42,
        }
    }
}
