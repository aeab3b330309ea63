use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::features::SemesterFeatures;

/// A source dataset of arbitrary schema. Empty cells are `None`.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn text_column(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).and_then(|cell| cell.as_deref()))
                .collect(),
        )
    }

    /// Parses a column as numbers. Fails if any non-empty cell is not numeric.
    pub fn numeric_column(&self, name: &str) -> Result<Option<Vec<Option<f64>>>> {
        let Some(cells) = self.text_column(name) else {
            return Ok(None);
        };

        cells
            .into_iter()
            .enumerate()
            .map(|(row, cell)| match cell {
                None => Ok(None),
                Some(text) => parse_number(text).map(Some).ok_or_else(|| {
                    PipelineError::dataset(format!(
                        "column `{name}` row {}: `{text}` is not a number",
                        row + 1
                    ))
                }),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    pub fn numeric_columns(&self) -> Vec<Vec<Option<f64>>> {
        (0..self.columns.len())
            .filter_map(|index| {
                self.rows
                    .iter()
                    .map(|row| match row.get(index).and_then(|cell| cell.as_deref()) {
                        None => Some(None),
                        Some(text) => parse_number(text).map(Some),
                    })
                    .collect::<Option<Vec<_>>>()
            })
            .collect()
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseScoreSource {
    TotalScore,
    NumericMean,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtendedRecord {
    pub features: SemesterFeatures,
    pub placed: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedTable {
    pub feature_names: Vec<String>,
    pub records: Vec<ExtendedRecord>,
    pub base_source: BaseScoreSource,
    pub synthesized_columns: Vec<String>,
}

impl ExtendedTable {
    pub fn placed_count(&self) -> usize {
        self.records.iter().filter(|record| record.placed == 1).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScores {
    pub ct1: Vec<f64>,
    pub ct2: Vec<f64>,
    #[serde(rename = "final")]
    pub finals: Vec<f64>,
    pub skills: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: u8,
    /// Probability of `label`.
    pub probability: f64,
    pub probabilities: Vec<f64>,
    /// Skill feature value (token count times ten).
    pub skill_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub inputs: CandidateScores,
    pub skill_count: u32,
    pub result: String,
    /// Percentage, two decimals.
    pub probability: f64,
}
