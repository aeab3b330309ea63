use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::features::SKILL_WEIGHT;
use crate::models::{CandidateScores, HistoryEntry, PredictionResult};

pub fn label_text(label: u8) -> &'static str {
    if label == 1 {
        "Placed"
    } else {
        "Not Placed"
    }
}

/// Probability as a percentage rounded to two decimals.
pub fn probability_percent(probability: f64) -> f64 {
    (probability * 10_000.0).round() / 100.0
}

impl HistoryEntry {
    pub fn new(inputs: CandidateScores, result: &PredictionResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            inputs,
            skill_count: result.skill_count / SKILL_WEIGHT,
            result: label_text(result.label).to_string(),
            probability: probability_percent(result.probability),
        }
    }
}

/// Appends one entry as a JSON line.
pub fn append_entry(path: &Path, entry: &HistoryEntry) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(entry)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// All stored entries, newest first. A missing file is an empty history.
pub fn read_entries(path: &Path) -> Result<Vec<HistoryEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut entries = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: HistoryEntry = serde_json::from_str(&line).map_err(|e| {
            PipelineError::dataset(format!("{} line {}: {e}", path.display(), number + 1))
        })?;
        entries.push(entry);
    }

    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(entries)
}
