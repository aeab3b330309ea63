use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::artifact::ModelArtifact;
use crate::config::{Settings, TrainConfig};
use crate::dataset::{load_raw_table, write_extended_table};
use crate::error::{PipelineError, Result};
use crate::features::build_feature_vector;
use crate::forest::{Classifier, RandomForest};
use crate::metrics::{classification_report, ClassificationReport};
use crate::models::{BaseScoreSource, ExtendedTable, RawTable};
use crate::synth::{synthesize_seeded, SYNTHESIS_SEED};

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub placed_rows: usize,
    pub base_source: BaseScoreSource,
    pub synthesized_columns: usize,
    pub report: ClassificationReport,
    pub config: TrainConfig,
    pub model_path: Option<PathBuf>,
    pub autogen_path: Option<PathBuf>,
}

impl TrainingSummary {
    pub fn accuracy(&self) -> f64 {
        self.report.accuracy
    }
}

/// Shuffled train/test row indices. The test side gets
/// `ceil(test_ratio * n)` rows and both sides must be non-empty.
pub fn train_test_split(n: usize, test_ratio: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(PipelineError::training(format!(
            "test ratio must be between 0 and 1, got {test_ratio}"
        )));
    }

    let n_test = (test_ratio * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::training(format!(
            "{n} rows is too few to hold out a {:.0}% test split",
            test_ratio * 100.0
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let train = order.split_off(n_test);
    Ok((train, order))
}

pub fn feature_matrix(table: &ExtendedTable) -> Result<(Vec<Vec<f64>>, Vec<u8>)> {
    let rows = table
        .records
        .iter()
        .map(|record| build_feature_vector(&table.feature_names, &record.features))
        .collect::<Result<Vec<_>>>()?;
    let labels = table.records.iter().map(|record| record.placed).collect();
    Ok((rows, labels))
}

pub fn fit_extended(
    table: &ExtendedTable,
    config: &TrainConfig,
) -> Result<(ModelArtifact, TrainingSummary)> {
    let (rows, labels) = feature_matrix(table)?;
    let placed = table.placed_count();
    if placed == 0 || placed == rows.len() {
        warn!(rows = rows.len(), placed, "training labels contain a single class");
    }
    let (train_idx, test_idx) = train_test_split(rows.len(), config.test_ratio, config.seed)?;
    info!(train = train_idx.len(), test = test_idx.len(), "split dataset");

    let pick_rows = |idx: &[usize]| idx.iter().map(|&i| rows[i].clone()).collect::<Vec<_>>();
    let pick_labels = |idx: &[usize]| idx.iter().map(|&i| labels[i]).collect::<Vec<_>>();

    let train_rows = pick_rows(&train_idx);
    let train_labels = pick_labels(&train_idx);

    info!(
        trees = config.forest.n_estimators,
        max_depth = config.forest.max_depth,
        "training random forest"
    );
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let forest = RandomForest::fit(&train_rows, &train_labels, config.forest, &mut rng)?;

    let test_labels = pick_labels(&test_idx);
    let predictions = pick_rows(&test_idx)
        .iter()
        .map(|row| forest.predict(row).map(|p| p.label as u8))
        .collect::<Result<Vec<_>>>()?;
    let report = classification_report(&predictions, &test_labels)?;
    info!(accuracy = report.accuracy, "evaluated on held-out rows");

    let artifact = ModelArtifact::new(table.feature_names.clone(), forest)?;
    let summary = TrainingSummary {
        rows: rows.len(),
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
        placed_rows: placed,
        base_source: table.base_source,
        synthesized_columns: table.synthesized_columns.len(),
        report,
        config: *config,
        model_path: None,
        autogen_path: None,
    };
    Ok((artifact, summary))
}

pub fn train_on_table(
    table: &RawTable,
    config: &TrainConfig,
) -> Result<(ExtendedTable, ModelArtifact, TrainingSummary)> {
    let extended = synthesize_seeded(table, SYNTHESIS_SEED)?;
    let (artifact, summary) = fit_extended(&extended, config)?;
    Ok((extended, artifact, summary))
}

/// Fails before writing anything when the raw dataset is missing.
pub fn train_full_model(settings: &Settings, config: &TrainConfig) -> Result<TrainingSummary> {
    let raw = load_raw_table(&settings.data_file)?;
    let extended = synthesize_seeded(&raw, SYNTHESIS_SEED)?;
    write_extended_table(&settings.autogen_file, &extended)?;

    let (artifact, mut summary) = fit_extended(&extended, config)?;
    artifact.save(&settings.model_file)?;

    summary.model_path = Some(settings.model_file.clone());
    summary.autogen_path = Some(settings.autogen_file.clone());
    Ok(summary)
}
