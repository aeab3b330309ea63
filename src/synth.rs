use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::features::{
    count_skill_tokens, ct_to_percent, feature_names, weighted_skill_count, FeatureField,
    SemesterFeatures, LABEL_COLUMN, SEMESTERS,
};
use crate::models::{BaseScoreSource, ExtendedRecord, ExtendedTable, RawTable};

pub const SYNTHESIS_SEED: u64 = 42;

pub const TOTAL_SCORE_COLUMN: &str = "Total_Score";
pub const SKILLS_COLUMN: &str = "Skills";

pub const FALLBACK_BASE_SCORE: f64 = 70.0;

// Used when the export has no `Skills` column. A bare count, not weighted.
pub const DEFAULT_SKILL_COUNT: f64 = 5.0;

const SCALED_FLOOR: f64 = 40.0;
const SCALED_SPAN: f64 = 60.0;

const CT_NOISE_SD: f64 = 6.0;
const FINAL_NOISE_SD: f64 = 8.0;
const FINAL_SHIFT: f64 = 2.0;

const FINAL_LABEL_WEIGHT: f64 = 0.7;
const SKILL_LABEL_WEIGHT: f64 = 0.3;
const PLACEMENT_THRESHOLD: f64 = 0.5;

pub fn base_scores(table: &RawTable) -> Result<(Vec<f64>, BaseScoreSource)> {
    if let Some(totals) = table.numeric_column(TOTAL_SCORE_COLUMN)? {
        let fill = mean(totals.iter().flatten().copied()).unwrap_or(FALLBACK_BASE_SCORE);
        let scores = totals.into_iter().map(|value| value.unwrap_or(fill)).collect();
        return Ok((scores, BaseScoreSource::TotalScore));
    }

    let numeric = table.numeric_columns();
    if !numeric.is_empty() {
        let scores = (0..table.len())
            .map(|row| {
                mean(numeric.iter().filter_map(|column| column[row])).unwrap_or(FALLBACK_BASE_SCORE)
            })
            .collect();
        return Ok((scores, BaseScoreSource::NumericMean));
    }

    Ok((vec![FALLBACK_BASE_SCORE; table.len()], BaseScoreSource::Flat))
}

/// Min-max scales base scores into 40..=100. A table with zero range maps
/// every record to 70.
pub fn normalize_base_scores(base: &[f64]) -> Vec<f64> {
    let min = base.iter().copied().fold(f64::INFINITY, f64::min);
    let max = base.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if range > 0.0 {
        base.iter()
            .map(|value| SCALED_FLOOR + SCALED_SPAN * (value - min) / range)
            .collect()
    } else {
        vec![FALLBACK_BASE_SCORE; base.len()]
    }
}

pub fn skill_counts(table: &RawTable) -> Vec<f64> {
    match table.text_column(SKILLS_COLUMN) {
        Some(cells) => cells
            .into_iter()
            .map(|cell| {
                let count = cell.map(count_skill_tokens).unwrap_or(0);
                f64::from(weighted_skill_count(count))
            })
            .collect(),
        None => vec![DEFAULT_SKILL_COUNT; table.len()],
    }
}

/// Placement label from the derived score: `0.7 * final + 0.3 * skill`, both
/// averaged over semesters and scaled by 1/100.
pub fn derive_label(features: &SemesterFeatures) -> u8 {
    let final_avg = features.finals.iter().sum::<f64>() / SEMESTERS as f64;
    let skill_avg = features.skills.iter().sum::<f64>() / SEMESTERS as f64;
    let score = FINAL_LABEL_WEIGHT * (final_avg / 100.0) + SKILL_LABEL_WEIGHT * (skill_avg / 100.0);
    u8::from(score > PLACEMENT_THRESHOLD)
}

/// Noise for missing columns is drawn one column at a time, semester by
/// semester in CT1, CT2, Final order.
pub fn synthesize<R: Rng + ?Sized>(table: &RawTable, rng: &mut R) -> Result<ExtendedTable> {
    let n = table.len();
    let (base, base_source) = base_scores(table)?;
    let scaled = normalize_base_scores(&base);
    let skills = skill_counts(table);

    let mut features = vec![SemesterFeatures::default(); n];
    let mut synthesized_columns = Vec::new();

    for semester in 1..=SEMESTERS {
        for field in [FeatureField::Ct1, FeatureField::Ct2, FeatureField::Final] {
            let column = field.column(semester);
            let values = match table.numeric_column(&column)? {
                Some(raw) => observed_values(&column, field, raw)?,
                None => {
                    let (sd, shift) = match field {
                        FeatureField::Final => (FINAL_NOISE_SD, FINAL_SHIFT),
                        _ => (CT_NOISE_SD, 0.0),
                    };
                    let values: Vec<f64> = scaled
                        .iter()
                        .map(|base| {
                            let value = base + gaussian(&mut *rng, sd) + shift;
                            round2(value.clamp(0.0, 100.0))
                        })
                        .collect();
                    synthesized_columns.push(column);
                    values
                }
            };

            for (record, value) in features.iter_mut().zip(values) {
                record.set(field, semester, value);
            }
        }

        for (record, skill) in features.iter_mut().zip(skills.iter()) {
            record.set(FeatureField::Skill, semester, *skill);
        }
    }

    let labels = match table.numeric_column(LABEL_COLUMN)? {
        Some(raw) => raw
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                let value = value.ok_or_else(|| {
                    PipelineError::dataset(format!("column `{LABEL_COLUMN}` row {} is empty", row + 1))
                })?;
                placed_label(value).ok_or_else(|| {
                    PipelineError::dataset(format!(
                        "column `{LABEL_COLUMN}` row {}: {value} is not 0 or 1",
                        row + 1
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?,
        None => features.iter().map(derive_label).collect(),
    };

    let records: Vec<ExtendedRecord> = features
        .into_iter()
        .zip(labels)
        .map(|(features, placed)| ExtendedRecord { features, placed })
        .collect();

    debug!(columns = ?synthesized_columns, "synthesized columns");
    info!(
        rows = n,
        base_source = ?base_source,
        synthesized = synthesized_columns.len(),
        placed = records.iter().filter(|record| record.placed == 1).count(),
        "built extended dataset"
    );

    Ok(ExtendedTable {
        feature_names: feature_names(),
        records,
        base_source,
        synthesized_columns,
    })
}

fn placed_label(value: f64) -> Option<u8> {
    match value.trunc() {
        v if v == 0.0 => Some(0),
        v if v == 1.0 => Some(1),
        _ => None,
    }
}

pub fn synthesize_seeded(table: &RawTable, seed: u64) -> Result<ExtendedTable> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    synthesize(table, &mut rng)
}

fn observed_values(column: &str, field: FeatureField, raw: Vec<Option<f64>>) -> Result<Vec<f64>> {
    raw.into_iter()
        .enumerate()
        .map(|(row, value)| {
            let value = value.ok_or_else(|| {
                PipelineError::dataset(format!("column `{column}` row {} is empty", row + 1))
            })?;
            let percent = match field {
                FeatureField::Ct1 | FeatureField::Ct2 => ct_to_percent(value),
                _ => value,
            };
            Ok(percent.clamp(0.0, 100.0))
        })
        .collect()
}

/// Zero-mean normal sample via the Box-Muller transform.
fn gaussian<R: Rng + ?Sized>(rng: &mut R, sd: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::EPSILON);
    let u2: f64 = rng.gen();
    sd * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{read_raw_table, write_extended_table};
    use crate::features::SKILL_WEIGHT;

    fn table(csv: &str) -> RawTable {
        read_raw_table(csv.as_bytes()).unwrap()
    }

    #[test]
    fn gaussian_noise_is_centred_with_the_requested_spread() {
        let mut rng = ChaCha8Rng::seed_from_u64(SYNTHESIS_SEED);
        let samples: Vec<f64> = (0..20_000).map(|_| gaussian(&mut rng, 6.0)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.2, "mean {mean}");
        assert!((var.sqrt() - 6.0).abs() < 0.2, "sd {}", var.sqrt());
    }

    #[test]
    fn normalization_spans_forty_to_hundred() {
        let scaled = normalize_base_scores(&[0.0, 50.0, 100.0]);
        assert_eq!(scaled, vec![40.0, 70.0, 100.0]);
    }

    #[test]
    fn zero_range_normalizes_to_seventy() {
        assert_eq!(normalize_base_scores(&[60.0, 60.0, 60.0]), vec![70.0; 3]);
        assert!(normalize_base_scores(&[]).is_empty());
    }

    #[test]
    fn total_score_gaps_take_the_column_mean() {
        let raw = table("Total_Score,Age\n60,20\n,21\n80,22\n");
        let (base, source) = base_scores(&raw).unwrap();
        assert_eq!(source, BaseScoreSource::TotalScore);
        assert_eq!(base, vec![60.0, 70.0, 80.0]);
    }

    #[test]
    fn numeric_mean_ignores_text_columns() {
        let raw = table("Name,Midterm,Quiz\nAvery,80,60\nJules,,90\nKiara,,\n");
        let (base, source) = base_scores(&raw).unwrap();
        assert_eq!(source, BaseScoreSource::NumericMean);
        assert_eq!(base, vec![70.0, 90.0, FALLBACK_BASE_SCORE]);
    }

    #[test]
    fn text_only_tables_use_a_flat_base() {
        let raw = table("Name,Department\nAvery,CSE\nJules,ECE\n");
        let (base, source) = base_scores(&raw).unwrap();
        assert_eq!(source, BaseScoreSource::Flat);
        assert_eq!(base, vec![FALLBACK_BASE_SCORE; 2]);
    }

    #[test]
    fn non_numeric_total_score_is_an_error() {
        let raw = table("Total_Score\n80\nabsent\n");
        assert!(matches!(base_scores(&raw), Err(PipelineError::Dataset(_))));
    }

    #[test]
    fn skills_column_counts_tokens_times_ten() {
        let raw = RawTable::new(
            vec!["Name".to_string(), "Skills".to_string()],
            vec![
                vec![Some("Avery".to_string()), Some("Java, SQL, Python".to_string())],
                vec![Some("Jules".to_string()), Some("Java,".to_string())],
                vec![Some("Kiara".to_string()), None],
            ],
        );
        assert_eq!(skill_counts(&raw), vec![30.0, 10.0, 0.0]);
    }

    #[test]
    fn missing_skills_column_uses_the_unscaled_default() {
        // The default is a bare count of 5, unlike the x10 convention used
        // whenever skills are actually listed. Both paths are kept as-is.
        let raw = table("Total_Score\n70\n80\n");
        assert_eq!(skill_counts(&raw), vec![DEFAULT_SKILL_COUNT; 2]);
        assert_eq!(DEFAULT_SKILL_COUNT, 5.0);
        assert_ne!(DEFAULT_SKILL_COUNT, 5.0 * f64::from(SKILL_WEIGHT));
    }

    #[test]
    fn observed_columns_convert_and_clamp() {
        let raw = table("CT1_Sem1,CT2_Sem1,Final_Sem1\n15,36,105\n30,-3,64.5\n");
        let extended = synthesize_seeded(&raw, SYNTHESIS_SEED).unwrap();

        let first = &extended.records[0].features;
        assert_eq!(first.ct1[0], 50.0);
        assert_eq!(first.ct2[0], 100.0);
        assert_eq!(first.finals[0], 100.0);

        let second = &extended.records[1].features;
        assert_eq!(second.ct1[0], 100.0);
        assert_eq!(second.ct2[0], 0.0);
        assert_eq!(second.finals[0], 64.5);

        assert!(!extended.synthesized_columns.contains(&"CT1_Sem1".to_string()));
        assert!(extended.synthesized_columns.contains(&"CT1_Sem2".to_string()));
        assert_eq!(extended.synthesized_columns.len(), 21);
    }

    #[test]
    fn empty_cell_in_observed_column_is_an_error() {
        let raw = table("CT1_Sem1,Age\n20,19\n,20\n");
        assert!(matches!(
            synthesize_seeded(&raw, SYNTHESIS_SEED),
            Err(PipelineError::Dataset(_))
        ));
    }

    #[test]
    fn synthesized_values_are_clamped_and_rounded() {
        let raw = table("Total_Score,Skills\n0,Java\n100,\"Java,SQL\"\n55,\n");
        let extended = synthesize_seeded(&raw, SYNTHESIS_SEED).unwrap();

        assert_eq!(extended.synthesized_columns.len(), 24);
        for record in &extended.records {
            for values in [&record.features.ct1, &record.features.ct2, &record.features.finals] {
                for value in values.iter() {
                    assert!((0.0..=100.0).contains(value));
                    assert!(((value * 100.0).round() - value * 100.0).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn skill_feature_is_constant_across_semesters() {
        let raw = table("Total_Score,Skills\n40,\"Java,SQL\"\n90,Rust\n65,\n");
        let extended = synthesize_seeded(&raw, SYNTHESIS_SEED).unwrap();

        let expected = [20.0, 10.0, 0.0];
        for (record, skill) in extended.records.iter().zip(expected) {
            assert!(record.features.skills.iter().all(|value| *value == skill));
        }
    }

    #[test]
    fn same_seed_gives_identical_tables() {
        let raw = table("Total_Score,Skills\n52,Java\n71,\"SQL,Excel\"\n88,\n64,Python\n");
        let first = synthesize_seeded(&raw, SYNTHESIS_SEED).unwrap();
        let second = synthesize_seeded(&raw, SYNTHESIS_SEED).unwrap();
        assert_eq!(first, second);

        let dir = tempfile::tempdir().unwrap();
        let first_path = dir.path().join("first.csv");
        let second_path = dir.path().join("second.csv");
        write_extended_table(&first_path, &first).unwrap();
        write_extended_table(&second_path, &second).unwrap();
        assert_eq!(
            std::fs::read(&first_path).unwrap(),
            std::fs::read(&second_path).unwrap()
        );

        let other = synthesize_seeded(&raw, SYNTHESIS_SEED + 1).unwrap();
        assert_ne!(first.records, other.records);
    }

    #[test]
    fn existing_placed_column_is_kept_as_binary() {
        let raw = table("Total_Score,Placed\n95,0\n30,1\n60,1.0\n");
        let extended = synthesize_seeded(&raw, SYNTHESIS_SEED).unwrap();
        let labels: Vec<u8> = extended.records.iter().map(|r| r.placed).collect();
        assert_eq!(labels, vec![0, 1, 1]);
    }

    #[test]
    fn fractional_placed_values_truncate() {
        let raw = table("Total_Score,Placed\n95,0.5\n30,1.9\n60,-0.4\n");
        let extended = synthesize_seeded(&raw, SYNTHESIS_SEED).unwrap();
        let labels: Vec<u8> = extended.records.iter().map(|r| r.placed).collect();
        assert_eq!(labels, vec![0, 1, 0]);
    }

    #[test]
    fn out_of_range_placed_values_are_rejected() {
        for value in ["2", "-1"] {
            let raw = table(&format!("Total_Score,Placed\n80,1\n70,{value}\n"));
            let err = synthesize_seeded(&raw, SYNTHESIS_SEED).unwrap_err();
            assert!(matches!(err, PipelineError::Dataset(_)), "{err}");
            assert!(err.to_string().contains("row 2"));
        }
    }

    #[test]
    fn derived_label_weighs_finals_and_skills() {
        let mut features = SemesterFeatures::default();
        features.finals = [60.0; SEMESTERS];
        features.skills = [30.0; SEMESTERS];
        // 0.7 * 0.6 + 0.3 * 0.3 = 0.51
        assert_eq!(derive_label(&features), 1);

        features.skills = [20.0; SEMESTERS];
        // 0.7 * 0.6 + 0.3 * 0.2 = 0.48
        assert_eq!(derive_label(&features), 0);
    }

    #[test]
    fn labels_are_derived_when_placed_is_absent() {
        let raw = table(
            "Final_Sem1,Final_Sem2,Final_Sem3,Final_Sem4,Final_Sem5,Final_Sem6,Final_Sem7,Final_Sem8,Skills\n\
             90,90,90,90,90,90,90,90,\"Java,SQL\"\n\
             20,20,20,20,20,20,20,20,Java\n",
        );
        let extended = synthesize_seeded(&raw, SYNTHESIS_SEED).unwrap();
        assert_eq!(extended.records[0].placed, 1);
        assert_eq!(extended.records[1].placed, 0);
    }

    #[test]
    fn empty_table_yields_no_records() {
        let raw = table("Total_Score,Skills\n");
        let extended = synthesize_seeded(&raw, SYNTHESIS_SEED).unwrap();
        assert!(extended.records.is_empty());
        assert_eq!(extended.feature_names.len(), 32);
    }
}
