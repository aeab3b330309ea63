use std::collections::HashSet;

use crate::error::{PipelineError, Result};

// Layout is semester-major: CT1_Sem1, CT2_Sem1, Final_Sem1, Skill_Sem1, CT1_Sem2, ...
pub const SEMESTERS: usize = 8;
pub const FEATURES_PER_SEMESTER: usize = 4;
pub const FEATURE_COUNT: usize = SEMESTERS * FEATURES_PER_SEMESTER;
pub const LABEL_COLUMN: &str = "Placed";

/// Class tests are marked out of this many points.
pub const CT_MAX_MARK: f64 = 30.0;
pub const SKILL_WEIGHT: u32 = 10;

const NO_SKILL_SENTINELS: [&str; 3] = ["none", "na", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureField {
    Ct1,
    Ct2,
    Final,
    Skill,
}

impl FeatureField {
    pub const ALL: [FeatureField; FEATURES_PER_SEMESTER] = [
        FeatureField::Ct1,
        FeatureField::Ct2,
        FeatureField::Final,
        FeatureField::Skill,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            FeatureField::Ct1 => "CT1",
            FeatureField::Ct2 => "CT2",
            FeatureField::Final => "Final",
            FeatureField::Skill => "Skill",
        }
    }

    pub fn column(self, semester: usize) -> String {
        format!("{}_Sem{}", self.prefix(), semester)
    }
}

pub fn feature_names() -> Vec<String> {
    (1..=SEMESTERS)
        .flat_map(|semester| {
            FeatureField::ALL
                .iter()
                .map(move |field| field.column(semester))
        })
        .collect()
}

pub fn parse_feature_name(name: &str) -> Option<(FeatureField, usize)> {
    let (prefix, semester) = name.split_once("_Sem")?;
    let field = FeatureField::ALL
        .into_iter()
        .find(|field| field.prefix() == prefix)?;
    let semester: usize = semester.parse().ok()?;
    if (1..=SEMESTERS).contains(&semester) {
        Some((field, semester))
    } else {
        None
    }
}

/// Checks that a persisted name list covers every (field, semester) pair
/// exactly once.
pub fn validate_feature_names(names: &[String]) -> Result<()> {
    if names.len() != FEATURE_COUNT {
        return Err(PipelineError::schema(format!(
            "expected {FEATURE_COUNT} feature names, found {}",
            names.len()
        )));
    }

    let mut seen = HashSet::new();
    for name in names {
        let key = parse_feature_name(name)
            .ok_or_else(|| PipelineError::schema(format!("unknown feature name `{name}`")))?;
        if !seen.insert(key) {
            return Err(PipelineError::schema(format!(
                "duplicate feature name `{name}`"
            )));
        }
    }

    Ok(())
}

/// Converts a class-test mark out of 30 into a percentage. No clamping.
pub fn ct_to_percent(mark: f64) -> f64 {
    mark * 100.0 / CT_MAX_MARK
}

pub fn count_skill_tokens(text: &str) -> usize {
    text.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .count()
}

/// Skill feature value for a free-text skill list: token count times ten,
/// or zero for blank text and the "none"/"na" sentinels.
pub fn parse_skill_count(text: &str) -> u32 {
    let normalized = text.trim().to_lowercase();
    if NO_SKILL_SENTINELS.contains(&normalized.as_str()) {
        return 0;
    }
    weighted_skill_count(count_skill_tokens(text))
}

/// `count * SKILL_WEIGHT`, saturating at `u32::MAX`.
pub fn weighted_skill_count(count: usize) -> u32 {
    u32::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(SKILL_WEIGHT))
        .unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SemesterFeatures {
    pub ct1: [f64; SEMESTERS],
    pub ct2: [f64; SEMESTERS],
    pub finals: [f64; SEMESTERS],
    pub skills: [f64; SEMESTERS],
}

impl SemesterFeatures {
    pub fn value(&self, field: FeatureField, semester: usize) -> f64 {
        let index = semester - 1;
        match field {
            FeatureField::Ct1 => self.ct1[index],
            FeatureField::Ct2 => self.ct2[index],
            FeatureField::Final => self.finals[index],
            FeatureField::Skill => self.skills[index],
        }
    }

    pub fn set(&mut self, field: FeatureField, semester: usize, value: f64) {
        let index = semester - 1;
        match field {
            FeatureField::Ct1 => self.ct1[index] = value,
            FeatureField::Ct2 => self.ct2[index] = value,
            FeatureField::Final => self.finals[index] = value,
            FeatureField::Skill => self.skills[index] = value,
        }
    }
}

pub fn build_feature_vector(names: &[String], features: &SemesterFeatures) -> Result<Vec<f64>> {
    validate_feature_names(names)?;
    names
        .iter()
        .map(|name| {
            parse_feature_name(name)
                .map(|(field, semester)| features.value(field, semester))
                .ok_or_else(|| PipelineError::schema(format!("unknown feature name `{name}`")))
        })
        .collect()
}
