use std::path::Path;

use tracing::debug;

use crate::artifact::ModelArtifact;
use crate::error::{PipelineError, Result};
use crate::features::{
    build_feature_vector, ct_to_percent, parse_skill_count, validate_feature_names, FeatureField,
    SemesterFeatures, SEMESTERS,
};
use crate::forest::{Classifier, RandomForest};
use crate::models::PredictionResult;

/// Read-only after construction; one instance serves any number of calls.
#[derive(Debug, Clone)]
pub struct Predictor<C = RandomForest> {
    classifier: C,
    features: Vec<String>,
}

impl Predictor<RandomForest> {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_artifact(ModelArtifact::load(path)?))
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self {
            classifier: artifact.model,
            features: artifact.features,
        }
    }
}

impl<C: Classifier> Predictor<C> {
    pub fn new(classifier: C, features: Vec<String>) -> Result<Self> {
        validate_feature_names(&features)?;
        if classifier.feature_count() != features.len() {
            return Err(PipelineError::schema(format!(
                "classifier expects {} features but {} names were given",
                classifier.feature_count(),
                features.len()
            )));
        }
        Ok(Self {
            classifier,
            features,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.features
    }

    /// CT marks are converted from /30 to percentages without clamping.
    pub fn build_feature_vector(
        &self,
        ct1_scores: &[f64],
        ct2_scores: &[f64],
        final_scores: &[f64],
        skill_text: &str,
    ) -> Result<(Vec<f64>, u32)> {
        let ct1 = per_semester("ct1_scores", ct1_scores)?;
        let ct2 = per_semester("ct2_scores", ct2_scores)?;
        let finals = per_semester("final_scores", final_scores)?;
        let skill_count = parse_skill_count(skill_text);

        let mut features = SemesterFeatures::default();
        for semester in 1..=SEMESTERS {
            let index = semester - 1;
            features.set(FeatureField::Ct1, semester, ct_to_percent(ct1[index]));
            features.set(FeatureField::Ct2, semester, ct_to_percent(ct2[index]));
            features.set(FeatureField::Final, semester, finals[index]);
            features.set(FeatureField::Skill, semester, f64::from(skill_count));
        }

        let vector = build_feature_vector(&self.features, &features)?;
        Ok((vector, skill_count))
    }

    pub fn predict(
        &self,
        ct1_scores: &[f64],
        ct2_scores: &[f64],
        final_scores: &[f64],
        skill_text: &str,
    ) -> Result<PredictionResult> {
        let (vector, skill_count) =
            self.build_feature_vector(ct1_scores, ct2_scores, final_scores, skill_text)?;
        let prediction = self.classifier.predict(&vector)?;

        let probability = prediction
            .probabilities
            .get(prediction.label)
            .copied()
            .ok_or_else(|| PipelineError::schema("classifier returned no probability for its label"))?;
        let label = u8::try_from(prediction.label)
            .map_err(|_| PipelineError::schema(format!("label {} is not binary", prediction.label)))?;

        debug!(label, probability, skill_count, "predicted placement");
        Ok(PredictionResult {
            label,
            probability,
            probabilities: prediction.probabilities,
            skill_count,
        })
    }
}

/// Loads the artifact and predicts in one call. Re-reads the model every
/// time; keep a [`Predictor`] around to avoid that.
pub fn predict_from_inputs(
    model_path: &Path,
    ct1_scores: &[f64],
    ct2_scores: &[f64],
    final_scores: &[f64],
    skill_text: &str,
) -> Result<PredictionResult> {
    Predictor::load(model_path)?.predict(ct1_scores, ct2_scores, final_scores, skill_text)
}

fn per_semester(name: &str, values: &[f64]) -> Result<[f64; SEMESTERS]> {
    <[f64; SEMESTERS]>::try_from(values).map_err(|_| {
        PipelineError::invalid_input(format!(
            "{name} needs exactly {SEMESTERS} values, got {}",
            values.len()
        ))
    })
}
