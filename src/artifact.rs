use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::features::validate_feature_names;
use crate::forest::{Classifier, RandomForest};

/// Bumped whenever the feature layout or model encoding changes.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// A fitted classifier plus the ordered feature names it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub features: Vec<String>,
    pub model: RandomForest,
}

impl ModelArtifact {
    pub fn new(features: Vec<String>, model: RandomForest) -> Result<Self> {
        let artifact = Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            trained_at: Utc::now(),
            features,
            model,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::ModelNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&content)?;
        artifact.validate()?;
        info!(
            path = %path.display(),
            trained_at = %artifact.trained_at,
            trees = artifact.model.trees().len(),
            "loaded model artifact"
        );
        Ok(artifact)
    }

    /// Writes to a sibling temp file and renames it into place so readers
    /// never see a partial artifact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &content)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), bytes = content.len(), "saved model artifact");
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(PipelineError::schema(format!(
                "artifact format {} is not supported (expected {ARTIFACT_FORMAT_VERSION}); retrain the model",
                self.format_version
            )));
        }
        validate_feature_names(&self.features)?;
        if self.model.feature_count() != self.features.len() {
            return Err(PipelineError::schema(format!(
                "model expects {} features but the artifact lists {}",
                self.model.feature_count(),
                self.features.len()
            )));
        }
        self.model.validate()
    }
}
