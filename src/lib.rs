pub mod artifact;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod forest;
pub mod history;
pub mod metrics;
pub mod models;
pub mod predict;
pub mod report;
pub mod synth;
pub mod trainer;

pub use artifact::ModelArtifact;
pub use config::{Settings, TrainConfig};
pub use error::{PipelineError, Result};
pub use models::{CandidateScores, PredictionResult};
pub use predict::{predict_from_inputs, Predictor};
