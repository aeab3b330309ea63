use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use placement_predictor::config::{Settings, TrainConfig};
use placement_predictor::features::SKILL_WEIGHT;
use placement_predictor::forest::ForestParams;
use placement_predictor::history::{self, label_text, probability_percent};
use placement_predictor::models::{CandidateScores, HistoryEntry};
use placement_predictor::predict::Predictor;
use placement_predictor::report;
use placement_predictor::trainer;

#[derive(Parser)]
#[command(name = "placement-predictor")]
#[command(about = "Job placement prediction from semester scores and skills", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the extended dataset and train the placement model
    Train {
        /// Raw dataset (CSV)
        #[arg(long)]
        data: Option<PathBuf>,
        /// Where to write the extended dataset
        #[arg(long)]
        autogen_out: Option<PathBuf>,
        /// Where to write the model artifact
        #[arg(long)]
        model_out: Option<PathBuf>,
        #[arg(long, default_value_t = 200)]
        trees: usize,
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
        #[arg(long, default_value_t = 0.2)]
        test_ratio: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Also write a markdown training report
        #[arg(long = "report")]
        report_out: Option<PathBuf>,
    },
    /// Predict placement for one candidate
    Predict {
        /// Eight CT1 marks out of 30, comma separated
        #[arg(long, value_delimiter = ',', required = true, allow_negative_numbers = true)]
        ct1: Vec<f64>,
        /// Eight CT2 marks out of 30, comma separated
        #[arg(long, value_delimiter = ',', required = true, allow_negative_numbers = true)]
        ct2: Vec<f64>,
        /// Eight final exam percentages, comma separated
        #[arg(long = "final", value_delimiter = ',', required = true, allow_negative_numbers = true)]
        finals: Vec<f64>,
        /// Comma separated skill list
        #[arg(long, default_value = "")]
        skills: String,
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long = "history")]
        history_file: Option<PathBuf>,
        /// Do not record this prediction
        #[arg(long)]
        no_history: bool,
        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recorded predictions, newest first
    History {
        #[arg(long = "history")]
        history_file: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Train {
            data,
            autogen_out,
            model_out,
            trees,
            max_depth,
            test_ratio,
            seed,
            report_out,
        } => {
            let settings = Settings {
                data_file: data.unwrap_or(settings.data_file),
                autogen_file: autogen_out.unwrap_or(settings.autogen_file),
                model_file: model_out.unwrap_or(settings.model_file),
                ..settings
            };
            let config = TrainConfig {
                forest: ForestParams {
                    n_estimators: trees,
                    max_depth,
                    ..ForestParams::default()
                },
                test_ratio,
                seed,
            };

            println!("Loading {}", settings.data_file.display());
            let summary = trainer::train_full_model(&settings, &config)
                .context("training failed")?;

            println!("Saved auto-generated dataset to: {}", settings.autogen_file.display());
            println!("Test accuracy: {:.4}", summary.accuracy());
            println!("{}", summary.report);
            println!("Saved model to: {}", settings.model_file.display());

            if let Some(out) = report_out {
                let markdown = report::build_training_report(&summary, Utc::now());
                std::fs::write(&out, markdown)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                println!("Report written to {}.", out.display());
            }
        }
        Commands::Predict {
            ct1,
            ct2,
            finals,
            skills,
            model,
            history_file,
            no_history,
            json,
        } => {
            let model_path = model.unwrap_or(settings.model_file);
            let predictor = Predictor::load(&model_path)?;
            let result = predictor
                .predict(&ct1, &ct2, &finals, &skills)
                .context("prediction failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "{} ({:.2}%), {} skills counted",
                    label_text(result.label),
                    probability_percent(result.probability),
                    result.skill_count / SKILL_WEIGHT
                );
            }

            if !no_history {
                let path = history_file.unwrap_or(settings.history_file);
                let inputs = CandidateScores {
                    ct1,
                    ct2,
                    finals,
                    skills,
                };
                history::append_entry(&path, &HistoryEntry::new(inputs, &result))
                    .with_context(|| format!("failed to record history in {}", path.display()))?;
            }
        }
        Commands::History {
            history_file,
            limit,
        } => {
            let path = history_file.unwrap_or(settings.history_file);
            let entries = history::read_entries(&path)?;

            if entries.is_empty() {
                println!("No predictions recorded yet.");
                return Ok(());
            }

            println!("Recent predictions:");
            for entry in entries.iter().take(limit) {
                println!("{}", report::format_history_entry(entry));
            }
        }
    }

    Ok(())
}
