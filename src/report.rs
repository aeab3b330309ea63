use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::HistoryEntry;
use crate::trainer::TrainingSummary;

pub fn build_training_report(summary: &TrainingSummary, generated_at: DateTime<Utc>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Placement Model Training Report");
    let _ = writeln!(output, "Generated {}", generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Dataset");
    let _ = writeln!(
        output,
        "- {} rows ({} train, {} held out)",
        summary.rows, summary.train_rows, summary.test_rows
    );
    let _ = writeln!(
        output,
        "- {} placed / {} not placed",
        summary.placed_rows,
        summary.rows - summary.placed_rows
    );
    let _ = writeln!(output, "- base score source: {:?}", summary.base_source);
    if summary.synthesized_columns == 0 {
        let _ = writeln!(output, "- every semester column was present in the export");
    } else {
        let _ = writeln!(
            output,
            "- {} semester columns synthesized",
            summary.synthesized_columns
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Model");
    let _ = writeln!(
        output,
        "- random forest: {} trees, max depth {}, seed {}",
        summary.config.forest.n_estimators, summary.config.forest.max_depth, summary.config.seed
    );
    if let Some(path) = &summary.model_path {
        let _ = writeln!(output, "- artifact: {}", path.display());
    }
    if let Some(path) = &summary.autogen_path {
        let _ = writeln!(output, "- extended dataset: {}", path.display());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Held-out Evaluation");
    let _ = writeln!(output, "Accuracy: {:.4}", summary.accuracy());
    let _ = writeln!(output);
    let _ = writeln!(output, "```");
    let _ = write!(output, "{}", summary.report);
    let _ = writeln!(output, "```");

    output
}

pub fn format_history_entry(entry: &HistoryEntry) -> String {
    format!(
        "- {} {} ({:.2}%) with {} skills [{}]",
        entry.created_at.format("%Y-%m-%d %H:%M"),
        entry.result,
        entry.probability,
        entry.skill_count,
        entry.inputs.skills
    )
}
