use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::features::{build_feature_vector, LABEL_COLUMN};
use crate::models::{ExtendedTable, RawTable};

/// Loads a raw dataset from a CSV file with a header row.
pub fn load_raw_table(path: &Path) -> Result<RawTable> {
    if !path.exists() {
        return Err(PipelineError::DatasetNotFound(path.to_path_buf()));
    }

    let file = std::fs::File::open(path)?;
    let table = read_raw_table(file)?;
    if table.is_empty() {
        warn!(path = %path.display(), "dataset has a header but no rows");
    }
    info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns.len(),
        "loaded raw dataset"
    );
    Ok(table)
}

pub fn read_raw_table<R: Read>(source: R) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result?;
        let row: Vec<Option<String>> = record
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(RawTable::new(columns, rows))
}

/// Writes the extended dataset: feature columns in order, then `Placed`.
pub fn write_extended_table(path: &Path, table: &ExtendedTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header: Vec<&str> = table.feature_names.iter().map(String::as_str).collect();
    header.push(LABEL_COLUMN);
    writer.write_record(&header)?;

    for record in table.records.iter() {
        let mut row: Vec<String> = build_feature_vector(&table.feature_names, &record.features)?
            .into_iter()
            .map(|value| value.to_string())
            .collect();
        row.push(record.placed.to_string());
        writer.write_record(&row)?;
    }

    writer.flush()?;
    info!(path = %path.display(), rows = table.records.len(), "wrote extended dataset");
    Ok(())
}
