use std::fs;
use std::path::{Path, PathBuf};
use calamine::{open_workbook_auto, Reader};
use log::{info, warn, error};
use rust_xlsxwriter::{Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_HEADER: &str = "Code";
pub const SYNONYM_HEADER: &str = "Synonyme";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("could not write spreadsheet: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("could not read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("CSV output error: {0}")]
    Csv(#[from] csv::Error),
    #[error("output I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("output spreadsheet has no worksheet")]
    NoWorksheet,
}

/// One (code, synonym) pair of the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Synonyme")]
    pub synonym: String,
}

impl ResultRow {
    pub fn new(code: impl Into<String>, synonym: impl Into<String>) -> Self {
        ResultRow {
            code: code.into(),
            synonym: synonym.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Xlsx,
    Csv,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => OutputFormat::Csv,
            _ => OutputFormat::Xlsx,
        }
    }
}

/// Two-column output file, rewritten in full on every save.
pub struct ResultSink {
    path: PathBuf,
    format: OutputFormat,
}

impl ResultSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let format = OutputFormat::from_path(&path);
        ResultSink { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites the output with `rows`. Errors are logged, never raised:
    /// the caller still holds the rows for the next attempt.
    pub fn save(&self, rows: &[ResultRow]) -> bool {
        if rows.is_empty() {
            info!("No results to save");
            return false;
        }
        match self.write(rows) {
            Ok(()) => {
                info!("Saved {} rows to {:?}", rows.len(), self.path);
                true
            }
            Err(e) => {
                error!("Failed to save results to {:?}: {}", self.path, e);
                false
            }
        }
    }

    fn write(&self, rows: &[ResultRow]) -> Result<(), SinkError> {
        let tmp_path = sibling(&self.path, ".tmp");
        match self.format {
            OutputFormat::Xlsx => write_xlsx(&tmp_path, rows)?,
            OutputFormat::Csv => write_csv(&tmp_path, rows)?,
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Reads back rows written by a previous save. A missing file is empty.
    pub fn load(&self) -> Result<Vec<ResultRow>, SinkError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        match self.format {
            OutputFormat::Xlsx => read_xlsx(&self.path),
            OutputFormat::Csv => read_csv(&self.path),
        }
    }


    /// Moves the current output aside to `<name>.bak` so a later save cannot
    /// overwrite rows that could not be read back.
    pub fn backup(&self) -> Option<PathBuf> {
        if !self.path.exists() {
            return None;
        }
        let backup_path = sibling(&self.path, ".bak");
        match fs::rename(&self.path, &backup_path) {
            Ok(()) => {
                warn!("Previous output moved to {:?}", backup_path);
                Some(backup_path)
            }
            Err(e) => {
                error!("Could not back up {:?}: {}", self.path, e);
                None
            }
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn write_xlsx(path: &Path, rows: &[ResultRow]) -> Result<(), SinkError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.write_string(0, 0, CODE_HEADER)?;
    worksheet.write_string(0, 1, SYNONYM_HEADER)?;

    for (i, row) in rows.iter().enumerate() {
        let line = (i + 1) as u32;
        worksheet.write_string(line, 0, row.code.as_str())?;
        worksheet.write_string(line, 1, row.synonym.as_str())?;
    }

    workbook.save(path)?;
    Ok(())
}

fn write_csv(path: &Path, rows: &[ResultRow]) -> Result<(), SinkError> {
    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_xlsx(path: &Path) -> Result<Vec<ResultRow>, SinkError> {
    let mut workbook = open_workbook_auto(path)?;
    let worksheets = workbook.worksheets();
    let (_name, range) = worksheets.first().ok_or(SinkError::NoWorksheet)?;

    let mut rows = Vec::new();
    for (i, cells) in range.rows().enumerate() {
        let code = cells.first().map(|c| c.to_string()).unwrap_or_default();
        let synonym = cells.get(1).map(|c| c.to_string()).unwrap_or_default();
        if i == 0 && code == CODE_HEADER {
            continue;
        }
        if code.is_empty() || synonym.is_empty() {
            warn!("Skipping incomplete output row {} in {:?}", i + 1, path);
            continue;
        }
        rows.push(ResultRow { code, synonym });
    }
    Ok(rows)
}

fn read_csv(path: &Path) -> Result<Vec<ResultRow>, SinkError> {
    let mut reader = csv::ReaderBuilder::new().delimiter(b';').from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Vec<ResultRow> {
        vec![
            ResultRow::new("A00.0", "Choléra classique"),
            ResultRow::new("A00.0", "Choléra"),
            ResultRow::new("J45.0", "Asthme allergique"),
        ]
    }

    #[test]
    fn xlsx_has_header_and_one_row_per_pair() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("synonymes.xlsx");
        let sink = ResultSink::new(&path);
        assert!(sink.save(&sample()));

        let mut workbook = open_workbook_auto(&path).unwrap();
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        assert_eq!(rows[0], vec!["Code", "Synonyme"]);
        assert_eq!(rows[3], vec!["J45.0", "Asthme allergique"]);
        assert_eq!(rows.len(), 4);

        assert_eq!(sink.load().unwrap(), sample());
    }

    #[test]
    fn save_overwrites_instead_of_appending() {
        let dir = tempdir().unwrap();
        let sink = ResultSink::new(dir.path().join("synonymes.xlsx"));
        sink.save(&sample());
        sink.save(&sample()[..1]);
        assert_eq!(sink.load().unwrap(), sample()[..1].to_vec());
    }

    #[test]
    fn csv_output_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("synonymes.csv");
        let sink = ResultSink::new(&path);
        sink.save(&sample());

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Code;Synonyme"));
        assert_eq!(sink.load().unwrap(), sample());
    }

    #[test]
    fn empty_results_are_not_written() {
        let dir = tempdir().unwrap();
        let sink = ResultSink::new(dir.path().join("synonymes.xlsx"));
        assert!(!sink.save(&[]));
        assert!(!sink.path().exists());
        assert!(sink.load().unwrap().is_empty());
    }

    #[test]
    fn backup_moves_the_output_aside() {
        let dir = tempdir().unwrap();
        let sink = ResultSink::new(dir.path().join("synonymes.csv"));
        assert!(sink.backup().is_none());
        sink.save(&sample());

        let backup = sink.backup().unwrap();
        assert_eq!(backup, dir.path().join("synonymes.csv.bak"));
        assert!(backup.exists());
        assert!(!sink.path().exists());
    }

    #[test]
    fn write_failure_is_reported_not_raised() {
        let dir = tempdir().unwrap();
        let sink = ResultSink::new(dir.path().join("nope").join("synonymes.xlsx"));
        assert!(!sink.save(&sample()));
    }
}
