use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use log::{info, warn};
use calamine::{open_workbook_auto, Reader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input file {0:?} does not exist")]
    Missing(std::path::PathBuf),
    #[error("could not open input file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not read CSV input: {0}")]
    Csv(#[from] csv::Error),
    #[error("could not read spreadsheet input: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("spreadsheet has no worksheet")]
    NoWorksheet,
}

/// Loads the distinct codes found in `column` (0-based) of the input file.
///
/// CSV inputs are semicolon-delimited without a header row; `.xlsx`/`.xls`
/// inputs are read from their first worksheet with the same column rule.
/// Cells are trimmed of surrounding whitespace as they are loaded; the
/// trimmed string is the code's identity from then on. Blank cells are
/// dropped and the first occurrence of each code wins, compared before any
/// URL cleaning (`A00.0` and `A000` stay distinct).
pub fn load_codes<P: AsRef<Path>>(filename: P, column: usize) -> Result<Vec<String>, LoadError> {
    let path_ref = filename.as_ref();

    if !path_ref.exists() {
        return Err(LoadError::Missing(path_ref.to_path_buf()));
    }

    let is_excel = path_ref
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xls"));

    let cells = if is_excel {
        load_excel_column(path_ref, column)?
    } else {
        load_csv_column(path_ref, column)?
    };

    let codes = dedup_codes(cells);
    info!("Loaded {} unique codes from {:?}", codes.len(), path_ref);
    Ok(codes)
}

fn load_csv_column(path: &Path, column: usize) -> Result<Vec<String>, LoadError> {
    let file = File::open(path)?;

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut cells = Vec::new();
    for (line, result) in rdr.byte_records().enumerate() {
        match result {
            Ok(record) => {
                if let Some(raw) = record.get(column) {
                    cells.push(String::from_utf8_lossy(raw).into_owned());
                }
            }
            Err(e) => {
                warn!("Skipping unreadable CSV record {}: {}", line + 1, e);
            }
        }
    }
    Ok(cells)
}

fn load_excel_column(path: &Path, column: usize) -> Result<Vec<String>, LoadError> {
    let mut workbook = open_workbook_auto(path)?;

    let worksheets = workbook.worksheets();
    let (_name, range) = worksheets.first().ok_or(LoadError::NoWorksheet)?;

    Ok(range
        .rows()
        .filter_map(|row| row.get(column))
        .map(|cell| cell.to_string())
        .collect())
}

fn dedup_codes(cells: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    cells
        .into_iter()
        .map(|cell| cell.trim().to_string())
        .filter(|code| !code.is_empty())
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reads_column_dropping_blanks_and_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("codes.csv");
        fs::write(
            &path,
            "x;A00.0;Choléra\n\
             y;;vide\n\
             z;B01-9;Varicelle\n\
             w;A00.0;Doublon\n\
             short\n\
             v; C22.1 ;Tumeur\n",
        )
        .unwrap();

        let codes = load_codes(&path, 1).unwrap();
        assert_eq!(codes, vec!["A00.0", "B01-9", "C22.1"]);
    }

    #[test]
    fn dedup_is_on_raw_code_not_cleaned_form() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("codes.csv");
        fs::write(&path, "A00.0\nA000\nA00-0\n").unwrap();

        let codes = load_codes(&path, 0).unwrap();
        assert_eq!(codes, vec!["A00.0", "A000", "A00-0"]);
    }

    #[test]
    fn surrounding_whitespace_is_not_part_of_the_code() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("codes.csv");
        fs::write(&path, "A00.0\n  A00.0 \nA00.0\t\nB01\n").unwrap();

        let codes = load_codes(&path, 0).unwrap();
        assert_eq!(codes, vec!["A00.0", "B01"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = load_codes(dir.path().join("absent.csv"), 0).unwrap_err();
        assert!(matches!(err, LoadError::Missing(_)));
    }

    #[test]
    fn reads_first_worksheet_of_excel_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("codes.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (row, code) in ["J45.0", "", "J45.0", "K35"].iter().enumerate() {
            sheet.write_string(row as u32, 0, "libellé").unwrap();
            if !code.is_empty() {
                sheet.write_string(row as u32, 1, *code).unwrap();
            }
        }
        workbook.save(&path).unwrap();

        let codes = load_codes(&path, 1).unwrap();
        assert_eq!(codes, vec!["J45.0", "K35"]);
    }
}
