//! Result workbooks
//!
//! Each metric is accumulated in its own XLSX workbook stored in the bucket.
//! Layout of the `Results` sheet:
//!
//! ```text
//!        A      B       C      ...
//!   1   Year   RCP45   RCP85          <- climate scenario
//!   2          E1      E1             <- aging label
//!   3   2025   ...
//!   ..
//!  62   2084
//! ```
//!
//! Columns are found by the (scenario, aging) header pair and appended when
//! missing. Every write is a read-modify-write of the stored workbook.

use crate::error::{EngineError, Result};
use crate::storage::ObjectStore;
use std::io::Cursor;
use tracing::debug;
use umya_spreadsheet::{Spreadsheet, Worksheet};

/// First year with a row in the workbook
pub const YEARS_START: i32 = 2025;

/// Last year with a row in the workbook
pub const YEARS_END: i32 = 2084;

/// Sheet name
pub const SHEET_NAME: &str = "Results";

/// First data row (rows 1-2 hold the column headers)
const FIRST_YEAR_ROW: u32 = 3;

/// Width applied to newly added result columns
const RESULT_COLUMN_WIDTH: f64 = 16.0;

/// Row holding `year`
pub fn row_for_year(year: i32) -> Result<u32> {
    if !(YEARS_START..=YEARS_END).contains(&year) {
        return Err(EngineError::YearOutOfRange(year));
    }
    Ok(FIRST_YEAR_ROW + (year - YEARS_START) as u32)
}

/// Spreadsheet column letters for a 1-based index (1 -> A, 27 -> AA)
pub fn column_letter(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(b'A' + rem as u8);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// A fresh workbook with the year column filled in
pub fn init_workbook() -> Spreadsheet {
    let mut book = umya_spreadsheet::new_file();
    if let Some(sheet) = book.get_sheet_collection_mut().first_mut() {
        init_sheet(sheet);
    }
    book
}

fn init_sheet(sheet: &mut Worksheet) {
    sheet.set_name(SHEET_NAME);
    sheet.get_cell_mut((1, 1)).set_value("Year");
    sheet.get_cell_mut((1, 2)).set_value("");
    for year in YEARS_START..=YEARS_END {
        let row = FIRST_YEAR_ROW + (year - YEARS_START) as u32;
        sheet.get_cell_mut((1, row)).set_value_number(year);
    }
}

/// Column for the (climate, aging) pair, appending a new column if needed
pub fn col_for_pair(sheet: &mut Worksheet, climate: &str, aging: &str) -> u32 {
    let max_col = sheet.get_highest_column().max(1);
    for col in 2..=max_col {
        let c1 = sheet.get_value((col, 1));
        let c2 = sheet.get_value((col, 2));
        if c1.trim() == climate && c2.trim() == aging {
            return col;
        }
    }

    let col = if max_col >= 2 { max_col + 1 } else { 2 };
    sheet.get_cell_mut((col, 1)).set_value(climate);
    sheet.get_cell_mut((col, 2)).set_value(aging);
    sheet
        .get_column_dimension_mut(&column_letter(col))
        .set_width(RESULT_COLUMN_WIDTH);
    col
}

/// Parse stored workbook bytes
pub fn read_workbook(bytes: Vec<u8>) -> Result<Spreadsheet> {
    umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(bytes), true)
        .map_err(|e| EngineError::workbook(format!("Failed to read workbook: {}", e)))
}

/// Serialize a workbook to XLSX bytes
pub fn write_workbook(book: &Spreadsheet) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(book, &mut cursor)
        .map_err(|e| EngineError::workbook(format!("Failed to write workbook: {}", e)))?;
    Ok(cursor.into_inner())
}

/// Set one value in workbook bytes (or a fresh workbook) and return the new bytes
pub fn apply_value(
    existing: Option<Vec<u8>>,
    climate: &str,
    aging: &str,
    year: i32,
    value: f64,
) -> Result<Vec<u8>> {
    let row = row_for_year(year)?;
    let mut book = match existing {
        Some(bytes) => read_workbook(bytes)?,
        None => init_workbook(),
    };

    let sheet = book
        .get_sheet_collection_mut()
        .first_mut()
        .ok_or_else(|| EngineError::workbook("Workbook has no sheets"))?;
    let col = col_for_pair(sheet, climate, aging);
    sheet.get_cell_mut((col, row)).set_value_number(value);

    write_workbook(&book)
}

/// Read one value back from workbook bytes
pub fn read_value(bytes: Vec<u8>, climate: &str, aging: &str, year: i32) -> Result<Option<f64>> {
    let row = row_for_year(year)?;
    let book = read_workbook(bytes)?;
    let sheet = book
        .get_sheet_collection()
        .first()
        .ok_or_else(|| EngineError::workbook("Workbook has no sheets"))?;

    let max_col = sheet.get_highest_column();
    for col in 2..=max_col {
        if sheet.get_value((col, 1)).trim() == climate && sheet.get_value((col, 2)).trim() == aging {
            return Ok(sheet.get_value((col, row)).trim().parse().ok());
        }
    }
    Ok(None)
}

/// Results workbook stored under one key
#[derive(Debug, Clone)]
pub struct ResultsWorkbook {
    key: String,
}

impl ResultsWorkbook {
    /// Workbook stored at `key`
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Storage key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record `value` for (climate, aging, year).
    ///
    /// A missing value is skipped rather than written as zero. Returns whether
    /// the workbook was updated.
    pub async fn record(
        &self,
        store: &dyn ObjectStore,
        climate: &str,
        aging: &str,
        year: i32,
        value: Option<f64>,
    ) -> Result<bool> {
        let Some(value) = value else {
            return Ok(false);
        };
        // Validate before touching storage.
        row_for_year(year)?;

        let existing = if store.exists(&self.key).await? {
            Some(store.get(&self.key).await?)
        } else {
            None
        };

        let (climate_owned, aging_owned) = (climate.to_string(), aging.to_string());
        let bytes = tokio::task::spawn_blocking(move || {
            apply_value(existing, &climate_owned, &aging_owned, year, value)
        })
        .await??;
        store.put(&self.key, bytes).await?;

        debug!(
            key = %self.key,
            climate = %climate,
            aging = %aging,
            year,
            value,
            "Recorded result"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::MemoryStore;

    #[test]
    fn test_row_for_year() {
        assert_eq!(row_for_year(2025).unwrap(), 3);
        assert_eq!(row_for_year(2084).unwrap(), 62);
        assert!(matches!(
            row_for_year(2024),
            Err(EngineError::YearOutOfRange(2024))
        ));
        assert!(row_for_year(2085).is_err());
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(2), "B");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(53), "BA");
    }

    #[test]
    fn test_init_workbook_layout() {
        let book = init_workbook();
        let sheet = book.get_sheet_collection().first().unwrap();
        assert_eq!(sheet.get_name(), SHEET_NAME);
        assert_eq!(sheet.get_value((1, 1)), "Year");
        assert_eq!(sheet.get_value((1, 3)), "2025");
        assert_eq!(sheet.get_value((1, 62)), "2084");
    }

    #[test]
    fn test_col_for_pair_appends_and_reuses() {
        let mut book = init_workbook();
        let sheet = book.get_sheet_collection_mut().first_mut().unwrap();

        assert_eq!(col_for_pair(sheet, "RCP45", "E1"), 2);
        assert_eq!(col_for_pair(sheet, "RCP85", "E1"), 3);
        assert_eq!(col_for_pair(sheet, "RCP45", "E1"), 2);
        assert_eq!(col_for_pair(sheet, "RCP45", "T2"), 4);
    }

    #[tokio::test]
    async fn test_record_creates_then_updates() {
        let store = MemoryStore::new("mmstore");
        let workbook = ResultsWorkbook::new("results_total_site_energy.xlsx");

        assert!(workbook
            .record(&store, "RCP45", "E1", 2030, Some(1234.5))
            .await
            .unwrap());
        assert!(workbook
            .record(&store, "RCP85", "E1", 2031, Some(99.0))
            .await
            .unwrap());

        let bytes = store.object(workbook.key()).unwrap();
        assert_eq!(
            read_value(bytes.clone(), "RCP45", "E1", 2030).unwrap(),
            Some(1234.5)
        );
        assert_eq!(
            read_value(bytes.clone(), "RCP85", "E1", 2031).unwrap(),
            Some(99.0)
        );
        assert_eq!(read_value(bytes, "RCP26", "E1", 2030).unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_skips_missing_value() {
        let store = MemoryStore::new("mmstore");
        let workbook = ResultsWorkbook::new("results.xlsx");

        let written = workbook
            .record(&store, "RCP45", "E1", 2030, None)
            .await
            .unwrap();
        assert!(!written);
        assert!(store.object("results.xlsx").is_none());
    }

    #[tokio::test]
    async fn test_record_rejects_year_before_storage() {
        let store = MemoryStore::new("mmstore");
        let workbook = ResultsWorkbook::new("results.xlsx");

        let err = workbook
            .record(&store, "RCP45", "E1", 2020, Some(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::YearOutOfRange(2020)));
        assert!(store.keys().is_empty());
    }
}
